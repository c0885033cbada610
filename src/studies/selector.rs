//! Weighted random study selection.

use rand::Rng;

use crate::error::SelectionError;

use super::Study;

/// Picks a study at random, proportionally to weight.
///
/// Zero-weight studies stay in the catalog but are never picked.
pub fn choose_study(studies: &[Study]) -> Result<&Study, SelectionError> {
    choose_study_with(studies, &mut rand::thread_rng())
}

/// Same as [`choose_study`] with a caller-supplied random source.
pub fn choose_study_with<'a, R: Rng>(
    studies: &'a [Study],
    rng: &mut R,
) -> Result<&'a Study, SelectionError> {
    let eligible: Vec<&Study> = studies.iter().filter(|s| s.is_eligible()).collect();

    if eligible.is_empty() {
        return Err(SelectionError::NoEligibleStudies);
    }
    if eligible.len() == 1 {
        return Ok(eligible[0]);
    }

    // Running totals over weights scaled into (0, 1], so the sum stays
    // finite even when the raw weights are near f64::MAX
    let cumulative: Vec<f64> = scale_to_max(eligible.iter().map(|s| s.weight))
        .into_iter()
        .scan(0.0, |total, w| {
            *total += w;
            Some(*total)
        })
        .collect();
    let total = cumulative[cumulative.len() - 1];
    if !(total.is_finite() && total > 0.0) {
        return Err(SelectionError::NoEligibleStudies);
    }

    let threshold = rng.gen_range(0.0..total);
    let idx = cumulative.partition_point(|&upper| upper <= threshold);

    Ok(eligible[idx.min(eligible.len() - 1)])
}

/// Divides every weight by the largest one.
///
/// Ratios are preserved and each result lies in `[0, 1]`. All zeros stay
/// zero.
pub(crate) fn scale_to_max(weights: impl Iterator<Item = f64> + Clone) -> Vec<f64> {
    let max = weights.clone().fold(0.0_f64, f64::max);
    if max > 0.0 {
        weights.map(|w| w / max).collect()
    } else {
        weights.map(|_| 0.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn make_study(name: &str, weight: f64) -> Study {
        Study::new(format!("https://example.com/{}", name), weight)
    }

    #[test]
    fn test_single_study_always_selected() {
        let studies = vec![make_study("a", 1.0)];
        for _ in 0..5 {
            assert_eq!(choose_study(&studies).unwrap().url, "https://example.com/a");
        }
    }

    #[test]
    fn test_chooses_from_studies() {
        let studies = vec![make_study("a", 1.0), make_study("b", 1.0)];
        let chosen = choose_study(&studies).unwrap();
        assert!(studies.contains(chosen));
    }

    #[test]
    fn test_zero_weight_never_selected() {
        let studies = vec![make_study("a", 0.0), make_study("b", 1.0)];
        for _ in 0..100 {
            assert_eq!(choose_study(&studies).unwrap().url, "https://example.com/b");
        }
    }

    #[test]
    fn test_zero_weight_never_selected_among_many() {
        let studies = vec![
            make_study("a", 1.0),
            make_study("retired", 0.0),
            make_study("c", 2.0),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let chosen = choose_study_with(&studies, &mut rng).unwrap();
            assert_ne!(chosen.url, "https://example.com/retired");
        }
    }

    #[test]
    fn test_all_zero_weights_fails() {
        let studies = vec![make_study("a", 0.0), make_study("b", 0.0)];
        assert_eq!(
            choose_study(&studies).unwrap_err(),
            SelectionError::NoEligibleStudies
        );
    }

    #[test]
    fn test_empty_catalog_fails() {
        assert_eq!(
            choose_study(&[]).unwrap_err(),
            SelectionError::NoEligibleStudies
        );
    }

    #[test]
    fn test_respects_heavy_skew() {
        let studies = vec![make_study("a", 1.0), make_study("b", 99.0)];
        let mut rng = StdRng::seed_from_u64(42);

        let mut counts = [0usize; 2];
        for _ in 0..1000 {
            let chosen = choose_study_with(&studies, &mut rng).unwrap();
            if chosen.url.ends_with("/a") {
                counts[0] += 1;
            } else {
                counts[1] += 1;
            }
        }

        assert!(counts[1] > counts[0] * 10, "counts: {:?}", counts);
    }

    #[test]
    fn test_ratio_converges_to_weights() {
        let studies = vec![make_study("a", 1.0), make_study("b", 2.0)];
        let mut rng = StdRng::seed_from_u64(1234);

        let mut a = 0usize;
        let mut b = 0usize;
        for _ in 0..30_000 {
            match choose_study_with(&studies, &mut rng).unwrap().url.as_str() {
                "https://example.com/a" => a += 1,
                _ => b += 1,
            }
        }

        let ratio = b as f64 / a as f64;
        assert!((1.9..2.1).contains(&ratio), "ratio {:.3} ({} / {})", ratio, b, a);
    }

    #[test]
    fn test_huge_weights_do_not_overflow() {
        let studies = vec![make_study("a", 1.7e308), make_study("b", 1.7e308)];
        let mut rng = StdRng::seed_from_u64(99);

        let mut a = 0usize;
        for _ in 0..2000 {
            if choose_study_with(&studies, &mut rng).unwrap().url.ends_with("/a") {
                a += 1;
            }
        }
        assert!((800..1200).contains(&a), "a picked {} times", a);
    }

    #[test]
    fn test_scale_to_max() {
        let weights = [1.0, 4.0, 0.0, 2.0];
        assert_eq!(scale_to_max(weights.iter().copied()), vec![0.25, 1.0, 0.0, 0.5]);
        assert_eq!(scale_to_max([0.0, 0.0].iter().copied()), vec![0.0, 0.0]);
        assert_eq!(scale_to_max([f64::MAX, f64::MAX].iter().copied()), vec![1.0, 1.0]);
    }
}
