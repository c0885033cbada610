//! Merging request parameters into a study URL.

use url::Url;

use crate::store::ParameterSet;

/// Adds `incoming` parameters to `base_url`'s query string.
///
/// Keys already in the base query win: their base values replace the
/// incoming ones, so study owners can pin parameters such as `study_id`.
/// Repeated keys are emitted once per value.
pub fn merge_urls(base_url: &str, incoming: &ParameterSet) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base_url)?;
    let base = ParameterSet::from_query(url.query().unwrap_or(""));

    let mut merged = incoming.clone();
    for (key, values) in base.iter() {
        merged.set(key, values.to_vec());
    }

    if merged.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(merged.pairs());
    }

    Ok(url.into())
}
