//! Request parameter sets and their order-independent fingerprints.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use sha2::{Digest, Sha256};
use url::form_urlencoded;

/// Insertion-ordered multimap of request parameters.
///
/// Keys are unique; repeated query keys collect into one value list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    entries: Vec<(String, Vec<String>)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes an `application/x-www-form-urlencoded` query string.
    ///
    /// Blank values are kept, so `?a=&b` yields `a: [""]` and `b: [""]`.
    pub fn from_query(query: &str) -> Self {
        form_urlencoded::parse(query.as_bytes()).collect()
    }

    /// Appends a value to `key`, creating the key at the end if needed.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Replaces all values of `key`, keeping its position if present.
    pub fn set(&mut self, key: impl Into<String>, values: Vec<String>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((key, values)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates keys with their values, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Flattens to one `(key, value)` pair per value.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v.as_str())))
    }
}

impl<K, V> FromIterator<(K, V)> for ParameterSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = ParameterSet::new();
        for (k, v) in iter {
            params.push(k, v);
        }
        params
    }
}

/// Lowercase hex SHA-256 digest identifying a parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of a parameter set.
///
/// Key order and value order within a key do not affect the result.
pub fn compute_fingerprint(params: &ParameterSet) -> serde_json::Result<Fingerprint> {
    let digest = Sha256::digest(canonical_bytes(params)?);
    Ok(Fingerprint(hex::encode(digest)))
}

/// Canonical JSON encoding: sorted keys, sorted values, `", "` and `": "`
/// separators, everything outside printable ASCII escaped as `\uXXXX`.
pub fn canonical_bytes(params: &ParameterSet) -> serde_json::Result<Vec<u8>> {
    let sorted: BTreeMap<&str, Vec<&str>> = params
        .iter()
        .map(|(k, values)| {
            let mut values: Vec<&str> = values.iter().map(String::as_str).collect();
            values.sort_unstable();
            (k, values)
        })
        .collect();

    let mut out = Vec::with_capacity(64);
    sorted.serialize(&mut Serializer::with_formatter(&mut out, CanonicalFormatter))?;
    Ok(out)
}

struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if (' '..='~').contains(&c) {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ParameterSet {
        pairs.iter().copied().collect()
    }

    // ========== Phase 1: ParameterSet ==========

    #[test]
    fn test_from_query_groups_repeated_keys() {
        let p = ParameterSet::from_query("tag=a&email=foo%40bar.com&tag=b");
        assert_eq!(p.len(), 2);
        assert_eq!(p.get("tag").unwrap(), ["a", "b"]);
        assert_eq!(p.get("email").unwrap(), ["foo@bar.com"]);
    }

    #[test]
    fn test_from_query_keeps_blank_values() {
        let p = ParameterSet::from_query("a=&b");
        assert_eq!(p.get("a").unwrap(), [""]);
        assert_eq!(p.get("b").unwrap(), [""]);
    }

    #[test]
    fn test_from_empty_query() {
        assert!(ParameterSet::from_query("").is_empty());
    }

    #[test]
    fn test_set_keeps_position() {
        let mut p = params(&[("a", "1"), ("b", "2")]);
        p.set("a", vec!["9".to_string()]);
        p.set("c", vec!["3".to_string()]);

        let keys: Vec<&str> = p.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(p.get("a").unwrap(), ["9"]);
    }

    #[test]
    fn test_pairs_flatten() {
        let p = params(&[("tag", "a"), ("x", "1"), ("tag", "b")]);
        let pairs: Vec<(&str, &str)> = p.pairs().collect();
        assert_eq!(pairs, vec![("tag", "a"), ("tag", "b"), ("x", "1")]);
    }

    // ========== Phase 2: Canonical Encoding ==========

    #[test]
    fn test_canonical_form_layout() {
        let p = params(&[("tags", "b"), ("email", "x"), ("tags", "a")]);
        assert_eq!(
            String::from_utf8(canonical_bytes(&p).unwrap()).unwrap(),
            r#"{"email": ["x"], "tags": ["a", "b"]}"#
        );
    }

    #[test]
    fn test_canonical_form_escapes_non_ascii() {
        let p = params(&[("name", "Zoë"), ("q", "a\"b\n")]);
        assert_eq!(
            String::from_utf8(canonical_bytes(&p).unwrap()).unwrap(),
            r#"{"name": ["Zo\u00eb"], "q": ["a\"b\n"]}"#
        );
    }

    #[test]
    fn test_canonical_form_escapes_astral_as_surrogates() {
        let p = params(&[("e", "😀")]);
        assert_eq!(
            String::from_utf8(canonical_bytes(&p).unwrap()).unwrap(),
            r#"{"e": ["\ud83d\ude00"]}"#
        );
    }

    // ========== Phase 3: Fingerprints ==========

    #[test]
    fn test_known_digest() {
        let p = params(&[("email", "foo@bar.com")]);
        assert_eq!(
            compute_fingerprint(&p).unwrap().as_str(),
            "b8c996fe067d4983b907a2da6526daa74bfb48aea5a6d84265741a4f17fcbbd5"
        );

        let p = params(&[("tags", "b"), ("email", "x"), ("tags", "a")]);
        assert_eq!(
            compute_fingerprint(&p).unwrap().to_string(),
            "ff61333a52a833d1ccd3738202a13029bdd5e6d78fbad7ceaf48a50174685ce6"
        );

        let p = params(&[("name", "Zoë")]);
        assert_eq!(
            compute_fingerprint(&p).unwrap().as_str(),
            "c960ecdbfb52bc4b75826ecd8f00be2d4a1714b9e8675f2aa2138eba90f6e9da"
        );
    }

    #[test]
    fn test_stable() {
        let p = params(&[("email", "foo@bar.com"), ("ts", "12345")]);
        assert_eq!(compute_fingerprint(&p).unwrap(), compute_fingerprint(&p.clone()).unwrap());
    }

    #[test]
    fn test_key_order_independent() {
        let p1 = params(&[("ts", "1"), ("email", "x")]);
        let p2 = params(&[("email", "x"), ("ts", "1")]);
        assert_eq!(compute_fingerprint(&p1).unwrap(), compute_fingerprint(&p2).unwrap());
    }

    #[test]
    fn test_value_order_independent() {
        let p1 = params(&[("tags", "a"), ("tags", "b"), ("tags", "c")]);
        let p2 = params(&[("tags", "c"), ("tags", "b"), ("tags", "a")]);
        assert_eq!(compute_fingerprint(&p1).unwrap(), compute_fingerprint(&p2).unwrap());
    }

    #[test]
    fn test_differs_for_different_values() {
        let p1 = params(&[("email", "a@b.com")]);
        let p2 = params(&[("email", "x@y.com")]);
        assert_ne!(compute_fingerprint(&p1).unwrap(), compute_fingerprint(&p2).unwrap());
    }

    #[test]
    fn test_differs_for_value_multiplicity() {
        let p1 = params(&[("tag", "a")]);
        let p2 = params(&[("tag", "a"), ("tag", "a")]);
        assert_ne!(compute_fingerprint(&p1).unwrap(), compute_fingerprint(&p2).unwrap());
    }

    #[test]
    fn test_differs_for_key_split() {
        // Same characters, different structure
        let p1 = params(&[("a", "b,c")]);
        let p2 = params(&[("a", "b"), ("a", "c")]);
        assert_ne!(compute_fingerprint(&p1).unwrap(), compute_fingerprint(&p2).unwrap());
    }

    #[test]
    fn test_fingerprint_is_hex_256() {
        let fp = compute_fingerprint(&params(&[("id", "1")])).unwrap();
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_never_hashes_empty_input() {
        // SHA-256 of zero bytes
        const EMPTY_DIGEST: &str =
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

        assert_eq!(canonical_bytes(&ParameterSet::new()).unwrap(), b"{}");
        for p in [ParameterSet::new(), params(&[("id", "1")]), params(&[("", "")])] {
            assert_ne!(compute_fingerprint(&p).unwrap().as_str(), EMPTY_DIGEST);
        }
    }
}
