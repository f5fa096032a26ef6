//! An ordered header multimap with case-insensitive lookup and
//! case-preserving storage.
//!
//! `http::HeaderMap` lowercases names on insert, which this crate cannot
//! use: request heads must retain the header's original casing, and the
//! response builder must be able to detect two names that differ only in
//! case. This is a vector-of-pairs plus a case-folded index, per the
//! crate's own design notes on the shape of such a structure.

use std::fmt;

/// One header name, storing the original case it was parsed or set with.
#[derive(Clone, Debug, Eq)]
pub struct HeaderName(String);

impl HeaderName {
    /// Builds a `HeaderName` from a caller-supplied string, rejecting empty
    /// names.
    pub fn from_str(s: &str) -> Result<HeaderName, crate::error::Error> {
        if s.is_empty() {
            return Err(crate::error::Error::new_parse(
                crate::error::Parse::HeaderNameEmpty,
            ));
        }
        Ok(HeaderName(s.to_owned()))
    }

    /// The original-case representation of the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn eq_ignore_case(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq for HeaderName {
    fn eq(&self, other: &Self) -> bool {
        self.eq_ignore_case(&other.0)
    }
}

impl PartialEq<str> for HeaderName {
    fn eq(&self, other: &str) -> bool {
        self.eq_ignore_case(other)
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HeaderName {
    fn from(s: &str) -> Self {
        HeaderName(s.to_owned())
    }
}

impl From<String> for HeaderName {
    fn from(s: String) -> Self {
        HeaderName(s)
    }
}

/// An ordered, case-preserving, case-insensitive-lookup header multimap.
///
/// Insertion order is preserved for iteration. Multiple entries with names
/// differing only in original case are permitted by this type itself
/// (requests legitimately retain duplicates); callers that must reject
/// case-only duplicates (the response builder) check for that themselves
/// with [`HeaderMap::has_case_conflict`].
#[derive(Clone, Debug, Default)]
pub struct HeaderMap {
    entries: Vec<(HeaderName, String)>,
}

impl HeaderMap {
    /// Creates an empty header map.
    pub fn new() -> Self {
        HeaderMap {
            entries: Vec::new(),
        }
    }

    /// Number of header entries (counting duplicates).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no header entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a header entry, retaining any existing entries with the
    /// same (case-insensitive) name.
    pub fn append<N: Into<HeaderName>>(&mut self, name: N, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Removes all entries matching `name` (case-insensitively) and
    /// inserts a single new entry.
    pub fn set<N: Into<HeaderName>>(&mut self, name: N, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|(n, _)| n != &name);
        self.entries.push((name, value.into()));
    }

    /// Removes all entries matching `name` (case-insensitively).
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_case(name));
    }

    /// Returns the first value for `name` (case-insensitively), if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for `name` (case-insensitively), in insertion
    /// order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True if at least one entry matches `name` (case-insensitively).
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_case(name))
    }

    /// Iterates all entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &str)> {
        self.entries.iter().map(|(n, v)| (n, v.as_str()))
    }

    /// True if two distinct entries share a case-insensitive name but
    /// differ in original case (the response builder treats this as a
    /// build-time error; request parsing does not).
    pub fn has_case_conflict(&self) -> bool {
        for (i, (a, _)) in self.entries.iter().enumerate() {
            for (b, _) in self.entries.iter().skip(i + 1) {
                if a.eq_ignore_case(b.as_str()) && a.as_str() != b.as_str() {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_lookup_case_preserving_storage() {
        let mut h = HeaderMap::new();
        h.append("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.iter().next().unwrap().0.as_str(), "Content-Type");
    }

    #[test]
    fn duplicates_retained_by_default() {
        let mut h = HeaderMap::new();
        h.append("X-Foo", "1");
        h.append("X-Foo", "2");
        assert_eq!(h.get_all("x-foo").collect::<Vec<_>>(), vec!["1", "2"]);
    }

    #[test]
    fn set_replaces_all_matches() {
        let mut h = HeaderMap::new();
        h.append("X-Foo", "1");
        h.append("X-Foo", "2");
        h.set("x-foo", "3");
        assert_eq!(h.get_all("X-Foo").collect::<Vec<_>>(), vec!["3"]);
    }

    #[test]
    fn detects_case_only_conflict() {
        let mut h = HeaderMap::new();
        h.append("Content-Length", "1");
        assert!(!h.has_case_conflict());
        h.append("content-length", "2");
        assert!(h.has_case_conflict());
    }
}
