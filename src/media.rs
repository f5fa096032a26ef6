//! Media-type (`Content-Type`/`Accept`) parsing and negotiation.
//!
//! Content negotiation is an application-layer concern with no
//! transport-library precedent to draw on; the parser and scoring
//! function below implement the negotiation algorithm directly.

use std::cmp::Ordering;

/// A handler's declared media range: either a concrete (possibly
/// wildcarded) MIME type, or one of the two sentinels that describe
/// "no request body".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaRange {
    /// `<nothing>` — matches only requests that have no body/content-type.
    Nothing,
    /// `<nothing-and-all>` — matches requests with no body, and (like
    /// `*/*`) any concrete content type.
    NothingAndAll,
    /// A concrete range, e.g. `*/*`, `text/*`, or `text/plain; charset=utf-8`.
    Concrete(ConcreteType),
}

/// A MIME type with an ordered parameter list (order does not affect
/// equality; comparisons below work on the parameter set).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConcreteType {
    pub type_: String,
    pub subtype: String,
    pub params: Vec<(String, String)>,
}

impl ConcreteType {
    fn is_type_wild(&self) -> bool {
        self.type_ == "*"
    }

    fn is_subtype_wild(&self) -> bool {
        self.subtype == "*"
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// True if every parameter on `self` is present with an equal value on
    /// `other` (used both directions, for content-type and accept
    /// matching respectively).
    fn params_subset_of(&self, other: &ConcreteType) -> bool {
        self.params
            .iter()
            .all(|(k, v)| other.param(k).map(|ov| ov.eq_ignore_ascii_case(v)).unwrap_or(false))
    }
}

/// Parses a `Content-Type`-shaped value (no wildcards expected, but
/// tolerated) into a [`ConcreteType`].
pub fn parse_concrete(value: &str) -> Option<ConcreteType> {
    let mut parts = value.split(';');
    let essence = parts.next()?.trim();
    let (type_, subtype) = essence.split_once('/')?;
    if type_.is_empty() || subtype.is_empty() {
        return None;
    }
    let mut params = Vec::new();
    for p in parts {
        let p = p.trim();
        if p.is_empty() {
            continue;
        }
        if let Some((k, v)) = p.split_once('=') {
            params.push((
                k.trim().to_ascii_lowercase(),
                v.trim().trim_matches('"').to_owned(),
            ));
        }
    }
    Some(ConcreteType {
        type_: type_.trim().to_ascii_lowercase(),
        subtype: subtype.trim().to_ascii_lowercase(),
        params,
    })
}

/// One entry of a parsed `Accept` header.
#[derive(Clone, Debug)]
pub struct AcceptEntry {
    pub range: ConcreteType,
    pub q: f32,
}

/// Parses an `Accept` header value into its entries, defaulting `q` to
/// 1.0 when absent.
pub fn parse_accept(value: &str) -> Vec<AcceptEntry> {
    let mut out = Vec::new();
    for item in value.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let mut q = 1.0f32;
        let mut essence_and_params = Vec::new();
        let mut parts = item.split(';');
        let essence = match parts.next() {
            Some(e) => e.trim(),
            None => continue,
        };
        for p in parts {
            let p = p.trim();
            if let Some(rest) = p.strip_prefix("q=") {
                q = rest.trim().parse().unwrap_or(1.0);
            } else if let Some((k, v)) = p.split_once('=') {
                essence_and_params.push((
                    k.trim().to_ascii_lowercase(),
                    v.trim().trim_matches('"').to_owned(),
                ));
            }
        }
        let (type_, subtype) = match essence.split_once('/') {
            Some(parts) => parts,
            None => continue,
        };
        out.push(AcceptEntry {
            range: ConcreteType {
                type_: type_.trim().to_ascii_lowercase(),
                subtype: subtype.trim().to_ascii_lowercase(),
                params: essence_and_params,
            },
            q,
        });
    }
    out
}

/// The second stage of handler resolution: does `consumes` accept a request whose body's
/// content-type is `request_ct` (`None` meaning no body/content-type)?
pub fn content_type_matches(consumes: &MediaRange, request_ct: Option<&ConcreteType>) -> bool {
    match (consumes, request_ct) {
        (MediaRange::Nothing, None) => true,
        (MediaRange::Nothing, Some(_)) => false,
        (MediaRange::NothingAndAll, None) => true,
        (MediaRange::NothingAndAll, Some(_)) => true,
        (MediaRange::Concrete(_), None) => false,
        (MediaRange::Concrete(range), Some(ct)) => range_covers(range, ct),
    }
}

/// True if `range` (a handler's declared consumes range, possibly
/// wildcarded) covers the concrete `ct`, per `*/* ⊇ type/* ⊇ type/subtype`
/// with request params a superset of the handler's.
fn range_covers(range: &ConcreteType, ct: &ConcreteType) -> bool {
    if range.is_type_wild() {
        return range.params_subset_of(ct);
    }
    if !range.type_.eq_ignore_ascii_case(&ct.type_) {
        return false;
    }
    if range.is_subtype_wild() {
        return range.params_subset_of(ct);
    }
    if !range.subtype.eq_ignore_ascii_case(&ct.subtype) {
        return false;
    }
    range.params_subset_of(ct)
}

/// A handler's specificity score against one `Accept` entry, used in
/// the third stage of handler resolution. Returns `None` if the entry and the handler's
/// `produces` type are wholly incompatible.
///
/// The ordering implemented here: concrete subtype match beats a
/// subtype wildcard match, which beats the nothing/nothing-and-all
/// sentinels; among equally-ranged matches, more handler parameters
/// satisfied wins; `<nothing>` outranks `<nothing-and-all>` when the
/// peer's accept entry itself signals "no preference" (`*/*`), and
/// `*/*` outranks `<nothing-and-all>` when the peer's entry names a
/// concrete type. This is an intentionally asymmetric ordering, not a
/// "cleaner" derived one.
pub fn specificity(produces: &MediaRange, accept: &AcceptEntry) -> Option<(u8, usize)> {
    match produces {
        MediaRange::Nothing => {
            if accept.range.is_type_wild() {
                Some((1, 0))
            } else {
                None
            }
        }
        MediaRange::NothingAndAll => Some((0, 0)),
        MediaRange::Concrete(p) => {
            if accept.range.is_type_wild() {
                return Some((1, p.params.len()));
            }
            if !accept.range.type_.eq_ignore_ascii_case(&p.type_) {
                return None;
            }
            if accept.range.is_subtype_wild() {
                return Some((2, p.params.len()));
            }
            if !accept.range.subtype.eq_ignore_ascii_case(&p.subtype) {
                return None;
            }
            Some((3, p.params.len()))
        }
    }
}

/// Total ordering key for selecting the winning handler in stage 3:
/// `q * specificity`, compared lexicographically via
/// `(quality_bucket, range_rank, param_count)` to avoid floating-point
/// tie subtleties while still respecting `q` as the dominant factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Score {
    pub q_milli: u32,
    pub range_rank: u8,
    pub param_count: usize,
}

impl Score {
    pub fn compute(produces: &MediaRange, accept: &AcceptEntry) -> Option<Score> {
        let (range_rank, param_count) = specificity(produces, accept)?;
        Some(Score {
            q_milli: (accept.q.max(0.0) * 1000.0) as u32,
            range_rank,
            param_count,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.q_milli == 0
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(
            self.q_milli
                .cmp(&other.q_milli)
                .then(self.range_rank.cmp(&other.range_rank))
                .then(self.param_count.cmp(&other.param_count)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_concrete_with_params() {
        let ct = parse_concrete("text/plain; charset=utf-8").unwrap();
        assert_eq!(ct.type_, "text");
        assert_eq!(ct.subtype, "plain");
        assert_eq!(ct.param("charset"), Some("utf-8"));
    }

    #[test]
    fn nothing_only_matches_absent_body() {
        assert!(content_type_matches(&MediaRange::Nothing, None));
        let ct = parse_concrete("application/json").unwrap();
        assert!(!content_type_matches(&MediaRange::Nothing, Some(&ct)));
    }

    #[test]
    fn wildcard_range_covers_concrete() {
        let range = parse_concrete("text/*").unwrap();
        let ct = parse_concrete("text/plain").unwrap();
        assert!(range_covers(&range, &ct));
        let other = parse_concrete("application/json").unwrap();
        assert!(!range_covers(&range, &other));
    }

    #[test]
    fn accept_quality_breaks_ties() {
        let entries = parse_accept("text/html;q=0.9, text/plain;q=0.5");
        assert_eq!(entries[0].range.subtype, "html");
        assert!(entries[0].q > entries[1].q);
    }

    #[test]
    fn higher_quality_html_wins_over_plain() {
        let html = MediaRange::Concrete(parse_concrete("text/html").unwrap());
        let plain = MediaRange::Concrete(parse_concrete("text/plain").unwrap());
        let entries = parse_accept("text/html;q=0.9, text/plain;q=0.5");
        let html_score = entries
            .iter()
            .filter_map(|e| Score::compute(&html, e))
            .max_by(|a, b| a.partial_cmp(b).unwrap());
        let plain_score = entries
            .iter()
            .filter_map(|e| Score::compute(&plain, e))
            .max_by(|a, b| a.partial_cmp(b).unwrap());
        assert!(html_score.unwrap().partial_cmp(&plain_score.unwrap()) == Some(Ordering::Greater));
    }
}
