//! Path segment parsing and normalization, shared by the route and
//! action registries.

use crate::error::Error;

/// One component of a route or action pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Static(String),
    Param(String),
    CatchAll(String),
}

/// Parses a `/`-delimited pattern into its segments.
///
/// Shared syntax for routes and actions: `:name` is a single-segment
/// parameter, `*name` is a catch-all (only legal as the last segment), a
/// leading/trailing `/` is discarded (at most one), and parameter names
/// must be unique within the pattern.
pub fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, PatternError> {
    let trimmed = pattern.strip_prefix('/').unwrap_or(pattern);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);

    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let mut names = std::collections::HashSet::new();
    let parts: Vec<&str> = trimmed.split('/').collect();
    let last = parts.len() - 1;

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            return Err(PatternError::EmptySegment);
        }
        let seg = if let Some(name) = part.strip_prefix(':') {
            if name.is_empty() {
                return Err(PatternError::EmptySegment);
            }
            Segment::Param(name.to_owned())
        } else if let Some(name) = part.strip_prefix('*') {
            if name.is_empty() {
                return Err(PatternError::EmptySegment);
            }
            if i != last {
                return Err(PatternError::CatchAllNotLast);
            }
            Segment::CatchAll(name.to_owned())
        } else {
            Segment::Static((*part).to_owned())
        };

        if let Segment::Param(name) | Segment::CatchAll(name) = &seg {
            if !names.insert(name.clone()) {
                return Err(PatternError::DuplicateParamName);
            }
        }

        segments.push(seg);
    }

    Ok(segments)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternError {
    EmptySegment,
    CatchAllNotLast,
    DuplicateParamName,
}

/// Normalizes a raw request path: collapse repeated `/`, strip
/// trailing `/`, percent-decode each segment, resolve `.`/`..`, then
/// split into segments for left-to-right matching. An empty path
/// normalizes to a single empty segment list (matching `/`).
pub fn normalize_path(raw: &str) -> Result<Vec<String>, Error> {
    let path = if raw.is_empty() { "/" } else { raw };

    let mut resolved: Vec<String> = Vec::new();
    for raw_seg in path.split('/') {
        if raw_seg.is_empty() {
            continue;
        }
        let decoded = percent_decode(raw_seg)?;
        match decoded.as_str() {
            "." => {}
            ".." => {
                resolved.pop();
            }
            _ => resolved.push(decoded),
        }
    }
    Ok(resolved)
}

fn percent_decode(input: &str) -> Result<String, Error> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = hex_digit(bytes[i + 1]);
            let lo = hex_digit(bytes[i + 2]);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push(hi * 16 + lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_static_param_catchall() {
        let segs = parse_pattern("/greet/:name").unwrap();
        assert_eq!(
            segs,
            vec![Segment::Static("greet".into()), Segment::Param("name".into())]
        );
    }

    #[test]
    fn catchall_must_be_last() {
        assert_eq!(
            parse_pattern("/*rest/more").unwrap_err(),
            PatternError::CatchAllNotLast
        );
    }

    #[test]
    fn empty_path_normalizes_to_root() {
        assert_eq!(normalize_path("").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn collapses_slash_runs_and_trailing_slashes() {
        assert_eq!(
            normalize_path("//a///b///").unwrap(),
            vec!["a".to_owned(), "b".to_owned()]
        );
    }

    #[test]
    fn resolves_dot_segments() {
        assert_eq!(
            normalize_path("/a/b/../c").unwrap(),
            vec!["a".to_owned(), "c".to_owned()]
        );
    }
}
