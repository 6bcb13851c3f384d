//! `Range` request header parsing.

use std::fmt;

use tracing::info;

const BYTES_UNIT: &str = "bytes=";

/// Inclusive byte range. `upper` is open ended when `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub lower: u64,
    pub upper: Option<u64>,
}

impl ByteRange {
    pub fn closed(lower: u64, upper: u64) -> Self {
        Self {
            lower,
            upper: Some(upper),
        }
    }

    pub fn at_least(lower: u64) -> Self {
        Self { lower, upper: None }
    }

    /// Satisfiable when the lower bound lies strictly before the last byte.
    pub fn is_satisfiable(&self, content_size: u64) -> bool {
        self.lower.saturating_add(1) < content_size
    }

    /// Intersection with `[0, content_size - 1]` as `(lower, upper)`.
    ///
    /// Only meaningful for satisfiable ranges.
    pub fn clamp(&self, content_size: u64) -> (u64, u64) {
        let last = content_size.saturating_sub(1);
        let upper = self.upper.map_or(last, |upper| upper.min(last));
        (self.lower.min(upper), upper)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upper {
            Some(upper) => write!(f, "{}-{}", self.lower, upper),
            None => write!(f, "{}-", self.lower),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeRequest {
    Single(ByteRange),
    /// More than one range was asked for; these are not served.
    Multiple,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RangeParser;

impl RangeParser {
    /// Parse a `Range` header value.
    ///
    /// Supports one range of the forms `bytes=X-Y`, `bytes=X-` and
    /// `bytes=-Y`; the last one is read literally as bytes `0..=Y`.
    /// Anything malformed yields `None` and the full content is served.
    pub fn parse(&self, header: &str) -> Option<RangeRequest> {
        if header.contains(',') {
            return Some(RangeRequest::Multiple);
        }
        let Some(spec) = header.strip_prefix(BYTES_UNIT).filter(|s| !s.is_empty()) else {
            info!(range = header, "unsupported range unit, sending complete content");
            return None;
        };

        let parsed = if let Some(upper) = spec.strip_prefix('-') {
            upper.parse().ok().map(|upper| ByteRange::closed(0, upper))
        } else if let Some(lower) = spec.strip_suffix('-') {
            lower.parse().ok().map(ByteRange::at_least)
        } else if let Some((lower, upper)) = spec.split_once('-') {
            match (lower.parse::<u64>(), upper.parse::<u64>()) {
                (Ok(lower), Ok(upper)) if lower <= upper => Some(ByteRange::closed(lower, upper)),
                _ => None,
            }
        } else {
            None
        };

        if parsed.is_none() {
            info!(range = header, "malformed range, ignoring it");
        }
        parsed.map(RangeRequest::Single)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(header: &str) -> Option<ByteRange> {
        match RangeParser.parse(header) {
            Some(RangeRequest::Single(range)) => Some(range),
            _ => None,
        }
    }

    #[test]
    fn test_forms() {
        assert_eq!(single("bytes=0-499"), Some(ByteRange::closed(0, 499)));
        assert_eq!(single("bytes=500-999"), Some(ByteRange::closed(500, 999)));
        assert_eq!(single("bytes=9500-"), Some(ByteRange::at_least(9500)));
        assert_eq!(single("bytes=-500"), Some(ByteRange::closed(0, 500)));
    }

    #[test]
    fn test_multiple() {
        assert_eq!(
            RangeParser.parse("bytes=0-1,5-9"),
            Some(RangeRequest::Multiple)
        );
        assert_eq!(RangeParser.parse("bytes=x,y"), Some(RangeRequest::Multiple));
    }

    #[test]
    fn test_malformed_ignored() {
        for header in [
            "bytes=",
            "bytes=abc",
            "bytes=5",
            "bytes=9-3",
            "bytes=1-2-3",
            "items=0-5",
            "0-5",
            "bytes=--5",
            "bytes=-x",
        ] {
            assert_eq!(RangeParser.parse(header), None, "{}", header);
        }
    }

    #[test]
    fn test_satisfiable() {
        assert!(ByteRange::closed(0, 10).is_satisfiable(2));
        assert!(ByteRange::at_least(8).is_satisfiable(10));
        // lower must be strictly less than size - 1
        assert!(!ByteRange::at_least(9).is_satisfiable(10));
        assert!(!ByteRange::closed(10, 20).is_satisfiable(10));
        assert!(!ByteRange::closed(0, 0).is_satisfiable(0));
    }

    #[test]
    fn test_clamp() {
        assert_eq!(ByteRange::closed(2, 5).clamp(10), (2, 5));
        assert_eq!(ByteRange::closed(2, 50).clamp(10), (2, 9));
        assert_eq!(ByteRange::at_least(3).clamp(10), (3, 9));
        assert_eq!(ByteRange::at_least(3).to_string(), "3-");
    }
}
