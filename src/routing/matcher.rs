//! Route path patterns.
//!
//! # Syntax
//! - Literal segments match exactly (case-sensitive)
//! - `*` matches exactly one segment
//! - `**` as the final segment matches zero or more segments
//!
//! # Design Decisions
//! - Patterns compiled once at startup
//! - No regex, matching is a single pass over the segments
//! - Empty segments (`//`, trailing `/`) are ignored

/// One compiled pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Single,
    Rest,
}

/// A compiled path pattern such as `/exchange/**`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a pattern. Fails on a missing leading `/` or a non-trailing `**`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if !raw.starts_with('/') {
            return Err(format!("pattern '{}' must start with '/'", raw));
        }

        let parts: Vec<&str> = split_path(raw).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "**" if i + 1 == parts.len() => Segment::Rest,
                "**" => return Err(format!("'**' must be the last segment in '{}'", raw)),
                "*" => Segment::Single,
                literal => Segment::Literal(literal.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Returns true if the request path matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        let mut parts = split_path(path);
        for segment in &self.segments {
            match segment {
                Segment::Rest => return true,
                Segment::Single => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(expected) => match parts.next() {
                    Some(part) if part == expected => {}
                    _ => return false,
                },
            }
        }
        parts.next().is_none()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Non-empty path segments.
pub(crate) fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_pattern() {
        let pattern = PathPattern::parse("/exchange/**").unwrap();
        assert!(pattern.matches("/exchange"));
        assert!(pattern.matches("/exchange/from/USD/to/INR"));
        assert!(!pattern.matches("/exchanges/from/USD"));
        assert!(!pattern.matches("/conversion/exchange"));
    }

    #[test]
    fn test_single_and_literal() {
        let pattern = PathPattern::parse("/limits/*/detail").unwrap();
        assert!(pattern.matches("/limits/42/detail"));
        assert!(!pattern.matches("/limits/detail"));
        assert!(!pattern.matches("/limits/42/detail/more"));

        let exact = PathPattern::parse("/health").unwrap();
        assert!(exact.matches("/health/"));
        assert!(!exact.matches("/health/deep"));
    }

    #[test]
    fn test_root_catch_all() {
        let pattern = PathPattern::parse("/**").unwrap();
        assert!(pattern.matches("/"));
        assert!(pattern.matches("/anything/at/all"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(PathPattern::parse("exchange/**").is_err());
        assert!(PathPattern::parse("/a/**/b").is_err());
    }
}
