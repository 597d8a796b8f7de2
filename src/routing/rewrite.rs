//! Path rewriting applied after a route matches.

use crate::config::schema::RewriteConfig;
use crate::routing::matcher::split_path;

/// A compiled rewrite rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRewrite {
    /// Drop the first `n` segments.
    StripPrefix(usize),
    /// Replace a literal prefix that ends on a segment boundary.
    ReplacePrefix { from: String, to: String },
}

impl From<&RewriteConfig> for PathRewrite {
    fn from(config: &RewriteConfig) -> Self {
        match config {
            RewriteConfig::StripPrefix(n) => PathRewrite::StripPrefix(*n),
            RewriteConfig::ReplacePrefix { from, to } => PathRewrite::ReplacePrefix {
                from: from.trim_end_matches('/').to_string(),
                to: to.trim_end_matches('/').to_string(),
            },
        }
    }
}

impl PathRewrite {
    /// Rewrite `path`. The result always starts with `/`.
    pub fn apply(&self, path: &str) -> String {
        match self {
            PathRewrite::StripPrefix(n) => {
                let rest: Vec<&str> = split_path(path).skip(*n).collect();
                let mut out = format!("/{}", rest.join("/"));
                if path.ends_with('/') && out.len() > 1 {
                    out.push('/');
                }
                out
            }
            PathRewrite::ReplacePrefix { from, to } => match path.strip_prefix(from.as_str()) {
                Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                    let out = format!("{}{}", to, rest);
                    if out.is_empty() {
                        "/".to_string()
                    } else {
                        out
                    }
                }
                _ => path.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_prefix() {
        let rewrite = PathRewrite::StripPrefix(1);
        assert_eq!(rewrite.apply("/exchange/from/USD/to/INR"), "/from/USD/to/INR");
        assert_eq!(rewrite.apply("/exchange"), "/");
        assert_eq!(rewrite.apply("/exchange/a/"), "/a/");
        assert_eq!(PathRewrite::StripPrefix(5).apply("/a/b"), "/");
    }

    #[test]
    fn test_replace_prefix() {
        let rewrite = PathRewrite::from(&RewriteConfig::ReplacePrefix {
            from: "/conversion-new/".into(),
            to: "/conversion-feign".into(),
        });
        assert_eq!(
            rewrite.apply("/conversion-new/from/USD/to/INR/quantity/10"),
            "/conversion-feign/from/USD/to/INR/quantity/10"
        );
        // segment boundary is respected
        assert_eq!(rewrite.apply("/conversion-newer/x"), "/conversion-newer/x");
    }

    #[test]
    fn test_replace_with_root() {
        let rewrite = PathRewrite::ReplacePrefix {
            from: "/api".into(),
            to: String::new(),
        };
        assert_eq!(rewrite.apply("/api"), "/");
        assert_eq!(rewrite.apply("/api/limits"), "/limits");
    }
}
