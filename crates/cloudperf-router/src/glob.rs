//! Path pattern matching.
//!
//! Patterns are matched against the whole path, case-sensitively. `*` matches
//! any run of characters (including `/` and the empty run) and `?` matches
//! exactly one character, so `/api*` covers `/api`, `/api/v1` and `/apis`.

use std::fmt;

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathGlob {
    pattern: Vec<char>,
    source: String,
}

impl PathGlob {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.chars().collect(),
            source: pattern.to_string(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        let text: Vec<char> = path.chars().collect();
        let pat = &self.pattern;

        let (mut p, mut t) = (0usize, 0usize);
        // Position of the last `*` and the text index it was tried against.
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            if p < pat.len() && pat[p] == '*' {
                backtrack = Some((p, t));
                p += 1;
            } else if p < pat.len() && (pat[p] == '?' || pat[p] == text[t]) {
                p += 1;
                t += 1;
            } else if let Some((star, matched)) = backtrack {
                p = star + 1;
                t = matched + 1;
                backtrack = Some((star, matched + 1));
            } else {
                return false;
            }
        }

        pat[p..].iter().all(|c| *c == '*')
    }
}

impl fmt::Display for PathGlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_star_is_prefix_match() {
        let glob = PathGlob::new("/api*");
        assert!(glob.matches("/api"));
        assert!(glob.matches("/api/v1/status"));
        assert!(glob.matches("/apis"));
        assert!(!glob.matches("/ap"));
        assert!(!glob.matches("/v1/api"));
    }

    #[test]
    fn literal_requires_exact_match() {
        let glob = PathGlob::new("/index.html");
        assert!(glob.matches("/index.html"));
        assert!(!glob.matches("/index.html/x"));
        assert!(!glob.matches("/INDEX.html"));
    }

    #[test]
    fn root_matches_only_root() {
        let glob = PathGlob::new("/");
        assert!(glob.matches("/"));
        assert!(!glob.matches("/x"));
        assert!(!glob.matches(""));
    }

    #[test]
    fn inner_star_backtracks() {
        let glob = PathGlob::new("/img/*.png");
        assert!(glob.matches("/img/a.png"));
        assert!(glob.matches("/img/a/b.c.png"));
        assert!(!glob.matches("/img/a.png.bak"));
    }

    #[test]
    fn star_in_path_does_not_pin_pattern_star() {
        let glob = PathGlob::new("/img/*.png");
        assert!(glob.matches("/img/*a.png"));
        assert!(glob.matches("/img/*.png"));
        assert!(PathGlob::new("/a*b").matches("/a**b"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        let glob = PathGlob::new("/v?/ping");
        assert!(glob.matches("/v1/ping"));
        assert!(!glob.matches("/v10/ping"));
        assert!(!glob.matches("/v/ping"));
    }

    #[test]
    fn bare_star_matches_everything() {
        let glob = PathGlob::new("*");
        assert!(glob.matches(""));
        assert!(glob.matches("/anything/at/all"));
    }
}
