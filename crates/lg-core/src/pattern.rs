//! Compiled URL patterns
//!
//! A network rule's pattern text is compiled once into a short op sequence.
//! Matching walks the ops left to right against the raw URL bytes. The runs
//! between `*` are placed at their leftmost fit, so a match costs at most
//! URL length times pattern length.

use std::fmt;

use crate::url::{host_label_starts, is_separator_char};

/// One step of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternOp {
    /// Literal text (already lowercased unless the rule is case-sensitive)
    Literal(Box<str>),
    /// ABP `^`: one separator character, or the end of the URL
    Separator,
    /// ABP `*`: any run of characters
    Wildcard,
}

/// Where a pattern is allowed to start matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnchorType {
    /// Anywhere in the URL
    #[default]
    None,
    /// `|` - only at the very start of the URL
    Left,
    /// `||` - only at the start of a hostname label
    Hostname,
}

/// A compiled, immutable URL pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    ops: Vec<PatternOp>,
    anchor: AnchorType,
    right_anchor: bool,
    match_case: bool,
}

impl Pattern {
    /// Compile the pattern body (anchors already stripped).
    pub fn compile(body: &str, anchor: AnchorType, right_anchor: bool, match_case: bool) -> Self {
        let mut ops: Vec<PatternOp> = Vec::new();
        let mut literal = String::new();

        for ch in body.chars() {
            match ch {
                '*' | '^' => {
                    if !literal.is_empty() {
                        ops.push(PatternOp::Literal(std::mem::take(&mut literal).into_boxed_str()));
                    }
                    if ch == '^' {
                        ops.push(PatternOp::Separator);
                    } else if ops.last() != Some(&PatternOp::Wildcard) {
                        ops.push(PatternOp::Wildcard);
                    }
                }
                _ if match_case => literal.push(ch),
                _ => literal.push(ch.to_ascii_lowercase()),
            }
        }
        if !literal.is_empty() {
            ops.push(PatternOp::Literal(literal.into_boxed_str()));
        }

        // An unanchored leading `*` and a trailing `*` change nothing.
        if anchor == AnchorType::None && ops.first() == Some(&PatternOp::Wildcard) {
            ops.remove(0);
        }
        let mut right_anchor = right_anchor;
        if ops.last() == Some(&PatternOp::Wildcard) {
            ops.pop();
            right_anchor = false;
        }

        Self {
            ops,
            anchor,
            right_anchor,
            match_case,
        }
    }

    pub fn ops(&self) -> &[PatternOp] {
        &self.ops
    }

    pub fn anchor(&self) -> AnchorType {
        self.anchor
    }

    pub fn has_right_anchor(&self) -> bool {
        self.right_anchor
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.match_case
    }

    /// True when the pattern matches every URL.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.anchor == AnchorType::None && !self.right_anchor
    }

    /// Hostname a `||` pattern is pinned to, used as the index bucket key.
    ///
    /// Only returned when the host text is terminated (by `^`, `/`, `:` or a
    /// right anchor), so every URL the pattern can match has this name or one
    /// of its subdomains as host.
    pub fn hostname(&self) -> Option<String> {
        if self.anchor != AnchorType::Hostname {
            return None;
        }
        let first = match self.ops.first() {
            Some(PatternOp::Literal(lit)) => lit,
            _ => return None,
        };

        let host_len = first
            .bytes()
            .position(|b| !(b.is_ascii_alphanumeric() || b == b'.' || b == b'-'))
            .unwrap_or(first.len());
        let host = &first[..host_len];

        let terminated = if host_len < first.len() {
            matches!(first.as_bytes()[host_len], b'/' | b':' | b'?')
        } else {
            match self.ops.get(1) {
                Some(PatternOp::Separator) => true,
                None => self.right_anchor,
                _ => false,
            }
        };

        if !terminated || host.is_empty() || host.starts_with('.') || host.ends_with('.') {
            return None;
        }
        Some(host.to_ascii_lowercase())
    }

    /// Test the pattern against a full URL.
    pub fn matches(&self, url: &str) -> bool {
        let bytes = url.as_bytes();
        match self.anchor {
            AnchorType::Left => self.match_segments(bytes, 0, true),
            AnchorType::Hostname => host_label_starts(url).any(|start| self.match_segments(bytes, start, true)),
            AnchorType::None => self.match_segments(bytes, 0, false),
        }
    }

    /// Match the wildcard-separated segments in order.
    ///
    /// Each segment after a `*` is taken at its leftmost match: a later match
    /// never ends earlier, so it cannot leave more room for what follows.
    /// Only a right-anchored last segment has to be tried at every position.
    fn match_segments(&self, url: &[u8], start: usize, pinned: bool) -> bool {
        let mut pos = start;
        let mut pinned = pinned;
        let mut segments = self.ops.split(|op| *op == PatternOp::Wildcard).peekable();

        while let Some(segment) = segments.next() {
            let must_end = self.right_anchor && segments.peek().is_none();
            if pinned {
                match self.segment_at(url, segment, pos) {
                    Some(end) if !must_end || end == url.len() => pos = end,
                    _ => return false,
                }
            } else if must_end {
                return (pos..=url.len()).any(|p| self.segment_at(url, segment, p) == Some(url.len()));
            } else {
                match (pos..=url.len()).find_map(|p| self.segment_at(url, segment, p)) {
                    Some(end) => pos = end,
                    None => return false,
                }
            }
            pinned = false;
        }
        true
    }

    /// Match a wildcard-free run of ops at `pos`, returning where it ends.
    fn segment_at(&self, url: &[u8], segment: &[PatternOp], mut pos: usize) -> Option<usize> {
        for op in segment {
            match op {
                PatternOp::Literal(lit) => {
                    if !self.literal_at(url, pos, lit.as_bytes()) {
                        return None;
                    }
                    pos += lit.len();
                }
                PatternOp::Separator => {
                    if pos < url.len() {
                        if !is_separator_char(url[pos]) {
                            return None;
                        }
                        pos += 1;
                    }
                }
                PatternOp::Wildcard => {}
            }
        }
        Some(pos)
    }

    #[inline]
    fn literal_at(&self, url: &[u8], pos: usize, lit: &[u8]) -> bool {
        match url.get(pos..pos + lit.len()) {
            Some(window) if self.match_case => window == lit,
            Some(window) => window.eq_ignore_ascii_case(lit),
            None => false,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut body = String::new();
        for op in &self.ops {
            match op {
                PatternOp::Literal(lit) => body.push_str(&lit.replace('$', "\\$")),
                PatternOp::Separator => body.push('^'),
                PatternOp::Wildcard => body.push('*'),
            }
        }

        match self.anchor {
            AnchorType::None => {
                // Bodies that would read back as something else get a no-op `*`.
                let ambiguous = body.is_empty()
                    || body.starts_with(['|', '!', '[', '#'])
                    || body.starts_with("@@")
                    || (body.len() > 1 && body.starts_with('/') && body.ends_with('/'));
                if ambiguous {
                    f.write_str("*")?;
                }
            }
            AnchorType::Left => f.write_str("|")?,
            AnchorType::Hostname => f.write_str("||")?,
        }
        f.write_str(&body)?;
        if self.right_anchor {
            f.write_str("|")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(body: &str) -> Pattern {
        Pattern::compile(body, AnchorType::Hostname, false, false)
    }

    fn plain(body: &str) -> Pattern {
        Pattern::compile(body, AnchorType::None, false, false)
    }

    #[test]
    fn test_compile_ops() {
        let p = plain("/ads/*banner^");
        assert_eq!(
            p.ops(),
            &[
                PatternOp::Literal("/ads/".into()),
                PatternOp::Wildcard,
                PatternOp::Literal("banner".into()),
                PatternOp::Separator,
            ]
        );
    }

    #[test]
    fn test_compile_collapses_wildcards() {
        let p = plain("**ad***x**");
        assert_eq!(
            p.ops(),
            &[PatternOp::Literal("ad".into()), PatternOp::Wildcard, PatternOp::Literal("x".into())]
        );
    }

    #[test]
    fn test_hostname_anchor() {
        let p = host("ads.example^");
        assert!(p.matches("https://ads.example/x"));
        assert!(p.matches("http://sub.ads.example/"));
        assert!(p.matches("https://ads.example"));
        assert!(p.matches("https://ads.example:8443/"));
        assert!(!p.matches("https://notads.example/"));
        assert!(!p.matches("https://ads.example.com/"));
        assert!(!p.matches("https://site.test/?u=ads.example/"));
    }

    #[test]
    fn test_left_and_right_anchor() {
        let p = Pattern::compile("https://ads.", AnchorType::Left, false, false);
        assert!(p.matches("https://ads.example/"));
        assert!(!p.matches("http://x.test/https://ads."));

        let p = Pattern::compile(".swf", AnchorType::None, true, false);
        assert!(p.matches("https://x.test/movie.swf"));
        assert!(!p.matches("https://x.test/movie.swf?x=1"));
    }

    #[test]
    fn test_wildcard_backtracking() {
        let p = plain("/a*b/c");
        assert!(p.matches("https://x.test/a1b/d/a2b/c"));
        assert!(!p.matches("https://x.test/a1b/d"));
    }

    #[test]
    fn test_many_wildcards_on_long_url() {
        let url = format!("https://x.test{}", "/a".repeat(60));
        let p = plain("/*/*/*/*/*/*/*/zz");
        let started = std::time::Instant::now();
        assert!(!p.matches(&url));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        assert!(p.matches(&format!("{url}/zz")));
        let p = Pattern::compile("/*/*/*/*/*/*/a", AnchorType::None, true, false);
        assert!(p.matches(&url));
    }

    #[test]
    fn test_right_anchored_last_segment() {
        let p = Pattern::compile("/ads/*.js", AnchorType::None, true, false);
        assert!(p.matches("https://x.test/ads/a.js/b.js"));
        assert!(!p.matches("https://x.test/ads/a.js?v=1"));

        let p = Pattern::compile("x.test/*^", AnchorType::Hostname, true, false);
        assert!(p.matches("https://x.test/a/"));
        assert!(p.matches("https://x.test/a"));
    }

    #[test]
    fn test_separator_matches_end() {
        let p = plain("/track^");
        assert!(p.matches("https://x.test/track"));
        assert!(p.matches("https://x.test/track?id=1"));
        assert!(!p.matches("https://x.test/tracker"));
        assert!(!p.matches("https://x.test/track.js"));
    }

    #[test]
    fn test_case_sensitivity() {
        let p = plain("/Banner");
        assert!(p.matches("https://x.test/BANNER.png"));

        let p = Pattern::compile("/Banner", AnchorType::None, false, true);
        assert!(p.matches("https://x.test/Banner.png"));
        assert!(!p.matches("https://x.test/banner.png"));
    }

    #[test]
    fn test_hostname_key() {
        assert_eq!(host("ads.example^").hostname().as_deref(), Some("ads.example"));
        assert_eq!(host("Ads.Example/path").hostname().as_deref(), Some("ads.example"));
        assert_eq!(host("ads.example:8080").hostname().as_deref(), Some("ads.example"));
        assert_eq!(
            Pattern::compile("ads.example", AnchorType::Hostname, true, false).hostname().as_deref(),
            Some("ads.example")
        );
        assert_eq!(host("ads.example").hostname(), None);
        assert_eq!(host("ads.exa*^").hostname(), None);
        assert_eq!(plain("ads.example^").hostname(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(host("ads.example^").to_string(), "||ads.example^");
        assert_eq!(plain("/Ads/*.js").to_string(), "/ads/*.js");
        assert_eq!(Pattern::compile("x", AnchorType::Left, true, false).to_string(), "|x|");
        assert_eq!(plain("").to_string(), "*");
        assert_eq!(plain("/banner/").to_string(), "*/banner/");
        assert_eq!(plain("pay$").to_string(), "pay\\$");
    }
}
