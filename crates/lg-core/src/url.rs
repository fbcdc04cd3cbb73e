//! Fast URL parsing utilities for the hot path
//!
//! These functions avoid allocations and work directly on string slices.

// =============================================================================
// Scheme
// =============================================================================

/// Get the position after "://".
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();

    // Find ':'
    let colon_pos = bytes.iter().position(|&b| b == b':')?;

    // Check for "://"
    if bytes.len() > colon_pos + 2 && bytes[colon_pos + 1] == b'/' && bytes[colon_pos + 2] == b'/' {
        return Some(colon_pos + 3);
    }

    None
}

// =============================================================================
// Host Extraction
// =============================================================================

/// Get the start and end positions of the hostname in a URL.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();

    // Skip userinfo
    let mut host_start = scheme_end;
    for (i, &b) in bytes.iter().enumerate().skip(scheme_end) {
        if b == b'@' {
            host_start = i + 1;
            break;
        }
        if b == b'/' || b == b'?' || b == b'#' {
            break;
        }
    }

    // Bracketed IPv6 literal
    if bytes.get(host_start) == Some(&b'[') {
        let close = bytes[host_start..].iter().position(|&b| b == b']')?;
        return Some((host_start, host_start + close + 1));
    }

    // Find host end
    let mut host_end = bytes.len();
    for (i, &b) in bytes.iter().enumerate().skip(host_start) {
        if b == b'/' || b == b'?' || b == b'#' || b == b':' {
            host_end = i;
            break;
        }
    }

    Some((host_start, host_end))
}

/// Fast host extraction without allocations.
/// Returns a slice into the original URL.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    Some(&url[host_start..host_end])
}

/// Positions in `url` where a hostname label starts.
///
/// These are the only places a `||` anchored pattern may begin matching:
/// the start of the host and the character after each dot inside it.
pub fn host_label_starts(url: &str) -> impl Iterator<Item = usize> + '_ {
    let (host_start, host_end) = get_host_position(url).unwrap_or((0, 0));
    let bytes = url.as_bytes();
    let first = (host_end > host_start).then_some(host_start);
    let rest = (host_start..host_end)
        .filter(move |&i| bytes[i] == b'.' && i + 1 < host_end)
        .map(|i| i + 1);
    first.into_iter().chain(rest)
}

// =============================================================================
// ABP Separator Check
// =============================================================================

/// Check if a character is an ABP separator (what `^` stands for).
///
/// Everything except letters, digits and `_ - . %` separates.
#[inline]
pub fn is_separator_char(c: u8) -> bool {
    !(c.is_ascii_alphanumeric() || matches!(c, b'_' | b'-' | b'.' | b'%'))
}

/// Check if position in string is at a separator. End of string counts.
#[inline]
pub fn is_at_separator(s: &str, pos: usize) -> bool {
    if pos >= s.len() {
        return true;
    }
    is_separator_char(s.as_bytes()[pos])
}
