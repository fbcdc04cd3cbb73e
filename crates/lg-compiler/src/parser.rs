//! Filter list parser
//!
//! Turns AdBlock Plus filter text into [`Rule`]s and [`CosmeticRule`]s. A
//! malformed line never aborts a list: it comes back as
//! [`ParsedLine::Unparseable`] and the list parser counts it and moves on.

use std::net::IpAddr;
use std::time::Duration;

use lg_core::pattern::{AnchorType, Pattern};
use lg_core::rule::{CosmeticKind, CosmeticRule, DomainConstraint, Rule};
use lg_core::types::{PartyMask, RequestType, RuleAction, RuleFlags};

/// Why a single line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Empty pattern")]
    EmptyPattern,
    #[error("Regular expression rules are not supported")]
    RegexPattern,
    #[error("Whitespace inside pattern")]
    Whitespace,
    #[error("Unsupported option: {0}")]
    UnsupportedOption(String),
    #[error("Invalid domain: {0:?}")]
    InvalidDomain(String),
    #[error("Options exclude every request type")]
    EmptyTypeMask,
    #[error("Options exclude both first- and third-party requests")]
    EmptyPartyMask,
    #[error("Empty element hiding selector")]
    EmptySelector,
}

/// Classification of one line of filter text.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Rule(Rule),
    /// Element hiding rule; kept with the list, never matched against requests
    Cosmetic(CosmeticRule),
    Comment,
    /// `! Key: value` header comment
    Metadata { key: String, value: String },
    /// Valid syntax with no network meaning (`$elemhide`, snippets, ...)
    Ignored,
    Unparseable(ParseError),
}

// =============================================================================
// Single Line
// =============================================================================

/// Comment keys captured as list metadata, in canonical spelling.
const METADATA_KEYS: &[&str] = &["Title", "Homepage", "Expires", "Checksum", "Version", "Last modified", "Licence"];

/// Parse one line of filter text.
pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() {
        return ParsedLine::Comment;
    }

    if let Some(comment) = line.strip_prefix('!') {
        return parse_comment(comment);
    }
    if line.starts_with('[') && line.ends_with(']') {
        return ParsedLine::Comment;
    }

    // Cosmetic markers before `#` comments: `##.ad` is a rule, `# hosts` is not.
    if let Some(parsed) = parse_cosmetic(line) {
        return parsed;
    }
    if line.starts_with('#') {
        return ParsedLine::Comment;
    }

    if let Some(host) = parse_hosts_file_domain(line) {
        return match host {
            Some(host) => ParsedLine::Rule(hosts_rule(&host)),
            None => ParsedLine::Ignored,
        };
    }

    match parse_network_rule(line) {
        Ok(Some(rule)) => ParsedLine::Rule(rule),
        Ok(None) => ParsedLine::Ignored,
        Err(e) => ParsedLine::Unparseable(e),
    }
}

fn parse_comment(comment: &str) -> ParsedLine {
    let comment = comment.trim();
    let (key, value) = match comment.split_once(':') {
        Some(pair) => pair,
        None => return ParsedLine::Comment,
    };
    let key = key.trim();

    match METADATA_KEYS.iter().find(|known| known.eq_ignore_ascii_case(key)) {
        Some(known) => ParsedLine::Metadata {
            key: (*known).to_string(),
            value: value.trim().to_string(),
        },
        None => ParsedLine::Comment,
    }
}

// =============================================================================
// Cosmetic Rules
// =============================================================================

/// Returns `None` when the line has no cosmetic marker.
fn parse_cosmetic(line: &str) -> Option<ParsedLine> {
    let pos = line.find('#')?;
    let rest = &line[pos..];

    let (kind, marker_len) = if rest.starts_with("##") {
        (Some(CosmeticKind::Hide), 2)
    } else if rest.starts_with("#@#") {
        (Some(CosmeticKind::HideException), 3)
    } else if rest.starts_with("#?#") {
        (Some(CosmeticKind::Extended), 3)
    } else if rest.starts_with("#$#") || rest.starts_with("#@$#") {
        (None, 0)
    } else {
        return None;
    };

    // Network rules may contain `#` in their path; a cosmetic domain list never
    // contains these.
    let domain_part = &line[..pos];
    if domain_part.contains(['/', '*', '|', '@', '"', '!', '^', '$']) {
        return None;
    }

    // Snippet filters
    let kind = match kind {
        Some(kind) => kind,
        None => return Some(ParsedLine::Ignored),
    };

    let selector = line[pos + marker_len..].trim();
    if selector.is_empty() {
        return Some(ParsedLine::Unparseable(ParseError::EmptySelector));
    }

    let mut domains = Vec::new();
    for raw in domain_part.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        let (negated, name) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        match normalize_domain(name) {
            Some(domain) if negated => domains.push(format!("~{domain}")),
            Some(domain) => domains.push(domain),
            None => return Some(ParsedLine::Unparseable(ParseError::InvalidDomain(raw.to_string()))),
        }
    }

    Some(ParsedLine::Cosmetic(CosmeticRule {
        kind,
        domains,
        selector: selector.to_string(),
    }))
}

// =============================================================================
// Hosts-file Lines
// =============================================================================

/// Names hosts files map to themselves; not worth a rule.
const HOSTS_FILE_SELF_NAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "ip6-mcastprefix",
    "ip6-allnodes",
    "ip6-allrouters",
    "0.0.0.0",
];

/// `0.0.0.0 ads.example`: `Some(Some(host))` for a rule, `Some(None)` for a
/// hosts entry that should be skipped, `None` when the line is no hosts entry.
fn parse_hosts_file_domain(line: &str) -> Option<Option<String>> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let second = parts.next()?;

    if first.parse::<IpAddr>().is_err() {
        return None;
    }

    let host = second.to_ascii_lowercase();
    if HOSTS_FILE_SELF_NAMES.contains(&host.as_str()) {
        return Some(None);
    }
    Some(normalize_domain(&host))
}

fn hosts_rule(host: &str) -> Rule {
    Rule {
        action: RuleAction::Block,
        flags: RuleFlags::FROM_HOSTS_FILE | RuleFlags::HAS_HOST_ANCHOR,
        pattern: Pattern::compile(&format!("{host}^"), AnchorType::Hostname, false, false),
        type_mask: RequestType::empty(),
        party_mask: PartyMask::empty(),
        domain_constraints: None,
    }
}

// =============================================================================
// Network Rules
// =============================================================================

/// `Ok(None)` means the rule is valid but has no network effect.
fn parse_network_rule(line: &str) -> Result<Option<Rule>, ParseError> {
    let (action, line) = match line.strip_prefix("@@") {
        Some(rest) => (RuleAction::Allow, rest.trim_start()),
        None => (RuleAction::Block, line),
    };

    let (pattern_part, options_text) = split_rule_options(line);
    let options = match options_text {
        Some(text) => parse_options(text)?,
        None => ParsedOptions::default(),
    };
    if options.network_ignored {
        return Ok(None);
    }

    let pattern_part = pattern_part.trim();
    if pattern_part.contains(char::is_whitespace) {
        return Err(ParseError::Whitespace);
    }
    if pattern_part.len() > 1 && pattern_part.starts_with('/') && pattern_part.ends_with('/') {
        return Err(ParseError::RegexPattern);
    }

    let (anchor, rest) = if let Some(rest) = pattern_part.strip_prefix("||") {
        (AnchorType::Hostname, rest)
    } else if let Some(rest) = pattern_part.strip_prefix('|') {
        (AnchorType::Left, rest)
    } else {
        (AnchorType::None, pattern_part)
    };
    let (body, right_anchor) = match rest.strip_suffix('|') {
        Some(body) => (body, true),
        None => (rest, false),
    };

    // `$script,domain=x` alone is a valid rule; a bare `*` or `||` is not.
    let body_is_empty = body.chars().all(|c| c == '*');
    if body_is_empty && (options_text.is_none() || anchor == AnchorType::Hostname) {
        return Err(ParseError::EmptyPattern);
    }

    let body = body.replace("\\$", "$");
    let match_case = options.flags.contains(RuleFlags::MATCH_CASE);
    let pattern = Pattern::compile(&body, anchor, right_anchor, match_case);

    let mut flags = options.flags;
    match anchor {
        AnchorType::Hostname => flags |= RuleFlags::HAS_HOST_ANCHOR,
        AnchorType::Left => flags |= RuleFlags::HAS_LEFT_ANCHOR,
        AnchorType::None => {}
    }
    if pattern.has_right_anchor() {
        flags |= RuleFlags::HAS_RIGHT_ANCHOR;
    }

    Ok(Some(Rule {
        action,
        flags,
        pattern,
        type_mask: options.type_mask,
        party_mask: options.party_mask,
        domain_constraints: options.domain_constraints,
    }))
}

/// Split at the first `$` not escaped with a backslash.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    let bytes = line.as_bytes();
    let split = (0..bytes.len()).find(|&i| bytes[i] == b'$' && (i == 0 || bytes[i - 1] != b'\\'));
    match split {
        Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
        None => (line, None),
    }
}

#[derive(Debug, Clone)]
struct ParsedOptions {
    flags: RuleFlags,
    type_mask: RequestType,
    party_mask: PartyMask,
    domain_constraints: Option<DomainConstraint>,
    network_ignored: bool,
}

impl Default for ParsedOptions {
    fn default() -> Self {
        Self {
            flags: RuleFlags::empty(),
            type_mask: RequestType::empty(),
            party_mask: PartyMask::empty(),
            domain_constraints: None,
            network_ignored: false,
        }
    }
}

fn parse_options(text: &str) -> Result<ParsedOptions, ParseError> {
    let mut flags = RuleFlags::empty();
    let mut type_include = RequestType::empty();
    let mut type_exclude = RequestType::empty();
    let mut party_include = PartyMask::empty();
    let mut party_exclude = PartyMask::empty();
    let mut domain_constraints: Option<DomainConstraint> = None;
    let mut network_ignored = false;

    for raw in text.split(',').map(str::trim).filter(|raw| !raw.is_empty()) {
        let raw_lower = raw.to_ascii_lowercase();
        let raw_lower = raw_lower.as_str();

        if raw_lower == "match-case" {
            flags |= RuleFlags::MATCH_CASE;
            continue;
        }

        if let Some(value) = raw_lower.strip_prefix("domain=") {
            let parsed = parse_domain_option(value)?;
            domain_constraints = Some(merge_constraints(domain_constraints, parsed));
            continue;
        }

        let (negated, name) = match raw_lower.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw_lower),
        };

        if let Some(mask) = request_type_mask(name) {
            if negated {
                type_exclude |= mask;
            } else {
                type_include |= mask;
            }
            continue;
        }

        if let Some(mask) = party_mask(name) {
            if negated {
                party_exclude |= mask;
            } else {
                party_include |= mask;
            }
            continue;
        }

        match name {
            "document" if negated => type_exclude |= RequestType::DOCUMENT,
            // Page-level switches; nothing to do for individual requests.
            "document" | "elemhide" | "generichide" | "popup" => network_ignored = true,
            // Deprecated, no effect on matching
            "collapse" => {}
            _ => return Err(ParseError::UnsupportedOption(raw.to_string())),
        }
    }

    let type_mask = finalize_type_mask(type_include, type_exclude).ok_or(ParseError::EmptyTypeMask)?;
    let party_mask = finalize_party_mask(party_include, party_exclude).ok_or(ParseError::EmptyPartyMask)?;

    Ok(ParsedOptions {
        flags,
        type_mask,
        party_mask,
        domain_constraints,
        network_ignored,
    })
}

fn merge_constraints(existing: Option<DomainConstraint>, incoming: DomainConstraint) -> DomainConstraint {
    match existing {
        Some(mut current) => {
            current.include.extend(incoming.include);
            current.exclude.extend(incoming.exclude);
            current
        }
        None => incoming,
    }
}

fn parse_domain_option(value: &str) -> Result<DomainConstraint, ParseError> {
    let mut constraint = DomainConstraint::default();

    for raw in value.split('|').map(str::trim).filter(|raw| !raw.is_empty()) {
        let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let domain = normalize_domain(domain_raw).ok_or_else(|| ParseError::InvalidDomain(raw.to_string()))?;
        if is_exclude {
            constraint.exclude.push(domain);
        } else {
            constraint.include.push(domain);
        }
    }

    if constraint.is_empty() {
        return Err(ParseError::InvalidDomain(value.to_string()));
    }
    Ok(constraint)
}

/// Combine included and excluded type bits. `None` when nothing is left; a
/// mask covering every type collapses to empty (unconstrained).
fn finalize_type_mask(include: RequestType, exclude: RequestType) -> Option<RequestType> {
    let base = if include.is_empty() { RequestType::ALL } else { include };
    let mask = base.difference(exclude);
    if mask.is_empty() {
        return None;
    }
    if mask == RequestType::ALL {
        return Some(RequestType::empty());
    }
    Some(mask)
}

fn finalize_party_mask(include: PartyMask, exclude: PartyMask) -> Option<PartyMask> {
    let base = if include.is_empty() { PartyMask::ALL } else { include };
    let mask = base.difference(exclude);
    if mask.is_empty() {
        return None;
    }
    if mask == PartyMask::ALL {
        return Some(PartyMask::empty());
    }
    Some(mask)
}

fn request_type_mask(name: &str) -> Option<RequestType> {
    match name {
        "script" => Some(RequestType::SCRIPT),
        "image" | "background" => Some(RequestType::IMAGE),
        "stylesheet" => Some(RequestType::STYLESHEET),
        "object" | "object-subrequest" => Some(RequestType::OBJECT),
        "subdocument" => Some(RequestType::SUBDOCUMENT),
        "xmlhttprequest" | "xhr" => Some(RequestType::XMLHTTPREQUEST),
        "media" => Some(RequestType::MEDIA),
        "font" => Some(RequestType::FONT),
        "ping" => Some(RequestType::PING),
        "websocket" => Some(RequestType::WEBSOCKET),
        "other" => Some(RequestType::OTHER),
        _ => None,
    }
}

fn party_mask(name: &str) -> Option<PartyMask> {
    match name {
        "third-party" | "3p" => Some(PartyMask::THIRD_PARTY),
        "first-party" | "1p" => Some(PartyMask::FIRST_PARTY),
        _ => None,
    }
}

fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

// =============================================================================
// Whole List
// =============================================================================

/// Header metadata of a filter list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMetadata {
    pub title: Option<String>,
    pub homepage: Option<String>,
    pub expires: Option<Duration>,
    pub checksum: Option<String>,
    pub version: Option<String>,
    pub last_modified: Option<String>,
}

impl ListMetadata {
    /// Record a metadata comment. The first value for a key wins.
    fn record(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        let slot = match key {
            "Title" => &mut self.title,
            "Homepage" => &mut self.homepage,
            "Checksum" => &mut self.checksum,
            "Version" => &mut self.version,
            "Last modified" => &mut self.last_modified,
            "Expires" => {
                if self.expires.is_none() {
                    self.expires = parse_expires(value);
                }
                return;
            }
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }
}

/// Per-list line counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub lines: usize,
    pub blocking: usize,
    pub exceptions: usize,
    pub cosmetic: usize,
    pub comments: usize,
    pub ignored: usize,
    pub errors: usize,
}

/// Everything parsed out of one filter list.
#[derive(Debug, Clone, Default)]
pub struct ParsedList {
    pub rules: Vec<Rule>,
    pub cosmetic: Vec<CosmeticRule>,
    pub metadata: ListMetadata,
    pub report: ParseReport,
}

/// Parse a complete filter list.
pub fn parse_filter_list(text: &str) -> ParsedList {
    let mut list = ParsedList::default();

    for (line_no, raw_line) in text.lines().enumerate() {
        list.report.lines += 1;
        match parse_line(raw_line.trim_start_matches('\u{feff}')) {
            ParsedLine::Rule(rule) => {
                if rule.is_exception() {
                    list.report.exceptions += 1;
                } else {
                    list.report.blocking += 1;
                }
                list.rules.push(rule);
            }
            ParsedLine::Cosmetic(rule) => {
                list.report.cosmetic += 1;
                list.cosmetic.push(rule);
            }
            ParsedLine::Metadata { key, value } => {
                list.report.comments += 1;
                list.metadata.record(&key, &value);
            }
            ParsedLine::Comment => list.report.comments += 1,
            ParsedLine::Ignored => list.report.ignored += 1,
            ParsedLine::Unparseable(e) => {
                list.report.errors += 1;
                log::debug!("Skipping line {}: {} ({:?})", line_no + 1, e, raw_line.trim());
            }
        }
    }

    list
}

/// Parse an `Expires` header value such as `4 days (update frequency)`,
/// `12 hours`, `1d` or `6h`, clamped to between one hour and 14 days.
pub fn parse_expires(value: &str) -> Option<Duration> {
    const HOUR: u64 = 60 * 60;
    const DAY: u64 = 24 * HOUR;

    let value = value.trim();
    let digits_end = value.find(|c: char| !c.is_ascii_digit()).unwrap_or(value.len());
    let amount: u64 = value[..digits_end].parse().ok()?;

    let unit: String = value[digits_end..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();

    let secs = match unit.as_str() {
        "d" | "day" | "days" => amount.checked_mul(DAY)?,
        "h" | "hour" | "hours" => amount.checked_mul(HOUR)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs.clamp(HOUR, 14 * DAY)))
}

/// True when the text starts like a filter list: an `[Adblock ...]` header,
/// a `!` or `#` comment, or a hosts-file entry. Rejects HTML error pages and
/// other unrelated payloads.
pub fn has_list_header(text: &str) -> bool {
    let first = match text
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
    {
        Some(line) => line,
        None => return false,
    };

    if first.starts_with('[') {
        return first.to_ascii_lowercase().contains("adblock");
    }
    first.starts_with('!') || first.starts_with('#') || parse_hosts_file_domain(first).is_some()
}

// =============================================================================
// Declared Checksum
// =============================================================================

fn checksum_line_value(line: &str) -> Option<&str> {
    let comment = line.trim().strip_prefix('!')?;
    let (key, value) = comment.split_once(':')?;
    if !key.trim().eq_ignore_ascii_case("checksum") {
        return None;
    }
    Some(value.trim())
}

/// Value of the list's `! Checksum:` line, if any.
pub fn declared_checksum(text: &str) -> Option<&str> {
    text.lines().find_map(checksum_line_value).filter(|v| !v.is_empty())
}

/// The text a declared checksum covers: the list without its checksum line,
/// with line endings normalized and empty lines dropped.
pub fn checksum_body(text: &str) -> String {
    let mut body = String::with_capacity(text.len());
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || checksum_line_value(line).is_some() {
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }
    body
}
