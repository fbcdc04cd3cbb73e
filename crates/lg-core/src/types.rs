//! Core type definitions for ListGuard
//!
//! Bit masks and request/decision types shared by the parser, the rule index
//! and the profile layer.

use std::sync::Arc;

use crate::psl::is_third_party;
use crate::rule::Rule;
use crate::url::extract_host;

// =============================================================================
// Rule Actions
// =============================================================================

/// Action to take for a matched rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RuleAction {
    /// Exception rule (@@...) - allows the request, overriding any block
    Allow = 0,
    /// Block rule - cancels the request
    Block = 1,
}

// =============================================================================
// Rule Flags
// =============================================================================

bitflags::bitflags! {
    /// Flags for rule behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RuleFlags: u16 {
        /// Case-sensitive matching ($match-case)
        const MATCH_CASE = 1 << 0;
        /// Rule has right anchor (ends with |)
        const HAS_RIGHT_ANCHOR = 1 << 1;
        /// Rule has hostname anchor (||)
        const HAS_HOST_ANCHOR = 1 << 2;
        /// Rule has left anchor (starts with |)
        const HAS_LEFT_ANCHOR = 1 << 3;
        /// Rule came from a hosts-file line
        const FROM_HOSTS_FILE = 1 << 4;
    }
}

// =============================================================================
// Request Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Request type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestType: u16 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const DOCUMENT = 1 << 6;     // main document
        const XMLHTTPREQUEST = 1 << 7;
        const FONT = 1 << 8;
        const MEDIA = 1 << 9;
        const WEBSOCKET = 1 << 10;
        const PING = 1 << 11;

        /// All request types
        const ALL = 0x0FFF;
    }
}

impl RequestType {
    /// Parse from a request type name as reported by the browsing engine.
    ///
    /// Unknown names map to `OTHER`.
    pub fn from_type_name(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "document" | "main_frame" => Self::DOCUMENT,
            "subdocument" | "sub_frame" => Self::SUBDOCUMENT,
            "stylesheet" => Self::STYLESHEET,
            "script" => Self::SCRIPT,
            "image" => Self::IMAGE,
            "font" => Self::FONT,
            "object" => Self::OBJECT,
            "xmlhttprequest" | "xhr" => Self::XMLHTTPREQUEST,
            "media" => Self::MEDIA,
            "websocket" => Self::WEBSOCKET,
            "ping" => Self::PING,
            _ => Self::OTHER,
        }
    }

    /// Option keyword used in filter text for a single type bit.
    pub fn option_name(self) -> Option<&'static str> {
        let name = match self {
            Self::OTHER => "other",
            Self::SCRIPT => "script",
            Self::IMAGE => "image",
            Self::STYLESHEET => "stylesheet",
            Self::OBJECT => "object",
            Self::SUBDOCUMENT => "subdocument",
            Self::DOCUMENT => "document",
            Self::XMLHTTPREQUEST => "xmlhttprequest",
            Self::FONT => "font",
            Self::MEDIA => "media",
            Self::WEBSOCKET => "websocket",
            Self::PING => "ping",
            _ => return None,
        };
        Some(name)
    }
}

// =============================================================================
// Party Masks
// =============================================================================

bitflags::bitflags! {
    /// Party (first-party / third-party) mask.
    ///
    /// An empty mask means the rule is unconstrained.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartyMask: u8 {
        /// Matches first-party requests
        const FIRST_PARTY = 1 << 0;
        /// Matches third-party requests
        const THIRD_PARTY = 1 << 1;
        /// Matches both
        const ALL = Self::FIRST_PARTY.bits() | Self::THIRD_PARTY.bits();
    }
}

// =============================================================================
// Request Context
// =============================================================================

/// Context for a request being matched.
///
/// Built once per request and shared by every profile queried for it.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Request hostname, lowercased
    pub req_host: String,
    /// Lowercased hostname of the document that originated the request
    pub site_host: Option<String>,
    /// Is this a third-party request?
    pub is_third_party: bool,
    /// Request type
    pub request_type: RequestType,
}

impl<'a> RequestContext<'a> {
    /// Build a context from the target URL, the originating document URL and
    /// the resource type.
    ///
    /// A missing or host-less origin counts as first-party.
    pub fn new(url: &'a str, origin_url: Option<&'a str>, request_type: RequestType) -> Self {
        let req_host = extract_host(url).unwrap_or("").to_ascii_lowercase();
        let site_host = origin_url
            .and_then(extract_host)
            .filter(|host| !host.is_empty())
            .map(str::to_ascii_lowercase);
        let is_third_party = match &site_host {
            Some(site) if !req_host.is_empty() => is_third_party(site, &req_host),
            _ => false,
        };

        Self {
            url,
            req_host,
            site_host,
            is_third_party,
            request_type,
        }
    }

    /// The party bit of this request.
    #[inline]
    pub fn party(&self) -> PartyMask {
        if self.is_third_party {
            PartyMask::THIRD_PARTY
        } else {
            PartyMask::FIRST_PARTY
        }
    }
}

// =============================================================================
// Match Result
// =============================================================================

/// Final decision for a matched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    /// No rule matched; the request is allowed by default
    NoMatch,
    /// A blocking rule matched and no exception did
    Block,
    /// An exception rule matched; the request is allowed regardless of blocks
    Exception,
}

impl MatchDecision {
    /// True only for `Block`.
    #[inline]
    pub fn is_blocked(self) -> bool {
        self == Self::Block
    }
}

/// Result of matching a request against one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// The final decision for this request
    pub decision: MatchDecision,
    /// A rule that produced the decision
    pub rule: Option<Arc<Rule>>,
}

impl MatchResult {
    /// Filter text of the deciding rule, for logging.
    pub fn filter(&self) -> Option<String> {
        self.rule.as_ref().map(|rule| rule.to_string())
    }
}

impl Default for MatchResult {
    fn default() -> Self {
        Self {
            decision: MatchDecision::NoMatch,
            rule: None,
        }
    }
}
