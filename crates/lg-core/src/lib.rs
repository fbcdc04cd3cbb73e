//! ListGuard Core Library
//!
//! Rule model and request matching for the ListGuard content blocker. This
//! crate is pure computation: no I/O, no async, no global state other than
//! an optional Public Suffix List installed once at startup.
//!
//! # Modules
//!
//! - `types`: Request types, party masks, match decisions
//! - `url`: Fast URL parsing without allocations
//! - `psl`: Registrable-domain (eTLD+1) extraction and host suffix walking
//! - `pattern`: Compiled ABP URL patterns
//! - `rule`: Network and cosmetic rules
//! - `index`: Host-bucketed rule index and the matching hot path

pub mod index;
pub mod pattern;
pub mod psl;
pub mod rule;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use index::{IndexStats, RuleIndex};
pub use pattern::{AnchorType, Pattern, PatternOp};
pub use psl::{get_etld1, install_public_suffix_list, is_third_party, PslError};
pub use rule::{CosmeticKind, CosmeticRule, DomainConstraint, Rule};
pub use types::{MatchDecision, MatchResult, PartyMask, RequestContext, RequestType, RuleAction, RuleFlags};
