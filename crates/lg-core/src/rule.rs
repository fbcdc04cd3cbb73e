//! Parsed filter rules
//!
//! A [`Rule`] is built once by the parser and never changed afterwards; the
//! rule index owns rules by value. Options that ABP keeps as a loose string
//! bag are resolved into masks and sets at construction time so matching
//! never compares option strings.

use std::fmt;

use crate::pattern::{AnchorType, Pattern};
use crate::psl::is_same_or_subdomain;
use crate::types::{PartyMask, RequestContext, RequestType, RuleAction, RuleFlags};

/// `$domain=` constraint on the originating document.
///
/// Listed domains also cover their subdomains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DomainConstraint {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl DomainConstraint {
    /// Check an origin host against the constraint.
    ///
    /// With no origin, only constraints without included domains pass.
    pub fn allows(&self, site_host: Option<&str>) -> bool {
        let site = match site_host {
            Some(site) => site,
            None => return self.include.is_empty(),
        };

        if self.exclude.iter().any(|d| is_same_or_subdomain(site, d)) {
            return false;
        }

        self.include.is_empty() || self.include.iter().any(|d| is_same_or_subdomain(site, d))
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// A network filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub action: RuleAction,
    pub flags: RuleFlags,
    pub pattern: Pattern,
    /// Empty mask = every request type
    pub type_mask: RequestType,
    /// Empty mask = first- and third-party
    pub party_mask: PartyMask,
    pub domain_constraints: Option<DomainConstraint>,
}

impl Rule {
    pub fn is_exception(&self) -> bool {
        self.action == RuleAction::Allow
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.flags.contains(RuleFlags::MATCH_CASE)
    }

    pub fn matches_at_start(&self) -> bool {
        self.pattern.anchor() != AnchorType::None
    }

    pub fn matches_at_end(&self) -> bool {
        self.pattern.has_right_anchor()
    }

    /// Bucket key for the rule index; `None` puts the rule in the generic bucket.
    pub fn index_key(&self) -> Option<String> {
        self.pattern.hostname()
    }

    /// Cheap option checks: type, party and origin domain.
    #[inline]
    pub fn applies_to(&self, ctx: &RequestContext<'_>) -> bool {
        if !self.type_mask.is_empty() && !self.type_mask.intersects(ctx.request_type) {
            return false;
        }

        if !self.party_mask.is_empty() && !self.party_mask.intersects(ctx.party()) {
            return false;
        }

        match &self.domain_constraints {
            Some(constraint) => constraint.allows(ctx.site_host.as_deref()),
            None => true,
        }
    }

    /// Full check: options first, then the URL pattern.
    pub fn matches(&self, ctx: &RequestContext<'_>) -> bool {
        self.applies_to(ctx) && self.pattern.matches(ctx.url)
    }
}

/// Canonical filter text. Parsing it back yields a rule with the same
/// matching behavior.
impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exception() {
            f.write_str("@@")?;
        }
        write!(f, "{}", self.pattern)?;

        let mut options: Vec<String> = Vec::new();

        if !self.type_mask.is_empty() && self.type_mask != RequestType::ALL {
            // `document` is not accepted as a positive option, so masks that
            // include it can only be written as exclusions.
            if self.type_mask.contains(RequestType::DOCUMENT) {
                for bit in RequestType::ALL.difference(self.type_mask).iter() {
                    if let Some(name) = bit.option_name() {
                        options.push(format!("~{name}"));
                    }
                }
            } else {
                for bit in self.type_mask.iter() {
                    if let Some(name) = bit.option_name() {
                        options.push(name.to_string());
                    }
                }
            }
        }

        if self.party_mask == PartyMask::THIRD_PARTY {
            options.push("third-party".to_string());
        } else if self.party_mask == PartyMask::FIRST_PARTY {
            options.push("~third-party".to_string());
        }

        if let Some(constraint) = self.domain_constraints.as_ref().filter(|c| !c.is_empty()) {
            let domains: Vec<String> = constraint
                .include
                .iter()
                .cloned()
                .chain(constraint.exclude.iter().map(|d| format!("~{d}")))
                .collect();
            options.push(format!("domain={}", domains.join("|")));
        }

        if self.is_case_sensitive() {
            options.push("match-case".to_string());
        }

        if !options.is_empty() {
            write!(f, "${}", options.join(","))?;
        }
        Ok(())
    }
}

/// Flavor of an element-hiding rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CosmeticKind {
    /// `##selector`
    Hide,
    /// `#@#selector`
    HideException,
    /// `#?#selector` (extended CSS)
    Extended,
}

/// An element-hiding rule. Recorded with its list, never used for network
/// matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CosmeticRule {
    pub kind: CosmeticKind,
    pub domains: Vec<String>,
    pub selector: String,
}

impl fmt::Display for CosmeticRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.kind {
            CosmeticKind::Hide => "##",
            CosmeticKind::HideException => "#@#",
            CosmeticKind::Extended => "#?#",
        };
        write!(f, "{}{}{}", self.domains.join(","), marker, self.selector)
    }
}
