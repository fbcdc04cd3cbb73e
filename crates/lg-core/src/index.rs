//! Rule Index and Request Matching
//!
//! This is the hot path: every request of every page goes through
//! [`RuleIndex::match_request`]. Rules pinned to a hostname live in a bucket
//! keyed by that hostname; everything else goes in the generic bucket, which
//! is consulted for every request.

use std::collections::HashMap;
use std::sync::Arc;

use crate::psl::walk_host_suffixes;
use crate::rule::{CosmeticRule, Rule};
use crate::types::{MatchDecision, MatchResult, RequestContext, RequestType};

/// Rule counts of an index, for logging and profile info.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub blocking: usize,
    pub exceptions: usize,
    pub cosmetic: usize,
    pub host_buckets: usize,
    pub generic: usize,
}

impl IndexStats {
    /// Network rules (blocking and exceptions).
    pub fn network(&self) -> usize {
        self.blocking + self.exceptions
    }
}

/// Immutable, rebuildable set of rules for one filter list.
#[derive(Debug, Default)]
pub struct RuleIndex {
    buckets: HashMap<Box<str>, Vec<Arc<Rule>>>,
    generic: Vec<Arc<Rule>>,
    cosmetic: Vec<CosmeticRule>,
    stats: IndexStats,
}

impl RuleIndex {
    /// An index that matches nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index. Each rule lands in exactly one bucket, and rules keep
    /// their list order within a bucket.
    pub fn build(rules: Vec<Rule>, cosmetic: Vec<CosmeticRule>) -> Self {
        let mut buckets: HashMap<Box<str>, Vec<Arc<Rule>>> = HashMap::new();
        let mut generic = Vec::new();
        let mut stats = IndexStats {
            cosmetic: cosmetic.len(),
            ..IndexStats::default()
        };

        for rule in rules {
            if rule.is_exception() {
                stats.exceptions += 1;
            } else {
                stats.blocking += 1;
            }

            match rule.index_key() {
                Some(key) => buckets.entry(key.into_boxed_str()).or_default().push(Arc::new(rule)),
                None => generic.push(Arc::new(rule)),
            }
        }

        stats.host_buckets = buckets.len();
        stats.generic = generic.len();

        Self {
            buckets,
            generic,
            cosmetic,
            stats,
        }
    }

    pub fn stats(&self) -> IndexStats {
        self.stats
    }

    /// Number of network rules.
    pub fn len(&self) -> usize {
        self.stats.network()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cosmetic_rules(&self) -> &[CosmeticRule] {
        &self.cosmetic
    }

    /// All network rules: generic ones first, then host buckets.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.generic
            .iter()
            .chain(self.buckets.values().flatten())
            .map(|rule| &**rule)
    }

    /// Rules that could apply to a request host: the generic bucket plus the
    /// buckets of the host and each of its parent domains.
    pub fn candidates<'s>(&'s self, req_host: &'s str) -> impl Iterator<Item = &'s Arc<Rule>> + 's {
        let hosted = walk_host_suffixes(req_host)
            .filter_map(move |suffix| self.buckets.get(suffix))
            .flatten();
        self.generic.iter().chain(hosted)
    }

    /// Match a request.
    ///
    /// Any matching exception decides `Exception`; otherwise any matching
    /// blocking rule decides `Block`. Which rule is reported is not part of
    /// the contract.
    pub fn match_request(&self, ctx: &RequestContext<'_>) -> MatchResult {
        let mut blocked_by: Option<&Arc<Rule>> = None;

        for rule in self.candidates(&ctx.req_host) {
            // Once blocked, only exceptions can change the outcome.
            if blocked_by.is_some() && !rule.is_exception() {
                continue;
            }
            if !rule.matches(ctx) {
                continue;
            }
            if rule.is_exception() {
                return MatchResult {
                    decision: MatchDecision::Exception,
                    rule: Some(Arc::clone(rule)),
                };
            }
            blocked_by = Some(rule);
        }

        match blocked_by {
            Some(rule) => MatchResult {
                decision: MatchDecision::Block,
                rule: Some(Arc::clone(rule)),
            },
            None => MatchResult::default(),
        }
    }

    /// Convenience wrapper building the request context in place.
    pub fn is_blocked(&self, url: &str, origin_url: Option<&str>, request_type: RequestType) -> bool {
        let ctx = RequestContext::new(url, origin_url, request_type);
        self.match_request(&ctx).decision.is_blocked()
    }
}
