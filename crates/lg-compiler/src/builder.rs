//! Filter list to [`RuleIndex`] compilation.
//!
//! Building is all-or-nothing: either a complete index comes back or an
//! error does, never a partial index.

use lg_core::RuleIndex;

use crate::parser::{parse_filter_list, ListMetadata, ParseReport};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("Filter list contains no usable rules ({errors} unparseable lines)")]
    NoUsableRules { errors: usize },
}

/// A compiled filter list.
#[derive(Debug)]
pub struct CompiledList {
    pub index: RuleIndex,
    pub metadata: ListMetadata,
    pub report: ParseReport,
}

/// Parse `text` and build its index.
///
/// Fails when the list yields neither network nor cosmetic rules.
pub fn build_index(text: &str) -> Result<CompiledList, BuildError> {
    let parsed = parse_filter_list(text);
    let report = parsed.report;

    if parsed.rules.is_empty() && parsed.cosmetic.is_empty() {
        return Err(BuildError::NoUsableRules { errors: report.errors });
    }

    let index = RuleIndex::build(parsed.rules, parsed.cosmetic);
    let stats = index.stats();
    log::debug!(
        "Built index: {} blocking, {} exceptions, {} cosmetic, {} host buckets, {} generic, {} unparseable",
        stats.blocking,
        stats.exceptions,
        stats.cosmetic,
        stats.host_buckets,
        stats.generic,
        report.errors
    );

    Ok(CompiledList {
        index,
        metadata: parsed.metadata,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lg_core::{MatchDecision, RequestContext, RequestType};

    #[test]
    fn test_build_end_to_end_list() {
        let text = "! Title: Test List\n||ads.example^\n@@||ads.example/allowed.js\n##.banner\n";
        let compiled = build_index(text).unwrap();

        assert_eq!(compiled.metadata.title.as_deref(), Some("Test List"));
        let stats = compiled.index.stats();
        assert_eq!((stats.blocking, stats.exceptions, stats.cosmetic), (1, 1, 1));

        let allowed = RequestContext::new("https://ads.example/allowed.js", None, RequestType::SCRIPT);
        let other = RequestContext::new("https://ads.example/other.js", None, RequestType::SCRIPT);
        assert_eq!(compiled.index.match_request(&allowed).decision, MatchDecision::Exception);
        assert_eq!(compiled.index.match_request(&other).decision, MatchDecision::Block);
    }

    #[test]
    fn test_every_rule_lands_in_one_bucket() {
        let text = "||a.test^\n||b.a.test^\n/banner/*\n||c.test/x.js\n@@*.gif|\n! comment\n";
        let compiled = build_index(text).unwrap();
        let stats = compiled.index.stats();
        assert_eq!(stats.host_buckets, 3);
        assert_eq!(stats.generic, 2);
        assert_eq!(compiled.index.rules().count(), 5);
        assert_eq!(compiled.report.blocking + compiled.report.exceptions, 5);
    }

    #[test]
    fn test_no_usable_rules() {
        let text = "[Adblock Plus 2.0]\n! Title: Empty\n/ads[0-9]/\n";
        assert_eq!(build_index(text).unwrap_err(), BuildError::NoUsableRules { errors: 1 });
        assert!(build_index("").is_err());
    }
}
