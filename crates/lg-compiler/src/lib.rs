//! ListGuard Filter List Compiler
//!
//! Parses AdBlock Plus compatible filter lists and builds the rule index the
//! matcher runs on.

pub mod builder;
pub mod parser;

pub use builder::{build_index, BuildError, CompiledList};
pub use parser::{
    checksum_body, declared_checksum, has_list_header, parse_expires, parse_filter_list, parse_line, ListMetadata,
    ParseError, ParseReport, ParsedLine, ParsedList,
};
