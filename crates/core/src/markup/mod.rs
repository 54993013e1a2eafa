//! Markup interpretation: HTML parsing, field expressions and JSON paths.
//!
//! HTML pages are parsed into an owned [`MarkupNode`] tree by a forgiving
//! tokenizer and queried with [`QueryExpr`]s validated at definition-load
//! time. API sources are walked with dotted paths instead.

mod json_path;
mod node;
mod parser;
mod selector;

pub use json_path::{api_records, record_field, scalar_text, validate_path, walk};
pub use node::{Descendants, MarkupNode, NodeKind};
pub use parser::parse_html;
pub use selector::{AttrPredicate, Index, QueryExpr, Selector, SelectorError};
