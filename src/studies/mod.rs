//! Study definitions and weighted selection.
//!
//! Parses the TOML studies catalog into weighted destination candidates
//! and picks one of them at random, proportionally to weight.

mod catalog;
mod selector;

pub use catalog::{parse_studies_file, parse_studies_str, CatalogParseResult, Study};
pub use selector::{choose_study, choose_study_with};
pub(crate) use selector::scale_to_max;
