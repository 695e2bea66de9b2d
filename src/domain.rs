//! Domain module - Core audit entities
//!
//! This module contains the value objects that describe a lookup run:
//! identifiers, classified search outcomes, result records and the
//! error taxonomy every layer converts into.
//!
//! Modern Rust module organization:
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod errors;
pub mod identifier;
pub mod outcome;
pub mod result_record;

pub use errors::{AuditError, FailureKind, ItemError, classify_failure};
pub use identifier::{Identifier, MAX_IDENTIFIER_LEN, MIN_IDENTIFIER_LEN, normalize_identifier};
pub use outcome::{AddToCartState, CartVerdict, RecordStatus, SearchOutcome};
pub use result_record::{CSV_HEADER, ProductDetails, ProductPage, ResultRecord};
