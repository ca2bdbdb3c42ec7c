//! Output contracts: what a valid candidate looks like.
//!
//! This module provides:
//! - Field declarations and failure policies
//! - A builder that resolves validators into an immutable `OutputContract`
//! - JSON Schema binding
//! - Candidate parsing against a contract

mod contract;
mod parse;
mod schema;
mod types;

pub use contract::{
    BoundField, BoundValidator, ContractBuilder, ContractMode, OutputContract, CANDIDATE_FIELD,
    SCALAR_FIELD,
};
pub use parse::{parse_candidate, strip_code_fences, FieldSlot, ParsedCandidate};
pub use types::{FieldSpec, FieldType, OnFail, ValidatorRef};
