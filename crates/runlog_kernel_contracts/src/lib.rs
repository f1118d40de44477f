#![forbid(unsafe_code)]

pub mod admin;
pub mod common;
pub mod roster;
pub mod run;
pub mod submission;
pub mod submitter;

pub use common::{ContractViolation, MonotonicTimeNs, ReasonCodeId, SchemaVersion, Validate};
