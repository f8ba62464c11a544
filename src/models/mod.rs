//! Data models for groups, targets and bulk LMS jobs.
//!
//! Field names serialize in camelCase to match the dashboard's JSON contract.

mod group;
mod job;

pub use group::*;
pub use job::*;
