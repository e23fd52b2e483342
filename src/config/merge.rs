//! Merge rules for layered configuration

mod merge_policy;

pub use merge_policy::builder_with_defaults;
