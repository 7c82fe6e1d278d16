//! Shared utilities used across the sync pipeline

pub mod glob;

pub use glob::IgnoreMatcher;
