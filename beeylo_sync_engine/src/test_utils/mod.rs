//! Helpers for tests in this crate and its dependents. Enabled by the `test_utils` feature.
pub mod fixtures;
pub mod prepare_env;
