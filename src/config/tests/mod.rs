//! Unit tests for funcdock configuration types.
//!
//! - [`helpers`] - Shared fixtures and helper functions
//! - [`types_tests`] - Defaults, TOML parsing and validation
//! - [`layer_precedence_tests`] - `MergeComposer` layer precedence tests

mod helpers;
