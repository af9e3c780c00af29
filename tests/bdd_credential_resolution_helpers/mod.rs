//! Behavioural step helpers for credential-resolution scenarios.

mod assertions;
mod fakes;
mod steps;

pub use state::{CredentialResolutionState, credential_resolution_state};
