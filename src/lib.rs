//! Container engine connection and registry credential resolution for
//! function builds.
//!
//! `funcdock` answers the two questions a function build asks before it can
//! push an image: which container engine should do the work, and which
//! credentials will the registry accept.
//!
//! # Modules
//!
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`engine`]: Engine host resolution, Podman service and machine support,
//!   and the connected [`engine::EngineHandle`]
//! - [`credentials`]: Registry credential lookup, verification, prompting and
//!   persistence through Docker credential helpers
//! - [`ssh`]: SSH tunnels to remote engines (Unix only)
//! - [`error`]: Semantic error types for the application

use std::future::Future;
use std::pin::Pin;

pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
#[cfg(unix)]
pub mod ssh;

mod path_search;
mod terminal;

/// A boxed, sendable future, as returned by the mockable async seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
