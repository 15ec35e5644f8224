//! # divban
//!
//! A declarative manager for rootless container services on a single
//! Linux host. Each service is described by a configuration document
//! (loaded by an external caller; see [`crate::quadlet`] for the
//! descriptor types this crate compiles); `divban` compiles it into
//! systemd Quadlet unit files for a dedicated, dynamically provisioned
//! unprivileged user, then drives the resulting services through
//! their lifecycle.
//!
//! ## Architecture
//!
//! - [`entry`]: key-value entry algebra every section compiler is
//!   built from.
//! - [`ini`]: canonical INI section rendering.
//! - [`quadlet`]: the pure compiler from a container/network/volume/
//!   stack descriptor to rendered unit files.
//! - [`solver`]: dependency-graph topological sort, cycle detection,
//!   and parallel-level extraction.
//! - [`host`]: read-only host inventory queries and the transactional
//!   mutation engine (user provisioning, subordinate-id allocation,
//!   directory setup, linger activation, teardown).
//! - [`orchestrator`]: drives the external unit manager through the
//!   solver's levels: start, stop, restart, enable, status.
//! - [`retry`]: failure classification and backoff schedules shared
//!   by the mutation engine and orchestrator.
//! - [`gateway`]: the only place in the crate that spawns an external
//!   process.
//! - [`error`]: the crate-wide error taxonomy.
//!
//! This crate has no CLI surface, no configuration-file loader, and no
//! daemon mode: it is the compiler and the host/orchestration engine
//! that a CLI or service wrapper would sit on top of.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod entry;
pub mod error;
pub mod gateway;
pub mod host;
pub mod ini;
pub mod orchestrator;
pub mod quadlet;
pub mod retry;
pub mod solver;

pub use error::{Error, Result};

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
