//! podfw - PodNet firewall builder
//!
//! Compiles a declarative firewall policy into a single nftables
//! `table inet` document and deploys it into a network namespace on a
//! two-node PodNet pair.
//!
//! # Architecture
//!
//! - [`validators`] - Per-object and batch validation of untyped policy JSON
//! - [`core`] - Classification, rule/NAT compilation, assembly and deployment
//! - [`remote`] - Command execution on the nodes (ssh)
//! - [`audit`] - Audit log of every build, scrub, read and check
//! - [`config`] - Settings persistence
//! - [`utils`] - Utility functions (XDG directories, line diff)
//!
//! # Safety Features
//!
//! - Every validation issue in a batch is reported, not just the first
//! - Candidate documents are syntax-checked on the node before the running
//!   table is touched
//! - The disabled node is only changed after the enabled node succeeded
//! - Failures carry every step that succeeded, for manual recovery
//! - SHA-256 document checksums in logs and the audit trail

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod remote;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::assemble::Document;
pub use core::error::{Error, Result};
pub use core::policy::{Policy, PolicySpec, Rule, Target};
