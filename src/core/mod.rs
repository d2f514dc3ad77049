//! Policy compilation and deployment
//!
//! - [`policy`]: Typed policy model (rules, sets, NAT mappings, target)
//! - [`classify`]: Groups rules into filter chains by direction
//! - [`compile`]: Renders one rule into one nft rule line
//! - [`nat`]: Renders NAT mappings into prerouting/postrouting lines
//! - [`assemble`]: Builds the complete `table inet` document
//! - [`verify`]: Local `nft --check` of a document
//! - [`topology`]: Resolves the enabled/disabled node pair
//! - [`deploy`]: Two-node build, scrub and read
//! - [`error`]: Error types

pub mod assemble;
pub mod classify;
pub mod compile;
pub mod deploy;
pub mod error;
pub mod nat;
pub mod policy;
pub mod topology;
pub mod verify;

#[cfg(test)]
pub mod test_helpers;
