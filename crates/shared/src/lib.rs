//! Payflow Shared Types and Utilities
//!
//! This crate contains the domain types and database utilities shared
//! across the Payflow platform.

pub mod db;
pub mod types;

pub use db::*;
pub use types::*;
