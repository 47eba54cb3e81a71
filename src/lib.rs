// src/lib.rs
//! Archflow resolves extracted DDD facts into an architecture graph and
//! decomposes it into execution chains.

pub mod config;
pub mod core;
pub mod error;

pub use error::{ArchflowError, Result};
