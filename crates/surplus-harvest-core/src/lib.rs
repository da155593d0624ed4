//! # Surplus Harvest Core
//!
//! Shared, runtime-free logic for Surplus Harvest: data models, the
//! checksum-bearing case-reference format, canonical-case validation,
//! the jurisdiction gate, the job-client port, and the state/run store
//! abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP, or other native-only
//! dependencies; everything here is exercised directly by unit tests and
//! backed by in-memory adapters.

pub mod caseref;
pub mod jobs;
pub mod jurisdiction;
pub mod models;
pub mod store;
pub mod validate;
