//! # RFP Harness Core
//!
//! Shared, runtime-agnostic logic for RFP Harness: data models, storage and
//! provider traits, context window assembly, sufficiency verdict parsing,
//! prompt templates, and the per-row answer state machine.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! The application crate supplies concrete stores and providers and drives
//! the state machine defined in [`graph`].

pub mod embedding;
pub mod error;
pub mod graph;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod store;
pub mod verdict;
pub mod window;
