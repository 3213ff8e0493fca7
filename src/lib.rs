//! # RFP Harness
//!
//! Answers Request-for-Proposal spreadsheets from a project's own
//! documents. Each requirement row runs a small retrieval agent: search
//! the project's vector index, expand hits into surrounding context, ask
//! the model whether that context suffices, widen the search if not, then
//! draft the answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌───────────┐
//! │  Documents  │──▶│   Ingest    │──▶│  SQLite   │
//! │ files/pages │   │ Chunk+Embed │   │ chunks+vec│
//! └─────────────┘   └─────────────┘   └─────┬─────┘
//!                                           │
//! ┌─────────────┐   ┌─────────────┐         │
//! │  RFP sheet  │──▶│  RfpAgent   │◀────────┘
//! │  CSV/XLSX   │   │ per-row loop│──▶ answered CSV
//! └─────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rfp init
//! rfp ingest --user 1 --project 7 docs/security.txt docs/pricing.txt
//! rfp answer --user 1 --project 7 --input "Acme RFP.xlsx"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] / [`migrate`] | Database connection and schema |
//! | [`sqlite_store`] | SQLite `Store` + `VectorIndex` |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Language model providers and [`llm::ModelClient`] |
//! | [`retry`] | Exponential backoff for upstream calls |
//! | [`retriever`] | Scoped vector search, fail-closed |
//! | [`judge`] | Sufficiency judge |
//! | [`generate`] | Answer generator |
//! | [`agent`] | Per-row agent loop and `process_row_batch` |
//! | [`trace`] | Per-row observability sink |
//! | [`ingest`] | File and web page ingestion |
//! | [`sheet`] | RFP sheet reading and writing |
//! | [`rfp`] | RFP job processing |
//! | [`jobs`] | JSON job request dispatch |
//!
//! The pure pieces (state machine, window assembly, verdict parsing,
//! prompts, store traits) live in `rfp-harness-core`.

pub mod agent;
pub mod app;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod generate;
pub mod http;
pub mod ingest;
pub mod jobs;
pub mod judge;
pub mod llm;
pub mod migrate;
pub mod retriever;
pub mod retry;
pub mod rfp;
pub mod sheet;
pub mod sqlite_store;
pub mod trace;
