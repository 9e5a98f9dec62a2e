//! # doc-corpus
//!
//! A document corpus ingestion and retrieval-augmented query server.
//!
//! Distributed scanner agents push office/text documents to the upload
//! endpoint; a background worker pool extracts text (Tika), chunks and
//! embeds it, and upserts the chunks into an external vector index under
//! deterministic ids. Queries are answered by retrieving the most similar
//! chunks and generating an answer conditioned on them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌───────────┐   ┌────────────┐   ┌──────────────┐
//! │ Agents      │──▶│  Upload    │──▶│  Dispatch   │──▶│   Pipeline    │
//! │ (external)  │   │  (axum)   │   │ (queue)    │   │ extract+embed │
//! └─────────────┘   └───────────┘   └────────────┘   └──────┬───────┘
//!                                                           │
//!                         ┌──────────────┐        ┌─────────┴────────┐
//!                         ▼              ▼        ▼                  ▼
//!                   ┌──────────┐   ┌──────────┐  ┌────────┐   ┌───────────┐
//!                   │  Query   │◀──│ AI once- │  │ SQLite │   │  Vector   │
//!                   │ (answer) │   │ init     │  │ (meta) │   │  index    │
//!                   └──────────┘   └──────────┘  └────────┘   └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Document record repository |
//! | [`chunk`] | Overlapping text chunking with deterministic ids |
//! | [`extract`] | Extraction collaborator client (Tika protocol) |
//! | [`embedding`] | Embedding collaborator client (Ollama protocol) |
//! | [`vector`] | Vector index clients (HTTP + in-memory) |
//! | [`generate`] | Generation collaborator client and prompt building |
//! | [`ai`] | Lazy once-per-process AI component initializer |
//! | [`pipeline`] | Document processing pipeline |
//! | [`dispatch`] | Job queue and worker pool |
//! | [`query`] | Retrieval-augmented answer engine |
//! | [`server`] | HTTP server (upload, query, dashboard) |

pub mod ai;
pub mod chunk;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod embedding;
pub mod extract;
pub mod generate;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod server;
pub mod store;
pub mod vector;
