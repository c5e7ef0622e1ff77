//! # wikiqa
//!
//! Retrieval-augmented question answering over an internal markdown wiki.
//!
//! Every raw wiki page gets a model-written summary. Both trees are split
//! by markdown headers, embedded, and stored in SQLite. At question time a
//! tool-calling agent searches the index and answers from the summaries of
//! the documents it finds.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌─────────────┐   ┌──────────┐
//! │ raw/*.md │──▶│ Summarizer │──▶│ summary/*.md│──▶│  Index   │
//! └────┬─────┘   └────────────┘   └─────────────┘   │ SQLite   │
//!      └───────────────────────────────────────────▶│ + vecs   │
//!                                                   └────┬─────┘
//!                                                        ▼
//!                      ┌──────────┐   ┌───────┐   ┌───────────┐
//!                      │ CLI/HTTP │──▶│ Agent │──▶│ Retriever │
//!                      └──────────┘   └───────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! wikiqa init
//! wikiqa build --workers 8
//! wikiqa search "cluster autoscaler"
//! wikiqa serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`corpus`] | Raw/summary trees and ignore patterns |
//! | [`llm`] | Chat model abstraction (OpenAI, Azure OpenAI) |
//! | [`summarize`] | Concurrent per-document summarization |
//! | [`chunk`] | Markdown header splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`store`] | Persistent vector store |
//! | [`index`] | Index build pipeline |
//! | [`search`] | Retrieval and reference formatting |
//! | [`tools`] | Tools exposed to the agent |
//! | [`agent`] | Tool-calling answer loop |
//! | [`server`] | HTTP API and static frontend |
//! | [`stats`] | Corpus and index status |
//! | [`commands`] | CLI command implementations |

pub mod agent;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod index;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod stats;
pub mod store;
pub mod summarize;
pub mod tools;
