//! # Transcript Harness
//!
//! Finds meeting transcripts in a SharePoint document library, pairs each
//! Teams meeting recording with its transcript, stores them in SQLite and
//! generates AI summaries on demand.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────┐
//! │ Graph (MS)   │──▶│ scan + resolver  │──▶│  SQLite  │
//! │ DriveLookup  │   │ naming matcher   │   │  store   │
//! └──────────────┘   └──────────────────┘   └────┬─────┘
//!                                                │
//!                          ┌─────────────────────┤
//!                          ▼                     ▼
//!                     ┌──────────┐         ┌──────────┐
//!                     │   CLI    │         │   HTTP   │
//!                     │  (tsh)   │         │   API    │
//!                     └──────────┘         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GRAPH_CLIENT_SECRET=...
//! tsh init                      # create database
//! tsh scan                      # find and store transcripts
//! tsh list
//! tsh summarize <id>            # needs [openai] and AZURE_OPENAI_API_KEY
//! tsh serve                     # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`naming`] | Recording base names and transcript name matching |
//! | [`graph`] | Microsoft Graph drive access |
//! | [`resolver`] | Transcript lookup cascade for one recording |
//! | [`scan`] | Folder scan orchestration |
//! | [`extract`] | VTT / TXT / DOCX text extraction |
//! | [`activity`] | Structured activity sinks |
//! | [`store`] | Transcript and summary persistence |
//! | [`summarize`] | Azure OpenAI summaries |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`logging`] | `tracing` subscriber setup |

pub mod activity;
pub mod config;
pub mod db;
pub mod extract;
pub mod graph;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod naming;
pub mod resolver;
pub mod scan;
pub mod server;
pub mod store;
pub mod summarize;

#[cfg(test)]
mod testing;
