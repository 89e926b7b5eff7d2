//! # gmdex - Game item and map catalog search with a command relay
//!
//! gmdex indexes item and map descriptor XML into an in-memory prefix index,
//! answers multi-token prefix queries by set intersection, and relays admin
//! commands for a selected entity to a game session over TCP.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`index`] - Catalog building (XML records, enrichment, prefix trie)
//! - [`query`] - Query tokenization and bucket intersection
//! - [`server`] - Relay wire protocol, client and server
//! - `tui` - Interactive terminal browser (`interactive` feature)
//! - [`output`] - Colored result printing for the CLI
//! - [`utils`] - Tokenizer, configuration and progress helpers
//!
//! ## Quick Start
//!
//! ```ignore
//! use gmdex::index::load_catalogs;
//! use gmdex::query::QueryEngine;
//! use gmdex::utils::AppConfig;
//!
//! let config = AppConfig::load().unwrap();
//! let catalogs = load_catalogs(&config, true).unwrap();
//!
//! if let Some(items) = &catalogs.items {
//!     for entity in QueryEngine::new(items).query("rare potion").iter() {
//!         println!("{} {}", entity.id, entity.name);
//!     }
//! }
//! ```
//!
//! ## Relay
//!
//! Messages are `<sessionId>*<command>` in a single fixed-size frame. The
//! server resolves the session through a [`server::SessionRegistry`] and hands
//! `[name, args...]` to an embedding [`server::CommandDispatcher`].

pub mod index;
pub mod output;
pub mod query;
pub mod server;
#[cfg(feature = "interactive")]
pub mod tui;
pub mod utils;
