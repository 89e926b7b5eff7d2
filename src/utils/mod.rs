//! Utility functions and shared plumbing.
//!
//! ## Modules
//!
//! - [`app_data`] - Configuration (`config.json` in the app data dir, `paths.json`)
//! - [`progress`] - Progress bars that compile away without the `progress` feature
//! - [`tokenizer`] - Search-token normalization
//!
//! ## Key Functions
//!
//! ```no_run
//! use gmdex::utils::tokenize;
//!
//! let tokens = tokenize("Potion_of-Life  (Rare)");
//! // Returns: ["potion", "of", "life", "rare"]
//! ```

pub mod app_data;
pub mod progress;
pub mod tokenizer;

pub use app_data::*;
pub use tokenizer::*;
