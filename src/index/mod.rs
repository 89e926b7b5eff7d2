pub mod build;
pub mod catalog;
pub mod enrich;
pub mod error;
pub mod stats;
pub mod trie;
pub mod types;
pub mod xml;

pub use build::{Catalogs, build_catalogs, load_catalogs};
pub use catalog::Catalog;
pub use error::CatalogError;
pub use trie::PrefixIndex;
pub use types::*;
