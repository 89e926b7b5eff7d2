pub mod executor;

pub use executor::{QueryEngine, QueryResult};
