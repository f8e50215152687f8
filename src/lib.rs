pub mod api;
pub mod config;
pub mod enrichment;
pub mod errors;
pub mod matching;
pub mod merge;
pub mod models;
pub mod store;
pub mod utils;
