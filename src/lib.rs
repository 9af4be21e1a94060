pub mod auction;
pub mod checkpoint;
pub mod comparison;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod neighborhood;
pub mod realism;
pub mod scrape;
pub mod shutdown;
pub mod sources;
pub mod types;
