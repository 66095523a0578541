pub mod config;
pub mod delivery;
pub mod error;
pub mod report;
pub mod search;
pub mod stats;
pub mod types;
