pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod filter;
pub mod github;
pub mod model;
pub mod orchestrator;
pub mod overrides;
pub mod report;
pub mod state;
