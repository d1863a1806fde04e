pub mod app;
pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod lookup;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod resolver;
pub mod sdmx;
pub mod store;
pub mod table;
pub mod validate;
pub mod versioning;
pub mod vintage;
