pub mod app;
pub mod config;
pub mod domain;
pub mod feeds;
pub mod fetch;
pub mod output;
pub mod query;
pub mod scheduler;
pub mod store;
pub mod tasks;
