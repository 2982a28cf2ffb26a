pub mod app;
pub mod builder;
pub mod config;
pub mod domain;
pub mod error;
pub mod output;
pub mod reconcile;
pub mod sources;
pub mod sync;
