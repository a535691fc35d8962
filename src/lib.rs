pub mod app;
pub mod cache;
pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod flavorgraph;
pub mod output;
pub mod sweep;
pub mod table;
pub mod tui;
