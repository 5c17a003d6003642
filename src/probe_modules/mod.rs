pub mod api;
pub mod check;
pub mod config;
pub mod error;
pub mod reporter;
pub mod runner;
pub mod threshold;
