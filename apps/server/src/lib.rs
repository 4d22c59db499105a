//! Lotfolio Server - HTTP front-end over the ledger engine.

pub mod api;
pub mod config;
pub mod error;
pub mod main_lib;
pub mod store;
