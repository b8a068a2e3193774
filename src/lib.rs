//! Container load planning service.
//!
//! Expands cargo rows into single units, assigns them greedily to standard
//! shipping containers and serves the result over HTTP together with saved
//! projects and a small message board.

pub mod api;
pub mod board;
pub mod config;
pub mod logging;
pub mod model;
pub mod parse;
pub mod planner;
pub mod projects;
pub mod store;
pub mod types;
