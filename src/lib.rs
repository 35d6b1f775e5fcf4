//! agentpty: run AI coding agents on managed pseudo-terminals.
//!
//! The engine lives in [`agentpty_core`]; this crate adds configuration
//! loading and the interactive terminal front end.

pub mod config;
pub mod run;
