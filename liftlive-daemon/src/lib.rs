//! LiftLive daemon library
//!
//! This module re-exports the daemon's modules for integration testing.

pub mod config;
pub mod hooks;
pub mod routes;
pub mod shorts;
