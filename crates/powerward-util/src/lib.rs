//! Shared utilities for powerward
//!
//! This crate provides:
//! - ID types (TransitionId, ClientId)
//! - Clock access with a development mock-time override
//! - Wall-clock time of day for schedule windows
//! - Default paths for the config file and control socket

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
