//! Protocol types for powerwardd IPC
//!
//! This crate defines the stable API between powerwardd and clients:
//! - Commands (requests from clients)
//! - Responses
//! - Events (service -> clients)
//! - Power state and transition records shared with the core

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
