//! Managed-host gateway interface for powerwardd
//!
//! This crate defines the boundary between the power-state core and the
//! transport used to reach the managed host. It contains no transport code
//! itself; see `powerward-host-esxi` for the SSH / Wake-on-LAN adapter.

mod command;
mod hardware;
mod mock;
mod traits;

pub use command::*;
pub use hardware::*;
pub use mock::*;
pub use traits::*;
