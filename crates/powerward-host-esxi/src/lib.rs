//! ESXi gateway for powerwardd
//!
//! Provides:
//! - Remote commands over short-lived `ssh` sessions (key or `sshpass` auth)
//! - Wake-on-LAN magic packets over UDP broadcast
//! - The ESXi command lines behind each remote operation

mod adapter;
mod ssh;
mod wol;

pub use adapter::*;
pub use ssh::*;
pub use wol::*;
