//! Power-state core for powerwardd
//!
//! This crate is the heart of powerwardd, containing:
//! - The schedule oracle (should the host be on right now?)
//! - Power-on and power-off procedures with retry-and-verify semantics
//! - The reconciliation loop that owns the believed power state
//! - The control surface used for manual triggers and status

mod controller;
mod events;
mod executor;
mod guard;
mod reconcile;
mod schedule;
mod state;

pub use controller::*;
pub use events::*;
pub use executor::*;
pub use guard::*;
pub use reconcile::*;
pub use schedule::*;
pub use state::*;
