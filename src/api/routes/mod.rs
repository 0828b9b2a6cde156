//! Route handlers for the API
//!
//! - [`system`] - Health check
//! - [`socket`] - WebSocket batch test endpoint

mod socket;
mod system;

pub use socket::*;
pub use system::*;
