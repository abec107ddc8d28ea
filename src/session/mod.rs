//! Per-user conversation handling.

pub mod controller;
pub mod locks;
pub mod prompts;
pub mod router;

pub use controller::SessionController;
pub use locks::IdentityLocks;
pub use router::{EventHandler, SessionRouter};
