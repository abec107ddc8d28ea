//! Channel abstraction for message I/O.

pub mod keyboard;
pub mod telegram;
pub mod types;

pub use keyboard::Keyboard;
pub use telegram::TelegramChannel;
pub use types::*;
