//! Walking the remote mailbox: message listing and message detail.

pub mod detail;
pub mod walker;

pub use detail::load_message;
pub use walker::{list_messages, MessageWalker};
