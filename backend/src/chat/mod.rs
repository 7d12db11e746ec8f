//! Chat module
//!
//! Amazon Q Business chat session and its transcript.

pub mod models;
pub mod session;

pub use models::{Message, MessageRole};
pub use session::{is_exit_command, render_reply, ChatSession};
