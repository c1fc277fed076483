//! In-memory session log and document registry backing the chatdesk HTTP API.

pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{parse_message, ChatStore};
