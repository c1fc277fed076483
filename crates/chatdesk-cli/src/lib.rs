pub mod chat;
pub mod client;
pub mod config;
