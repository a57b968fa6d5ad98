pub mod commands;
pub mod config;
pub mod feed;
pub mod notify;
pub mod sync;
