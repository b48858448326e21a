//! Portal - web application core
//!
//! Console and rotating file logging with access-log formats, and third-party
//! login through OAuth strategies (LinkedIn) backed by a local user store.

pub mod auth;
pub mod config;
pub mod logging;
pub mod server;
pub mod users;
