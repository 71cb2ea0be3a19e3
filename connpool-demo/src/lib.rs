//! Demo client and echo server for the connpool crate.

pub mod client;
pub mod echo;
pub mod logging;
pub mod settings;
