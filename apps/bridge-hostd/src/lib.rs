//! Library half of the Host binary: everything `main.rs` wires together,
//! factored out so integration tests can drive a full host without
//! spawning a subprocess.

pub mod cli;
pub mod config;
pub mod console;
pub mod host;
pub mod lock;
