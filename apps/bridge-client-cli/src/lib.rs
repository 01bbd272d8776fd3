//! Library half of the Client binary: the interactive console loop,
//! factored out so integration tests can drive it over an in-memory
//! socket instead of a real transport.

pub mod console;
