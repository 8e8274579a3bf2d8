//! Shared utilities for the Irori chat hub: logging setup and clock abstraction.

pub mod logger;
pub mod time;
