//! In-process stand-ins for the external collaborators.
//!
//! Production deployments back these traits with the relational store; the in-memory
//! versions keep the server runnable on its own.

pub mod inmemory;

pub use inmemory::{InMemoryMembershipAuthority, InMemoryMessageStore};
