//! Irori chat hub server library.
//!
//! Live connection hub with room fan-out: authenticated WebSocket connections join
//! rooms, and every message sent to a room is delivered to the room's current members
//! without letting a slow client stall anyone else.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
