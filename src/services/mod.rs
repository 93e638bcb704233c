//! Room services: the domain logic behind the session gateway.
//!
//! ARCHITECTURE
//! ============
//! `registry` owns live rooms, `room` serializes each room's mutations
//! through its `event_log`, and `derived` folds events into the state that
//! snapshots and client mirrors share. `canvas` and `roster` are the
//! sub-states with their own rules. `reaper` sweeps abandoned rooms.

pub mod canvas;
pub mod derived;
pub mod event_log;
pub mod reaper;
pub mod registry;
pub mod room;
pub mod roster;
