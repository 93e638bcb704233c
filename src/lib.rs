//! Real-time room synchronization for a virtual classroom.
//!
//! A room is a shared whiteboard plus chat, tasks, notes, files, timer,
//! and media flags. Every mutation becomes a sequence-numbered event in the
//! room's log; each participant's connection receives those events in log
//! order, and late joiners start from a snapshot.

pub mod config;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod mirror;
pub mod routes;
pub mod services;
pub mod state;
