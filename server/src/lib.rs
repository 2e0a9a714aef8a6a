//! Karaoke party server library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod config;
pub mod db;
pub mod party;
pub mod room;
pub mod routes;
pub mod session;
pub mod state;
pub mod time;
pub mod ws;
