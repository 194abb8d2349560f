//! TripCrew - collaborative trip itinerary editing
//!
//! A small group edits a day-by-day itinerary together while a server-side
//! assistant may rewrite it at any time and a chat stream runs alongside.
//!
//! # Modules
//!
//! - [`trip`] - trip snapshot and user wire types
//! - [`chat`] - chat messages and the append-only transcript
//! - [`gateway`] - REST persistence of itinerary changes
//! - [`realtime`] - per-trip WebSocket channel
//! - [`sync`] - coordinator actor reconciling local edits with the server
//! - [`render`] - terminal formatting
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod chat;
pub mod cli;
pub mod config;
pub mod gateway;
pub mod preview;
pub mod realtime;
pub mod render;
pub mod repl;
pub mod sync;
pub mod trip;
