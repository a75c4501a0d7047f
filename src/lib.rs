//! Squeeze Control - client for the Logitech/Lyrion Media Server CLI
//!
//! The server speaks a line-oriented text protocol on its CLI port (9090 by
//! default). This library provides:
//! - A serialized command connection with typed browse and status queries
//! - Playback and playlist control for individual players
//! - A push-event listener on a second connection, fanned out to per-player
//!   subscribers
//! - A reconnecting session runner for long-lived clients

pub mod browse;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod model;
pub mod playback;
pub mod protocol;
pub mod service;
pub mod session;

pub use error::{CliError, Result};
pub use service::SqueezeService;
