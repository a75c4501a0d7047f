//! Mock servers for integration testing
//!
//! Simulates the media server's CLI port so the client can be exercised
//! end to end without a real server.
#![allow(dead_code)]

pub mod lms_cli;

pub use lms_cli::MockCliServer;
