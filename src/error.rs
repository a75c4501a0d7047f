//! Error taxonomy for the CLI client

use std::time::Duration;
use thiserror::Error;

use crate::model::ItemKind;

/// Errors surfaced by [`Connection`](crate::connection::Connection) and the
/// services built on it.
#[derive(Error, Debug)]
pub enum CliError {
    /// TCP connect was refused or the host could not be resolved
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("connect to {addr} already in progress")]
    ConnectInProgress { addr: String },

    /// Server closed the socket in reply to `login`
    #[error("server at {addr} rejected the login credentials")]
    AuthenticationFailed { addr: String },

    /// Read or write failure on an established connection
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("no reply from server within {0:?}")]
    ResponseTimeout(Duration),

    #[error("not connected")]
    NotConnected,

    /// Reply line did not have the shape expected for the issued command.
    /// Logged by the browse layer rather than returned.
    #[error("malformed {expected} response: {line}")]
    MalformedResponse { expected: &'static str, line: String },

    #[error("no playlist query field for {0:?} items")]
    UnsupportedItemKind(ItemKind),
}

impl CliError {
    /// Connect-time failures (refused, timed out, unresolvable, rejected login)
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::ConnectTimeout { .. }
                | Self::ConnectInProgress { .. }
                | Self::AuthenticationFailed { .. }
        )
    }

    /// Mid-session failures on an established socket
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::ConnectionClosed | Self::ResponseTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
