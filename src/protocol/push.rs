//! Unsolicited server lines
//!
//! With `listen 1` active the server writes one line per state change:
//! `<playerid> <command> <args...>`, every token percent-encoded.
//!
//! Example lines:
//! - `00%3A04%3A20%3Aaa%3Abb%3Acc playlist newsong Track%20Name 5`
//! - `00%3A04%3A20%3Aaa%3Abb%3Acc playlist pause 1`
//! - `00%3A04%3A20%3Aaa%3Abb%3Acc newsong Track%20Name 5`
//! - `00%3A04%3A20%3Aaa%3Abb%3Acc time 63.2`
//! - `00%3A04%3A20%3Aaa%3Abb%3Acc pause 0`

use super::decode_token;
use crate::model::PlaybackState;

/// Parsed push line
#[derive(Debug, Clone, PartialEq)]
pub enum PushLine {
    /// A new track started
    NewSong {
        player_id: String,
        title: Option<String>,
        /// Playlist index of the new track
        index: Option<u32>,
    },
    /// Playlist or transport change (`playlist <sub>`, `play`, `pause`, `stop`, `mode`)
    Playlist {
        player_id: String,
        command: String,
        /// Transport state implied by the line, when it implies one
        state: Option<PlaybackState>,
    },
    /// Elapsed-time report
    Time { player_id: String, seconds: f64 },
    /// Anything else (mixer, power, client, the `listen` echo...)
    Unknown { raw_line: String },
}

impl PushLine {
    pub fn player_id(&self) -> Option<&str> {
        match self {
            Self::NewSong { player_id, .. }
            | Self::Playlist { player_id, .. }
            | Self::Time { player_id, .. } => Some(player_id),
            Self::Unknown { .. } => None,
        }
    }
}

/// Parse one push line. Never fails; unrecognized lines come back as
/// [`PushLine::Unknown`].
pub fn parse_push_line(line: &str) -> PushLine {
    let line = line.trim();
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return PushLine::Unknown {
            raw_line: line.to_string(),
        };
    }

    let player_id = decode_token(parts[0]);
    let arg = |i: usize| parts.get(i).copied();

    match parts[1] {
        "playlist" => {
            let subcommand = arg(2).unwrap_or("");
            if subcommand == "newsong" {
                return PushLine::NewSong {
                    player_id,
                    title: arg(3).map(decode_token),
                    index: arg(4).and_then(|s| s.parse().ok()),
                };
            }
            PushLine::Playlist {
                player_id,
                command: subcommand.to_string(),
                state: transport_state(subcommand, arg(3)),
            }
        }
        "newsong" => PushLine::NewSong {
            player_id,
            title: arg(2).map(decode_token),
            index: arg(3).and_then(|s| s.parse().ok()),
        },
        "time" => match arg(2).and_then(|s| decode_token(s).parse::<f64>().ok()) {
            Some(seconds) => PushLine::Time { player_id, seconds },
            None => PushLine::Unknown {
                raw_line: line.to_string(),
            },
        },
        command @ ("play" | "pause" | "stop" | "mode") => PushLine::Playlist {
            player_id,
            command: command.to_string(),
            state: transport_state(command, arg(2)),
        },
        _ => PushLine::Unknown {
            raw_line: line.to_string(),
        },
    }
}

/// Transport state implied by a transport command and its first argument.
/// A bare `pause` toggles, so it implies nothing on its own.
fn transport_state(command: &str, arg: Option<&str>) -> Option<PlaybackState> {
    match (command, arg) {
        ("play", _) => Some(PlaybackState::Playing),
        ("stop", _) => Some(PlaybackState::Stopped),
        ("pause", Some("1")) => Some(PlaybackState::Paused),
        ("pause", Some("0")) => Some(PlaybackState::Playing),
        ("mode", Some(mode)) => Some(PlaybackState::from(decode_token(mode).as_str())),
        _ => None,
    }
}
