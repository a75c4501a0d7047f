//! Library items, players and playback status
//!
//! Items are a closed set of kinds (genre, artist, album, song). Status objects
//! are rebuilt from each `status` query and only patched in place by push
//! events (see [`PlayerStatus::apply_event`]).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::events::Event;

// =============================================================================
// Items
// =============================================================================

/// Discriminator for [`Item`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Genre,
    Artist,
    Album,
    Song,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Genre => write!(f, "genre"),
            Self::Artist => write!(f, "artist"),
            Self::Album => write!(f, "album"),
            Self::Song => write!(f, "song"),
        }
    }
}

/// Artwork URLs served by the media server's HTTP port.
/// Derived, never fetched by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverArt {
    pub url: String,
    pub thumbnail_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub artist: Option<String>,
    /// Only known when the album was browsed under an artist
    pub artist_id: Option<String>,
    pub artwork_track_id: Option<String>,
    pub cover: Option<CoverArt>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub name: String,
    pub artist: Option<String>,
    pub artist_id: Option<String>,
    pub album: Option<String>,
    pub album_id: Option<String>,
    pub genre: Option<String>,
    pub cover: Option<CoverArt>,
}

/// Any browsable library item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Item {
    Genre(Genre),
    Artist(Artist),
    Album(Album),
    Song(Song),
}

impl Item {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Genre(_) => ItemKind::Genre,
            Self::Artist(_) => ItemKind::Artist,
            Self::Album(_) => ItemKind::Album,
            Self::Song(_) => ItemKind::Song,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Genre(g) => &g.id,
            Self::Artist(a) => &a.id,
            Self::Album(a) => &a.id,
            Self::Song(s) => &s.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Genre(g) => &g.name,
            Self::Artist(a) => &a.name,
            Self::Album(a) => &a.name,
            Self::Song(s) => &s.name,
        }
    }
}

impl From<Genre> for Item {
    fn from(g: Genre) -> Self {
        Self::Genre(g)
    }
}

impl From<Artist> for Item {
    fn from(a: Artist) -> Self {
        Self::Artist(a)
    }
}

impl From<Album> for Item {
    fn from(a: Album) -> Self {
        Self::Album(a)
    }
}

impl From<Song> for Item {
    fn from(s: Song) -> Self {
        Self::Song(s)
    }
}

/// One page of a browse query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseResult<T> {
    pub results: Vec<T>,
    /// Total reported by the server, independent of page size
    pub total_items: u32,
}

impl<T> BrowseResult<T> {
    pub fn new(results: Vec<T>, total_items: u32) -> Self {
        // total_items >= results.len(), even when the count token was missing
        let total_items = total_items.max(results.len() as u32);
        Self {
            results,
            total_items,
        }
    }

    pub fn empty() -> Self {
        Self {
            results: Vec::new(),
            total_items: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Album ordering accepted by the `albums` query. `Title` is the server
/// default and is never sent on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlbumSort {
    #[default]
    Title,
    New,
    Artflow,
    ArtistAlbum,
    YearAlbum,
    YearArtistAlbum,
}

impl AlbumSort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::New => "new",
            Self::Artflow => "artflow",
            Self::ArtistAlbum => "artistalbum",
            Self::YearAlbum => "yearalbum",
            Self::YearArtistAlbum => "yearartistalbum",
        }
    }
}

// =============================================================================
// Players and status
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub uuid: Option<String>,
    pub ip: Option<String>,
}

/// Transport state reported in the `mode` status token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playing => write!(f, "playing"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

impl From<&str> for PlaybackState {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "playing" | "play" => Self::Playing,
            "paused" | "pause" => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShuffleMode {
    #[default]
    Off,
    Songs,
    Albums,
}

impl From<u8> for ShuffleMode {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Songs,
            2 => Self::Albums,
            _ => Self::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatMode {
    #[default]
    Off,
    Song,
    Playlist,
}

impl From<u8> for RepeatMode {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Song,
            2 => Self::Playlist,
            _ => Self::Off,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub current_song: Option<Song>,
    /// Position of `current_song` in the player's playlist
    pub current_index: Option<u32>,
    pub state: PlaybackState,
    /// Elapsed seconds in the current track
    pub position: f64,
    pub duration: Option<f64>,
    /// 0-100
    pub volume: u8,
    pub muted: bool,
    pub shuffle: ShuffleMode,
    pub repeat: RepeatMode,
    pub playlist_tracks: u32,
}

impl PlayerStatus {
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state == PlaybackState::Stopped
    }

    /// Set volume from the raw `mixer volume` value. The server reports a
    /// muted player as the negated volume.
    pub fn set_raw_volume(&mut self, raw: i32) {
        self.muted = raw < 0;
        self.volume = raw.unsigned_abs().min(100) as u8;
    }

    /// Patch this status from a push event for the same player.
    /// Returns true if anything changed.
    pub fn apply_event(&mut self, event: &Event) -> bool {
        match event {
            Event::TimeChanged { seconds, .. } => {
                if self.position == *seconds {
                    return false;
                }
                self.position = *seconds;
                true
            }
            Event::SongChanged { status, .. } | Event::PlaylistChanged { status, .. } => {
                if self == status {
                    return false;
                }
                *self = status.clone();
                true
            }
            Event::Disconnected => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_reports_kind_and_id() {
        let item: Item = Album {
            id: "7".to_string(),
            name: "Kind of Blue".to_string(),
            ..Default::default()
        }
        .into();
        assert_eq!(item.kind(), ItemKind::Album);
        assert_eq!(item.id(), "7");
        assert_eq!(item.name(), "Kind of Blue");
    }

    #[test]
    fn browse_result_total_never_below_page_length() {
        let result = BrowseResult::new(vec![1, 2, 3], 0);
        assert_eq!(result.total_items, 3);

        let result = BrowseResult::new(vec![1, 2], 40);
        assert_eq!(result.total_items, 40);
    }

    #[test]
    fn playback_state_from_mode_token() {
        assert_eq!(PlaybackState::from("play"), PlaybackState::Playing);
        assert_eq!(PlaybackState::from("pause"), PlaybackState::Paused);
        assert_eq!(PlaybackState::from("stop"), PlaybackState::Stopped);
        assert_eq!(PlaybackState::from("bogus"), PlaybackState::Stopped);
    }

    #[test]
    fn shuffle_and_repeat_from_numeric_tokens() {
        assert_eq!(ShuffleMode::from(0), ShuffleMode::Off);
        assert_eq!(ShuffleMode::from(2), ShuffleMode::Albums);
        assert_eq!(RepeatMode::from(1), RepeatMode::Song);
        assert_eq!(RepeatMode::from(9), RepeatMode::Off);
    }

    #[test]
    fn negative_volume_means_muted() {
        let mut status = PlayerStatus::default();
        status.set_raw_volume(-35);
        assert!(status.muted);
        assert_eq!(status.volume, 35);

        status.set_raw_volume(150);
        assert!(!status.muted);
        assert_eq!(status.volume, 100);
    }

    #[test]
    fn time_event_patches_position_in_place() {
        let mut status = PlayerStatus {
            current_index: Some(3),
            state: PlaybackState::Playing,
            ..Default::default()
        };
        let event = Event::TimeChanged {
            player_id: "00:04:20:aa:bb:cc".to_string(),
            seconds: 42.5,
        };
        assert!(status.apply_event(&event));
        assert_eq!(status.position, 42.5);
        assert_eq!(status.current_index, Some(3));
        assert!(!status.apply_event(&event));
    }

    #[test]
    fn song_event_replaces_status() {
        let mut status = PlayerStatus::default();
        let fresh = PlayerStatus {
            current_index: Some(1),
            state: PlaybackState::Playing,
            ..Default::default()
        };
        let event = Event::SongChanged {
            player_id: "p".to_string(),
            status: fresh.clone(),
        };
        assert!(status.apply_event(&event));
        assert_eq!(status, fresh);
        assert!(!status.apply_event(&Event::Disconnected));
    }
}
