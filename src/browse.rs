//! Library browsing and player status queries
//!
//! Command builders and reply parsers are free functions so they can be
//! checked without a server; [`BrowseService`] glues them to a
//! [`Connection`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::connection::{Connection, Endpoint};
use crate::error::{CliError, Result};
use crate::events::StatusSource;
use crate::model::{
    Album, AlbumSort, Artist, BrowseResult, CoverArt, Genre, Item, ItemKind, Player, PlaybackState,
    PlayerStatus, Song,
};
use crate::protocol::{
    encode_token, extract_count, extract_field, extract_list, extract_playlist_count,
    token_number, token_value, Fields, ResponseShape,
};

/// Tags requested on album queries: artist, album, artwork track
const ALBUM_TAGS: &str = "tags:laj";
/// Tags requested on status queries
const STATUS_TAGS: &str = "tags:asleJpP";
const PLAYERS_COMMAND: &str = "players 0 1000";

const THUMBNAIL_SIZE: &str = "50x50";
const COVER_SIZE: &str = "320x320";

/// Filter key used when a query is scoped to a parent item
const PARENT_FILTERS: &[(ItemKind, &str)] = &[
    (ItemKind::Genre, "genre_id"),
    (ItemKind::Artist, "artist_id"),
    (ItemKind::Album, "album_id"),
];

fn parent_filter(parent: Option<&Item>, accepted: &[ItemKind]) -> Option<String> {
    let parent = parent?;
    if !accepted.contains(&parent.kind()) {
        debug!("Ignoring {} parent for this query", parent.kind());
        return None;
    }
    PARENT_FILTERS
        .iter()
        .find(|(kind, _)| *kind == parent.kind())
        .map(|(_, key)| format!("{}:{}", key, encode_token(parent.id())))
}

// =============================================================================
// Commands
// =============================================================================

pub fn genres_command(start: u32, count: u32) -> String {
    format!("genres {} {}", start, count)
}

pub fn artists_command(parent: Option<&Item>, start: u32, count: u32) -> String {
    let mut command = format!("artists {} {}", start, count);
    if let Some(filter) = parent_filter(parent, &[ItemKind::Genre]) {
        command.push(' ');
        command.push_str(&filter);
    }
    command
}

pub fn albums_command(parent: Option<&Item>, start: u32, count: u32, sort: AlbumSort) -> String {
    let mut command = format!("albums {} {}", start, count);
    if let Some(filter) = parent_filter(parent, &[ItemKind::Artist, ItemKind::Genre]) {
        command.push(' ');
        command.push_str(&filter);
    }
    if sort != AlbumSort::default() {
        command.push_str(" sort:");
        command.push_str(sort.as_str());
    }
    command.push(' ');
    command.push_str(ALBUM_TAGS);
    command
}

pub fn songs_command(parent: Option<&Item>, start: u32, count: u32) -> String {
    let mut command = format!("titles {} {}", start, count);
    if let Some(filter) = parent_filter(
        parent,
        &[ItemKind::Artist, ItemKind::Album, ItemKind::Genre],
    ) {
        command.push(' ');
        command.push_str(&filter);
    }
    command
}

/// `<player> status <start> <count>`; `None` asks for the current track only (`- 1`)
pub fn status_command(player_id: &str, window: Option<(u32, u32)>) -> String {
    let player = encode_token(player_id);
    match window {
        Some((start, count)) => format!("{} status {} {} {}", player, start, count, STATUS_TAGS),
        None => format!("{} status - 1 {}", player, STATUS_TAGS),
    }
}

// =============================================================================
// Reply parsing
// =============================================================================

/// Cover URLs for an artwork or track id
pub fn cover_art(endpoint: &Endpoint, id: &str) -> CoverArt {
    let base = endpoint.http_base();
    CoverArt {
        url: format!("{}/music/{}/cover_{}_o", base, id, COVER_SIZE),
        thumbnail_url: format!("{}/music/{}/cover_{}_o", base, id, THUMBNAIL_SIZE),
    }
}

fn parent_id(parent: Option<&Item>, kind: ItemKind) -> Option<String> {
    parent
        .filter(|p| p.kind() == kind)
        .map(|p| p.id().to_string())
}

pub fn parse_genres(line: &str) -> BrowseResult<Genre> {
    let genres = extract_list(ResponseShape::Genres, line, |f| Genre {
        id: f.text(1),
        name: f.text(2),
    });
    BrowseResult::new(genres, extract_count(line))
}

pub fn parse_artists(line: &str) -> BrowseResult<Artist> {
    let artists = extract_list(ResponseShape::Artists, line, |f| Artist {
        id: f.text(1),
        name: f.text(2),
    });
    BrowseResult::new(artists, extract_count(line))
}

pub fn parse_albums(line: &str, endpoint: &Endpoint, parent: Option<&Item>) -> BrowseResult<Album> {
    let artist_id = parent_id(parent, ItemKind::Artist);
    let albums = extract_list(ResponseShape::Albums, line, |f| {
        let artwork_track_id = f.optional(3);
        Album {
            id: f.text(1),
            name: f.text(2),
            artist: f.optional(4),
            artist_id: artist_id.clone(),
            cover: artwork_track_id.as_deref().map(|id| cover_art(endpoint, id)),
            artwork_track_id,
        }
    });
    BrowseResult::new(albums, extract_count(line))
}

pub fn parse_songs(line: &str, endpoint: &Endpoint, parent: Option<&Item>) -> BrowseResult<Song> {
    let artist_id = parent_id(parent, ItemKind::Artist);
    let album_id = parent_id(parent, ItemKind::Album);
    let songs = extract_list(ResponseShape::Songs, line, |f| {
        let id = f.text(1);
        Song {
            cover: Some(cover_art(endpoint, &id)),
            name: f.text(2),
            genre: f.optional(3),
            artist: f.optional(4),
            album: f.optional(5),
            artist_id: artist_id.clone(),
            album_id: album_id.clone(),
            id,
        }
    });
    BrowseResult::new(songs, extract_count(line))
}

pub fn parse_players(line: &str) -> Vec<Player> {
    extract_list(ResponseShape::Players, line, |f| Player {
        id: f.text(1),
        uuid: f.optional(2),
        ip: f.optional(3),
        name: f.text(4),
    })
}

fn playlist_entry(f: &Fields<'_>, endpoint: &Endpoint) -> Song {
    let id = f.text(1);
    let artwork = f.optional(7).unwrap_or_else(|| id.clone());
    Song {
        name: f.text(2),
        artist: f.optional(3),
        artist_id: f.optional(4),
        album: f.optional(5),
        album_id: f.optional(6),
        genre: None,
        cover: Some(cover_art(endpoint, &artwork)),
        id,
    }
}

/// Playlist page of a `status` reply. The total is `playlist_tracks`,
/// never `count`.
pub fn parse_playlist(line: &str, endpoint: &Endpoint) -> BrowseResult<Song> {
    let songs = extract_list(ResponseShape::PlaylistEntries, line, |f| {
        playlist_entry(f, endpoint)
    });
    BrowseResult::new(songs, extract_playlist_count(line))
}

/// Full status from a `status - 1` reply. Scalar tokens that are missing
/// keep their defaults.
pub fn parse_status(line: &str, endpoint: &Endpoint) -> PlayerStatus {
    let mut status = PlayerStatus {
        current_song: extract_list(ResponseShape::PlaylistEntries, line, |f| {
            playlist_entry(f, endpoint)
        })
        .into_iter()
        .next(),
        current_index: extract_field(ResponseShape::Status, line, 1)
            .and_then(|index| index.parse().ok()),
        state: token_value(line, "mode")
            .map(|mode| PlaybackState::from(mode.as_str()))
            .unwrap_or_default(),
        position: token_number(line, "time").unwrap_or(0.0),
        duration: token_number(line, "duration"),
        shuffle: token_number::<u8>(line, "playlist shuffle")
            .unwrap_or_default()
            .into(),
        repeat: token_number::<u8>(line, "playlist repeat")
            .unwrap_or_default()
            .into(),
        playlist_tracks: extract_playlist_count(line),
        ..Default::default()
    };
    if let Some(raw) = token_number::<i32>(line, "mixer volume") {
        status.set_raw_volume(raw);
    }
    status
}

// =============================================================================
// Service
// =============================================================================

/// Browse and status queries over a shared [`Connection`]
#[derive(Clone)]
pub struct BrowseService {
    connection: Arc<Connection>,
}

impl BrowseService {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    fn endpoint(&self) -> &Endpoint {
        self.connection.endpoint()
    }

    pub async fn browse_genres(&self, start: u32, count: u32) -> Result<BrowseResult<Genre>> {
        let reply = self.connection.execute(&genres_command(start, count)).await?;
        Ok(parse_genres(&reply))
    }

    pub async fn browse_artists(
        &self,
        parent: Option<&Item>,
        start: u32,
        count: u32,
    ) -> Result<BrowseResult<Artist>> {
        let reply = self
            .connection
            .execute(&artists_command(parent, start, count))
            .await?;
        Ok(parse_artists(&reply))
    }

    pub async fn browse_albums(
        &self,
        parent: Option<&Item>,
        start: u32,
        count: u32,
        sort: AlbumSort,
    ) -> Result<BrowseResult<Album>> {
        let reply = self
            .connection
            .execute(&albums_command(parent, start, count, sort))
            .await?;
        Ok(parse_albums(&reply, self.endpoint(), parent))
    }

    pub async fn browse_songs(
        &self,
        parent: Option<&Item>,
        start: u32,
        count: u32,
    ) -> Result<BrowseResult<Song>> {
        let reply = self
            .connection
            .execute(&songs_command(parent, start, count))
            .await?;
        Ok(parse_songs(&reply, self.endpoint(), parent))
    }

    pub async fn get_players(&self) -> Result<Vec<Player>> {
        let reply = self.connection.execute(PLAYERS_COMMAND).await?;
        let players = parse_players(&reply);
        if players.is_empty() && extract_count(&reply) > 0 {
            let err = CliError::MalformedResponse {
                expected: ResponseShape::Players.name(),
                line: reply,
            };
            warn!("{}", err);
        }
        Ok(players)
    }

    pub async fn get_current_playlist(
        &self,
        player_id: &str,
        start: u32,
        count: u32,
    ) -> Result<BrowseResult<Song>> {
        let reply = self
            .connection
            .execute(&status_command(player_id, Some((start, count))))
            .await?;
        Ok(parse_playlist(&reply, self.endpoint()))
    }

    pub async fn get_player_status(&self, player_id: &str) -> Result<PlayerStatus> {
        let reply = self
            .connection
            .execute(&status_command(player_id, None))
            .await?;
        Ok(parse_status(&reply, self.endpoint()))
    }
}

#[async_trait]
impl StatusSource for BrowseService {
    async fn player_status(&self, player_id: &str) -> Result<PlayerStatus> {
        self.get_player_status(player_id).await
    }
}
