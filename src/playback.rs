//! Transport and playlist commands for one player
//!
//! Every method waits for the server's acknowledgement line, so a caller's
//! next command is ordered after this one on the server.

use std::sync::Arc;

use tracing::info;

use crate::connection::Connection;
use crate::error::{CliError, Result};
use crate::model::{Item, ItemKind};
use crate::protocol::encode_token;

/// Playlist query field for each item kind that can be queued
const QUERY_FIELDS: &[(ItemKind, &str)] = &[
    (ItemKind::Album, "album.id"),
    (ItemKind::Artist, "contributor.id"),
    (ItemKind::Song, "track.id"),
];

/// How `playlist <verb>tracks` places the item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    /// `addtracks`: append
    Add,
    /// `loadtracks`: replace the playlist and start playing
    Load,
    /// `inserttracks`: play after the current track
    Insert,
}

impl Enqueue {
    fn verb(self) -> &'static str {
        match self {
            Self::Add => "addtracks",
            Self::Load => "loadtracks",
            Self::Insert => "inserttracks",
        }
    }
}

pub fn query_field(kind: ItemKind) -> Result<&'static str> {
    QUERY_FIELDS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, field)| *field)
        .ok_or(CliError::UnsupportedItemKind(kind))
}

/// `<player> playlist <verb> <field>=<id>`
pub fn enqueue_command(player_id: &str, item: &Item, mode: Enqueue) -> Result<String> {
    let field = query_field(item.kind())?;
    Ok(format!(
        "{} playlist {} {}={}",
        encode_token(player_id),
        mode.verb(),
        field,
        encode_token(item.id())
    ))
}

/// Player-scoped command with the player id escaped
pub fn player_command(player_id: &str, args: &str) -> String {
    format!("{} {}", encode_token(player_id), args)
}

#[derive(Clone)]
pub struct PlaybackController {
    connection: Arc<Connection>,
}

impl PlaybackController {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }

    async fn send(&self, player_id: &str, args: &str) -> Result<()> {
        self.connection
            .execute(&player_command(player_id, args))
            .await?;
        Ok(())
    }

    async fn enqueue(&self, player_id: &str, item: &Item, mode: Enqueue) -> Result<()> {
        let command = enqueue_command(player_id, item, mode)?;
        info!(
            "{} {} '{}' on {}",
            mode.verb(),
            item.kind(),
            item.name(),
            player_id
        );
        self.connection.execute(&command).await?;
        Ok(())
    }

    /// Append to the end of the playlist
    pub async fn add_item(&self, player_id: &str, item: &Item) -> Result<()> {
        self.enqueue(player_id, item, Enqueue::Add).await
    }

    /// Replace the playlist with `item` and play it
    pub async fn play_item(&self, player_id: &str, item: &Item) -> Result<()> {
        self.enqueue(player_id, item, Enqueue::Load).await
    }

    /// Queue `item` right after the current track
    pub async fn play_item_next(&self, player_id: &str, item: &Item) -> Result<()> {
        self.enqueue(player_id, item, Enqueue::Insert).await
    }

    pub async fn play(&self, player_id: &str) -> Result<()> {
        self.send(player_id, "play").await
    }

    pub async fn pause(&self, player_id: &str) -> Result<()> {
        self.send(player_id, "pause 1").await
    }

    pub async fn resume(&self, player_id: &str) -> Result<()> {
        self.send(player_id, "pause 0").await
    }

    pub async fn toggle_pause(&self, player_id: &str) -> Result<()> {
        self.send(player_id, "pause").await
    }

    pub async fn stop(&self, player_id: &str) -> Result<()> {
        self.send(player_id, "stop").await
    }

    /// Jump to playlist position `index`
    pub async fn jump(&self, player_id: &str, index: u32) -> Result<()> {
        self.send(player_id, &format!("playlist index {}", index))
            .await
    }

    pub async fn next(&self, player_id: &str) -> Result<()> {
        self.send(player_id, "playlist index +1").await
    }

    pub async fn previous(&self, player_id: &str) -> Result<()> {
        self.send(player_id, "playlist index -1").await
    }

    pub async fn remove_item(&self, player_id: &str, index: u32) -> Result<()> {
        self.send(player_id, &format!("playlist delete {}", index))
            .await
    }

    pub async fn remove_all_by_artist(&self, player_id: &str, artist_id: &str) -> Result<()> {
        self.send(
            player_id,
            &format!("playlistcontrol cmd:delete artist_id:{}", encode_token(artist_id)),
        )
        .await
    }

    pub async fn remove_all_in_album(&self, player_id: &str, album_id: &str) -> Result<()> {
        self.send(
            player_id,
            &format!("playlistcontrol cmd:delete album_id:{}", encode_token(album_id)),
        )
        .await
    }

    /// Absolute volume, clamped to 0-100
    pub async fn set_volume(&self, player_id: &str, volume: u8) -> Result<()> {
        self.send(player_id, &format!("mixer volume {}", volume.min(100)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionSettings;
    use crate::model::{Album, Artist, Genre, Song};

    const PLAYER: &str = "00:04:20:aa:bb:cc";

    #[test]
    fn query_field_lookup() {
        assert_eq!(query_field(ItemKind::Album).unwrap(), "album.id");
        assert_eq!(query_field(ItemKind::Artist).unwrap(), "contributor.id");
        assert_eq!(query_field(ItemKind::Song).unwrap(), "track.id");
        assert!(matches!(
            query_field(ItemKind::Genre),
            Err(CliError::UnsupportedItemKind(ItemKind::Genre))
        ));
    }

    #[test]
    fn enqueue_commands_per_kind_and_mode() {
        let album: Item = Album {
            id: "10".to_string(),
            ..Default::default()
        }
        .into();
        let artist: Item = Artist {
            id: "42".to_string(),
            name: "Miles Davis".to_string(),
        }
        .into();
        let song: Item = Song {
            id: "501".to_string(),
            ..Default::default()
        }
        .into();

        assert_eq!(
            enqueue_command(PLAYER, &album, Enqueue::Add).unwrap(),
            "00%3A04%3A20%3Aaa%3Abb%3Acc playlist addtracks album.id=10"
        );
        assert_eq!(
            enqueue_command(PLAYER, &artist, Enqueue::Load).unwrap(),
            "00%3A04%3A20%3Aaa%3Abb%3Acc playlist loadtracks contributor.id=42"
        );
        assert_eq!(
            enqueue_command(PLAYER, &song, Enqueue::Insert).unwrap(),
            "00%3A04%3A20%3Aaa%3Abb%3Acc playlist inserttracks track.id=501"
        );
    }

    #[tokio::test]
    async fn genre_is_rejected_before_sending() {
        // not connected: an attempted send would fail with NotConnected instead
        let controller = PlaybackController::new(Arc::new(Connection::new(
            ConnectionSettings::default(),
        )));
        let genre: Item = Genre {
            id: "1".to_string(),
            name: "Jazz".to_string(),
        }
        .into();
        assert!(matches!(
            controller.add_item(PLAYER, &genre).await,
            Err(CliError::UnsupportedItemKind(ItemKind::Genre))
        ));
    }

    #[tokio::test]
    async fn transport_commands_require_connection() {
        let controller = PlaybackController::new(Arc::new(Connection::new(
            ConnectionSettings::default(),
        )));
        assert!(matches!(
            controller.play(PLAYER).await,
            Err(CliError::NotConnected)
        ));
    }

    #[test]
    fn player_command_escapes_id() {
        assert_eq!(
            player_command(PLAYER, "pause 1"),
            "00%3A04%3A20%3Aaa%3Abb%3Acc pause 1"
        );
    }
}
