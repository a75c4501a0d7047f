//! CLI response codec
//!
//! Replies are one line of space-separated tokens, each percent-encoded as a
//! whole (`artist%3AMiles%20Davis`). Every command family has a fixed pattern
//! describing one record; records are pulled left to right with a single
//! regex scan per reply. There is no nesting in the format, so there is no
//! tokenizer beyond this.

pub mod push;

use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::error::CliError;

/// Record shapes, one per command family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `id`, `genre`
    Genres,
    /// `id`, `artist`
    Artists,
    /// `id`, `album`, `artwork_track_id`?, `artist`?
    Albums,
    /// `id`, `title`, `genre`?, `artist`?, `album`?
    Songs,
    /// `playerid`, `uuid`?, `ip`, `name`
    Players,
    /// `id`, `title`, `artist`, `artist_id`, `album`, `album_id`, `artwork_track_id`?
    PlaylistEntries,
    /// `playlist_cur_index`
    Status,
    /// `count`
    Count,
    /// `playlist_tracks`
    PlaylistCount,
}

// Each record starts at a token boundary so `id%3A` never matches the tail
// of `artist_id%3A`.
const GENRES_PATTERN: &str = r"(?:^| )id%3A([^ ]*) genre%3A([^ ]*)";
const ARTISTS_PATTERN: &str = r"(?:^| )id%3A([^ ]*) artist%3A([^ ]*)";
const ALBUMS_PATTERN: &str =
    r"(?:^| )id%3A([^ ]*) album%3A([^ ]*)(?: artwork_track_id%3A([0-9]+))?(?: artist%3A([^ ]*))?";
const SONGS_PATTERN: &str = r"(?:^| )id%3A([^ ]*) title%3A([^ ]*)(?: genre%3A([^ ]*))?(?: artist%3A([^ ]*))?(?: album%3A([^ ]*))?";
const PLAYERS_PATTERN: &str =
    r"(?:^| )playerid%3A([^ ]*)(?: uuid%3A([^ ]*))? ip%3A([^ ]*) name%3A([^ ]*)";
const PLAYLIST_ENTRIES_PATTERN: &str = r"(?:^| )id%3A([^ ]*) title%3A([^ ]*) artist%3A([^ ]*) artist_id%3A([^ ]*) album%3A([^ ]*) album_id%3A([^ ]*)(?: artwork_track_id%3A([^ ]*))?";
const STATUS_PATTERN: &str = r"(?:^| )playlist_cur_index%3A([0-9]*)";
const COUNT_PATTERN: &str = r"(?:^| )count%3A([^ ]*)";
const PLAYLIST_COUNT_PATTERN: &str = r"(?:^| )playlist_tracks%3A([^ ]*)";

// Literal patterns only; each one is compiled by the tests below
#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("invalid response pattern")
}

static GENRES_RE: LazyLock<Regex> = LazyLock::new(|| compile(GENRES_PATTERN));
static ARTISTS_RE: LazyLock<Regex> = LazyLock::new(|| compile(ARTISTS_PATTERN));
static ALBUMS_RE: LazyLock<Regex> = LazyLock::new(|| compile(ALBUMS_PATTERN));
static SONGS_RE: LazyLock<Regex> = LazyLock::new(|| compile(SONGS_PATTERN));
static PLAYERS_RE: LazyLock<Regex> = LazyLock::new(|| compile(PLAYERS_PATTERN));
static PLAYLIST_ENTRIES_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(PLAYLIST_ENTRIES_PATTERN));
static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| compile(STATUS_PATTERN));
static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| compile(COUNT_PATTERN));
static PLAYLIST_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| compile(PLAYLIST_COUNT_PATTERN));

impl ResponseShape {
    pub fn pattern(self) -> &'static Regex {
        match self {
            Self::Genres => &GENRES_RE,
            Self::Artists => &ARTISTS_RE,
            Self::Albums => &ALBUMS_RE,
            Self::Songs => &SONGS_RE,
            Self::Players => &PLAYERS_RE,
            Self::PlaylistEntries => &PLAYLIST_ENTRIES_RE,
            Self::Status => &STATUS_RE,
            Self::Count => &COUNT_RE,
            Self::PlaylistCount => &PLAYLIST_COUNT_RE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Genres => "genres",
            Self::Artists => "artists",
            Self::Albums => "albums",
            Self::Songs => "songs",
            Self::Players => "players",
            Self::PlaylistEntries => "playlist",
            Self::Status => "status",
            Self::Count => "count",
            Self::PlaylistCount => "playlist count",
        }
    }
}

/// Reverse the server's per-byte `%XX` escaping.
///
/// Decoding works on bytes, so a multi-byte character is only restored when
/// all of its escaped bytes are present; a truncated sequence becomes U+FFFD.
pub fn decode_token(raw: &str) -> String {
    let bytes = urlencoding::decode_binary(raw.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Escape a value for use as a single command-line token
pub fn encode_token(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Capture groups of one matched record
pub struct Fields<'h> {
    caps: Captures<'h>,
}

impl<'h> Fields<'h> {
    /// Group text exactly as sent (still escaped)
    pub fn raw(&self, group: usize) -> Option<&'h str> {
        self.caps.get(group).map(|m| m.as_str())
    }

    /// Decoded group, `None` if the group did not participate in the match
    pub fn decoded(&self, group: usize) -> Option<String> {
        self.raw(group).map(decode_token)
    }

    /// Decoded group, empty string if missing
    pub fn text(&self, group: usize) -> String {
        self.decoded(group).unwrap_or_default()
    }

    /// Decoded group, `None` if missing or empty
    pub fn optional(&self, group: usize) -> Option<String> {
        self.decoded(group).filter(|s| !s.is_empty())
    }
}

/// Decoded `group` of the first record matching `shape` in `line`
pub fn extract_field(shape: ResponseShape, line: &str, group: usize) -> Option<String> {
    shape
        .pattern()
        .captures(line)
        .and_then(|caps| caps.get(group))
        .map(|m| decode_token(m.as_str()))
}

/// First record matching `shape`, built with `ctor`
pub fn extract_one<T, F>(shape: ResponseShape, line: &str, ctor: F) -> Option<T>
where
    F: FnOnce(&Fields<'_>) -> T,
{
    shape
        .pattern()
        .captures(line)
        .map(|caps| ctor(&Fields { caps }))
}

/// Every non-overlapping record matching `shape`, in the order the server sent them
pub fn extract_list<T, F>(shape: ResponseShape, line: &str, mut ctor: F) -> Vec<T>
where
    F: FnMut(&Fields<'_>) -> T,
{
    shape
        .pattern()
        .captures_iter(line)
        .map(|caps| ctor(&Fields { caps }))
        .collect()
}

/// `count:<N>` total for browse replies. Empty results may omit it, so a
/// missing count is 0 rather than an error.
pub fn extract_count(line: &str) -> u32 {
    extract_number(ResponseShape::Count, line)
}

/// `playlist_tracks:<N>` total for status replies
pub fn extract_playlist_count(line: &str) -> u32 {
    extract_number(ResponseShape::PlaylistCount, line)
}

fn extract_number(shape: ResponseShape, line: &str) -> u32 {
    let Some(raw) = extract_field(shape, line, 1) else {
        debug!("Cannot find {} in response '{}'", shape.name(), line);
        return 0;
    };
    match raw.parse() {
        Ok(n) => n,
        Err(_) => {
            let err = CliError::MalformedResponse {
                expected: shape.name(),
                line: line.to_string(),
            };
            warn!("{}", err);
            0
        }
    }
}

/// Decoded value of the first `key:value` token whose key is `key`.
/// Used for scalar status tokens such as `mode` or `mixer volume`.
pub fn token_value(line: &str, key: &str) -> Option<String> {
    let prefix = format!("{}%3A", encode_token(key));
    line.split(' ')
        .find_map(|token| token.strip_prefix(prefix.as_str()))
        .map(decode_token)
}

/// [`token_value`] parsed into a number; unparsable values are logged and dropped
pub fn token_number<T: std::str::FromStr>(line: &str, key: &'static str) -> Option<T> {
    let value = token_value(line, key)?;
    match value.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!("Ignoring unparsable {} token '{}'", key, value);
            None
        }
    }
}
