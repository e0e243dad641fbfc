//! Ingestion artifact parsing
//!
//! An artifact is one JSON file per artist:
//!
//! ```json
//! {"artist_name": "Queen", "songs": [{"title": "...", "lyrics": "...", "album": {"name": "..."}}]}
//! ```
//!
//! Top-level problems reject the whole file. Problems inside a single song
//! only reject that song, so the file is decoded from a [`serde_json::Value`]
//! rather than into a strict struct.

use crate::errors::IngestionError;
use serde_json::Value;
use std::path::Path;

/// One song as read from an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongRecord {
    pub title: String,
    pub lyrics: String,
    pub album: Option<String>,
}

/// Why a song entry could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongDefect {
    MissingTitle,
    MissingLyrics,
}

impl SongDefect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingTitle => "missing_title",
            Self::MissingLyrics => "missing_lyrics",
        }
    }
}

/// A parsed artifact; song entries are decoded individually
#[derive(Debug)]
pub struct ArtistFile {
    pub artist: String,
    pub songs: Vec<Value>,
}

impl ArtistFile {
    pub fn parse(path: &Path, bytes: &[u8]) -> Result<Self, IngestionError> {
        let mut value: Value = serde_json::from_slice(bytes).map_err(|e| IngestionError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let artist = value
            .get("artist_name")
            .and_then(Value::as_str)
            .ok_or_else(|| IngestionError::MissingKey {
                path: path.to_path_buf(),
                key: "artist_name",
            })?
            .to_string();

        let songs = match value.get_mut("songs").map(Value::take) {
            Some(Value::Array(songs)) => songs,
            _ => {
                return Err(IngestionError::MissingKey {
                    path: path.to_path_buf(),
                    key: "songs",
                })
            }
        };

        Ok(Self { artist, songs })
    }
}

/// Decode one song entry. `album` is optional and may be null or lack a name.
pub fn parse_song(song: &Value) -> Result<SongRecord, SongDefect> {
    let title = song
        .get("title")
        .and_then(Value::as_str)
        .ok_or(SongDefect::MissingTitle)?;
    let lyrics = song
        .get("lyrics")
        .and_then(Value::as_str)
        .ok_or(SongDefect::MissingLyrics)?;
    let album = song
        .get("album")
        .and_then(|album| album.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(SongRecord {
        title: title.to_string(),
        lyrics: lyrics.to_string(),
        album,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<ArtistFile, IngestionError> {
        ArtistFile::parse(Path::new("artist.json"), value.to_string().as_bytes())
    }

    #[test]
    fn test_parse_artist_file() {
        let file = parse(json!({
            "artist_name": "Queen",
            "songs": [{"title": "Bohemian Rhapsody", "lyrics": "Is this the real life?"}],
            "scraped_at": "2024-01-01"
        }))
        .unwrap();
        assert_eq!(file.artist, "Queen");
        assert_eq!(file.songs.len(), 1);
    }

    #[test]
    fn test_invalid_json() {
        let err = ArtistFile::parse(Path::new("bad.json"), b"{not json").unwrap_err();
        assert!(matches!(err, IngestionError::Parse { .. }));
        assert!(err.is_structural());
    }

    #[test]
    fn test_missing_or_mistyped_top_level_keys() {
        let cases = [
            (json!({"songs": []}), "artist_name"),
            (json!({"artist_name": 3, "songs": []}), "artist_name"),
            (json!({"artist_name": "Queen"}), "songs"),
            (json!({"artist_name": "Queen", "songs": {}}), "songs"),
        ];
        for (value, expected) in cases {
            match parse(value) {
                Err(IngestionError::MissingKey { key, .. }) => assert_eq!(key, expected),
                other => panic!("expected missing {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_song_album_variants() {
        let with_album = json!({"title": "T", "lyrics": "L", "album": {"name": "A Night at the Opera"}});
        assert_eq!(parse_song(&with_album).unwrap().album.as_deref(), Some("A Night at the Opera"));

        for album in [json!(null), json!({}), json!({"name": null})] {
            let song = json!({"title": "T", "lyrics": "L", "album": album});
            assert_eq!(parse_song(&song).unwrap().album, None);
        }
        assert_eq!(parse_song(&json!({"title": "T", "lyrics": "L"})).unwrap().album, None);
    }

    #[test]
    fn test_parse_song_defects() {
        assert_eq!(parse_song(&json!({"lyrics": "L"})), Err(SongDefect::MissingTitle));
        assert_eq!(parse_song(&json!({"title": "T"})), Err(SongDefect::MissingLyrics));
        assert_eq!(
            parse_song(&json!({"title": "T", "lyrics": null})),
            Err(SongDefect::MissingLyrics)
        );
        assert_eq!(parse_song(&json!("not an object")), Err(SongDefect::MissingTitle));
    }
}
