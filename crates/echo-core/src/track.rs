//! Track and playlist values
//!
//! A track is identified by its `id` alone. Playlists are immutable ordered
//! sequences shared cheaply between the session and the presentation layer.

use std::hash::{ Hash, Hasher };
use std::ops::Index;
use std::sync::Arc;

use serde::{ Deserialize, Serialize };


/// A single playable item from the catalog.
#[derive( Debug, Clone, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde( alias = "src" )]
    pub source_uri: String,
    #[serde( alias = "thumbnail", default )]
    pub thumbnail_uri: String,
}


impl Track {
    /// Creates a track with no thumbnail.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        source_uri: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            source_uri: source_uri.into(),
            thumbnail_uri: String::new(),
        }
    }
}


impl PartialEq for Track {
    fn eq( &self, other: &Self ) -> bool {
        self.id == other.id
    }
}


impl Eq for Track {}


impl Hash for Track {
    fn hash<H: Hasher>( &self, state: &mut H ) {
        self.id.hash( state );
    }
}


/// Ordered, immutable sequence of tracks.
///
/// Cloning is cheap; the tracks are shared.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct Playlist {
    tracks: Arc<[Track]>,
}


impl Playlist {
    /// Creates an empty playlist.
    pub fn new() -> Self {
        Self::default()
    }


    /// Gets the track at `index`.
    pub fn get( &self, index: usize ) -> Option<&Track> {
        self.tracks.get( index )
    }


    /// Gets all tracks in order.
    pub fn tracks( &self ) -> &[Track] {
        &self.tracks
    }


    /// Iterates over the tracks in order.
    pub fn iter( &self ) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }


    /// Gets the number of tracks.
    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    /// Returns true if the playlist is empty.
    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }
}


impl From<Vec<Track>> for Playlist {
    fn from( tracks: Vec<Track> ) -> Self {
        Self { tracks: tracks.into() }
    }
}


impl FromIterator<Track> for Playlist {
    fn from_iter<I: IntoIterator<Item = Track>>( iter: I ) -> Self {
        Self { tracks: iter.into_iter().collect() }
    }
}


impl Index<usize> for Playlist {
    type Output = Track;


    fn index( &self, index: usize ) -> &Track {
        &self.tracks[ index ]
    }
}


impl<'a> IntoIterator for &'a Playlist {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;


    fn into_iter( self ) -> Self::IntoIter {
        self.tracks.iter()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_identity_is_id_only() {
        let a = Track::new( "a", "Song", "Artist", "a.mp3" );
        let renamed = Track::new( "a", "Other title", "Someone", "elsewhere.mp3" );
        assert_eq!( a, renamed );
        assert_ne!( a, Track::new( "b", "Song", "Artist", "a.mp3" ) );
    }


    #[test]
    fn test_deserialize_legacy_field_names() {
        let json = r#"{
            "id": "s1",
            "title": "Midnight",
            "artist": "Someone",
            "src": "https://cdn.example.com/s1.mp3",
            "thumbnail": "https://cdn.example.com/s1.jpg"
        }"#;
        let track: Track = serde_json::from_str( json ).unwrap();
        assert_eq!( track.source_uri, "https://cdn.example.com/s1.mp3" );
        assert_eq!( track.thumbnail_uri, "https://cdn.example.com/s1.jpg" );
    }


    #[test]
    fn test_serialize_camel_case() {
        let track = Track::new( "s1", "T", "A", "/music/t.flac" );
        let value = serde_json::to_value( &track ).unwrap();
        assert_eq!( value[ "sourceUri" ], "/music/t.flac" );
        assert_eq!( value[ "thumbnailUri" ], "" );
    }


    #[test]
    fn test_playlist_clone_shares_tracks() {
        let playlist = Playlist::from( vec![
            Track::new( "a", "A", "x", "a.mp3" ),
            Track::new( "b", "B", "x", "b.mp3" ),
        ]);
        let copy = playlist.clone();
        assert_eq!( copy.len(), 2 );
        assert!( std::ptr::eq( playlist.tracks(), copy.tracks() ) );
        assert_eq!( copy[ 1 ].id, "b" );
    }
}
