//! Song catalog loading
//!
//! The catalog is a JSON file of named playlists. Files and directories
//! given on the command line become ad-hoc tracks instead.

use std::collections::HashSet;
use std::fs;
use std::path::{ Path, PathBuf };

use anyhow::{ bail, Context, Result };
use rand::seq::SliceRandom;
use serde::{ Deserialize, Serialize };

use echo_core::history::ListenRecord;
use echo_core::{ Playlist, Track };


/// Supported audio file extensions.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "wav", "m4a", "aac", "opus", "aiff",
];


/// A named playlist in the catalog.
#[derive( Debug, Clone, Serialize, Deserialize )]
pub struct CatalogPlaylist {
    pub name: String,
    pub tracks: Vec<Track>,
}


/// Every playlist the client knows about.
#[derive( Debug, Clone, Default, Serialize, Deserialize )]
pub struct Catalog {
    pub playlists: Vec<CatalogPlaylist>,
}


impl Catalog {
    /// Reads a catalog file.
    pub fn load( path: &Path ) -> Result<Self> {
        let contents = fs::read_to_string( path )
            .with_context( || format!( "Failed to read catalog {}", path.display() ) )?;
        let catalog: Catalog = serde_json::from_str( &contents )
            .with_context( || format!( "Malformed catalog {}", path.display() ) )?;

        tracing::info!(
            "Loaded catalog {} with {} playlists",
            path.display(),
            catalog.playlists.len()
        );
        Ok( catalog )
    }


    /// Picks a playlist by name (case-insensitive), or the first one.
    pub fn playlist( &self, name: Option<&str> ) -> Result<Playlist> {
        let found = match name {
            Some( name ) => self.playlists.iter().find( |p| p.name.eq_ignore_ascii_case( name ) ),
            None => self.playlists.first(),
        };

        match found {
            Some( playlist ) => Ok( Playlist::from( playlist.tracks.clone() ) ),
            None if self.playlists.is_empty() => bail!( "Catalog has no playlists" ),
            None => {
                let names: Vec<&str> = self.playlists.iter().map( |p| p.name.as_str() ).collect();
                bail!(
                    "No playlist named '{}'. Available: {}",
                    name.unwrap_or_default(),
                    names.join( ", " )
                )
            }
        }
    }


    /// Finds a track by id in any playlist.
    pub fn find( &self, track_id: &str ) -> Option<&Track> {
        self.playlists.iter()
            .flat_map( |p| p.tracks.iter() )
            .find( |t| t.id == track_id )
    }


    /// Builds a playlist from history records, most recent first.
    ///
    /// Records for tracks missing from the catalog are skipped, as are repeats.
    pub fn listen_again( &self, records: &[ListenRecord] ) -> Playlist {
        let mut seen = HashSet::new();
        records.iter()
            .filter( |r| seen.insert( r.track_id.as_str() ) )
            .filter_map( |r| self.find( &r.track_id ).cloned() )
            .collect()
    }
}


/// Turns files and directories into tracks. Directories are scanned recursively.
pub fn tracks_from_paths( paths: &[PathBuf] ) -> Result<Vec<Track>> {
    let mut tracks = Vec::new();

    for path in paths {
        if path.is_dir() {
            tracing::info!( "Scanning: {:?}", path );
            scan_recursive( path, &mut tracks )?;
        } else if path.exists() {
            tracks.push( track_for_file( path ) );
        } else {
            bail!( "Path not found: {}", path.display() );
        }
    }

    tracing::info!( "Found {} tracks", tracks.len() );
    Ok( tracks )
}


fn scan_recursive( dir: &Path, tracks: &mut Vec<Track> ) -> Result<()> {
    let entries = match fs::read_dir( dir ) {
        Ok( e ) => e,
        Err( e ) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::warn!( "Access denied: {:?}", dir );
            return Ok(());
        }
        Err( e ) => return Err( e ).with_context( || format!( "Failed to scan {}", dir.display() ) ),
    };

    let mut paths: Vec<PathBuf> = entries.flatten().map( |e| e.path() ).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            scan_recursive( &path, tracks )?;
        } else if is_audio_file( &path ) {
            tracks.push( track_for_file( &path ) );
        }
    }

    Ok(())
}


/// Checks if a file has a supported audio extension.
fn is_audio_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| SUPPORTED_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


/// Ad-hoc track for a local file. The path doubles as the id.
fn track_for_file( path: &Path ) -> Track {
    let source = path.to_string_lossy().to_string();
    let title = path.file_stem()
        .map( |s| s.to_string_lossy().to_string() )
        .unwrap_or_else( || source.clone() );
    Track::new( source.clone(), title, "Unknown artist", source )
}


/// Shuffles in place (Fisher-Yates).
pub fn shuffle<T>( items: &mut [T] ) {
    items.shuffle( &mut rand::thread_rng() );
}


#[cfg( test )]
mod tests {
    use super::*;
    use chrono::{ TimeZone, Utc };


    const CATALOG: &str = r#"{
        "playlists": [
            { "name": "International Bops", "tracks": [
                { "id": "1", "title": "One", "artist": "A", "src": "https://cdn.example.com/1.mp3", "thumbnail": "1.jpg" },
                { "id": "2", "title": "Two", "artist": "B", "sourceUri": "https://cdn.example.com/2.mp3" }
            ]},
            { "name": "Chill", "tracks": [
                { "id": "3", "title": "Three", "artist": "C", "src": "3.ogg" }
            ]}
        ]
    }"#;


    fn catalog() -> Catalog {
        serde_json::from_str( CATALOG ).unwrap()
    }


    fn record( track_id: &str, hour: u32 ) -> ListenRecord {
        ListenRecord {
            listener_id: "u1".into(),
            track_id: track_id.into(),
            updated_at: Utc.with_ymd_and_hms( 2024, 5, 1, hour, 0, 0 ).unwrap(),
        }
    }


    #[test]
    fn test_select_playlist() {
        let catalog = catalog();
        assert_eq!( catalog.playlist( None ).unwrap().len(), 2 );
        assert_eq!( catalog.playlist( Some( "chill" ) ).unwrap()[ 0 ].id, "3" );
        assert!( catalog.playlist( Some( "Metal" ) ).is_err() );
        assert!( Catalog::default().playlist( None ).is_err() );
    }


    #[test]
    fn test_aliases_accepted() {
        let catalog = catalog();
        let track = catalog.find( "1" ).unwrap();
        assert_eq!( track.source_uri, "https://cdn.example.com/1.mp3" );
        assert_eq!( track.thumbnail_uri, "1.jpg" );
    }


    #[test]
    fn test_listen_again_maps_through_catalog() {
        let catalog = catalog();
        let records = vec![ record( "3", 9 ), record( "missing", 8 ), record( "1", 7 ), record( "3", 6 ) ];
        let playlist = catalog.listen_again( &records );

        let ids: Vec<&str> = playlist.iter().map( |t| t.id.as_str() ).collect();
        assert_eq!( ids, vec![ "3", "1" ] );
    }


    #[test]
    fn test_scan_directory() {
        let dir = std::env::temp_dir().join( format!( "echo-scan-{}", std::process::id() ) );
        fs::create_dir_all( dir.join( "nested" ) ).unwrap();
        fs::write( dir.join( "b.mp3" ), b"" ).unwrap();
        fs::write( dir.join( "notes.txt" ), b"" ).unwrap();
        fs::write( dir.join( "nested" ).join( "a.FLAC" ), b"" ).unwrap();

        let tracks = tracks_from_paths( &[ dir.clone() ] ).unwrap();
        let titles: Vec<&str> = tracks.iter().map( |t| t.title.as_str() ).collect();
        assert_eq!( titles, vec![ "b", "a" ] );

        let _ = fs::remove_dir_all( &dir );
    }


    #[test]
    fn test_missing_path() {
        assert!( tracks_from_paths( &[ PathBuf::from( "/no/such/place.mp3" ) ] ).is_err() );
    }


    #[test]
    fn test_shuffle_keeps_elements() {
        let mut items: Vec<u32> = ( 0..50 ).collect();
        shuffle( &mut items );
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!( sorted, ( 0..50 ).collect::<Vec<_>>() );
    }


    #[test]
    fn test_shuffle_changes_order() {
        // 50! orderings; landing on the identity is not a realistic outcome
        let ordered: Vec<u32> = ( 0..50 ).collect();
        let mut items = ordered.clone();
        shuffle( &mut items );
        assert_ne!( items, ordered );
    }
}
