//! Source URI resolution
//!
//! Turns a track's source URI into a readable media source: remote
//! `http(s)://` URIs are downloaded into memory, `file://` URIs and plain
//! paths are opened from disk.

use std::fs::File;
use std::io::Cursor;
use std::path::{ Path, PathBuf };
use std::time::Duration;

use symphonia::core::io::MediaSource;
use thiserror::Error;


/// User agent sent with remote fetches.
pub const USER_AGENT: &str = concat!( "echo/", env!( "CARGO_PKG_VERSION" ) );

/// Connect timeout for remote fetches.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Read timeout for remote fetches.
pub const READ_TIMEOUT_SECS: u64 = 60;


/// Errors that can occur while opening a source.
#[derive( Debug, Error )]
pub enum SourceError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "HTTP error: {0}" )]
    Http( #[from] reqwest::Error ),

    #[error( "Unsupported URI scheme: {0}" )]
    UnsupportedScheme( String ),

    #[error( "Empty source URI" )]
    Empty,
}


/// Where a source URI points.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum SourceLocation {
    Remote( String ),
    Local( PathBuf ),
}


impl SourceLocation {
    /// Classifies a source URI.
    pub fn parse( uri: &str ) -> Result<Self, SourceError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err( SourceError::Empty );
        }

        let lower = uri.to_ascii_lowercase();
        if lower.starts_with( "http://" ) || lower.starts_with( "https://" ) {
            return Ok( SourceLocation::Remote( uri.to_string() ) );
        }
        if lower.starts_with( "file://" ) {
            return Ok( SourceLocation::Local( PathBuf::from( &uri[ "file://".len().. ] ) ) );
        }
        if let Some(( scheme, _ )) = uri.split_once( "://" ) {
            return Err( SourceError::UnsupportedScheme( scheme.to_string() ) );
        }

        Ok( SourceLocation::Local( PathBuf::from( uri ) ) )
    }


    /// Gets the file extension of the resource, used as a format hint.
    pub fn extension( &self ) -> Option<String> {
        let path = match self {
            SourceLocation::Remote( url ) => {
                // Drop query and fragment before looking at the path
                let end = url.find( |c: char| c == '?' || c == '#' ).unwrap_or( url.len() );
                let without_scheme = url[ ..end ].split_once( "://" ).map( |( _, rest )| rest ).unwrap_or( "" );
                let path = without_scheme.split_once( '/' ).map( |( _, p )| p ).unwrap_or( "" );
                return Path::new( path )
                    .extension()
                    .and_then( |e| e.to_str() )
                    .map( |e| e.to_lowercase() );
            }
            SourceLocation::Local( path ) => path,
        };

        path.extension()
            .and_then( |e| e.to_str() )
            .map( |e| e.to_lowercase() )
    }


    /// Returns true for sources fetched over the network.
    pub fn is_remote( &self ) -> bool {
        matches!( self, SourceLocation::Remote( _ ) )
    }
}


/// An opened source, ready for probing.
pub struct OpenedSource {
    pub media: Box<dyn MediaSource>,
    pub extension: Option<String>,
    pub remote: bool,
}


/// Builds the blocking HTTP client used for remote sources.
pub fn http_client() -> Result<reqwest::blocking::Client, SourceError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent( USER_AGENT )
        .connect_timeout( Duration::from_secs( CONNECT_TIMEOUT_SECS ) )
        .timeout( Duration::from_secs( READ_TIMEOUT_SECS ) )
        .build()?;
    Ok( client )
}


/// Opens a source URI.
///
/// Blocks while a remote source downloads; call from a worker thread.
pub fn open( uri: &str ) -> Result<OpenedSource, SourceError> {
    let location = SourceLocation::parse( uri )?;
    let extension = location.extension();

    let media: Box<dyn MediaSource> = match &location {
        SourceLocation::Remote( url ) => {
            tracing::info!( "Fetching {}", url );
            let bytes = http_client()?
                .get( url )
                .send()?
                .error_for_status()?
                .bytes()?;
            tracing::debug!( "Fetched {} bytes from {}", bytes.len(), url );
            Box::new( Cursor::new( bytes.to_vec() ) )
        }
        SourceLocation::Local( path ) => Box::new( File::open( path )? ),
    };

    Ok( OpenedSource {
        media,
        extension,
        remote: location.is_remote(),
    })
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_remote() {
        let loc = SourceLocation::parse( "https://cdn.example.com/echo/songs/a.mp3?v=2" ).unwrap();
        assert!( loc.is_remote() );
        assert_eq!( loc.extension().as_deref(), Some( "mp3" ) );
    }


    #[test]
    fn test_parse_file_uri() {
        let loc = SourceLocation::parse( "file:///music/track.FLAC" ).unwrap();
        assert_eq!( loc, SourceLocation::Local( PathBuf::from( "/music/track.FLAC" ) ) );
        assert_eq!( loc.extension().as_deref(), Some( "flac" ) );
    }


    #[test]
    fn test_parse_plain_path() {
        let loc = SourceLocation::parse( "songs/intro.ogg" ).unwrap();
        assert!( !loc.is_remote() );
        assert_eq!( loc.extension().as_deref(), Some( "ogg" ) );
    }


    #[test]
    fn test_remote_without_extension() {
        let loc = SourceLocation::parse( "http://example.com" ).unwrap();
        assert_eq!( loc.extension(), None );
    }


    #[test]
    fn test_unsupported_scheme() {
        let result = SourceLocation::parse( "ftp://example.com/a.mp3" );
        assert!( matches!( result, Err( SourceError::UnsupportedScheme( s ) ) if s == "ftp" ) );
    }


    #[test]
    fn test_empty_uri() {
        assert!( matches!( SourceLocation::parse( "  " ), Err( SourceError::Empty ) ) );
    }


    #[test]
    fn test_open_missing_file() {
        let result = open( "/definitely/not/here/track.mp3" );
        assert!( matches!( result, Err( SourceError::Io( _ ) ) ) );
    }
}
