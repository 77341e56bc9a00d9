//! Command-line argument parsing for echo.

use std::path::PathBuf;

use clap::Parser;


/// Echo - a personal music player for the terminal.
#[derive( Parser, Debug )]
#[command( name = "echo-player" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Catalog file with named playlists.
    #[arg( short, long )]
    pub catalog: Option<PathBuf>,

    /// Name of the catalog playlist to start with.
    #[arg( short, long )]
    pub playlist: Option<String>,

    /// Listener id reported to the history store.
    #[arg( short, long )]
    pub listener: Option<String>,

    /// Base URL of the listen history store.
    #[arg( long )]
    pub history_url: Option<String>,

    /// Play without an audio device.
    #[arg( long )]
    pub simulate: bool,

    /// Shuffle the starting playlist once.
    #[arg( long )]
    pub shuffle: bool,

    /// Start from the tracks this listener played most recently.
    #[arg( long )]
    pub listen_again: bool,

    /// Log at debug level.
    #[arg( short, long )]
    pub verbose: bool,

    /// Files or directories to play.
    #[arg( trailing_var_arg = true )]
    pub files: Vec<PathBuf>,
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([
            "echo-player", "--catalog", "songs.json", "--playlist", "Bops",
            "--history-url", "http://localhost:3000/api", "--simulate", "--shuffle", "-v",
        ]);
        assert_eq!( args.catalog, Some( PathBuf::from( "songs.json" ) ) );
        assert_eq!( args.playlist.as_deref(), Some( "Bops" ) );
        assert_eq!( args.history_url.as_deref(), Some( "http://localhost:3000/api" ) );
        assert!( args.simulate && args.shuffle && args.verbose );
        assert!( !args.listen_again );
    }


    #[test]
    fn test_parse_files() {
        let args = Args::parse_from([ "echo-player", "a.mp3", "music/" ]);
        assert_eq!( args.files, vec![ PathBuf::from( "a.mp3" ), PathBuf::from( "music/" ) ] );
    }
}
