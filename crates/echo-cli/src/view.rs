//! View mode management for the TUI.


/// Current view mode of the application.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum ViewMode {
    /// Playlist view - main view showing current playlist.
    #[default]
    Playlist,

    /// Help overlay - shows available commands.
    Help,
}


impl ViewMode {
    /// Switches between the playlist and the help overlay.
    pub fn toggle_help( self ) -> Self {
        match self {
            ViewMode::Playlist => ViewMode::Help,
            ViewMode::Help => ViewMode::Playlist,
        }
    }


    /// Header label.
    pub fn label( &self ) -> &'static str {
        match self {
            ViewMode::Playlist => "PLAYLIST",
            ViewMode::Help => "HELP",
        }
    }
}


/// Formats seconds as `m:ss`. Negative and non-finite values show as `0:00`.
pub fn format_time( seconds: f64 ) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds.floor() as u64 } else { 0 };
    format!( "{}:{:02}", total / 60, total % 60 )
}


/// Fraction of the track played, in [0, 1].
pub fn progress( position: f64, duration: f64 ) -> f64 {
    if duration > 0.0 && position.is_finite() {
        ( position / duration ).clamp( 0.0, 1.0 )
    } else {
        0.0
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( 0.0 ), "0:00" );
        assert_eq!( format_time( 59.9 ), "0:59" );
        assert_eq!( format_time( 61.0 ), "1:01" );
        assert_eq!( format_time( 3600.0 ), "60:00" );
        assert_eq!( format_time( -3.0 ), "0:00" );
        assert_eq!( format_time( f64::NAN ), "0:00" );
    }


    #[test]
    fn test_progress() {
        assert_eq!( progress( 30.0, 120.0 ), 0.25 );
        assert_eq!( progress( 500.0, 120.0 ), 1.0 );
        assert_eq!( progress( 10.0, 0.0 ), 0.0 );
    }


    #[test]
    fn test_toggle_help() {
        assert_eq!( ViewMode::Playlist.toggle_help(), ViewMode::Help );
        assert_eq!( ViewMode::Help.toggle_help(), ViewMode::Playlist );
    }
}
