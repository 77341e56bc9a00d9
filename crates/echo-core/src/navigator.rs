//! Playlist traversal
//!
//! Pure index arithmetic over a playlist. Traversal is circular: there is no
//! end-of-playlist state, stepping past the last track lands on the first.

use crate::track::Playlist;


/// Finds the position of the track with `track_id`.
pub fn index_of( playlist: &Playlist, track_id: &str ) -> Option<usize> {
    playlist.iter().position( |t| t.id == track_id )
}


/// Returns the index after `index`, wrapping to the start.
///
/// @param playlist - The playlist being traversed
/// @param index - Current position
///
/// @returns None if the playlist is empty
pub fn next( playlist: &Playlist, index: usize ) -> Option<usize> {
    let len = playlist.len();
    if len == 0 {
        return None;
    }
    Some( ( index % len + 1 ) % len )
}


/// Returns the index before `index`, wrapping to the end.
///
/// @param playlist - The playlist being traversed
/// @param index - Current position
///
/// @returns None if the playlist is empty
pub fn previous( playlist: &Playlist, index: usize ) -> Option<usize> {
    let len = playlist.len();
    if len == 0 {
        return None;
    }
    Some( ( index % len + len - 1 ) % len )
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::track::Track;


    fn playlist( ids: &[&str] ) -> Playlist {
        ids.iter()
            .map( |id| Track::new( *id, *id, "artist", format!( "{}.mp3", id ) ) )
            .collect()
    }


    #[test]
    fn test_index_of() {
        let p = playlist( &[ "a", "b", "c" ] );
        assert_eq!( index_of( &p, "b" ), Some( 1 ) );
        assert_eq!( index_of( &p, "z" ), None );
    }


    #[test]
    fn test_next_wraps() {
        let p = playlist( &[ "a", "b", "c" ] );
        assert_eq!( next( &p, 0 ), Some( 1 ) );
        assert_eq!( next( &p, 2 ), Some( 0 ) );
    }


    #[test]
    fn test_previous_wraps() {
        let p = playlist( &[ "a", "b", "c" ] );
        assert_eq!( previous( &p, 1 ), Some( 0 ) );
        assert_eq!( previous( &p, 0 ), Some( 2 ) );
    }


    #[test]
    fn test_single_track_stays_put() {
        let p = playlist( &[ "solo" ] );
        assert_eq!( next( &p, 0 ), Some( 0 ) );
        assert_eq!( previous( &p, 0 ), Some( 0 ) );
    }


    #[test]
    fn test_empty_playlist() {
        let p = Playlist::new();
        assert_eq!( next( &p, 0 ), None );
        assert_eq!( previous( &p, 0 ), None );
        assert_eq!( index_of( &p, "a" ), None );
    }
}
