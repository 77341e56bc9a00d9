//! Playback session
//!
//! The session owns the only live transport handle, the current track and
//! the playlist being traversed. User actions and transport notifications
//! both land here, one at a time, on the thread that owns the session.
//!
//! Every track switch bumps a generation counter. The sink handed to the
//! transport at load time stamps each notification with that generation and
//! the handle id, so a notification is acted on only if both still match the
//! live state. Anything older is dropped.

use std::sync::mpsc::{ self, Receiver, Sender };

use crate::history::{ HistoryReporter, NoHistory };
use crate::navigator;
use crate::track::{ Playlist, Track };
use crate::transport::{ AudioTransport, EventSink, HandleId, SessionEvent, TransportEvent, TransportHandle };


/// Lifecycle of the current slot.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum PlaybackState {
    /// Nothing selected.
    #[default]
    Idle,
    /// Handle created, waiting for the transport to report ready.
    Loading,
    Playing,
    Paused,
    /// The stream reached its end.
    Ended,
    /// The transport could not load the track. The track is kept, the handle is not.
    Failed,
}


impl PlaybackState {
    /// Short label for display.
    pub fn label( &self ) -> &'static str {
        match self {
            PlaybackState::Idle => "Idle",
            PlaybackState::Loading => "Loading",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
            PlaybackState::Ended => "Ended",
            PlaybackState::Failed => "Failed",
        }
    }
}


/// Everything the session mutates. Only the session writes to it.
#[derive( Debug, Default )]
struct SessionState {
    current_track: Option<Track>,
    playlist: Playlist,
    current_index: Option<usize>,
    active_handle: Option<TransportHandle>,
    playing: bool,
    generation: u64,
    state: PlaybackState,
}


/// Orchestrates playback over an [`AudioTransport`].
pub struct PlaybackSession<T: AudioTransport> {
    transport: T,
    history: Box<dyn HistoryReporter>,
    state: SessionState,
    event_tx: Sender<SessionEvent>,
    event_rx: Receiver<SessionEvent>,
    last_error: Option<String>,
}


impl<T: AudioTransport> PlaybackSession<T> {
    /// Creates a session that keeps no listen history.
    pub fn new( transport: T ) -> Self {
        Self::with_history( transport, NoHistory )
    }


    /// Creates a session that reports every track start to `history`.
    pub fn with_history( transport: T, history: impl HistoryReporter + 'static ) -> Self {
        let ( event_tx, event_rx ) = mpsc::channel();
        Self {
            transport,
            history: Box::new( history ),
            state: SessionState::default(),
            event_tx,
            event_rx,
            last_error: None,
        }
    }


    /// Plays `track`, resuming it if it is the paused current track.
    ///
    /// A non-empty `playlist` replaces the current one. The track does not
    /// have to be a member; next and previous do nothing until one is chosen.
    pub fn play( &mut self, track: Track, playlist: Option<Playlist> ) {
        if self.can_resume( &track ) {
            if let Some( handle ) = self.state.active_handle.as_ref() {
                self.transport.play( handle );
            }
            self.state.playing = true;
            if self.state.state != PlaybackState::Loading {
                self.state.state = PlaybackState::Playing;
            }
            tracing::debug!( "Resumed {}", track.id );
            return;
        }

        self.state.generation += 1;
        let generation = self.state.generation;

        // Release before load so two handles never coexist
        if let Some( old ) = self.state.active_handle.take() {
            self.transport.release( old );
        }

        if let Some( playlist ) = playlist.filter( |p| !p.is_empty() ) {
            self.state.playlist = playlist;
        }
        self.state.current_index = navigator::index_of( &self.state.playlist, &track.id );

        tracing::info!(
            "Playing {} - {} (generation {}, index {:?})",
            track.artist,
            track.title,
            generation,
            self.state.current_index
        );

        let sink = EventSink::new( self.event_tx.clone(), generation );
        let handle = self.transport.load( &track.source_uri, sink );

        self.history.notify_started( &track.id );

        self.transport.play( &handle );
        self.state.active_handle = Some( handle );
        self.state.current_track = Some( track );
        self.state.playing = true;
        self.state.state = PlaybackState::Loading;
        self.last_error = None;
    }


    fn can_resume( &self, track: &Track ) -> bool {
        self.state.current_track.as_ref().is_some_and( |current| current.id == track.id )
            && self.state.active_handle.is_some()
            && self.state.state != PlaybackState::Ended
            && !self.state.playing
    }


    /// Pauses playback if playing.
    pub fn pause( &mut self ) {
        if !self.state.playing {
            return;
        }
        if let Some( handle ) = self.state.active_handle.as_ref() {
            self.transport.pause( handle );
        }
        self.state.playing = false;
        if self.state.state == PlaybackState::Playing {
            self.state.state = PlaybackState::Paused;
        }
    }


    /// Seeks the live stream. The transport clamps out-of-range targets.
    pub fn seek_to( &mut self, seconds: f64 ) {
        if let Some( handle ) = self.state.active_handle.as_ref() {
            self.transport.seek( handle, seconds );
        }
    }


    /// Seeks relative to the current position.
    pub fn seek_by( &mut self, delta: f64 ) {
        let target = self.position() + delta;
        self.seek_to( target );
    }


    /// Pauses if playing, otherwise plays the current track.
    pub fn toggle( &mut self ) {
        if self.state.playing {
            self.pause();
        } else if let Some( track ) = self.state.current_track.clone() {
            let playlist = self.state.playlist.clone();
            self.play( track, Some( playlist ) );
        }
    }


    /// Plays the next playlist entry, wrapping to the first.
    pub fn next( &mut self ) {
        let Some( index ) = self.state.current_index else {
            return;
        };
        if let Some( next ) = navigator::next( &self.state.playlist, index ) {
            self.play_index( next );
        }
    }


    /// Plays the previous playlist entry, wrapping to the last.
    pub fn previous( &mut self ) {
        let Some( index ) = self.state.current_index else {
            return;
        };
        if let Some( previous ) = navigator::previous( &self.state.playlist, index ) {
            self.play_index( previous );
        }
    }


    /// Plays the entry at `index` of the current playlist.
    ///
    /// @returns false if the index is out of range
    pub fn play_index( &mut self, index: usize ) -> bool {
        let Some( track ) = self.state.playlist.get( index ).cloned() else {
            return false;
        };
        let playlist = self.state.playlist.clone();
        self.play( track, Some( playlist ) );
        true
    }


    /// Lets the transport advance, then applies every queued notification.
    ///
    /// @returns the number of notifications drained
    pub fn process_events( &mut self ) -> usize {
        self.transport.poll();

        let mut drained = 0;
        while let Ok( event ) = self.event_rx.try_recv() {
            drained += 1;
            self.handle_event( event );
        }
        drained
    }


    /// Applies one notification if it refers to the live handle and generation.
    ///
    /// @returns true if the notification was fresh
    pub fn handle_event( &mut self, event: SessionEvent ) -> bool {
        if !self.is_fresh( &event ) {
            tracing::debug!(
                "Dropping stale {:?} for {} (generation {}, current {})",
                event.event,
                event.handle,
                event.generation,
                self.state.generation
            );
            return false;
        }

        match event.event {
            TransportEvent::Ready { duration } => {
                tracing::debug!( "Stream {} ready, {:.1}s", event.handle, duration );
                if self.state.state == PlaybackState::Loading {
                    self.state.state = if self.state.playing {
                        PlaybackState::Playing
                    } else {
                        PlaybackState::Paused
                    };
                }
            }
            TransportEvent::Ended => {
                tracing::info!( "Stream {} ended", event.handle );
                self.state.playing = false;
                self.state.state = PlaybackState::Ended;
                self.next();
            }
            TransportEvent::LoadFailed { message } => {
                tracing::warn!( "Stream {} failed to load: {}", event.handle, message );
                if let Some( handle ) = self.state.active_handle.take() {
                    self.transport.release( handle );
                }
                self.state.playing = false;
                self.state.state = PlaybackState::Failed;
                self.last_error = Some( message );
            }
        }

        true
    }


    fn is_fresh( &self, event: &SessionEvent ) -> bool {
        event.generation == self.state.generation
            && self.state.active_handle.as_ref().is_some_and( |h| h.id() == event.handle )
    }


    /// Releases the live handle and clears the current track. Safe to call twice.
    pub fn shutdown( &mut self ) {
        if let Some( handle ) = self.state.active_handle.take() {
            tracing::debug!( "Session shutdown, releasing {}", handle.id() );
            self.transport.release( handle );
        }
        self.state.current_track = None;
        self.state.current_index = None;
        self.state.playing = false;
        self.state.state = PlaybackState::Idle;
    }


    pub fn current_track( &self ) -> Option<&Track> {
        self.state.current_track.as_ref()
    }


    pub fn playlist( &self ) -> &Playlist {
        &self.state.playlist
    }


    pub fn current_index( &self ) -> Option<usize> {
        self.state.current_index
    }


    pub fn is_playing( &self ) -> bool {
        self.state.playing
    }


    pub fn state( &self ) -> PlaybackState {
        self.state.state
    }


    pub fn generation( &self ) -> u64 {
        self.state.generation
    }


    /// Length of the live stream in seconds, 0 until known.
    pub fn duration( &self ) -> f64 {
        self.state.active_handle.as_ref()
            .map( |h| self.transport.duration( h ) )
            .unwrap_or( 0.0 )
    }


    /// Position of the live stream in seconds.
    pub fn position( &self ) -> f64 {
        self.state.active_handle.as_ref()
            .map( |h| self.transport.position( h ) )
            .unwrap_or( 0.0 )
    }


    pub fn active_handle( &self ) -> Option<HandleId> {
        self.state.active_handle.as_ref().map( TransportHandle::id )
    }


    /// Message from the most recent load failure, cleared by the next switch.
    pub fn last_error( &self ) -> Option<&str> {
        self.last_error.as_deref()
    }


    pub fn transport( &self ) -> &T {
        &self.transport
    }


    pub fn transport_mut( &mut self ) -> &mut T {
        &mut self.transport
    }
}


impl<T: AudioTransport> Drop for PlaybackSession<T> {
    fn drop( &mut self ) {
        self.shutdown();
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::transport::SimulatedTransport;


    fn track( id: &str ) -> Track {
        Track::new( id, format!( "Song {}", id ), "Artist", format!( "{}.mp3", id ) )
    }


    #[test]
    fn test_new_session_is_idle() {
        let session = PlaybackSession::new( SimulatedTransport::new() );
        assert_eq!( session.state(), PlaybackState::Idle );
        assert!( session.current_track().is_none() );
        assert!( session.active_handle().is_none() );
        assert_eq!( session.generation(), 0 );
        assert_eq!( session.duration(), 0.0 );
    }


    #[test]
    fn test_play_then_ready() {
        let mut session = PlaybackSession::new( SimulatedTransport::new() );
        session.play( track( "a" ), None );
        assert_eq!( session.state(), PlaybackState::Loading );
        assert!( session.is_playing() );

        assert_eq!( session.process_events(), 1 );
        assert_eq!( session.state(), PlaybackState::Playing );
        assert_eq!( session.current_index(), None );
    }


    #[test]
    fn test_pause_while_loading_settles_paused() {
        let mut session = PlaybackSession::new( SimulatedTransport::new().with_deferred_loads() );
        session.play( track( "a" ), None );
        session.pause();
        assert_eq!( session.state(), PlaybackState::Loading );

        session.transport_mut().complete_loads();
        session.process_events();
        assert_eq!( session.state(), PlaybackState::Paused );
    }


    #[test]
    fn test_forged_handle_is_stale() {
        let mut session = PlaybackSession::new( SimulatedTransport::new() );
        session.play( track( "a" ), None );
        session.process_events();

        let forged = SessionEvent {
            generation: session.generation(),
            handle: HandleId( 999 ),
            event: TransportEvent::Ended,
        };
        assert!( !session.handle_event( forged ) );
        assert_eq!( session.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_shutdown_releases_handle() {
        let mut session = PlaybackSession::new( SimulatedTransport::new() );
        session.play( track( "a" ), None );
        session.shutdown();
        session.shutdown();

        assert_eq!( session.transport().live_handles(), 0 );
        assert!( session.current_track().is_none() );
        assert_eq!( session.state(), PlaybackState::Idle );
    }
}
