//! Playback session scenarios driven through the simulated transport.

use std::sync::{ Arc, Mutex };

use echo_core::{
    HistoryReporter, PlaybackSession, PlaybackState, Playlist, SessionEvent, SimulatedTransport,
    Track, TransportEvent,
};


// ===== Helpers =====

#[derive( Clone, Default )]
struct RecordingHistory {
    started: Arc<Mutex<Vec<String>>>,
}


impl RecordingHistory {
    fn started( &self ) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}


impl HistoryReporter for RecordingHistory {
    fn notify_started( &self, track_id: &str ) {
        self.started.lock().unwrap().push( track_id.to_string() );
    }
}


fn track( id: &str ) -> Track {
    Track::new( id, format!( "Song {}", id.to_uppercase() ), "Echo", format!( "{}.mp3", id ) )
}


fn abc() -> Playlist {
    Playlist::from( vec![ track( "a" ), track( "b" ), track( "c" ) ] )
}


fn session_with( transport: SimulatedTransport ) -> ( PlaybackSession<SimulatedTransport>, RecordingHistory ) {
    let history = RecordingHistory::default();
    let session = PlaybackSession::with_history( transport, history.clone() );
    ( session, history )
}


fn current_id( session: &PlaybackSession<SimulatedTransport> ) -> Option<String> {
    session.current_track().map( |t| t.id.clone() )
}


// ===== Auto-advance =====

#[test]
fn ended_advances_to_next_track() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new().with_default_duration( 10.0 ) );
    session.play( track( "a" ), Some( abc() ) );
    session.process_events();

    session.transport_mut().advance( 10.0 );
    session.process_events();

    assert_eq!( current_id( &session ).as_deref(), Some( "b" ) );
    assert_eq!( session.current_index(), Some( 1 ) );
    assert!( session.is_playing() );
    assert_eq!( session.state(), PlaybackState::Playing );
}


#[test]
fn ended_on_last_track_wraps_to_first() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new() );
    session.play( track( "c" ), Some( abc() ) );
    session.process_events();

    let id = session.active_handle().unwrap();
    assert!( session.transport_mut().finish( id ) );
    session.process_events();

    assert_eq!( current_id( &session ).as_deref(), Some( "a" ) );
    assert_eq!( session.current_index(), Some( 0 ) );
}


#[test]
fn ended_on_single_track_playlist_reloads_it() {
    let ( mut session, history ) = session_with( SimulatedTransport::new() );
    let only = Playlist::from( vec![ track( "a" ) ] );
    session.play( track( "a" ), Some( only ) );
    session.process_events();
    let first_handle = session.active_handle().unwrap();

    session.transport_mut().finish( first_handle );
    session.process_events();

    assert_eq!( current_id( &session ).as_deref(), Some( "a" ) );
    assert_ne!( session.active_handle(), Some( first_handle ) );
    assert_eq!( session.generation(), 2 );
    assert_eq!( history.started(), vec![ "a", "a" ] );
}


#[test]
fn ended_without_playlist_membership_stops() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new() );
    session.play( track( "x" ), Some( abc() ) );
    session.process_events();
    assert_eq!( session.current_index(), None );

    let id = session.active_handle().unwrap();
    session.transport_mut().finish( id );
    session.process_events();

    assert_eq!( current_id( &session ).as_deref(), Some( "x" ) );
    assert_eq!( session.state(), PlaybackState::Ended );
    assert!( !session.is_playing() );
    assert_eq!( session.generation(), 1 );
}


// ===== Stale notifications =====

#[test]
fn rapid_switch_ignores_stale_end() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new() );
    session.play( track( "a" ), Some( abc() ) );
    session.process_events();
    let stale_handle = session.active_handle().unwrap();
    let stale_generation = session.generation();

    session.next();
    session.next();
    session.process_events();
    assert_eq!( current_id( &session ).as_deref(), Some( "c" ) );
    let generation = session.generation();

    let fresh = session.handle_event( SessionEvent {
        generation: stale_generation,
        handle: stale_handle,
        event: TransportEvent::Ended,
    });

    assert!( !fresh );
    assert_eq!( current_id( &session ).as_deref(), Some( "c" ) );
    assert_eq!( session.generation(), generation );
    assert!( session.is_playing() );
}


#[test]
fn direct_switch_ignores_stale_end() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new() );
    session.play( track( "a" ), Some( abc() ) );
    let stale_handle = session.active_handle().unwrap();

    session.play( track( "c" ), Some( abc() ) );
    session.process_events();

    session.handle_event( SessionEvent {
        generation: 1,
        handle: stale_handle,
        event: TransportEvent::Ended,
    });

    assert_eq!( current_id( &session ).as_deref(), Some( "c" ) );
    assert_eq!( session.current_index(), Some( 2 ) );
    assert!( session.is_playing() );
    assert_eq!( session.generation(), 2 );
}


#[test]
fn released_stream_never_notifies() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new().with_deferred_loads() );
    session.play( track( "a" ), Some( abc() ) );
    let first = session.active_handle().unwrap();
    session.play( track( "b" ), None );
    let second = session.active_handle().unwrap();
    assert!( !session.transport().is_live( first ) );
    assert!( session.transport().is_live( second ) );

    session.transport_mut().complete_loads();
    assert!( !session.transport_mut().finish( first ) );
    assert_eq!( session.process_events(), 1 );

    assert_eq!( current_id( &session ).as_deref(), Some( "b" ) );
    assert_eq!( session.state(), PlaybackState::Playing );
}


#[test]
fn matching_generation_with_other_handle_is_stale() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new() );
    session.play( track( "a" ), Some( abc() ) );
    session.process_events();

    let fresh = session.handle_event( SessionEvent {
        generation: session.generation(),
        handle: echo_core::HandleId( 4242 ),
        event: TransportEvent::LoadFailed { message: "nope".into() },
    });

    assert!( !fresh );
    assert_eq!( session.state(), PlaybackState::Playing );
    assert!( session.last_error().is_none() );
}


// ===== Resume and toggle =====

#[test]
fn resume_keeps_handle_and_position() {
    let ( mut session, history ) = session_with( SimulatedTransport::new().with_default_duration( 120.0 ) );
    session.play( track( "a" ), Some( abc() ) );
    session.process_events();
    let handle = session.active_handle();

    session.transport_mut().advance( 30.0 );
    session.pause();
    assert_eq!( session.state(), PlaybackState::Paused );
    session.transport_mut().advance( 30.0 );

    session.play( track( "a" ), None );

    assert_eq!( session.active_handle(), handle );
    assert_eq!( session.position(), 30.0 );
    assert_eq!( session.generation(), 1 );
    assert_eq!( session.transport().load_count(), 1 );
    assert_eq!( history.started(), vec![ "a" ] );
    assert_eq!( session.state(), PlaybackState::Playing );
}


#[test]
fn playing_the_current_track_again_reloads() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new() );
    session.play( track( "a" ), Some( abc() ) );
    session.process_events();
    let handle = session.active_handle();

    session.play( track( "a" ), None );

    assert_ne!( session.active_handle(), handle );
    assert_eq!( session.generation(), 2 );
    assert_eq!( session.transport().live_handles(), 1 );
}


#[test]
fn toggle_pauses_and_resumes() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new() );
    session.toggle();
    assert!( session.current_track().is_none() );

    session.play( track( "b" ), Some( abc() ) );
    session.process_events();

    session.toggle();
    assert!( !session.is_playing() );
    session.toggle();
    assert!( session.is_playing() );
    assert_eq!( session.generation(), 1 );
}


#[test]
fn toggle_after_end_reloads() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new() );
    session.play( track( "x" ), None );
    session.process_events();
    let id = session.active_handle().unwrap();
    session.transport_mut().finish( id );
    session.process_events();
    assert_eq!( session.state(), PlaybackState::Ended );

    session.toggle();

    assert_eq!( session.generation(), 2 );
    assert_ne!( session.active_handle(), Some( id ) );
    assert_eq!( session.state(), PlaybackState::Loading );
}


// ===== Seek =====

#[test]
fn seek_is_clamped() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new().with_default_duration( 120.0 ) );
    session.play( track( "a" ), None );
    session.process_events();
    assert_eq!( session.duration(), 120.0 );

    session.seek_to( -5.0 );
    assert_eq!( session.position(), 0.0 );
    session.seek_to( 500.0 );
    assert_eq!( session.position(), 120.0 );
    session.seek_to( f64::NAN );
    assert_eq!( session.position(), 0.0 );
}


#[test]
fn seek_by_moves_relative() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new().with_default_duration( 60.0 ) );
    session.play( track( "a" ), None );
    session.process_events();

    session.seek_to( 20.0 );
    session.seek_by( 5.0 );
    assert_eq!( session.position(), 25.0 );
    session.seek_by( -100.0 );
    assert_eq!( session.position(), 0.0 );
}


#[test]
fn seek_without_track_is_noop() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new() );
    session.seek_to( 10.0 );
    assert_eq!( session.position(), 0.0 );
}


// ===== Navigation =====

#[test]
fn next_and_previous_wrap() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new() );
    session.play( track( "a" ), Some( abc() ) );

    session.previous();
    assert_eq!( current_id( &session ).as_deref(), Some( "c" ) );
    session.next();
    assert_eq!( current_id( &session ).as_deref(), Some( "a" ) );
    assert_eq!( session.transport().peak_live_handles(), 1 );
}


#[test]
fn navigation_without_index_is_noop() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new() );
    session.next();
    session.previous();
    assert_eq!( session.generation(), 0 );

    session.play( track( "x" ), Some( abc() ) );
    session.next();
    session.previous();
    assert_eq!( current_id( &session ).as_deref(), Some( "x" ) );
    assert_eq!( session.generation(), 1 );
}


#[test]
fn empty_playlist_keeps_current_one() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new() );
    session.play( track( "a" ), Some( abc() ) );
    session.play( track( "b" ), Some( Playlist::default() ) );

    assert_eq!( session.playlist().len(), 3 );
    assert_eq!( session.current_index(), Some( 1 ) );
}


#[test]
fn play_index_out_of_range() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new() );
    session.play( track( "a" ), Some( abc() ) );
    assert!( !session.play_index( 7 ) );
    assert!( session.play_index( 2 ) );
    assert_eq!( current_id( &session ).as_deref(), Some( "c" ) );
}


// ===== Load failure =====

#[test]
fn load_failure_keeps_track_without_advancing() {
    let transport = SimulatedTransport::new().with_failing_source( "b.mp3" );
    let ( mut session, _ ) = session_with( transport );
    session.play( track( "b" ), Some( abc() ) );
    session.process_events();

    assert_eq!( session.state(), PlaybackState::Failed );
    assert_eq!( current_id( &session ).as_deref(), Some( "b" ) );
    assert_eq!( session.current_index(), Some( 1 ) );
    assert!( session.active_handle().is_none() );
    assert!( !session.is_playing() );
    assert!( session.last_error().is_some() );
    assert_eq!( session.transport().live_handles(), 0 );

    session.process_events();
    assert_eq!( current_id( &session ).as_deref(), Some( "b" ) );
    assert_eq!( session.generation(), 1 );
}


#[test]
fn toggle_after_failure_retries() {
    let transport = SimulatedTransport::new().with_failing_source( "b.mp3" );
    let ( mut session, history ) = session_with( transport );
    session.play( track( "b" ), Some( abc() ) );
    session.process_events();

    session.toggle();

    assert_eq!( session.generation(), 2 );
    assert_eq!( session.state(), PlaybackState::Loading );
    assert!( session.active_handle().is_some() );
    assert!( session.last_error().is_none() );
    assert_eq!( session.transport().load_count(), 2 );
    assert_eq!( history.started(), vec![ "b", "b" ] );

    session.process_events();
    assert_eq!( session.state(), PlaybackState::Failed );
}


#[test]
fn next_after_failure_moves_on() {
    let transport = SimulatedTransport::new().with_failing_source( "b.mp3" );
    let ( mut session, _ ) = session_with( transport );
    session.play( track( "b" ), Some( abc() ) );
    session.process_events();

    session.next();
    session.process_events();

    assert_eq!( current_id( &session ).as_deref(), Some( "c" ) );
    assert_eq!( session.state(), PlaybackState::Playing );
}


// ===== History =====

#[test]
fn history_reported_once_per_switch() {
    let ( mut session, history ) = session_with( SimulatedTransport::new() );
    session.play( track( "a" ), Some( abc() ) );
    session.pause();
    session.play( track( "a" ), None );
    session.next();
    session.toggle();
    session.toggle();
    session.previous();

    assert_eq!( history.started(), vec![ "a", "b", "a" ] );
}


// ===== Lifecycle =====

#[test]
fn drop_releases_live_handle() {
    let ( mut session, _ ) = session_with( SimulatedTransport::new() );
    session.play( track( "a" ), None );
    assert_eq!( session.transport().live_handles(), 1 );
    session.shutdown();
    assert_eq!( session.transport().live_handles(), 0 );
    assert!( session.active_handle().is_none() );
}
