//! Property-based tests for navigation and the playback session
//!
//! Uses proptest to drive random operation sequences through a session on the
//! simulated transport and check its invariants after every step.

use echo_core::navigator;
use echo_core::{ PlaybackSession, PlaybackState, Playlist, SimulatedTransport, Track };
use proptest::prelude::*;

// ===== Helpers =====

fn playlist_of( len: usize ) -> Playlist {
    ( 0..len )
        .map( |i| Track::new( format!( "t{}", i ), format!( "Track {}", i ), "Artist", format!( "t{}.mp3", i ) ) )
        .collect()
}


#[derive( Debug, Clone )]
enum Op {
    Play( usize ),
    PlayOutside,
    Pause,
    Toggle,
    Next,
    Previous,
    Seek( f64 ),
    Advance( f64 ),
    Finish,
    CompleteLoads,
    Process,
}


fn arbitrary_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        ( 0usize..8 ).prop_map( Op::Play ),
        Just( Op::PlayOutside ),
        Just( Op::Pause ),
        Just( Op::Toggle ),
        Just( Op::Next ),
        Just( Op::Previous ),
        ( -50.0f64..300.0 ).prop_map( Op::Seek ),
        ( 0.0f64..120.0 ).prop_map( Op::Advance ),
        Just( Op::Finish ),
        Just( Op::CompleteLoads ),
        Just( Op::Process ),
    ]
}


fn apply( session: &mut PlaybackSession<SimulatedTransport>, playlist: &Playlist, op: &Op ) {
    match op {
        Op::Play( i ) => {
            let track = playlist[ i % playlist.len() ].clone();
            session.play( track, Some( playlist.clone() ) );
        }
        Op::PlayOutside => {
            session.play( Track::new( "outside", "Outside", "Nobody", "outside.mp3" ), None );
        }
        Op::Pause => session.pause(),
        Op::Toggle => session.toggle(),
        Op::Next => session.next(),
        Op::Previous => session.previous(),
        Op::Seek( s ) => session.seek_to( *s ),
        Op::Advance( s ) => session.transport_mut().advance( *s ),
        Op::Finish => {
            if let Some( id ) = session.active_handle() {
                session.transport_mut().finish( id );
            }
        }
        Op::CompleteLoads => session.transport_mut().complete_loads(),
        Op::Process => {
            session.process_events();
        }
    }
}


fn check_invariants( session: &PlaybackSession<SimulatedTransport> ) -> Result<(), TestCaseError> {
    // At most one live stream, ever
    prop_assert!( session.transport().live_handles() <= 1 );
    prop_assert!( session.transport().peak_live_handles() <= 1 );

    // A handle exists exactly when a track does, except after a failed load
    match session.state() {
        PlaybackState::Failed => {
            prop_assert!( session.active_handle().is_none() );
            prop_assert!( session.current_track().is_some() );
        }
        _ => prop_assert_eq!( session.active_handle().is_some(), session.current_track().is_some() ),
    }

    // The handle is bound to the current track
    if let ( Some( id ), Some( track ) ) = ( session.active_handle(), session.current_track() ) {
        prop_assert_eq!( session.transport().source_of( id ), Some( track.source_uri.as_str() ) );
    }

    // The index, when set, points at the current track
    if let Some( index ) = session.current_index() {
        prop_assert!( index < session.playlist().len() );
        prop_assert_eq!( Some( &session.playlist()[ index ] ), session.current_track() );
    }

    let position = session.position();
    prop_assert!( position >= 0.0 );
    prop_assert!( position.is_finite() );

    Ok(())
}

// ===== Property Tests =====

proptest! {
    /// Property: next then previous returns to the start, and the reverse
    #[test]
    fn next_previous_round_trip( len in 1usize..50, start in 0usize..50 ) {
        let playlist = playlist_of( len );
        let index = start % len;

        let forward = navigator::next( &playlist, index ).unwrap();
        prop_assert_eq!( navigator::previous( &playlist, forward ), Some( index ) );

        let backward = navigator::previous( &playlist, index ).unwrap();
        prop_assert_eq!( navigator::next( &playlist, backward ), Some( index ) );
    }

    /// Property: navigation always lands inside the playlist
    #[test]
    fn navigation_stays_in_bounds( len in 1usize..50, index in 0usize..200 ) {
        let playlist = playlist_of( len );
        prop_assert!( navigator::next( &playlist, index ).unwrap() < len );
        prop_assert!( navigator::previous( &playlist, index ).unwrap() < len );
    }

    /// Property: session invariants hold after every operation
    #[test]
    fn session_invariants_hold(
        len in 1usize..6,
        ops in prop::collection::vec( arbitrary_op(), 1..60 )
    ) {
        let playlist = playlist_of( len );
        let transport = SimulatedTransport::new().with_default_duration( 100.0 );
        let mut session = PlaybackSession::new( transport );

        for op in &ops {
            apply( &mut session, &playlist, op );
            check_invariants( &session )?;
        }

        session.shutdown();
        prop_assert_eq!( session.transport().live_handles(), 0 );
    }

    /// Property: invariants survive deferred loads and a failing track
    #[test]
    fn session_invariants_hold_with_slow_and_failing_loads(
        len in 2usize..6,
        ops in prop::collection::vec( arbitrary_op(), 1..60 )
    ) {
        let playlist = playlist_of( len );
        let transport = SimulatedTransport::new()
            .with_default_duration( 60.0 )
            .with_deferred_loads()
            .with_failing_source( "t1.mp3" );
        let mut session = PlaybackSession::new( transport );

        for op in &ops {
            apply( &mut session, &playlist, op );
            check_invariants( &session )?;
        }
    }

    /// Property: the generation never decreases
    #[test]
    fn generation_is_monotonic( ops in prop::collection::vec( arbitrary_op(), 1..60 ) ) {
        let playlist = playlist_of( 3 );
        let mut session = PlaybackSession::new( SimulatedTransport::new() );
        let mut last = session.generation();

        for op in &ops {
            apply( &mut session, &playlist, op );
            prop_assert!( session.generation() >= last );
            last = session.generation();
        }
    }
}
