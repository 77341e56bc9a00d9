//! In-memory transport
//!
//! Plays nothing. Streams have a configurable length and a position that only
//! moves when the transport clock advances, either by explicit calls
//! (`Pacing::Manual`) or from the wall clock on every poll
//! (`Pacing::Realtime`). Used for tests and for running the client without an
//! audio device.

use std::collections::{ HashMap, HashSet };
use std::time::Instant;

use super::{ clamp_seek, AudioTransport, EventSink, HandleId, TransportEvent, TransportHandle };


/// Default length of a simulated stream, in seconds.
pub const DEFAULT_DURATION_SECS: f64 = 180.0;


/// How the simulated clock moves.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum Pacing {
    /// Time only passes through [`SimulatedTransport::advance`].
    #[default]
    Manual,

    /// Time follows the wall clock, applied on every [`AudioTransport::poll`].
    Realtime,
}


#[derive( Debug )]
struct SimulatedStream {
    source: String,
    duration: f64,
    position: f64,
    playing: bool,
    ready: bool,
    /// Taken on release and on the terminal notification.
    sink: Option<EventSink>,
}


/// Deterministic transport without audio output.
#[derive( Debug, Default )]
pub struct SimulatedTransport {
    pacing: Pacing,
    last_poll: Option<Instant>,
    next_id: u64,
    streams: HashMap<HandleId, SimulatedStream>,
    default_duration: Option<f64>,
    durations: HashMap<String, f64>,
    failing: HashSet<String>,
    defer_loads: bool,
    load_count: usize,
    peak_live: usize,
}


impl SimulatedTransport {
    /// Creates a manually paced transport.
    pub fn new() -> Self {
        Self::default()
    }


    /// Creates a transport whose clock follows real time.
    pub fn realtime() -> Self {
        Self {
            pacing: Pacing::Realtime,
            ..Self::default()
        }
    }


    /// Sets the length used for sources without an explicit duration.
    pub fn with_default_duration( mut self, seconds: f64 ) -> Self {
        self.default_duration = Some( seconds.max( 0.0 ) );
        self
    }


    /// Sets the length of one source.
    pub fn with_duration( mut self, source_uri: impl Into<String>, seconds: f64 ) -> Self {
        self.durations.insert( source_uri.into(), seconds.max( 0.0 ) );
        self
    }


    /// Makes every load of `source_uri` fail.
    pub fn with_failing_source( mut self, source_uri: impl Into<String> ) -> Self {
        self.failing.insert( source_uri.into() );
        self
    }


    /// Keeps new loads pending until [`SimulatedTransport::complete_loads`].
    pub fn with_deferred_loads( mut self ) -> Self {
        self.defer_loads = true;
        self
    }


    /// Resolves every pending load, emitting `Ready` or `LoadFailed`.
    pub fn complete_loads( &mut self ) {
        let pending: Vec<HandleId> = self.streams.iter()
            .filter( |( _, s )| !s.ready && s.sink.is_some() )
            .map( |( id, _ )| *id )
            .collect();

        for id in pending {
            self.settle( id );
        }
    }


    /// Moves the clock forward, ending streams that run out.
    pub fn advance( &mut self, seconds: f64 ) {
        if seconds <= 0.0 {
            return;
        }

        for ( id, stream ) in self.streams.iter_mut() {
            if !stream.playing || !stream.ready {
                continue;
            }
            stream.position += seconds;
            if stream.position >= stream.duration {
                stream.position = stream.duration;
                stream.playing = false;
                if let Some( sink ) = stream.sink.take() {
                    tracing::debug!( "Simulated stream {} ended", id );
                    sink.emit( *id, TransportEvent::Ended );
                }
            }
        }
    }


    /// Forces a stream to its end.
    ///
    /// @returns true if an `Ended` notification was emitted
    pub fn finish( &mut self, id: HandleId ) -> bool {
        let Some( stream ) = self.streams.get_mut( &id ) else {
            return false;
        };

        stream.position = stream.duration;
        stream.playing = false;
        match stream.sink.take() {
            Some( sink ) => {
                sink.emit( id, TransportEvent::Ended );
                true
            }
            None => false,
        }
    }


    /// Gets the number of loaded, un-released streams.
    pub fn live_handles( &self ) -> usize {
        self.streams.len()
    }


    /// Gets the highest number of streams that were ever live at once.
    pub fn peak_live_handles( &self ) -> usize {
        self.peak_live
    }


    /// Gets the number of loads performed.
    pub fn load_count( &self ) -> usize {
        self.load_count
    }


    /// Returns true if the stream exists and is producing audio.
    pub fn is_playing( &self, id: HandleId ) -> bool {
        self.streams.get( &id ).map( |s| s.playing && s.ready ).unwrap_or( false )
    }


    /// Returns true if the stream has not been released.
    pub fn is_live( &self, id: HandleId ) -> bool {
        self.streams.contains_key( &id )
    }


    /// Gets the source a stream was loaded from.
    pub fn source_of( &self, id: HandleId ) -> Option<&str> {
        self.streams.get( &id ).map( |s| s.source.as_str() )
    }


    fn settle( &mut self, id: HandleId ) {
        let failing = match self.streams.get( &id ) {
            Some( stream ) => self.failing.contains( &stream.source ),
            None => return,
        };
        let Some( stream ) = self.streams.get_mut( &id ) else {
            return;
        };

        if failing {
            stream.playing = false;
            if let Some( sink ) = stream.sink.take() {
                sink.emit( id, TransportEvent::LoadFailed {
                    message: format!( "Cannot open {}", stream.source ),
                });
            }
        } else {
            stream.ready = true;
            if let Some( sink ) = stream.sink.as_ref() {
                sink.emit( id, TransportEvent::Ready { duration: stream.duration } );
            }
        }
    }
}


impl AudioTransport for SimulatedTransport {
    fn load( &mut self, source_uri: &str, sink: EventSink ) -> TransportHandle {
        self.next_id += 1;
        let id = HandleId( self.next_id );
        self.load_count += 1;

        let duration = self.durations.get( source_uri ).copied()
            .or( self.default_duration )
            .unwrap_or( DEFAULT_DURATION_SECS );

        self.streams.insert( id, SimulatedStream {
            source: source_uri.to_string(),
            duration,
            position: 0.0,
            playing: false,
            ready: false,
            sink: Some( sink ),
        });
        self.peak_live = self.peak_live.max( self.streams.len() );

        if !self.defer_loads {
            self.settle( id );
        }

        TransportHandle::new( id )
    }


    fn play( &mut self, handle: &TransportHandle ) {
        if let Some( stream ) = self.streams.get_mut( &handle.id() ) {
            if stream.sink.is_some() {
                stream.playing = true;
            }
        }
    }


    fn pause( &mut self, handle: &TransportHandle ) {
        if let Some( stream ) = self.streams.get_mut( &handle.id() ) {
            stream.playing = false;
        }
    }


    fn seek( &mut self, handle: &TransportHandle, seconds: f64 ) {
        if let Some( stream ) = self.streams.get_mut( &handle.id() ) {
            let duration = if stream.ready { stream.duration } else { 0.0 };
            stream.position = clamp_seek( seconds, duration );
        }
    }


    fn duration( &self, handle: &TransportHandle ) -> f64 {
        self.streams.get( &handle.id() )
            .filter( |s| s.ready )
            .map( |s| s.duration )
            .unwrap_or( 0.0 )
    }


    fn position( &self, handle: &TransportHandle ) -> f64 {
        self.streams.get( &handle.id() ).map( |s| s.position ).unwrap_or( 0.0 )
    }


    fn release( &mut self, handle: TransportHandle ) {
        if let Some( mut stream ) = self.streams.remove( &handle.id() ) {
            stream.sink = None;
            tracing::debug!( "Released simulated stream {}", handle.id() );
        }
    }


    fn poll( &mut self ) {
        if self.pacing != Pacing::Realtime {
            return;
        }
        let now = Instant::now();
        if let Some( last ) = self.last_poll.replace( now ) {
            self.advance( now.duration_since( last ).as_secs_f64() );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::sync::mpsc;


    #[test]
    fn test_load_emits_ready() {
        let ( tx, rx ) = mpsc::channel();
        let mut transport = SimulatedTransport::new().with_duration( "a.mp3", 120.0 );
        let handle = transport.load( "a.mp3", EventSink::new( tx, 1 ) );

        let event = rx.try_recv().unwrap();
        assert_eq!( event.handle, handle.id() );
        assert_eq!( event.event, TransportEvent::Ready { duration: 120.0 } );
        assert_eq!( transport.duration( &handle ), 120.0 );
    }


    #[test]
    fn test_deferred_load_has_no_duration() {
        let ( tx, rx ) = mpsc::channel();
        let mut transport = SimulatedTransport::new().with_deferred_loads();
        let handle = transport.load( "a.mp3", EventSink::new( tx, 1 ) );

        assert!( rx.try_recv().is_err() );
        assert_eq!( transport.duration( &handle ), 0.0 );

        transport.complete_loads();
        assert!( matches!( rx.try_recv().unwrap().event, TransportEvent::Ready { .. } ) );
    }


    #[test]
    fn test_advance_ends_once() {
        let ( tx, rx ) = mpsc::channel();
        let mut transport = SimulatedTransport::new().with_default_duration( 10.0 );
        let handle = transport.load( "a.mp3", EventSink::new( tx, 1 ) );
        transport.play( &handle );
        let _ready = rx.try_recv().unwrap();

        transport.advance( 4.0 );
        assert_eq!( transport.position( &handle ), 4.0 );
        transport.advance( 20.0 );
        transport.advance( 20.0 );

        assert_eq!( rx.try_recv().unwrap().event, TransportEvent::Ended );
        assert!( rx.try_recv().is_err() );
        assert_eq!( transport.position( &handle ), 10.0 );
    }


    #[test]
    fn test_paused_stream_does_not_advance() {
        let ( tx, _rx ) = mpsc::channel();
        let mut transport = SimulatedTransport::new();
        let handle = transport.load( "a.mp3", EventSink::new( tx, 1 ) );
        transport.play( &handle );
        transport.advance( 5.0 );
        transport.pause( &handle );
        transport.advance( 5.0 );
        assert_eq!( transport.position( &handle ), 5.0 );
    }


    #[test]
    fn test_nothing_emitted_after_release() {
        let ( tx, rx ) = mpsc::channel();
        let mut transport = SimulatedTransport::new().with_deferred_loads();
        let handle = transport.load( "a.mp3", EventSink::new( tx, 1 ) );
        let id = handle.id();
        transport.release( handle );

        transport.complete_loads();
        assert!( !transport.finish( id ) );
        assert!( rx.try_recv().is_err() );
        assert_eq!( transport.live_handles(), 0 );
    }


    #[test]
    fn test_failing_source() {
        let ( tx, rx ) = mpsc::channel();
        let mut transport = SimulatedTransport::new().with_failing_source( "broken.mp3" );
        let handle = transport.load( "broken.mp3", EventSink::new( tx, 4 ) );
        transport.play( &handle );

        let event = rx.try_recv().unwrap();
        assert_eq!( event.generation, 4 );
        assert!( matches!( event.event, TransportEvent::LoadFailed { .. } ) );
        assert!( !transport.is_playing( handle.id() ) );
    }


    #[test]
    fn test_seek_clamps_to_duration() {
        let ( tx, _rx ) = mpsc::channel();
        let mut transport = SimulatedTransport::new().with_default_duration( 120.0 );
        let handle = transport.load( "a.mp3", EventSink::new( tx, 1 ) );

        transport.seek( &handle, -5.0 );
        assert_eq!( transport.position( &handle ), 0.0 );
        transport.seek( &handle, 500.0 );
        assert_eq!( transport.position( &handle ), 120.0 );
    }
}
