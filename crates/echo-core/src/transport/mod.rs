//! Audio transport abstraction
//!
//! A transport owns loaded audio streams and hands out one [`TransportHandle`]
//! per stream. Streams report progress asynchronously through the
//! [`EventSink`] they were loaded with; the sink tags every notification with
//! the session generation that requested the load so stale notifications can
//! be recognised by the receiver.

use std::fmt;
use std::sync::mpsc::Sender;

pub mod device;
pub mod simulated;

pub use device::DeviceTransport;
pub use simulated::{ Pacing, SimulatedTransport };


/// Identifier of a loaded stream. Never reused within one transport.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord )]
pub struct HandleId( pub u64 );


impl fmt::Display for HandleId {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        write!( f, "#{}", self.0 )
    }
}


/// Exclusive handle to one loaded stream.
///
/// Not `Clone`: whoever holds it owns the stream, and [`AudioTransport::release`]
/// consumes it.
#[derive( Debug, PartialEq, Eq )]
pub struct TransportHandle {
    id: HandleId,
}


impl TransportHandle {
    /// Wraps a freshly allocated id. Only transports should call this.
    pub fn new( id: HandleId ) -> Self {
        Self { id }
    }


    /// Gets the stream id.
    pub fn id( &self ) -> HandleId {
        self.id
    }
}


/// Notifications emitted by a stream.
#[derive( Debug, Clone, PartialEq )]
pub enum TransportEvent {
    /// Metadata is known and audio can be produced.
    Ready { duration: f64 },

    /// Playback reached the end of the resource.
    Ended,

    /// The source could not be fetched or decoded.
    LoadFailed { message: String },
}


impl TransportEvent {
    /// Returns true for notifications after which the stream emits nothing else.
    pub fn is_terminal( &self ) -> bool {
        matches!( self, TransportEvent::Ended | TransportEvent::LoadFailed { .. } )
    }
}


/// A transport notification addressed to the session that created the sink.
#[derive( Debug, Clone, PartialEq )]
pub struct SessionEvent {
    pub generation: u64,
    pub handle: HandleId,
    pub event: TransportEvent,
}


/// Per-stream notification listener.
///
/// Created by the session for each load, bound to the generation that
/// requested it.
#[derive( Debug )]
pub struct EventSink {
    tx: Sender<SessionEvent>,
    generation: u64,
}


impl EventSink {
    /// Creates a sink that tags notifications with `generation`.
    pub fn new( tx: Sender<SessionEvent>, generation: u64 ) -> Self {
        Self { tx, generation }
    }


    /// Gets the generation this sink is bound to.
    pub fn generation( &self ) -> u64 {
        self.generation
    }


    /// Delivers a notification for `handle`.
    ///
    /// Returns false if the receiving session is gone.
    pub fn emit( &self, handle: HandleId, event: TransportEvent ) -> bool {
        self.tx
            .send( SessionEvent { generation: self.generation, handle, event } )
            .is_ok()
    }
}


/// Backend that plays audio streams.
///
/// Operations on ids the transport no longer knows about are no-ops.
/// Implementations must emit at most one terminal notification per stream and
/// nothing at all once the stream has been released.
pub trait AudioTransport {
    /// Starts loading `source_uri` and returns immediately.
    ///
    /// Failures are reported through `sink` as [`TransportEvent::LoadFailed`].
    fn load( &mut self, source_uri: &str, sink: EventSink ) -> TransportHandle;

    /// Starts or resumes playback. Queued if the stream is still loading.
    fn play( &mut self, handle: &TransportHandle );

    /// Pauses playback, keeping the position.
    fn pause( &mut self, handle: &TransportHandle );

    /// Moves the play position, clamped to `[0, duration]`.
    fn seek( &mut self, handle: &TransportHandle, seconds: f64 );

    /// Gets the stream length in seconds, 0 until known.
    fn duration( &self, handle: &TransportHandle ) -> f64;

    /// Gets the current play position in seconds.
    fn position( &self, handle: &TransportHandle ) -> f64;

    /// Stops the stream and frees everything tied to it.
    fn release( &mut self, handle: TransportHandle );

    /// Lets transports without their own worker advance and emit notifications.
    fn poll( &mut self ) {}
}


/// Clamps a seek target to the playable range.
pub fn clamp_seek( seconds: f64, duration: f64 ) -> f64 {
    if !seconds.is_finite() {
        return 0.0;
    }
    seconds.clamp( 0.0, duration.max( 0.0 ) )
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::sync::mpsc;


    #[test]
    fn test_clamp_seek() {
        assert_eq!( clamp_seek( -5.0, 120.0 ), 0.0 );
        assert_eq!( clamp_seek( 500.0, 120.0 ), 120.0 );
        assert_eq!( clamp_seek( 42.5, 120.0 ), 42.5 );
        assert_eq!( clamp_seek( f64::NAN, 120.0 ), 0.0 );
        assert_eq!( clamp_seek( 10.0, 0.0 ), 0.0 );
    }


    #[test]
    fn test_sink_tags_generation() {
        let ( tx, rx ) = mpsc::channel();
        let sink = EventSink::new( tx, 7 );
        assert!( sink.emit( HandleId( 3 ), TransportEvent::Ended ) );

        let event = rx.recv().unwrap();
        assert_eq!( event, SessionEvent {
            generation: 7,
            handle: HandleId( 3 ),
            event: TransportEvent::Ended,
        });
    }


    #[test]
    fn test_sink_reports_closed_receiver() {
        let ( tx, rx ) = mpsc::channel();
        drop( rx );
        let sink = EventSink::new( tx, 1 );
        assert!( !sink.emit( HandleId( 1 ), TransportEvent::Ended ) );
    }
}
