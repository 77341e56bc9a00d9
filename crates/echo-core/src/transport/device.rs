//! Device-backed transport
//!
//! Each loaded stream gets its own worker thread that fetches the source,
//! decodes it with Symphonia, resamples when the device rate differs, and
//! feeds a cpal output stream. The worker owns the output stream, so audio
//! stops as soon as the worker notices its stop flag.

use std::collections::HashMap;
use std::sync::atomic::{ AtomicBool, AtomicU32, AtomicU64, Ordering };
use std::sync::{ Arc, Mutex };
use std::thread;
use std::time::Duration;

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };
use thiserror::Error;

use super::{ clamp_seek, AudioTransport, EventSink, HandleId, TransportEvent, TransportHandle };
use crate::decoder::{ Decoder, DecoderError };
use crate::output::{ AudioOutput, OutputError, SampleBuffer };
use crate::source::{ self, SourceError };


/// Errors that stop a stream from starting.
#[derive( Debug, Error )]
pub enum LoadError {
    #[error( transparent )]
    Source( #[from] SourceError ),

    #[error( transparent )]
    Decoder( #[from] DecoderError ),

    #[error( transparent )]
    Output( #[from] OutputError ),

    #[error( "Failed to create resampler: {0}" )]
    Resampler( String ),

    #[error( "Failed to spawn stream worker: {0}" )]
    Spawn( std::io::Error ),
}


/// Converts planar samples back to interleaved format.
/// [[L0, L1, ...], [R0, R1, ...]] → [L0, R0, L1, R1, ...]
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    if channels.is_empty() || channels[ 0 ].is_empty() {
        return Vec::new();
    }
    let frames = channels[ 0 ].len();
    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        for ch in channels {
            out.push( ch[ f ] );
        }
    }
    out
}


/// State shared between the transport and one stream worker.
struct StreamShared {
    play_requested: AtomicBool,
    stop_flag: AtomicBool,
    seek_request: Mutex<Option<f64>>,
    /// Source frames decoded so far, including any seek offset
    frames_played: AtomicU64,
    sample_rate: AtomicU32,
    /// Duration in seconds stored as f64 bits, 0 until known
    duration: AtomicU64,
    volume: AtomicU32,
    /// Emptied by release and by the terminal notification
    sink: Mutex<Option<EventSink>>,
}


impl StreamShared {
    fn new( sink: EventSink, volume: f32 ) -> Self {
        Self {
            play_requested: AtomicBool::new( false ),
            stop_flag: AtomicBool::new( false ),
            seek_request: Mutex::new( None ),
            frames_played: AtomicU64::new( 0 ),
            sample_rate: AtomicU32::new( 0 ),
            duration: AtomicU64::new( 0.0_f64.to_bits() ),
            volume: AtomicU32::new( volume.to_bits() ),
            sink: Mutex::new( Some( sink ) ),
        }
    }


    /// Emits through the sink while holding its lock, so nothing can slip out
    /// after `detach_sink` returns.
    fn notify( &self, id: HandleId, event: TransportEvent ) {
        let mut guard = self.sink.lock().unwrap_or_else( |e| e.into_inner() );
        if event.is_terminal() {
            if let Some( sink ) = guard.take() {
                sink.emit( id, event );
            }
        } else if let Some( sink ) = guard.as_ref() {
            sink.emit( id, event );
        }
    }


    fn detach_sink( &self ) {
        self.sink.lock().unwrap_or_else( |e| e.into_inner() ).take();
    }


    fn is_stopped( &self ) -> bool {
        self.stop_flag.load( Ordering::Relaxed )
    }


    fn duration( &self ) -> f64 {
        f64::from_bits( self.duration.load( Ordering::Relaxed ) )
    }


    fn position( &self ) -> f64 {
        let rate = self.sample_rate.load( Ordering::Relaxed );
        if rate == 0 {
            return 0.0;
        }
        let seconds = self.frames_played.load( Ordering::Relaxed ) as f64 / rate as f64;
        let duration = self.duration();
        if duration > 0.0 { seconds.min( duration ) } else { seconds }
    }


    fn take_seek( &self ) -> Option<f64> {
        self.seek_request.lock().unwrap_or_else( |e| e.into_inner() ).take()
    }
}


/// Everything a worker needs once its source has been opened.
struct PreparedStream {
    decoder: Decoder,
    // Dropped with the worker, which stops the cpal stream
    _output: AudioOutput,
    sample_buffer: Arc<SampleBuffer>,
    resampler: Option<FastFixedOut<f32>>,
}


/// Transport that plays through the default output device.
pub struct DeviceTransport {
    next_id: u64,
    streams: HashMap<HandleId, Arc<StreamShared>>,
    volume: f32,
}


impl DeviceTransport {
    /// Creates a transport with no loaded streams.
    pub fn new() -> Self {
        Self {
            next_id: 0,
            streams: HashMap::new(),
            volume: 1.0,
        }
    }


    /// Sets the volume level (0.0 = mute, 1.0 = normal, >1.0 = boost).
    ///
    /// Applies to the live stream and every stream loaded later.
    pub fn set_volume( &mut self, volume: f32 ) {
        self.volume = volume.max( 0.0 );
        for shared in self.streams.values() {
            shared.volume.store( self.volume.to_bits(), Ordering::Relaxed );
        }
    }


    fn stream( &self, handle: &TransportHandle ) -> Option<&Arc<StreamShared>> {
        self.streams.get( &handle.id() )
    }


    /// Opens the source and sets up decoding and output.
    fn prepare( source_uri: &str, shared: &StreamShared ) -> Result<Option<PreparedStream>, LoadError> {
        let opened = source::open( source_uri )?;
        let decoder = Decoder::open( opened )?;

        // Released while fetching: don't touch the device at all
        if shared.is_stopped() {
            return Ok( None );
        }

        let source_sample_rate = decoder.sample_rate();
        let channels = decoder.channels() as u16;

        let ( output, sample_buffer ) = AudioOutput::new( source_sample_rate, channels )?;
        sample_buffer.set_volume( f32::from_bits( shared.volume.load( Ordering::Relaxed ) ) );
        sample_buffer.set_paused( !shared.play_requested.load( Ordering::Relaxed ) );

        let target_sample_rate = output.sample_rate();

        let resampler = if source_sample_rate != target_sample_rate {
            tracing::info!(
                "Resampling: {} Hz → {} Hz",
                source_sample_rate,
                target_sample_rate
            );

            let resampler = FastFixedOut::<f32>::new(
                target_sample_rate as f64 / source_sample_rate as f64,
                2.0,
                PolynomialDegree::Cubic,
                1024,
                channels as usize,
            ).map_err( |e| LoadError::Resampler( e.to_string() ) )?;

            Some( resampler )
        } else {
            None
        };

        output.play()?;

        Ok( Some( PreparedStream {
            decoder,
            _output: output,
            sample_buffer,
            resampler,
        }))
    }


    /// Worker entry point for one stream.
    fn run_stream( id: HandleId, source_uri: String, shared: Arc<StreamShared> ) {
        let prepared = match Self::prepare( &source_uri, &shared ) {
            Ok( Some( prepared ) ) => prepared,
            Ok( None ) => {
                tracing::debug!( "Stream {} released before it started", id );
                return;
            }
            Err( e ) => {
                tracing::warn!( "Failed to load {}: {}", source_uri, e );
                shared.notify( id, TransportEvent::LoadFailed { message: e.to_string() } );
                return;
            }
        };

        let duration = prepared.decoder.duration().unwrap_or( 0.0 );
        shared.sample_rate.store( prepared.decoder.sample_rate(), Ordering::Relaxed );
        shared.duration.store( duration.to_bits(), Ordering::Relaxed );
        shared.notify( id, TransportEvent::Ready { duration } );

        if Self::decode_loop( prepared, &shared ) {
            tracing::info!( "Stream {} reached end of {}", id, source_uri );
            shared.notify( id, TransportEvent::Ended );
        }

        tracing::debug!( "Stream {} worker exiting", id );
    }


    /// Decodes until the stream ends or is stopped.
    ///
    /// @returns true if playback reached the end of the source
    fn decode_loop( prepared: PreparedStream, shared: &StreamShared ) -> bool {
        let PreparedStream { mut decoder, _output, sample_buffer, mut resampler } = prepared;
        let channels = decoder.channels();
        let sample_rate = decoder.sample_rate();

        // Planar samples waiting for the resampler
        let mut resample_input: Vec<Vec<f32>> = ( 0..channels ).map( |_| Vec::new() ).collect();
        let mut at_eof = false;

        loop {
            if shared.is_stopped() {
                sample_buffer.clear();
                return false;
            }

            if let Some( target ) = shared.take_seek() {
                match decoder.seek( target ) {
                    Ok(()) => {
                        sample_buffer.clear();
                        resample_input.iter_mut().for_each( Vec::clear );
                        if let Some( ref mut resampler ) = resampler {
                            resampler.reset();
                        }
                        shared.frames_played.store( ( target * sample_rate as f64 ) as u64, Ordering::Relaxed );
                        at_eof = false;
                    }
                    Err( e ) => tracing::warn!( "Seek to {:.1}s failed: {}", target, e ),
                }
            }

            sample_buffer.set_volume( f32::from_bits( shared.volume.load( Ordering::Relaxed ) ) );
            sample_buffer.set_paused( !shared.play_requested.load( Ordering::Relaxed ) );

            if sample_buffer.is_paused() {
                thread::sleep( Duration::from_millis( 10 ) );
                continue;
            }

            if at_eof {
                // Let the device drain what is buffered before reporting the end
                if sample_buffer.is_empty() {
                    return true;
                }
                thread::sleep( Duration::from_millis( 10 ) );
                continue;
            }

            // Keep about 50ms decoded ahead
            let target_buffer = ( sample_rate as usize * channels ) / 20;
            if sample_buffer.len() > target_buffer {
                thread::sleep( Duration::from_millis( 5 ) );
                continue;
            }

            let samples = match decoder.decode_next() {
                Ok( Some( samples ) ) => samples,
                Ok( None ) => {
                    if let Some( ref mut resampler ) = resampler {
                        if !resample_input[ 0 ].is_empty() {
                            match resampler.process_partial( Some( &resample_input ), None ) {
                                Ok( resampled ) => push_all( &sample_buffer, &interleave( &resampled ), shared ),
                                Err( e ) => tracing::error!( "Final resample error: {}", e ),
                            }
                            resample_input.iter_mut().for_each( Vec::clear );
                        }
                    }
                    at_eof = true;
                    continue;
                }
                Err( e ) => {
                    tracing::error!( "Decode error: {}", e );
                    at_eof = true;
                    continue;
                }
            };

            shared.frames_played.fetch_add( ( samples.len() / channels ) as u64, Ordering::Relaxed );

            let output_samples = match resampler {
                Some( ref mut resampler ) => {
                    for chunk in samples.chunks( channels ) {
                        for ( ch_idx, sample ) in chunk.iter().enumerate() {
                            resample_input[ ch_idx ].push( *sample );
                        }
                    }

                    let mut output_interleaved = Vec::new();
                    while resample_input[ 0 ].len() >= resampler.input_frames_next() {
                        let needed = resampler.input_frames_next();
                        let input_chunk: Vec<Vec<f32>> = resample_input
                            .iter_mut()
                            .map( |ch| ch.drain( ..needed ).collect() )
                            .collect();

                        match resampler.process( &input_chunk, None ) {
                            Ok( resampled ) => output_interleaved.extend( interleave( &resampled ) ),
                            Err( e ) => {
                                tracing::error!( "Resample error: {}", e );
                                break;
                            }
                        }
                    }
                    output_interleaved
                }
                None => samples,
            };

            push_all( &sample_buffer, &output_samples, shared );
        }
    }
}


/// Pushes every sample, waiting for the device to make room.
fn push_all( sample_buffer: &SampleBuffer, samples: &[f32], shared: &StreamShared ) {
    let mut offset = 0;
    while offset < samples.len() && !shared.is_stopped() {
        let pushed = sample_buffer.push( &samples[ offset.. ] );
        offset += pushed;
        if pushed == 0 {
            thread::sleep( Duration::from_millis( 5 ) );
        }
    }
}


impl Default for DeviceTransport {
    fn default() -> Self {
        Self::new()
    }
}


impl AudioTransport for DeviceTransport {
    fn load( &mut self, source_uri: &str, sink: EventSink ) -> TransportHandle {
        self.next_id += 1;
        let id = HandleId( self.next_id );
        let shared = Arc::new( StreamShared::new( sink, self.volume ) );
        self.streams.insert( id, Arc::clone( &shared ) );

        tracing::info!( "Loading {} as stream {}", source_uri, id );

        let worker_shared = Arc::clone( &shared );
        let uri = source_uri.to_string();
        let spawned = thread::Builder::new()
            .name( format!( "echo-stream-{}", id.0 ) )
            .spawn( move || Self::run_stream( id, uri, worker_shared ) );

        // The worker is detached; release signals it through the stop flag
        if let Err( e ) = spawned {
            tracing::error!( "Failed to spawn stream worker: {}", e );
            shared.notify( id, TransportEvent::LoadFailed { message: LoadError::Spawn( e ).to_string() } );
        }

        TransportHandle::new( id )
    }


    fn play( &mut self, handle: &TransportHandle ) {
        if let Some( shared ) = self.stream( handle ) {
            shared.play_requested.store( true, Ordering::Relaxed );
        }
    }


    fn pause( &mut self, handle: &TransportHandle ) {
        if let Some( shared ) = self.stream( handle ) {
            shared.play_requested.store( false, Ordering::Relaxed );
        }
    }


    fn seek( &mut self, handle: &TransportHandle, seconds: f64 ) {
        let Some( shared ) = self.stream( handle ) else {
            return;
        };

        let target = clamp_seek( seconds, shared.duration() );
        let rate = shared.sample_rate.load( Ordering::Relaxed );
        if rate > 0 {
            shared.frames_played.store( ( target * rate as f64 ) as u64, Ordering::Relaxed );
        }
        *shared.seek_request.lock().unwrap_or_else( |e| e.into_inner() ) = Some( target );
    }


    fn duration( &self, handle: &TransportHandle ) -> f64 {
        self.stream( handle ).map( |s| s.duration() ).unwrap_or( 0.0 )
    }


    fn position( &self, handle: &TransportHandle ) -> f64 {
        self.stream( handle ).map( |s| s.position() ).unwrap_or( 0.0 )
    }


    fn release( &mut self, handle: TransportHandle ) {
        if let Some( shared ) = self.streams.remove( &handle.id() ) {
            shared.detach_sink();
            shared.play_requested.store( false, Ordering::Relaxed );
            shared.stop_flag.store( true, Ordering::Relaxed );
            tracing::debug!( "Released stream {}", handle.id() );
        }
    }
}


impl Drop for DeviceTransport {
    fn drop( &mut self ) {
        for shared in self.streams.values() {
            shared.detach_sink();
            shared.stop_flag.store( true, Ordering::Relaxed );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::sync::mpsc;


    #[test]
    fn test_interleave() {
        let planar = vec![ vec![ 1.0, 2.0 ], vec![ -1.0, -2.0 ] ];
        assert_eq!( interleave( &planar ), vec![ 1.0, -1.0, 2.0, -2.0 ] );
        assert!( interleave( &[] ).is_empty() );
    }


    #[test]
    fn test_terminal_notification_emitted_once() {
        let ( tx, rx ) = mpsc::channel();
        let shared = StreamShared::new( EventSink::new( tx, 2 ), 1.0 );

        shared.notify( HandleId( 1 ), TransportEvent::Ready { duration: 3.0 } );
        shared.notify( HandleId( 1 ), TransportEvent::Ended );
        shared.notify( HandleId( 1 ), TransportEvent::Ended );

        let events: Vec<_> = rx.try_iter().map( |e| e.event ).collect();
        assert_eq!( events, vec![ TransportEvent::Ready { duration: 3.0 }, TransportEvent::Ended ] );
    }


    #[test]
    fn test_detached_sink_is_silent() {
        let ( tx, rx ) = mpsc::channel();
        let shared = StreamShared::new( EventSink::new( tx, 1 ), 1.0 );
        shared.detach_sink();
        shared.notify( HandleId( 1 ), TransportEvent::Ended );
        assert!( rx.try_recv().is_err() );
    }


    #[test]
    fn test_position_capped_at_duration() {
        let ( tx, _rx ) = mpsc::channel();
        let shared = StreamShared::new( EventSink::new( tx, 1 ), 1.0 );
        assert_eq!( shared.position(), 0.0 );

        shared.sample_rate.store( 100, Ordering::Relaxed );
        shared.duration.store( 2.0_f64.to_bits(), Ordering::Relaxed );
        shared.frames_played.store( 150, Ordering::Relaxed );
        assert_eq!( shared.position(), 1.5 );
        shared.frames_played.store( 900, Ordering::Relaxed );
        assert_eq!( shared.position(), 2.0 );
    }


    #[test]
    fn test_missing_source_reports_load_failure() {
        let ( tx, rx ) = mpsc::channel();
        let mut transport = DeviceTransport::new();
        let handle = transport.load( "/no/such/file.mp3", EventSink::new( tx, 5 ) );

        let event = rx.recv_timeout( Duration::from_secs( 5 ) ).unwrap();
        assert_eq!( event.handle, handle.id() );
        assert_eq!( event.generation, 5 );
        assert!( matches!( event.event, TransportEvent::LoadFailed { .. } ) );
        transport.release( handle );
    }
}
