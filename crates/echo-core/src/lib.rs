//! Echo Core - Playback session engine
//!
//! This crate provides the core of the echo player: the track model,
//! playlist navigation, audio transports (device and simulated), the
//! playback session that ties them together, and listen history reporting.

pub mod command;
pub mod decoder;
pub mod history;
pub mod navigator;
pub mod output;
pub mod session;
pub mod source;
pub mod track;
pub mod transport;

pub use command::{ Command, CommandError };
pub use history::{ HistoryConfig, HistoryError, HistoryReporter, HttpHistoryReporter, ListenRecord, NoHistory };
pub use session::{ PlaybackSession, PlaybackState };
pub use track::{ Playlist, Track };
pub use transport::{
    AudioTransport, DeviceTransport, EventSink, HandleId, SessionEvent, SimulatedTransport,
    TransportEvent, TransportHandle,
};
