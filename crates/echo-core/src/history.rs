//! Listen history reporting
//!
//! The session tells a [`HistoryReporter`] every time a new track starts.
//! Reporting is fire-and-forget: failures are logged and never reach the
//! session.

use std::time::Duration;

use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use thiserror::Error;
use tokio::runtime::Runtime;


/// Time in-flight reports get to finish when the reporter is dropped.
const SHUTDOWN_GRACE_SECS: u64 = 2;

/// Request timeout for history calls.
const REQUEST_TIMEOUT_SECS: u64 = 15;


/// Errors that can occur talking to the history store.
#[derive( Debug, Error )]
pub enum HistoryError {
    #[error( "Invalid history URL: {0}" )]
    InvalidUrl( String ),

    #[error( "Failed to start history runtime: {0}" )]
    Runtime( #[from] std::io::Error ),

    #[error( "Request failed: {0}" )]
    Request( #[from] reqwest::Error ),

    #[error( "History store returned {status}: {message}" )]
    Status { status: u16, message: String },
}


/// Receives a notification each time a track starts.
pub trait HistoryReporter: Send {
    /// Records that `track_id` started. Must return without waiting on I/O.
    fn notify_started( &self, track_id: &str );
}


/// Reporter that discards everything.
#[derive( Debug, Clone, Copy, Default )]
pub struct NoHistory;


impl HistoryReporter for NoHistory {
    fn notify_started( &self, _track_id: &str ) {}
}


impl<R: HistoryReporter> HistoryReporter for Option<R> {
    fn notify_started( &self, track_id: &str ) {
        if let Some( reporter ) = self {
            reporter.notify_started( track_id );
        }
    }
}


/// Body of a `listen/save` request.
#[derive( Debug, Clone, PartialEq, Eq, Serialize )]
#[serde( rename_all = "camelCase" )]
pub struct ListenEvent {
    pub listener_id: String,
    pub track_id: String,
}


/// One entry of a listener's history.
#[derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
pub struct ListenRecord {
    pub listener_id: String,
    pub track_id: String,
    pub updated_at: DateTime<Utc>,
}


/// Connection details for the history store.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct HistoryConfig {
    pub base_url: String,
    pub listener_id: String,
}


impl HistoryConfig {
    pub fn new( base_url: impl Into<String>, listener_id: impl Into<String> ) -> Self {
        Self {
            base_url: base_url.into(),
            listener_id: listener_id.into(),
        }
    }


    /// Strips trailing slashes and checks the scheme.
    fn normalized_url( &self ) -> Result<String, HistoryError> {
        let url = self.base_url.trim().trim_end_matches( '/' ).to_string();
        if !url.starts_with( "http://" ) && !url.starts_with( "https://" ) {
            return Err( HistoryError::InvalidUrl( self.base_url.clone() ) );
        }
        Ok( url )
    }
}


/// Reports listens to an HTTP history store.
///
/// Owns a small tokio runtime; requests run on its single worker so callers
/// never block.
pub struct HttpHistoryReporter {
    runtime: Option<Runtime>,
    client: reqwest::Client,
    base_url: String,
    listener_id: String,
}


impl HttpHistoryReporter {
    /// Creates a reporter for the given store.
    pub fn new( config: HistoryConfig ) -> Result<Self, HistoryError> {
        let base_url = config.normalized_url()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads( 1 )
            .thread_name( "echo-history" )
            .enable_all()
            .build()?;

        let client = reqwest::Client::builder()
            .user_agent( crate::source::USER_AGENT )
            .timeout( Duration::from_secs( REQUEST_TIMEOUT_SECS ) )
            .build()?;

        tracing::info!( "Reporting listens to {} as {}", base_url, config.listener_id );

        Ok( Self {
            runtime: Some( runtime ),
            client,
            base_url,
            listener_id: config.listener_id,
        })
    }


    /// Gets the listener this reporter writes for.
    pub fn listener_id( &self ) -> &str {
        &self.listener_id
    }


    /// URL of the save endpoint.
    pub fn save_url( &self ) -> String {
        format!( "{}/listen/save", self.base_url )
    }


    /// URL of the history listing endpoint.
    pub fn songs_url( &self ) -> String {
        format!( "{}/listen/songs", self.base_url )
    }


    /// Fetches the listener's history, most recent first.
    ///
    /// Blocks until the request completes. Do not call from async code.
    pub fn recent( &self ) -> Result<Vec<ListenRecord>, HistoryError> {
        let Some( runtime ) = self.runtime.as_ref() else {
            return Ok( Vec::new() );
        };

        let request = self.client
            .get( self.songs_url() )
            .query( &[ ( "listenerId", self.listener_id.as_str() ) ] );

        let mut records = runtime.block_on( async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err( HistoryError::Status { status: status.as_u16(), message } );
            }
            let records: Vec<ListenRecord> = response.json().await?;
            Ok::<_, HistoryError>( records )
        })?;

        sort_recent_first( &mut records );
        tracing::debug!( "Fetched {} history records", records.len() );
        Ok( records )
    }
}


/// Orders records newest first.
pub fn sort_recent_first( records: &mut [ListenRecord] ) {
    records.sort_by( |a, b| b.updated_at.cmp( &a.updated_at ) );
}


impl HistoryReporter for HttpHistoryReporter {
    fn notify_started( &self, track_id: &str ) {
        let Some( runtime ) = self.runtime.as_ref() else {
            return;
        };

        let body = ListenEvent {
            listener_id: self.listener_id.clone(),
            track_id: track_id.to_string(),
        };
        let request = self.client.post( self.save_url() ).json( &body );

        runtime.spawn( async move {
            match request.send().await {
                Ok( response ) if response.status().is_success() => {
                    tracing::debug!( "Saved listen for {}", body.track_id );
                }
                Ok( response ) => {
                    tracing::warn!(
                        "History store rejected listen for {}: {}",
                        body.track_id,
                        response.status()
                    );
                }
                Err( e ) => {
                    tracing::warn!( "Failed to save listen for {}: {}", body.track_id, e );
                }
            }
        });
    }
}


impl Drop for HttpHistoryReporter {
    fn drop( &mut self ) {
        if let Some( runtime ) = self.runtime.take() {
            runtime.shutdown_timeout( Duration::from_secs( SHUTDOWN_GRACE_SECS ) );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_listen_event_body() {
        let body = ListenEvent {
            listener_id: "u1".into(),
            track_id: "t9".into(),
        };
        let json = serde_json::to_value( &body ).unwrap();
        assert_eq!( json, serde_json::json!({ "listenerId": "u1", "trackId": "t9" }) );
    }


    #[test]
    fn test_records_sorted_newest_first() {
        let json = r#"[
            { "listenerId": "u1", "trackId": "a", "updatedAt": "2024-03-01T10:00:00Z" },
            { "listenerId": "u1", "trackId": "b", "updatedAt": "2024-03-02T10:00:00Z" },
            { "listenerId": "u1", "trackId": "c", "updatedAt": "2024-02-28T10:00:00Z" }
        ]"#;
        let mut records: Vec<ListenRecord> = serde_json::from_str( json ).unwrap();
        sort_recent_first( &mut records );

        let order: Vec<&str> = records.iter().map( |r| r.track_id.as_str() ).collect();
        assert_eq!( order, vec![ "b", "a", "c" ] );
    }


    #[test]
    fn test_invalid_url_rejected() {
        let result = HttpHistoryReporter::new( HistoryConfig::new( "ftp://store", "u1" ) );
        assert!( matches!( result, Err( HistoryError::InvalidUrl( _ ) ) ) );
    }


    #[test]
    fn test_endpoint_urls() {
        let reporter = HttpHistoryReporter::new( HistoryConfig::new( "http://localhost:3000/api/", "u1" ) ).unwrap();
        assert_eq!( reporter.save_url(), "http://localhost:3000/api/listen/save" );
        assert_eq!( reporter.songs_url(), "http://localhost:3000/api/listen/songs" );
        assert_eq!( reporter.listener_id(), "u1" );
    }


    /// Accepts one connection, answers 200 and hands back the raw request.
    fn serve_once() -> ( String, std::sync::mpsc::Receiver<String> ) {
        use std::io::{ Read, Write };

        let listener = std::net::TcpListener::bind( "127.0.0.1:0" ).unwrap();
        let base = format!( "http://{}/api", listener.local_addr().unwrap() );
        let ( tx, rx ) = std::sync::mpsc::channel();

        std::thread::spawn( move || {
            let ( mut stream, _ ) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut chunk = [ 0u8; 1024 ];

            loop {
                let n = stream.read( &mut chunk ).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice( &chunk[ ..n ] );

                let text = String::from_utf8_lossy( &request ).to_string();
                if let Some( header_end ) = text.find( "\r\n\r\n" ) {
                    let length = text[ ..header_end ].lines()
                        .filter_map( |l| l.split_once( ':' ) )
                        .find( |( k, _ )| k.eq_ignore_ascii_case( "content-length" ) )
                        .and_then( |( _, v )| v.trim().parse::<usize>().ok() )
                        .unwrap_or( 0 );
                    if request.len() >= header_end + 4 + length {
                        break;
                    }
                }
            }

            stream.write_all( b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n" ).unwrap();
            tx.send( String::from_utf8_lossy( &request ).to_string() ).unwrap();
        });

        ( base, rx )
    }


    #[test]
    fn test_notify_posts_one_listen() {
        let ( base, requests ) = serve_once();
        let reporter = HttpHistoryReporter::new( HistoryConfig::new( base, "u1" ) ).unwrap();

        reporter.notify_started( "t9" );
        let request = requests.recv_timeout( Duration::from_secs( 10 ) ).unwrap();

        let ( head, body ) = request.split_once( "\r\n\r\n" ).unwrap();
        assert!( head.starts_with( "POST /api/listen/save HTTP/1.1" ) );
        let body: serde_json::Value = serde_json::from_str( body ).unwrap();
        assert_eq!( body, serde_json::json!({ "listenerId": "u1", "trackId": "t9" }) );
        assert_eq!( request.matches( "POST " ).count(), 1 );
    }


    #[test]
    fn test_unreachable_store_does_not_block() {
        // Nothing listens on port 9; the failure is logged on the worker
        let reporter = HttpHistoryReporter::new( HistoryConfig::new( "http://127.0.0.1:9", "u1" ) ).unwrap();
        reporter.notify_started( "t1" );
        drop( reporter );
    }
}
