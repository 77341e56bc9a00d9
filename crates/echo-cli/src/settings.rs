//! Application settings management
//!
//! Persistent settings for the history store, the toggle key and playback
//! defaults.

use std::fs;
use std::path::{ Path, PathBuf };

use serde::{ Deserialize, Serialize };


/// Application settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Base URL of the listen history store; no reporting when unset
    pub history_url: Option<String>,

    /// Listener id sent with every listen
    pub listener_id: String,

    /// Key that toggles play/pause
    pub toggle_key: String,

    /// Shuffle the starting playlist
    pub shuffle: bool,

    /// Output volume (0.0 to 1.0)
    pub volume: f32,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            history_url: None,
            listener_id: "guest".to_string(),
            toggle_key: "space".to_string(),
            shuffle: false,
            volume: 1.0,
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "echo" ).join( "settings.json" ) )
    }


    /// Loads settings from disk, or returns defaults if not found.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some( path ) => Self::load_from( &path ),
            None => Self::default(),
        }
    }


    /// Loads settings from a specific file.
    pub fn load_from( path: &Path ) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( path ) {
            Ok( contents ) => {
                serde_json::from_str( &contents ).unwrap_or_else( |e| {
                    tracing::warn!( "Ignoring malformed settings: {}", e );
                    Self::default()
                })
            }
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    /// Saves settings to disk.
    pub fn save( &self ) {
        if let Some( path ) = Self::settings_path() {
            self.save_to( &path );
        }
    }


    /// Saves settings to a specific file.
    pub fn save_to( &self, path: &Path ) {
        // Create parent directory if needed
        if let Some( parent ) = path.parent() {
            if !parent.exists() {
                if let Err( e ) = fs::create_dir_all( parent ) {
                    tracing::warn!( "Failed to create settings directory: {}", e );
                    return;
                }
            }
        }

        match serde_json::to_string_pretty( self ) {
            Ok( json ) => {
                if let Err( e ) = fs::write( path, json ) {
                    tracing::warn!( "Failed to save settings: {}", e );
                }
            }
            Err( e ) => {
                tracing::warn!( "Failed to serialize settings: {}", e );
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn temp_path( name: &str ) -> PathBuf {
        std::env::temp_dir()
            .join( format!( "echo-settings-{}-{}", name, std::process::id() ) )
            .join( "settings.json" )
    }


    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: Settings = serde_json::from_str( r#"{ "shuffle": true }"# ).unwrap();
        assert!( settings.shuffle );
        assert_eq!( settings.toggle_key, "space" );
        assert_eq!( settings.listener_id, "guest" );
        assert_eq!( settings.history_url, None );
    }


    #[test]
    fn test_save_then_load() {
        let path = temp_path( "roundtrip" );
        let settings = Settings {
            history_url: Some( "http://localhost:3000/api".into() ),
            listener_id: "u42".into(),
            volume: 0.5,
            ..Settings::default()
        };
        settings.save_to( &path );

        assert_eq!( Settings::load_from( &path ), settings );
        let _ = fs::remove_dir_all( path.parent().unwrap() );
    }


    #[test]
    fn test_malformed_file_falls_back() {
        let path = temp_path( "malformed" );
        fs::create_dir_all( path.parent().unwrap() ).unwrap();
        fs::write( &path, "{ not json" ).unwrap();

        assert_eq!( Settings::load_from( &path ), Settings::default() );
        let _ = fs::remove_dir_all( path.parent().unwrap() );
    }
}
