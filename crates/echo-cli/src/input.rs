//! Input handling for the TUI.
//!
//! Holds the global play/pause binding, the current input mode, and the
//! buffer used while typing a slash command.

use crossterm::event::KeyCode;

use echo_core::{ AudioTransport, PlaybackSession };


/// Current input mode of the application.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum InputMode {
    /// Normal mode - keyboard shortcuts active.
    #[default]
    Normal,

    /// Command mode - typing a slash command.
    Command,
}


/// The single global key that toggles playback.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct InputBinding {
    key: KeyCode,
}


impl Default for InputBinding {
    fn default() -> Self {
        Self { key: KeyCode::Char( ' ' ) }
    }
}


impl InputBinding {
    /// Parses a key name like "space", "enter", "tab" or a single character.
    pub fn parse( name: &str ) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        let key = match lower.as_str() {
            "space" | " " => KeyCode::Char( ' ' ),
            "enter" | "return" => KeyCode::Enter,
            "tab" => KeyCode::Tab,
            _ => {
                let mut chars = name.trim().chars();
                match ( chars.next(), chars.next() ) {
                    ( Some( c ), None ) => KeyCode::Char( c ),
                    _ => return None,
                }
            }
        };
        Some( Self { key } )
    }


    /// Gets the bound key.
    pub fn key( &self ) -> KeyCode {
        self.key
    }


    /// Label for the help line.
    pub fn label( &self ) -> String {
        match self.key {
            KeyCode::Char( ' ' ) => "Space".to_string(),
            KeyCode::Char( c ) => c.to_string(),
            KeyCode::Enter => "Enter".to_string(),
            KeyCode::Tab => "Tab".to_string(),
            other => format!( "{:?}", other ),
        }
    }


    /// Toggles the session if `code` is the bound key and a track is selected.
    ///
    /// @returns true if the key was consumed
    pub fn handle<T: AudioTransport>( &self, code: KeyCode, session: &mut PlaybackSession<T> ) -> bool {
        if code != self.key || session.current_track().is_none() {
            return false;
        }
        session.toggle();
        true
    }
}


/// Input buffer for command text entry.
#[derive( Debug, Default )]
pub struct InputBuffer {
    content: String,
    cursor: usize,
}


impl InputBuffer {
    /// Creates a new empty input buffer.
    pub fn new() -> Self {
        Self::default()
    }


    /// Inserts a character at the cursor position.
    pub fn insert( &mut self, c: char ) {
        self.content.insert( self.cursor, c );
        self.cursor += c.len_utf8();
    }


    /// Deletes the character before the cursor.
    pub fn backspace( &mut self ) {
        if self.cursor > 0 {
            let prev_char_boundary = self.content[ ..self.cursor ]
                .char_indices()
                .last()
                .map( |( i, _ )| i )
                .unwrap_or( 0 );
            self.content.remove( prev_char_boundary );
            self.cursor = prev_char_boundary;
        }
    }


    /// Clears the buffer.
    pub fn clear( &mut self ) {
        self.content.clear();
        self.cursor = 0;
    }


    /// Gets the current content.
    pub fn content( &self ) -> &str {
        &self.content
    }


    /// Gets the cursor position as character count (for display).
    pub fn cursor_char_pos( &self ) -> usize {
        self.content[ ..self.cursor ].chars().count()
    }


    /// Moves cursor left by one character.
    pub fn move_left( &mut self ) {
        if self.cursor > 0 {
            self.cursor = self.content[ ..self.cursor ]
                .char_indices()
                .last()
                .map( |( i, _ )| i )
                .unwrap_or( 0 );
        }
    }


    /// Moves cursor right by one character.
    pub fn move_right( &mut self ) {
        if self.cursor < self.content.len() {
            self.cursor = self.content[ self.cursor.. ]
                .char_indices()
                .nth( 1 )
                .map( |( i, _ )| self.cursor + i )
                .unwrap_or( self.content.len() );
        }
    }


    /// Returns true if the buffer is empty.
    pub fn is_empty( &self ) -> bool {
        self.content.is_empty()
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use echo_core::{ SimulatedTransport, Track };


    #[test]
    fn test_parse_binding() {
        assert_eq!( InputBinding::parse( "space" ), Some( InputBinding::default() ) );
        assert_eq!( InputBinding::parse( "K" ).map( |b| b.key() ), Some( KeyCode::Char( 'K' ) ) );
        assert_eq!( InputBinding::parse( "Enter" ).map( |b| b.key() ), Some( KeyCode::Enter ) );
        assert_eq!( InputBinding::parse( "ctrl+x" ), None );
        assert_eq!( InputBinding::default().label(), "Space" );
    }


    #[test]
    fn test_binding_ignored_without_track() {
        let mut session = PlaybackSession::new( SimulatedTransport::new() );
        let binding = InputBinding::default();
        assert!( !binding.handle( KeyCode::Char( ' ' ), &mut session ) );
        assert_eq!( session.generation(), 0 );
    }


    #[test]
    fn test_binding_toggles_session() {
        let mut session = PlaybackSession::new( SimulatedTransport::new() );
        session.play( Track::new( "a", "A", "Artist", "a.mp3" ), None );
        let binding = InputBinding::default();

        assert!( !binding.handle( KeyCode::Char( 'x' ), &mut session ) );
        assert!( session.is_playing() );
        assert!( binding.handle( KeyCode::Char( ' ' ), &mut session ) );
        assert!( !session.is_playing() );
        assert!( binding.handle( KeyCode::Char( ' ' ), &mut session ) );
        assert!( session.is_playing() );
    }


    #[test]
    fn test_buffer_editing() {
        let mut buffer = InputBuffer::new();
        for c in "sek".chars() {
            buffer.insert( c );
        }
        buffer.move_left();
        buffer.insert( 'e' );
        assert_eq!( buffer.content(), "seek" );
        assert_eq!( buffer.cursor_char_pos(), 3 );

        buffer.move_right();
        buffer.backspace();
        assert_eq!( buffer.content(), "see" );
        buffer.clear();
        assert!( buffer.is_empty() );
    }
}
