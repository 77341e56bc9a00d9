//! Transport command parsing.
//!
//! Commands are typed in the client as `/name [args]` and map onto the
//! playback session's transport controls.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;


/// Errors that can occur during command parsing.
#[derive( Debug, Error )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// Parsed transport command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    /// Play the 1-based playlist entry, or resume the current track.
    Play { index: Option<usize> },
    Pause,
    Toggle,
    Next,
    Prev,
    Seek { position: Duration },
    Help,
    Quit,
}


impl FromStr for Command {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        Command::parse( s )
    }
}


impl Command {
    /// Parses a command string (without the leading `/`).
    ///
    /// @param input - The command string to parse
    ///
    /// @returns The parsed command or an error
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let input = input.strip_prefix( '/' ).unwrap_or( input );
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() ).filter( |s| !s.is_empty() );

        match cmd.as_str() {
            "play" | "pl" => {
                let index = args.map( parse_index ).transpose()?;
                Ok( Command::Play { index } )
            }
            "pause" | "pa" => Ok( Command::Pause ),
            "toggle" | "t" => Ok( Command::Toggle ),
            "next" | "n" => Ok( Command::Next ),
            "prev" | "previous" | "p" => Ok( Command::Prev ),
            "seek" | "sk" => {
                let time_str = args
                    .ok_or_else( || CommandError::MissingArgument( "time position".into() ) )?;
                let position = parse_time( time_str )?;
                Ok( Command::Seek { position } )
            }
            "help" | "h" | "?" => Ok( Command::Help ),
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }
}


/// Parses a 1-based playlist position into a 0-based index.
fn parse_index( s: &str ) -> Result<usize, CommandError> {
    let n: usize = s.parse()
        .map_err( |_| CommandError::InvalidArgument( format!( "Invalid track number: {}", s ) ) )?;
    n.checked_sub( 1 )
        .ok_or_else( || CommandError::InvalidArgument( "Track numbers start at 1".into() ) )
}


/// Parses a time string like "1:30" or "90" into a Duration.
///
/// @param s - Time string in format "MM:SS", "M:SS", or just seconds
///
/// @returns Duration or error
pub fn parse_time( s: &str ) -> Result<Duration, CommandError> {
    let s = s.trim();

    if let Some(( min, sec )) = s.split_once( ':' ) {
        let minutes: u64 = min.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid minutes: {}", min ) ) )?;
        let seconds: u64 = sec.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) )?;
        if seconds >= 60 {
            return Err( CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) );
        }
        let total = minutes.checked_mul( 60 )
            .and_then( |m| m.checked_add( seconds ) )
            .ok_or_else( || CommandError::InvalidArgument( format!( "Time out of range: {}", s ) ) )?;
        Ok( Duration::from_secs( total ) )
    } else {
        let seconds: u64 = s.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid time: {}", s ) ) )?;
        Ok( Duration::from_secs( seconds ) )
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Commands:
  /play [n]       Play track n, or resume     [Enter]
  /pause          Pause playback
  /toggle         Toggle play/pause           [Space]
  /next           Next track                  [n]
  /prev           Previous track              [p]
  /seek <time>    Seek to position (1:30)     [←/→]
  /help           Show this help              [?]
  /quit           Exit echo                   [q]"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_play_without_index() {
        let cmd = Command::parse( "play" ).unwrap();
        assert_eq!( cmd, Command::Play { index: None } );
    }


    #[test]
    fn test_parse_play_index_is_one_based() {
        let cmd = Command::parse( "play 3" ).unwrap();
        assert_eq!( cmd, Command::Play { index: Some( 2 ) } );

        let result = Command::parse( "play 0" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_leading_slash() {
        let cmd: Command = "/next".parse().unwrap();
        assert_eq!( cmd, Command::Next );
    }


    #[test]
    fn test_parse_aliases() {
        assert_eq!( Command::parse( "p" ).unwrap(), Command::Prev );
        assert_eq!( Command::parse( "t" ).unwrap(), Command::Toggle );
        assert_eq!( Command::parse( "Q" ).unwrap(), Command::Quit );
    }


    #[test]
    fn test_parse_seek() {
        let cmd = Command::parse( "seek 1:30" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 90 ) } );
    }


    #[test]
    fn test_parse_seek_seconds() {
        let cmd = Command::parse( "seek 45" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 45 ) } );
    }


    #[test]
    fn test_parse_seek_bad_seconds() {
        let result = Command::parse( "seek 1:75" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_seek_overflow() {
        let result = Command::parse( "seek 999999999999999999:00" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );

        let result = parse_time( "307445734561825860:59" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_missing_arg() {
        let result = Command::parse( "seek" );
        assert!( matches!( result, Err( CommandError::MissingArgument( _ ) ) ) );
    }
}
