//! Echo CLI - Terminal music player

mod catalog;
mod cli;
mod input;
mod settings;
mod view;

use std::fs::{ self, File };
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{ Duration, Instant };

use anyhow::{ bail, Context, Result };
use clap::Parser;
use crossterm::{
    event::{ self, Event, KeyCode, KeyEventKind },
    terminal::{ disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen },
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{ Block, Borders, List, ListItem, ListState, Paragraph, Wrap },
};
use tracing::Level;

use catalog::Catalog;
use cli::Args;
use input::{ InputBinding, InputBuffer, InputMode };
use settings::Settings;
use view::{ format_time, progress, ViewMode };

use echo_core::{
    command, AudioTransport, Command, DeviceTransport, HistoryConfig, HttpHistoryReporter,
    PlaybackSession, PlaybackState, Playlist, SimulatedTransport,
};


/// Seek step for the arrow keys, in seconds.
const SEEK_STEP_SECS: f64 = 5.0;


/// Application state.
struct App<T: AudioTransport> {
    session: PlaybackSession<T>,
    should_quit: bool,

    // Playlist shown before anything plays
    library: Playlist,
    listener_id: String,

    // View state
    view_mode: ViewMode,
    playlist_state: ListState,
    help_scroll: u16,

    // Flag to scroll to playing track without changing selection
    scroll_to_playing: bool,
    last_generation: u64,
    reported_failure: Option<u64>,

    // Input state
    input_mode: InputMode,
    input_buffer: InputBuffer,
    binding: InputBinding,

    // Status message (shown in status bar)
    status_message: Option<String>,
    status_clear_at: Option<Instant>,
}


impl<T: AudioTransport> App<T> {
    fn new( session: PlaybackSession<T>, library: Playlist, binding: InputBinding, listener_id: String ) -> Self {
        let mut playlist_state = ListState::default();
        if !library.is_empty() {
            playlist_state.select( Some( 0 ) );
        }

        Self {
            session,
            should_quit: false,
            library,
            listener_id,
            view_mode: ViewMode::Playlist,
            playlist_state,
            help_scroll: 0,
            scroll_to_playing: false,
            last_generation: 0,
            reported_failure: None,
            input_mode: InputMode::Normal,
            input_buffer: InputBuffer::new(),
            binding,
            status_message: None,
            status_clear_at: None,
        }
    }


    /// Playlist the list widget shows: the session's once it has one.
    fn visible_playlist( &self ) -> &Playlist {
        if self.session.playlist().is_empty() {
            &self.library
        } else {
            self.session.playlist()
        }
    }


    /// Sets a status message that auto-clears after a delay.
    fn set_status( &mut self, msg: impl Into<String> ) {
        self.status_message = Some( msg.into() );
        self.status_clear_at = Some( Instant::now() + Duration::from_secs( 3 ) );
    }


    /// Clears expired messages and applies transport notifications.
    fn tick( &mut self ) {
        if let Some( clear_at ) = self.status_clear_at {
            if Instant::now() >= clear_at {
                self.status_message = None;
                self.status_clear_at = None;
            }
        }

        self.session.process_events();

        let generation = self.session.generation();
        if generation != self.last_generation {
            self.last_generation = generation;
            self.scroll_to_playing = true;
        }

        if self.session.state() == PlaybackState::Failed && self.reported_failure != Some( generation ) {
            self.reported_failure = Some( generation );
            let title = self.session.current_track().map( |t| t.title.clone() ).unwrap_or_default();
            let reason = self.session.last_error().unwrap_or( "unknown error" ).to_string();
            self.set_status( format!( "Cannot play {}: {}", title, reason ) );
        }
    }


    fn handle_key( &mut self, code: KeyCode ) {
        match self.input_mode {
            InputMode::Normal => self.handle_normal_key( code ),
            InputMode::Command => self.handle_command_key( code ),
        }
    }


    fn handle_normal_key( &mut self, code: KeyCode ) {
        if self.binding.handle( code, &mut self.session ) {
            return;
        }

        // Global keys
        match code {
            KeyCode::Char( '/' ) => {
                self.input_mode = InputMode::Command;
                self.input_buffer.clear();
                return;
            }
            KeyCode::Char( '?' ) => {
                self.view_mode = self.view_mode.toggle_help();
                self.help_scroll = 0;
                return;
            }
            KeyCode::Char( 'q' ) => {
                self.should_quit = true;
                return;
            }
            _ => {}
        }

        match self.view_mode {
            ViewMode::Playlist => self.handle_playlist_key( code ),
            ViewMode::Help => self.handle_help_key( code ),
        }
    }


    fn handle_playlist_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Char( 'n' ) => self.session.next(),
            KeyCode::Char( 'p' ) => self.session.previous(),
            KeyCode::Left => self.session.seek_by( -SEEK_STEP_SECS ),
            KeyCode::Right => self.session.seek_by( SEEK_STEP_SECS ),
            KeyCode::Up | KeyCode::Char( 'k' ) => self.playlist_select_previous(),
            KeyCode::Down | KeyCode::Char( 'j' ) => self.playlist_select_next(),
            KeyCode::Enter => self.play_selected(),
            _ => {}
        }
    }


    fn handle_help_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Esc => self.view_mode = ViewMode::Playlist,
            KeyCode::Up | KeyCode::Char( 'k' ) => self.help_scroll = self.help_scroll.saturating_sub( 1 ),
            KeyCode::Down | KeyCode::Char( 'j' ) => self.help_scroll = self.help_scroll.saturating_add( 1 ),
            _ => {}
        }
    }


    fn handle_command_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Enter => {
                let input = self.input_buffer.content().to_string();
                self.execute_command( &input );
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
            }
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
            }
            KeyCode::Backspace => {
                if self.input_buffer.is_empty() {
                    self.input_mode = InputMode::Normal;
                } else {
                    self.input_buffer.backspace();
                }
            }
            KeyCode::Left => self.input_buffer.move_left(),
            KeyCode::Right => self.input_buffer.move_right(),
            KeyCode::Char( c ) => self.input_buffer.insert( c ),
            _ => {}
        }
    }


    fn execute_command( &mut self, input: &str ) {
        match Command::parse( input ) {
            Ok( cmd ) => self.run_command( cmd ),
            Err( e ) => self.set_status( e.to_string() ),
        }
    }


    fn run_command( &mut self, cmd: Command ) {
        match cmd {
            Command::Play { index: Some( index ) } => {
                if !self.play_at( index ) {
                    self.set_status( format!( "No track {}", index + 1 ) );
                }
            }
            Command::Play { index: None } => {
                if self.session.current_track().is_none() {
                    self.play_selected();
                } else if !self.session.is_playing() {
                    self.session.toggle();
                }
            }
            Command::Pause => self.session.pause(),
            Command::Toggle => self.session.toggle(),
            Command::Next => self.session.next(),
            Command::Prev => self.session.previous(),
            Command::Seek { position } => self.session.seek_to( position.as_secs_f64() ),
            Command::Help => {
                self.view_mode = ViewMode::Help;
                self.help_scroll = 0;
            }
            Command::Quit => self.should_quit = true,
        }
    }


    fn playlist_select_next( &mut self ) {
        let len = self.visible_playlist().len();
        if len == 0 {
            return;
        }

        let i = match self.playlist_state.selected() {
            Some( i ) => if i >= len - 1 { 0 } else { i + 1 },
            None => 0,
        };
        self.playlist_state.select( Some( i ) );
    }


    fn playlist_select_previous( &mut self ) {
        let len = self.visible_playlist().len();
        if len == 0 {
            return;
        }

        let i = match self.playlist_state.selected() {
            Some( i ) => if i == 0 { len - 1 } else { i - 1 },
            None => 0,
        };
        self.playlist_state.select( Some( i ) );
    }


    fn play_selected( &mut self ) {
        if let Some( index ) = self.playlist_state.selected() {
            self.play_at( index );
        }
    }


    /// Plays entry `index` of the visible playlist.
    fn play_at( &mut self, index: usize ) -> bool {
        let playlist = self.visible_playlist().clone();
        let Some( track ) = playlist.get( index ).cloned() else {
            return false;
        };
        self.session.play( track, Some( playlist ) );
        self.playlist_state.select( Some( index ) );
        true
    }
}


/// Sends tracing output to a log file; the terminal belongs to the UI.
fn init_logging( verbose: bool ) -> Result<PathBuf> {
    let dir = dirs::data_local_dir()
        .unwrap_or_else( std::env::temp_dir )
        .join( "echo" );
    fs::create_dir_all( &dir )
        .with_context( || format!( "Failed to create log directory {}", dir.display() ) )?;

    let path = dir.join( "echo.log" );
    let file = File::create( &path )
        .with_context( || format!( "Failed to create log file {}", path.display() ) )?;

    tracing_subscriber::fmt()
        .with_max_level( if verbose { Level::DEBUG } else { Level::INFO } )
        .with_ansi( false )
        .with_writer( Mutex::new( file ) )
        .init();

    Ok( path )
}


fn main() -> Result<()> {
    let args = Args::parse();
    let log_path = init_logging( args.verbose )?;
    let settings = Settings::load();

    tracing::info!( "Starting echo {}, logging to {}", env!( "CARGO_PKG_VERSION" ), log_path.display() );

    let listener_id = args.listener.clone().unwrap_or_else( || settings.listener_id.clone() );
    let history_url = args.history_url.clone().or_else( || settings.history_url.clone() );

    let reporter = match history_url {
        Some( url ) => match HttpHistoryReporter::new( HistoryConfig::new( url, listener_id.clone() ) ) {
            Ok( reporter ) => Some( reporter ),
            Err( e ) => {
                tracing::warn!( "Listen history disabled: {}", e );
                None
            }
        },
        None => None,
    };

    let catalog = args.catalog.as_deref().map( Catalog::load ).transpose()?;
    let library = build_library( &args, &settings, catalog.as_ref(), reporter.as_ref() )?;

    let binding = InputBinding::parse( &settings.toggle_key ).unwrap_or_else( || {
        tracing::warn!( "Unknown toggle key '{}', using space", settings.toggle_key );
        InputBinding::default()
    });
    let autoplay = !args.files.is_empty() || args.listen_again;

    let result = if args.simulate {
        let session = PlaybackSession::with_history( SimulatedTransport::realtime(), reporter );
        run( App::new( session, library, binding, listener_id ), autoplay )
    } else {
        let mut transport = DeviceTransport::new();
        transport.set_volume( settings.volume );
        let session = PlaybackSession::with_history( transport, reporter );
        run( App::new( session, library, binding, listener_id ), autoplay )
    };

    settings.save();
    result
}


/// Resolves the starting playlist from files, history or the catalog.
fn build_library(
    args: &Args,
    settings: &Settings,
    catalog: Option<&Catalog>,
    reporter: Option<&HttpHistoryReporter>,
) -> Result<Playlist> {
    if args.listen_again {
        let Some( reporter ) = reporter else {
            bail!( "--listen-again needs a history URL" );
        };
        let Some( catalog ) = catalog else {
            bail!( "--listen-again needs a catalog" );
        };
        let records = reporter.recent().context( "Failed to fetch listen history" )?;
        return Ok( catalog.listen_again( &records ) );
    }

    let mut tracks = if !args.files.is_empty() {
        catalog::tracks_from_paths( &args.files )?
    } else if let Some( catalog ) = catalog {
        catalog.playlist( args.playlist.as_deref() )?.iter().cloned().collect()
    } else {
        Vec::new()
    };

    if args.shuffle || settings.shuffle {
        catalog::shuffle( &mut tracks );
    }

    Ok( Playlist::from( tracks ) )
}


/// Runs the UI loop until quit, restoring the terminal either way.
fn run<T: AudioTransport>( mut app: App<T>, autoplay: bool ) -> Result<()> {
    if autoplay {
        app.play_at( 0 );
    }

    enable_raw_mode()?;
    io::stdout().execute( EnterAlternateScreen )?;

    // Leave raw mode before the default hook prints the panic
    let default_hook = std::panic::take_hook();
    std::panic::set_hook( Box::new( move |info| {
        let _ = disable_raw_mode();
        let _ = io::stdout().execute( LeaveAlternateScreen );
        tracing::error!( "Panic: {}", info );
        default_hook( info );
    }));

    let result = event_loop( &mut app );

    disable_raw_mode()?;
    io::stdout().execute( LeaveAlternateScreen )?;

    app.session.shutdown();
    result
}


fn event_loop<T: AudioTransport>( app: &mut App<T> ) -> Result<()> {
    let mut terminal = Terminal::new( CrosstermBackend::new( io::stdout() ) )?;

    loop {
        app.tick();

        terminal.draw( |frame| draw_ui( frame, app ) )?;

        if event::poll( Duration::from_millis( 100 ) )? {
            if let Event::Key( key ) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key( key.code );
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}


/// Draws the main UI.
fn draw_ui<T: AudioTransport>( frame: &mut Frame, app: &mut App<T> ) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Length( 2 ),  // Header
            Constraint::Min( 0 ),     // Main content
            Constraint::Length( 5 ),  // Now playing
            Constraint::Length( 1 ),  // Status bar
        ])
        .split( area );

    let header = Paragraph::new( format!( "  ECHO - {}", app.view_mode.label() ) )
        .style( Style::default().fg( Color::Cyan ).bold() )
        .block( Block::default().borders( Borders::BOTTOM ) );
    frame.render_widget( header, chunks[0] );

    match app.view_mode {
        ViewMode::Playlist => draw_playlist( frame, app, chunks[1] ),
        ViewMode::Help => draw_help( frame, app, chunks[1] ),
    }

    draw_now_playing( frame, app, chunks[2] );
    draw_status_bar( frame, app, chunks[3] );
}


fn draw_playlist<T: AudioTransport>( frame: &mut Frame, app: &mut App<T>, area: Rect ) {
    let playing_index = if app.session.playlist().is_empty() {
        None
    } else {
        app.session.current_index()
    };

    // Scroll to the playing track without changing selection
    if app.scroll_to_playing {
        if let Some( playing_idx ) = playing_index {
            let visible_height = area.height.saturating_sub( 2 ) as usize;
            if visible_height > 0 {
                let current_offset = app.playlist_state.offset();
                let is_visible = playing_idx >= current_offset
                    && playing_idx < current_offset + visible_height;

                if !is_visible {
                    *app.playlist_state.offset_mut() = playing_idx.saturating_sub( visible_height / 2 );
                }
            }
        }
        app.scroll_to_playing = false;
    }

    let playlist = app.visible_playlist().clone();
    let items: Vec<ListItem> = playlist
        .iter()
        .enumerate()
        .map( |( i, track )| {
            let prefix = if Some( i ) == playing_index { "▶ " } else { "  " };
            let line = Line::from( vec![
                Span::raw( format!( "{}{}", prefix, track.title ) ),
                Span::styled( format!( "  {}", track.artist ), Style::default().fg( Color::Gray ) ),
            ]);
            ListItem::new( line )
        })
        .collect();

    let title = format!( " Playlist ({}) ", playlist.len() );

    let playlist_widget = List::new( items )
        .block( Block::default().title( title ).borders( Borders::ALL ) )
        .highlight_style( Style::default().bg( Color::DarkGray ) )
        .highlight_symbol( ">> " );

    frame.render_stateful_widget( playlist_widget, area, &mut app.playlist_state );
}


fn draw_help<T: AudioTransport>( frame: &mut Frame, app: &mut App<T>, area: Rect ) {
    let help_text = command::help_text();
    let line_count = help_text.lines().count() as u16;
    let visible_height = area.height.saturating_sub( 2 );

    let max_scroll = line_count.saturating_sub( visible_height );
    if app.help_scroll > max_scroll {
        app.help_scroll = max_scroll;
    }

    let help = Paragraph::new( help_text )
        .block( Block::default()
            .title( " Help (↑↓ scroll, ? or Esc to close) " )
            .borders( Borders::ALL )
        )
        .wrap( Wrap { trim: false } )
        .scroll(( app.help_scroll, 0 ));

    frame.render_widget( help, area );
}


fn draw_now_playing<T: AudioTransport>( frame: &mut Frame, app: &App<T>, area: Rect ) {
    let session = &app.session;
    let state_str = match session.state() {
        PlaybackState::Playing => "▶",
        PlaybackState::Paused => "⏸",
        PlaybackState::Loading => "…",
        PlaybackState::Failed => "✗",
        PlaybackState::Ended | PlaybackState::Idle => "■",
    };

    let ( title, artist ) = match session.current_track() {
        Some( track ) => ( track.title.clone(), track.artist.clone() ),
        None => ( "No track".to_string(), String::new() ),
    };

    let position = session.position();
    let duration = session.duration();

    let progress_width = 20;
    let filled = ( progress( position, duration ) * progress_width as f64 ).round() as usize;
    let bar = format!(
        "[{}{}]",
        "━".repeat( filled ),
        "─".repeat( progress_width - filled )
    );

    let mut lines = vec![
        Line::from( Span::styled( format!( " {} {} ", state_str, title ), Style::default().bold() ) ),
    ];

    if !artist.is_empty() {
        lines.push( Line::from( Span::styled( format!( "   {} ", artist ), Style::default().fg( Color::Gray ) ) ) );
    }

    lines.push( Line::from( format!(
        " {} {} / {}  {} ",
        bar,
        format_time( position ),
        format_time( duration ),
        session.state().label()
    )));

    let now_playing = Paragraph::new( lines )
        .block( Block::default()
            .title( format!( " Now Playing · {} ", app.listener_id ) )
            .borders( Borders::ALL )
        );

    frame.render_widget( now_playing, area );
}


fn draw_status_bar<T: AudioTransport>( frame: &mut Frame, app: &App<T>, area: Rect ) {
    let ( text, style ) = match app.input_mode {
        InputMode::Command => {
            ( format!( "/{}", app.input_buffer.content() ), Style::default().fg( Color::Yellow ) )
        }
        InputMode::Normal => {
            if let Some( ref msg ) = app.status_message {
                ( msg.clone(), Style::default().fg( Color::Green ) )
            } else {
                let hint = match app.view_mode {
                    ViewMode::Playlist => format!(
                        " [{}]Play/Pause [n/p]Skip [←→]Seek [Enter]Play [/]Cmd [?]Help [q]Quit ",
                        app.binding.label()
                    ),
                    ViewMode::Help => " [?]Close [Esc]Close ".to_string(),
                };
                ( hint, Style::default().fg( Color::DarkGray ) )
            }
        }
    };

    let status = Paragraph::new( text ).style( style );
    frame.render_widget( status, area );

    if app.input_mode == InputMode::Command {
        let cursor_x = area.x + 1 + app.input_buffer.cursor_char_pos() as u16;
        frame.set_cursor_position(( cursor_x, area.y ));
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use echo_core::Track;


    fn app() -> App<SimulatedTransport> {
        let library: Playlist = [ "a", "b", "c" ].iter()
            .map( |id| Track::new( *id, id.to_uppercase(), "Artist", format!( "{}.mp3", id ) ) )
            .collect();
        let session = PlaybackSession::new( SimulatedTransport::new() );
        App::new( session, library, InputBinding::default(), "tester".into() )
    }


    #[test]
    fn test_enter_plays_selection_with_library() {
        let mut app = app();
        app.handle_key( KeyCode::Down );
        app.handle_key( KeyCode::Enter );
        app.tick();

        assert_eq!( app.session.current_track().map( |t| t.id.as_str() ), Some( "b" ) );
        assert_eq!( app.session.current_index(), Some( 1 ) );
        assert_eq!( app.session.playlist().len(), 3 );
        assert_eq!( app.session.state(), PlaybackState::Playing );
    }


    #[test]
    fn test_toggle_key_needs_a_track() {
        let mut app = app();
        app.handle_key( KeyCode::Char( ' ' ) );
        assert!( app.session.current_track().is_none() );

        app.play_at( 0 );
        app.handle_key( KeyCode::Char( ' ' ) );
        assert!( !app.session.is_playing() );
    }


    #[test]
    fn test_slash_command() {
        let mut app = app();
        for c in "/play 3".chars() {
            app.handle_key( KeyCode::Char( c ) );
        }
        app.handle_key( KeyCode::Enter );

        assert_eq!( app.input_mode, InputMode::Normal );
        assert_eq!( app.session.current_track().map( |t| t.id.as_str() ), Some( "c" ) );
    }


    #[test]
    fn test_bad_command_sets_status() {
        let mut app = app();
        app.execute_command( "play 9" );
        assert_eq!( app.status_message.as_deref(), Some( "No track 9" ) );
        app.execute_command( "bogus" );
        assert!( app.status_message.as_deref().unwrap_or_default().contains( "Unknown" ) );
    }


    #[test]
    fn test_failure_reported_once() {
        let library = Playlist::from( vec![ Track::new( "x", "X", "Artist", "x.mp3" ) ] );
        let session = PlaybackSession::new( SimulatedTransport::new().with_failing_source( "x.mp3" ) );
        let mut app = App::new( session, library, InputBinding::default(), "tester".into() );

        app.play_at( 0 );
        app.tick();
        assert!( app.status_message.as_deref().unwrap_or_default().starts_with( "Cannot play X" ) );

        app.status_message = None;
        app.tick();
        assert!( app.status_message.is_none() );
    }


    #[test]
    fn test_quit_key() {
        let mut app = app();
        app.handle_key( KeyCode::Char( 'q' ) );
        assert!( app.should_quit );
    }
}
