use std::{error::Error, path::PathBuf, process, time::Duration};

use clap::{command, Parser, Subcommand, ValueEnum, ValueHint};
use log::{debug, error, info, trace, warn, LevelFilter};
use tokio::sync::broadcast::error::RecvError;

use trackside::{
    config::Config,
    events::Event,
    player::RepeatMode,
    protocol::MediaKind,
    search::SearchKind,
    signal::{Handler, Trigger},
    Session,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// How long to wait for the service to acknowledge a close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    ///
    /// TOML file with connection and session settings. Command line options
    /// take precedence over it.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, env = "TRACKSIDE_CONFIG")]
    config: Option<PathBuf>,

    /// Host the player listens on
    ///
    /// [default: 127.0.0.1]
    #[arg(long, value_hint = ValueHint::Hostname)]
    host: Option<String>,

    /// Port the player listens on
    ///
    /// [default: 26369]
    #[arg(short, long)]
    port: Option<u16>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    action: Action,
}

#[derive(Clone, Debug, Subcommand)]
enum Action {
    /// Print player events until interrupted
    ///
    /// SIGHUP drops the connection and opens a new one.
    Watch,

    /// Resume playback
    Play,

    /// Pause playback
    Pause,

    /// Skip to the next track
    Next,

    /// Go back to the previous track
    Previous,

    /// Seek within the current track
    Seek {
        /// Position, in seconds unless `--millis` is given
        position: f64,

        /// Read the position as milliseconds
        #[arg(long, default_value_t = false)]
        millis: bool,
    },

    /// Set the volume
    Volume {
        /// Volume from 0.0 to 1.0
        ratio: f64,
    },

    /// Set the repeat mode
    ///
    /// Without a mode, advance it by one: off, track, queue, off.
    Repeat {
        #[arg(value_enum)]
        mode: Option<Repeat>,
    },

    /// Turn shuffle on or off
    ///
    /// Without a state, toggle it.
    Shuffle {
        #[arg(value_enum)]
        state: Option<Switch>,
    },

    /// Turn autoplay on or off
    Autoplay {
        #[arg(value_enum)]
        state: Switch,
    },

    /// Play a catalog item, replacing the queue
    PlayId {
        id: String,

        #[arg(short, long, value_enum, default_value_t = Media::Song)]
        kind: Media,
    },

    /// Play a catalog item after the current track
    PlayNext {
        id: String,

        #[arg(short, long, value_enum, default_value_t = Media::Song)]
        kind: Media,
    },

    /// Append a catalog item to the queue
    Enqueue {
        id: String,

        #[arg(short, long, value_enum, default_value_t = Media::Song)]
        kind: Media,
    },

    /// Move a queue item to another position
    Move {
        /// Index of the item to move, as listed by `queue`
        from: usize,

        /// Index to move it to
        to: usize,
    },

    /// Quit the player application
    Quit,

    /// Show the current track and player state
    NowPlaying,

    /// List the play queue
    Queue,

    /// Print the lyrics of the current track
    Lyrics {
        /// Include timestamps and translations
        #[arg(long, default_value_t = false)]
        timed: bool,
    },

    /// Search the catalog
    Search {
        query: String,

        #[arg(short, long, value_enum, default_value_t = Kind::Song)]
        kind: Kind,

        /// Number of results, from 1 to 50
        #[arg(short, long, default_value_t = 10)]
        limit: u8,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Repeat {
    Off,
    Track,
    Queue,
}

impl From<Repeat> for RepeatMode {
    fn from(repeat: Repeat) -> Self {
        match repeat {
            Repeat::Off => Self::Off,
            Repeat::Track => Self::Track,
            Repeat::Queue => Self::Queue,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl From<Switch> for bool {
    fn from(switch: Switch) -> Self {
        matches!(switch, Switch::On)
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Media {
    Song,
    Album,
    Playlist,
    Station,
    MusicVideo,
}

impl From<Media> for MediaKind {
    fn from(media: Media) -> Self {
        match media {
            Media::Song => Self::Song,
            Media::Album => Self::Album,
            Media::Playlist => Self::Playlist,
            Media::Station => Self::Station,
            Media::MusicVideo => Self::MusicVideo,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Kind {
    Song,
    Album,
    Artist,
    Playlist,
}

impl From<Kind> for SearchKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Song => Self::Song,
            Kind::Album => Self::Album,
            Kind::Artist => Self::Artist,
            Kind::Playlist => Self::Playlist,
        }
    }
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            // Quiet and verbose are mutually exclusive, and `verbose` is 0 by
            // default. So this arm means: quiet mode.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Builds the configuration from the optional file and the command line.
fn load_config(args: &Args) -> Result<Config, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(host) = &args.host {
        config.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    config.validate()?;
    Ok(config)
}

/// Prints events until a shutdown signal arrives or the player goes away.
async fn watch(session: &Session) -> Result<(), Box<dyn Error>> {
    let mut signals = Handler::new()?;
    let mut events = session.subscribe();

    if let Some(track) = session.track() {
        println!("{track}");
    }

    loop {
        tokio::select! {
            // Prioritize signals.
            biased;

            trigger = signals.recv() => {
                if trigger.is_shutdown() {
                    info!("received {trigger}, shutting down gracefully");
                    break Ok(());
                }

                info!("received {trigger}, reconnecting");
                session.close();
                session.closed().await;
                events = events.resubscribe();
                session.connect().await?;
            }

            event = events.recv() => match event {
                Ok(Event::Disconnected) => {
                    break Err("player closed the connection".into());
                }
                Ok(Event::Frame { tag, .. }) => trace!("frame: {tag}"),
                Ok(Event::TimingChanged(timing)) => debug!("{timing}"),
                Ok(event) => println!("{event}"),
                Err(RecvError::Lagged(skipped)) => warn!("skipped {skipped} events"),
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    }
}

/// Runs one action against a connected session.
async fn perform(session: &Session, action: Action) -> Result<(), Box<dyn Error>> {
    match action {
        Action::Watch => watch(session).await?,
        Action::Play => session.play()?,
        Action::Pause => session.pause()?,
        Action::Next => session.next()?,
        Action::Previous => session.previous()?,
        Action::Seek { position, millis } => session.seek(position, millis)?,
        Action::Volume { ratio } => session.set_volume(ratio)?,
        Action::Repeat { mode: None } => session.cycle_repeat()?,
        Action::Repeat { mode: Some(mode) } => {
            session.set_repeat(RepeatMode::from(mode) as u8).await?;
        }
        Action::Shuffle { state: None } => session.toggle_shuffle()?,
        Action::Shuffle { state: Some(state) } => session.set_shuffle(state.into()).await?,
        Action::Autoplay { state } => session.set_autoplay(state.into())?,
        Action::PlayId { id, kind } => session.play_by_id(&id, kind.into())?,
        Action::PlayNext { id, kind } => session.play_next_by_id(&id, kind.into())?,
        Action::Enqueue { id, kind } => session.enqueue_by_id(&id, kind.into())?,
        Action::Move { from, to } => session.move_queue(from, to)?,
        Action::Quit => session.quit()?,

        Action::NowPlaying => {
            let track = session.current_track().await?;
            println!("{track}");
            if !track.album().is_empty() {
                println!("{}", track.album());
            }
            // Updated from the same frame.
            if let Some(state) = session.player() {
                println!("{state}");
            }
        }

        Action::Queue => {
            let queue = session.queue().await?;
            for (index, track) in queue.tracks().iter().enumerate() {
                let marker = if queue.position() == Some(index) { '>' } else { ' ' };
                println!("{marker} {index:>3}. {track}");
            }
        }

        Action::Lyrics { timed: false } => print!("{}", session.lyrics().await?),
        Action::Lyrics { timed: true } => {
            for line in session.lyrics_advanced().await? {
                match &line.translation {
                    Some(translation) => println!("{line} ({translation})"),
                    None => println!("{line}"),
                }
            }
        }

        Action::Search { query, kind, limit } => {
            for track in session.search(&query, kind.into(), limit).await? {
                println!("{:>12}  {track}", track.id());
            }
        }
    }

    Ok(())
}

/// Connects, performs the requested action and closes again.
///
/// # Errors
///
/// Returns an error when the configuration is invalid, the player cannot be
/// reached, or the action fails.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args)?;
    let session = Session::new(config)?;
    session.connect().await?;

    let result = perform(&session, args.action).await;

    session.close();
    if tokio::time::timeout(CLOSE_TIMEOUT, session.closed())
        .await
        .is_err()
    {
        warn!("player did not acknowledge close");
    }

    result
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and runs the requested action.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn arguments_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn queue_editing_subcommands() {
        let args = Args::try_parse_from(["trackside", "enqueue", "42", "--kind", "album"]).unwrap();
        assert!(matches!(args.action, Action::Enqueue { ref id, kind: Media::Album } if id == "42"));

        let args = Args::try_parse_from(["trackside", "move", "4", "1"]).unwrap();
        assert!(matches!(args.action, Action::Move { from: 4, to: 1 }));
    }

    #[test]
    fn repeat_and_shuffle_without_argument_step_once() {
        let args = Args::try_parse_from(["trackside", "repeat"]).unwrap();
        assert!(matches!(args.action, Action::Repeat { mode: None }));

        let args = Args::try_parse_from(["trackside", "shuffle", "on"]).unwrap();
        assert!(matches!(args.action, Action::Shuffle { state: Some(Switch::On) }));
    }
}
