//! `light-play` — stream a local M4A (ALAC/AAC) file to an AirTunes/RAOP1
//! receiver.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use light_play::error::{LightPlayError, Result};
use light_play::m4a::M4AFile;
use light_play::protocol::raop::RaopSession;

/// Stream a local M4A (ALAC/AAC) file to an AirTunes/RAOP receiver.
#[derive(Parser, Debug)]
#[command(name = "light-play", version, about, long_about = None)]
struct Cli {
    /// Digest password (default: the receiver factory default, "geheim")
    #[arg(short = 'c', value_name = "password")]
    password: Option<String>,

    /// RTSP port
    #[arg(short = 'p', value_name = "port", default_value_t = 5000)]
    port: u16,

    /// Log verbosity: e(rror), w(arning, default), i(nfo), d(ebug)
    #[arg(short = 'v', value_name = "level", default_value = "w")]
    verbosity: String,

    /// Log file (append)
    #[arg(short = 'l', value_name = "path")]
    log_file: Option<PathBuf>,

    /// Start offset in the file, in seconds
    #[arg(short = 'o', value_name = "seconds", default_value_t = 0)]
    offset: u64,

    /// Receiver hostname or IP address (not a URL)
    url: String,

    /// Path to the M4A file to stream
    #[arg(allow_hyphen_values = true)]
    filename: String,
}

/// Rewrites attached short-option values (`-cfoo`, `-ve`) into separate
/// tokens (`-c foo`, `-v e`) ahead of `clap::Parser`. `clap`'s own
/// attached-value support does not cover the bare-suffix verbosity form
/// (`-ve` rather than `-v=e`), so this runs a manual pre-pass before the
/// real option table.
///
/// Once both positionals (`<url>` and `<filename>`) have been consumed,
/// further `-`-leading tokens are passed through untouched — a filename
/// may start with `-` once `<url>` is already spoken for.
fn normalize_attached_short_flags(argv: &[String]) -> Vec<String> {
    const VALUE_FLAGS: &[char] = &['c', 'p', 'v', 'l', 'o'];

    let mut out = Vec::with_capacity(argv.len());
    let mut positionals_seen = 0u32;
    let mut expect_value = false;

    for (i, arg) in argv.iter().enumerate() {
        if i == 0 {
            out.push(arg.clone());
            continue;
        }
        if expect_value {
            out.push(arg.clone());
            expect_value = false;
            continue;
        }
        if arg == "--" {
            out.push(arg.clone());
            continue;
        }

        let flag_char = arg.starts_with('-').then(|| arg.chars().nth(1)).flatten();
        let is_value_flag = positionals_seen == 0 && flag_char.is_some_and(|c| VALUE_FLAGS.contains(&c));

        if is_value_flag {
            if arg.len() > 2 {
                out.push(arg[..2].to_string());
                out.push(arg[2..].to_string());
            } else {
                out.push(arg.clone());
                expect_value = true;
            }
        } else {
            if flag_char.is_none() {
                positionals_seen += 1;
            }
            out.push(arg.clone());
        }
    }
    out
}

/// Installs a `SIGINT` handler that only flips a flag — the handler
/// itself must stay async-signal-safe, so the actual `RaopSession::stop`
/// call happens on the main thread once it observes the flag.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_signal: i32) {
    INTERRUPTED.store(true, Ordering::Release);
}

fn install_sigint_handler() -> Result<()> {
    use nix::sys::signal::{signal, SigHandler, Signal};

    // SAFETY: `handle_sigint` only performs an atomic store, which is
    // async-signal-safe.
    unsafe {
        signal(Signal::SIGINT, SigHandler::Handler(handle_sigint))
    }
    .map_err(|e| LightPlayError::Resource(format!("failed to install SIGINT handler: {e}")))?;
    Ok(())
}

/// Installs the `tracing-subscriber` formatter: stderr always, plus a
/// non-blocking file writer when `-l` is given. The returned guard must
/// be held for the program's lifetime or buffered file writes are lost
/// on exit.
fn init_logging(cli: &Cli) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let level = match cli.verbosity.as_str() {
        "e" => "error",
        "w" => "warn",
        "i" => "info",
        "d" => "debug",
        other => {
            return Err(LightPlayError::Config(format!(
                "invalid -v level '{other}' (expected e, w, i, or d)"
            )))
        }
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(level));

    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let file_layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(EnvFilter::new(level));

            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
            Ok(None)
        }
    }
}

/// The CLI's parsed flags, collected into plain fields for diagnostic
/// logging and to keep `run` decoupled from `clap`'s own `Cli` type.
#[derive(Clone)]
struct PlaybackConfig {
    url: String,
    filename: String,
    password: String,
    port: u16,
    offset: Duration,
}

impl std::fmt::Debug for PlaybackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackConfig")
            .field("url", &self.url)
            .field("filename", &self.filename)
            .field("password", &"<redacted>")
            .field("port", &self.port)
            .field("offset", &self.offset)
            .finish()
    }
}

impl From<&Cli> for PlaybackConfig {
    fn from(cli: &Cli) -> Self {
        let default_password = RaopSession::default_credentials().1;
        Self {
            url: cli.url.clone(),
            filename: cli.filename.clone(),
            password: cli.password.clone().unwrap_or_else(|| default_password.to_string()),
            port: cli.port,
            offset: Duration::from_secs(cli.offset),
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = PlaybackConfig::from(cli);
    tracing::debug!(?config, "parsed playback configuration");

    let (username, _) = RaopSession::default_credentials();

    tracing::info!(
        file = %config.filename,
        host = %config.url,
        port = config.port,
        "Going to play file '{}' on url '{}:{}'",
        config.filename,
        config.url,
        config.port
    );

    let m4a = M4AFile::open(&config.filename, None)?;
    if m4a.has_parsed_with_warnings() {
        tracing::warn!("M4A file parsed with one or more warnings; continuing");
    }

    let mut session = RaopSession::connect(&config.url, config.port, username, &config.password)?;
    session.play(&m4a, config.offset)?;

    install_sigint_handler()?;

    while session.is_playing() {
        if INTERRUPTED.load(Ordering::Acquire) {
            break;
        }
        std::thread::sleep(Duration::from_millis(500));
    }

    if INTERRUPTED.load(Ordering::Acquire) {
        tracing::info!(progress = ?session.get_progress(), "SIGINT received; stopping");
        session.stop()
    } else {
        session.wait();
        Ok(())
    }
}

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().collect();
    let normalized = normalize_attached_short_flags(&argv);

    let cli = match Cli::try_parse_from(normalized) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let _log_guard = match init_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("light-play: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "light-play failed");
            ExitCode::FAILURE
        }
    }
}
