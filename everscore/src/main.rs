use clap::Parser;
use log::*;
#[cfg(debug_assertions)]
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::{
    append::rolling_file::{
        RollingFileAppender,
        policy::compound::{
            CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
        },
    },
    config::{Appender, Config as LogConfig, Logger, Root},
    encode::pattern::PatternEncoder,
};
use scoreboard_common::config::Config;
use std::{
    error::Error,
    fs::File,
    io::BufReader,
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
};

mod app;
mod arbiter;
mod hardware;
mod mode_state;
mod network;
mod operator;
mod publisher;
mod render;
mod shutdown;

use app::App;
use arbiter::StateArbiter;
use hardware::{JsonLineDecoder, open_console, spawn_feed};
use mode_state::{ModeSnapshot, ModeState};
use network::NetworkChannel;
use publisher::Publisher;
use render::BoardRenderer;
use shutdown::{ShutdownCoordinator, ShutdownSignal};

const APP_NAME: &str = "everscore";

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(long, short, action(clap::ArgAction::Count))]
    /// Increase the log verbosity
    verbose: u8,

    #[clap(long, short)]
    /// UDP port to listen and send on
    port: Option<u16>,

    #[clap(long, short)]
    /// Where to send state, `host` or `host:port`, default is the subnet broadcast address
    destination: Option<String>,

    #[clap(long)]
    /// Only accept packets from this address
    peer_filter: Option<String>,

    #[clap(long)]
    /// Serial port the console is attached to, default is to scan for a Prolific adapter
    serial_port: Option<String>,

    #[clap(long)]
    /// Baud rate of the console serial port
    baud_rate: Option<u32>,

    #[clap(long)]
    /// Don't read from the scoreboard console
    no_hardware: bool,

    #[clap(long, conflicts_with = "no_hardware")]
    /// Replay console updates from a file of JSON lines instead of the serial port
    replay: Option<PathBuf>,

    #[clap(long)]
    /// Start in send mode
    send: bool,

    #[clap(long)]
    /// Start in manual mode
    manual: bool,

    #[clap(long)]
    /// Directory within which log files will be placed, default is platform dependent
    log_location: Option<PathBuf>,

    #[clap(long, default_value = "5000000")]
    /// Max size in bytes that a log file is allowed to reach before being rolled over
    log_max_file_size: u64,

    #[clap(long, default_value = "3")]
    /// Number of archived logs to keep
    num_old_logs: u32,
}

impl Cli {
    fn apply_to(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(ref destination) = self.destination {
            config.network.destination = Some(destination.clone());
        }
        if let Some(ref filter) = self.peer_filter {
            config.network.peer_filter = filter.clone();
        }
        if let Some(ref port) = self.serial_port {
            config.hardware.port = Some(port.clone());
        }
        if let Some(baud_rate) = self.baud_rate {
            config.hardware.baud_rate = baud_rate;
        }
        if self.no_hardware {
            config.hardware.enabled = false;
        }
        if self.send {
            config.modes.send = true;
        }
        if self.manual {
            config.modes.auto = false;
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    init_logging(&args)?;

    let mut config: Config = match confy::load(APP_NAME, None) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to read config file, overwriting with default. Error: {e}");
            let config = Config::default();
            if let Err(e) = confy::store(APP_NAME, None, &config) {
                error!("Failed to store default config: {e}");
            }
            config
        }
    };
    args.apply_to(&mut config);
    debug!("Running with config {config:?}");

    let modes = Arc::new(ModeState::new(ModeSnapshot::from_config(
        &config.modes,
        &config.network.peer_filter,
    )));

    let network = match NetworkChannel::bind(&config.network) {
        Ok(network) => Arc::new(network),
        Err(e) => {
            error!("{e}");
            return Err(e.into());
        }
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    let arbiter = Arc::new(StateArbiter::new(
        modes.clone(),
        Publisher::new(tx.clone(), network.clone()),
    ));
    let mut shutdown = ShutdownCoordinator::new();

    let receiver = {
        let arbiter = arbiter.clone();
        let signal = shutdown.signal();
        thread::Builder::new()
            .name("network-receiver".to_string())
            .spawn(move || {
                network.receive_loop(&signal, |raw, from| {
                    arbiter.on_network(&raw, from);
                })
            })?
    };

    let hardware = start_hardware(&args, &config, arbiter.clone(), shutdown.signal())?;

    operator::spawn_console_reader(tx.clone())?;
    {
        let tx = tx.clone();
        thread::Builder::new()
            .name("ctrl-c".to_string())
            .spawn(move || operator::ctrl_c_thread(tx))?;
    }

    App::new(modes, arbiter, BoardRenderer::new(), rx).run();

    info!("Shutting down");
    shutdown.begin();
    if receiver.join().is_err() {
        error!("Network thread panicked");
    }
    if let Some(hardware) = hardware {
        if hardware.join().is_err() {
            error!("Hardware thread panicked");
        }
    }
    shutdown.complete();

    Ok(())
}

/// Starts whichever console feed is configured. A console that can't be
/// opened is logged and the relay carries on without it.
fn start_hardware(
    args: &Cli,
    config: &Config,
    arbiter: Arc<StateArbiter>,
    signal: ShutdownSignal,
) -> Result<Option<JoinHandle<()>>, Box<dyn Error>> {
    if let Some(ref path) = args.replay {
        info!("Replaying console updates from {}", path.display());
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to open replay file {}: {e}", path.display());
                return Ok(None);
            }
        };
        let decoder = JsonLineDecoder::new(BufReader::new(file));
        return Ok(Some(spawn_feed(decoder, arbiter, signal)?));
    }

    if !config.hardware.enabled {
        info!("Hardware input disabled");
        return Ok(None);
    }

    match open_console(&config.hardware) {
        Ok(decoder) => Ok(Some(spawn_feed(decoder, arbiter, signal)?)),
        Err(e) => {
            error!("{e}, continuing without hardware input");
            Ok(None)
        }
    }
}

fn init_logging(args: &Cli) -> Result<(), Box<dyn Error>> {
    let log_level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let log_base_path = match args.log_location {
        Some(ref path) => path.clone(),
        None => {
            let mut path = directories::BaseDirs::new()
                .ok_or("Could not find a directory to store logs")?
                .data_local_dir()
                .to_path_buf();
            path.push("everscore-logs");
            path
        }
    };
    let mut log_path = log_base_path.clone();
    let mut archived_log_path = log_base_path;
    log_path.push(format!("{APP_NAME}-log.txt"));
    archived_log_path.push(format!("{APP_NAME}-log-{{}}.txt.gz"));

    #[cfg(debug_assertions)]
    println!("Log path: {}", log_path.display());

    // Only log to the console in debug mode
    #[cfg(all(debug_assertions, not(target_os = "windows")))]
    let console_target = Target::Stderr;
    #[cfg(all(debug_assertions, target_os = "windows"))]
    let console_target = Target::Stdout; // Windows apps don't get a stderr handle
    #[cfg(debug_assertions)]
    let console = ConsoleAppender::builder()
        .target(console_target)
        .encoder(Box::new(PatternEncoder::new("[{d} {h({l:5})} {M}] {m}{n}")))
        .build();

    let archive_pattern = archived_log_path
        .to_str()
        .ok_or("Log location is not valid UTF-8")?;
    let roller = FixedWindowRoller::builder().build(archive_pattern, args.num_old_logs)?;
    let file_policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(args.log_max_file_size)),
        Box::new(roller),
    );
    let file_appender = RollingFileAppender::builder()
        .append(true)
        .encoder(Box::new(PatternEncoder::new("[{d} {l:5} {M}] {m}{n}")))
        .build(log_path, Box::new(file_policy))?;

    // Everything outside our own crates only logs errors
    let root = Root::builder().appender("file_appender");
    #[cfg(debug_assertions)]
    let root = root.appender("console");
    let root = root.build(LevelFilter::Error);

    let log_config = LogConfig::builder()
        .appender(Appender::builder().build("file_appender", Box::new(file_appender)));

    #[cfg(debug_assertions)]
    let log_config = log_config.appender(Appender::builder().build("console", Box::new(console)));

    let log_config = log_config
        .logger(Logger::builder().build("everscore", log_level))
        .logger(Logger::builder().build("scoreboard_common", log_level))
        .build(root)?;

    log4rs::init_config(log_config)?;
    log_panics::init();
    Ok(())
}
