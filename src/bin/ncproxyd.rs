//! The proxy daemon's entry point: parses the command line, loads and
//! validates the configuration document, and (unless `--test-conf` was
//! given) hands the reactor to a single-threaded `tokio` runtime for the
//! life of the process.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Event-driven memcached/Redis sharding proxy.
#[derive(Parser, Debug)]
#[command(name = "ncproxyd", version, about)]
struct Cli {
    /// Path to the YAML configuration document.
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// Increase log verbosity; repeatable (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate the configuration document and exit without starting
    /// the reactor.
    #[arg(short = 't', long = "test-conf")]
    test_conf: bool,
}

fn process_seed() -> u64 {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0);
    nanos ^ u64::from(std::process::id())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    #[cfg(feature = "tracing")]
    {
        let verbosity = logging::Verbosity::from_flag_count(cli.verbose);
        if let Err(error) = logging::install(verbosity) {
            eprintln!("ncproxyd: failed to install logging: {error}");
        }
    }
    #[cfg(not(feature = "tracing"))]
    let _ = cli.verbose;

    let config = match config::Config::load(&cli.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("ncproxyd: {}: {error}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    if cli.test_conf {
        println!("ncproxyd: configuration file {} is valid", cli.config.display());
        return ExitCode::SUCCESS;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("ncproxyd: failed to start runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    let local = tokio::task::LocalSet::new();
    let outcome = local.block_on(&runtime, server::run(&config, process_seed()));

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("ncproxyd: {error}");
            ExitCode::FAILURE
        }
    }
}
