mod args;
mod config;
mod daemon;
mod error;
mod ip;
mod outcome;
mod providers;
mod registry;
mod state;
mod transport;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// User-Agent header value for HTTP requests
pub const USER_AGENT: &str = concat!("dyndnsd/", env!("CARGO_PKG_VERSION"));

fn log_level(verbose: bool, debug: bool, quiet: bool) -> log::LevelFilter {
    if debug {
        log::LevelFilter::Debug
    } else if quiet && !verbose {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Info
    }
}

fn init_logger(verbose: bool, debug: bool, quiet: bool) {
    let log_level = log_level(verbose, debug, quiet);

    env_logger::builder()
        .filter(None, log_level)
        .init();
}

fn main() -> ExitCode {
    let args = args::Args::new();
    init_logger(args.verbose, args.debug, args.quiet);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &args::Args) -> Result<(), Box<dyn Error>> {
    let config = match (&args.file, args.cfg_stdin) {
        (Some(path), _) => config::Config::from_file(Path::new(path))?,
        (None, true) => config::Config::from_reader(std::io::stdin().lock())?,
        (None, false) => return Err("No configuration given (use --file or --cfg-stdin)".into()),
    };
    config.validate()?;

    let state_dir = match &args.state_dir {
        Some(dir) => PathBuf::from(dir),
        None => state::StateStore::default_dir().ok_or("Could not determine a state directory (use --state-dir)")?,
    };
    let store = state::StateStore::open(state_dir)?;
    log::debug!("Keeping state in {}", store.dir().display());

    if let Some(pidfile) = &args.pidfile {
        daemon::write_pidfile(Path::new(pidfile))?;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    daemon::install_signal_handlers(&shutdown)?;

    let use_tls = cfg!(feature = "https") && !args.no_tls;
    if !use_tls {
        log::warn!("Update requests will be sent over plain HTTP");
    }

    let ip_source = if args.remote {
        ip::IpSource::remote()
    } else {
        ip::IpSource::Interface(args.interface.clone())
    };

    let providers = daemon::build_providers(&config, &store, ip::resolve_ipv4)?;
    let mut daemon = daemon::Daemon::new(
        providers,
        store,
        Box::new(transport::HttpTransport::new(args.timeout)),
        use_tls,
        ip_source,
        Duration::from_secs(args.poll_interval()),
        args.timeout,
        shutdown,
    );

    for provider in daemon.providers() {
        log::info!("{}: tracking {} host(s)", provider.name(), provider.registry().len());
    }

    daemon.run(args.once)?;
    Ok(())
}
