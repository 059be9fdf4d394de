use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Dynamic DNS update daemon for DynDNS, Namecheap and Hurricane Electric", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'f', long, conflicts_with = "cfg_stdin")]
    pub file: Option<String>,

    /// Read the configuration from standard input
    #[arg(short = 'F', long, default_value = "false")]
    pub cfg_stdin: bool,

    /// Network interface whose address is published
    #[arg(short = 'i', long, default_value = "ppp0")]
    pub interface: String,

    /// Discover the public address through a remote check-ip service instead of an interface
    #[arg(short = 'r', long, default_value = "false")]
    pub remote: bool,

    /// Seconds between polling cycles (default 120, or 600 with --remote)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Directory holding per-host state files
    #[arg(short = 's', long)]
    pub state_dir: Option<String>,

    /// Write the daemon's pid to this file
    #[arg(short = 'p', long)]
    pub pidfile: Option<String>,

    /// Talk plain HTTP to update servers
    #[arg(long, default_value = "false")]
    pub no_tls: bool,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Run a single update cycle and exit
    #[arg(long, default_value = "false")]
    pub once: bool,

    /// Verbose output
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Debug output
    #[arg(long, default_value = "false")]
    pub debug: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short = 'q', long, default_value = "false")]
    pub quiet: bool,
}

impl Args {
    pub fn new() -> Self {
        Self::parse()
    }

    /// Polling interval, widened when a remote check-ip service is queried.
    pub fn poll_interval(&self) -> u64 {
        match (self.interval, self.remote) {
            (Some(secs), _) => secs,
            (None, true) => 600,
            (None, false) => 120,
        }
    }
}
