//! ip command - network interface configuration.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use rtnl::netlink::{Config, Connection, Protocol};

use crate::output::{OutputFormat, OutputOptions};

#[derive(Parser)]
#[command(name = "ip", version, about = "Network configuration tool")]
struct Cli {
    /// Output JSON.
    #[arg(short = 'j', long, global = true)]
    json: bool,

    /// Pretty print JSON.
    #[arg(short = 'p', long, global = true)]
    pretty: bool,

    /// Netlink receive buffer size in bytes.
    #[arg(long, global = true, value_name = "BYTES")]
    rcvbuf: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage network interfaces.
    #[command(visible_alias = "l")]
    Link(commands::link::LinkCmd),

    /// Monitor netlink events.
    #[command(visible_alias = "m", visible_alias = "mon")]
    Monitor(commands::monitor::MonitorCmd),
}

impl Cli {
    fn config(&self) -> Config {
        let config = Config::default();
        match self.rcvbuf {
            Some(size) => config.rcvbuf(size),
            None => config,
        }
    }
}

/// Open a route socket with the global settings.
pub(crate) fn connect(config: Config) -> rtnl::Result<Connection> {
    Connection::with_config(Protocol::Route, config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let opts = OutputOptions {
        pretty: cli.pretty,
    };
    let config = cli.config();

    let result = match cli.command {
        Command::Link(cmd) => cmd.run(config, format, &opts).await,
        Command::Monitor(cmd) => cmd.run(config, format, &opts).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        // framing corruption leaves the socket unusable
        let code = if e.is_fatal() { 2 } else { 1 };
        std::process::exit(code);
    }

    Ok(())
}
