//! ip link command implementation.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::{Args, Subcommand};
use rtnl::Result;
use rtnl::netlink::capture;
use rtnl::netlink::filter::Filter;
use rtnl::netlink::types::link::{LinkMessage, RTEXT_FILTER_VF};
use rtnl::netlink::{Config, NlMsgType};

use crate::output::{OutputFormat, OutputOptions, print_links};

#[derive(Args)]
pub struct LinkCmd {
    #[command(subcommand)]
    action: Option<LinkAction>,
}

#[derive(Subcommand)]
enum LinkAction {
    /// Show link information.
    Show {
        /// Interface name.
        dev: Option<String>,

        /// Only interfaces that are up.
        #[arg(long)]
        up: bool,
    },

    /// Delete a link.
    Del {
        /// Interface name.
        dev: String,
    },

    /// Set link attributes.
    Set {
        /// Interface name.
        dev: String,

        /// Bring interface up.
        #[arg(long, conflicts_with = "down")]
        up: bool,

        /// Bring interface down.
        #[arg(long)]
        down: bool,

        /// Set MTU.
        #[arg(long)]
        mtu: Option<u32>,
    },

    /// Write the raw link dump to a file (stdout by default).
    Save {
        /// Capture file.
        file: Option<PathBuf>,
    },

    /// Print links from a saved dump (stdin by default).
    Showdump {
        /// Capture file.
        file: Option<PathBuf>,
    },
}

impl LinkCmd {
    pub async fn run(self, config: Config, format: OutputFormat, opts: &OutputOptions) -> Result<()> {
        match self
            .action
            .unwrap_or(LinkAction::Show { dev: None, up: false })
        {
            LinkAction::Show { dev, up } => {
                let mut filter = Filter::new().up(up);
                if let Some(dev) = dev {
                    filter = filter.name(dev);
                }
                Self::show(config, &filter, format, opts).await
            }
            LinkAction::Del { dev } => crate::connect(config)?.del_link(&dev).await,
            LinkAction::Set {
                dev,
                up,
                down,
                mtu,
            } => Self::set(config, &dev, up, down, mtu).await,
            LinkAction::Save { file } => Self::save(config, file).await,
            LinkAction::Showdump { file } => Self::showdump(file, format, opts),
        }
    }

    async fn show(
        config: Config,
        filter: &Filter,
        format: OutputFormat,
        opts: &OutputOptions,
    ) -> Result<()> {
        let conn = crate::connect(config)?;
        let links: Vec<_> = conn
            .get_links()
            .await?
            .into_iter()
            .filter(|link| filter.matches_link(link))
            .collect();

        let mut stdout = io::stdout().lock();
        print_links(&mut stdout, &links, format, opts)?;
        Ok(())
    }

    async fn set(config: Config, dev: &str, up: bool, down: bool, mtu: Option<u32>) -> Result<()> {
        let conn = crate::connect(config)?;
        if let Some(mtu) = mtu {
            conn.set_link_mtu(dev, mtu).await?;
        }
        if up || down {
            conn.set_link_state(dev, up).await?;
        }
        Ok(())
    }

    async fn save(config: Config, file: Option<PathBuf>) -> Result<()> {
        let sink: Box<dyn Write + Send> = match file {
            Some(path) => Box::new(File::create(path)?),
            None => Box::new(io::stdout()),
        };

        let mut conn = crate::connect(config)?;
        conn.set_capture(sink);
        conn.dump_request_filter(libc::AF_UNSPEC as u8, NlMsgType::RTM_GETLINK, RTEXT_FILTER_VF)
            .await?;
        conn.dump_filter(|_| Ok(())).await?;

        if let Some(mut sink) = conn.take_capture() {
            sink.flush()?;
        }
        Ok(())
    }

    fn showdump(file: Option<PathBuf>, format: OutputFormat, opts: &OutputOptions) -> Result<()> {
        let reader: Box<dyn Read> = match file {
            Some(path) => Box::new(File::open(path)?),
            None => Box::new(io::stdin().lock()),
        };

        let mut links = Vec::new();
        capture::replay_reader(reader, |msg| {
            if msg.msg_type() == NlMsgType::RTM_NEWLINK {
                links.push(LinkMessage::parse(msg.payload)?);
            }
            Ok(())
        })?;

        let mut stdout = io::stdout().lock();
        print_links(&mut stdout, &links, format, opts)?;
        Ok(())
    }
}
