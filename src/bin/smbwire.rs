use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use smbwire::capture::{read_capture, run_pass};
use smbwire::engine::conversation::{ConversationKey, ConversationStats};
use smbwire::observability::init_tracing;
use smbwire::{Dissector, EngineConfig, Pass};

#[derive(Parser, Debug)]
#[command(name = "smbwire", version, about = "smbwire – passive SMB1/CIFS correlation and reassembly")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration (JSON). SMBWIRE_* environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use JSON logs
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print one JSON line per SMB1 PDU
    Analyze {
        /// Path to the pcap file
        pcap_file: PathBuf,

        /// Print the replay pass instead of the first pass
        #[arg(long, default_value_t = false)]
        replay: bool,
    },

    /// Print per-conversation statistics
    Summary {
        /// Path to the pcap file
        pcap_file: PathBuf,
    },
}

#[derive(Serialize)]
struct ConversationSummary<'a> {
    conversation: &'a ConversationKey,
    stats: ConversationStats,
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let base = match path {
        Some(p) => EngineConfig::from_file(p)?,
        None => EngineConfig::default(),
    };
    base.with_env().context("applying SMBWIRE_* overrides")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;
    let config = load_config(cli.config.as_ref())?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match cli.command {
        Commands::Analyze { pcap_file, replay } => {
            let pdus = read_capture(&pcap_file)?;
            let mut dissector = Dissector::new(config);
            let mut outcomes = run_pass(&mut dissector, &pdus, Pass::First);
            if replay {
                outcomes = run_pass(&mut dissector, &pdus, Pass::Replay);
            }
            for outcome in &outcomes {
                serde_json::to_writer(&mut out, outcome)?;
                out.write_all(b"\n")?;
            }
        }

        Commands::Summary { pcap_file } => {
            let pdus = read_capture(&pcap_file)?;
            let mut dissector = Dissector::new(config);
            let outcomes = run_pass(&mut dissector, &pdus, Pass::First);

            let mut conversations: Vec<_> = dissector.store().iter().collect();
            conversations.sort_by_key(|c| (c.key().client, c.key().server));
            for conv in conversations {
                let line = ConversationSummary { conversation: conv.key(), stats: conv.stats() };
                serde_json::to_writer(&mut out, &line)?;
                out.write_all(b"\n")?;
            }
            let total = dissector.stats();
            writeln!(
                out,
                "SMB1 PDUs: {} | conversations: {} | requests: {} (completed {}, pending {}, abandoned {}, evicted {}) | orphan responses: {}",
                outcomes.len(),
                dissector.store().len(),
                total.requests,
                total.completed,
                total.pending,
                total.abandoned,
                total.evicted,
                total.orphan_responses
            )?;
        }
    }
    out.flush()?;
    Ok(())
}
