use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use protocol_recorder::protocol::now_local;
use protocol_recorder::repair::{self, RepairOptions};
use protocol_recorder::{
    logging, NatsRoomRuntime, ProtocolConfig, ProtocolStore, SessionSupervisor, StoreOptions,
    SupervisorConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "protocol-recorder", version, about = "Multi-participant meeting protocol recorder")]
struct Cli {
    /// Optional config file (environment variables take precedence)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record a room's meeting protocol until interrupted
    Record {
        /// Room to record
        room: String,

        /// NATS server URL (overrides NATS_URL)
        #[arg(long)]
        nats_url: Option<String>,
    },

    /// Rebuild records missing from a protocol using the recorder's log
    Repair {
        /// Structured record stream (.jsonl) to repair
        #[arg(long)]
        input: PathBuf,

        /// Diagnostic trace (defaults to transcribe.txt next to the input)
        #[arg(long)]
        trace: Option<PathBuf>,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Session date, YYYY-MM-DD (defaults to the date in the file name)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Session start, HH:MM:SS (defaults to the header time)
        #[arg(long)]
        start: Option<NaiveTime>,

        /// Session end, HH:MM:SS (defaults to the footer time)
        #[arg(long)]
        end: Option<NaiveTime>,

        #[arg(long)]
        room: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = ProtocolConfig::load(cli.config.as_deref())?;
    logging::init(cfg.debug);

    match cli.command {
        Command::Record { room, nats_url } => record(cfg, room, nats_url).await,
        Command::Repair {
            input,
            trace,
            output_dir,
            date,
            start,
            end,
            room,
        } => {
            let options = RepairOptions {
                trace,
                output_dir,
                date,
                start,
                end,
                room,
                statistics: cfg.enable_statistics,
                ..RepairOptions::new(input)
            };

            let report = repair::run(&options)?;
            info!(
                "Repair complete: {} gaps, {} existing records, {} recovered",
                report.gaps.len(),
                report.existing,
                report.recovered
            );
            info!("Repaired protocol: {}", report.outputs.records.display());
            Ok(())
        }
    }
}

async fn record(cfg: ProtocolConfig, room: String, nats_url: Option<String>) -> Result<()> {
    info!(
        "Starting protocol agent with config: STT={}, Format={}",
        cfg.stt_provider, cfg.output_format
    );

    let store = Arc::new(ProtocolStore::new(StoreOptions {
        room: room.clone(),
        stt_provider: cfg.stt_provider.to_string(),
        output_format: cfg.output_format,
        statistics: cfg.enable_statistics,
        output_dir: cfg.protocols_dir.clone(),
        started: now_local(),
    }));

    let url = nats_url.unwrap_or_else(|| cfg.nats_url.clone());
    let (runtime, events) = NatsRoomRuntime::connect(&url, &room).await?;

    let supervisor = SessionSupervisor::start(SupervisorConfig::from(&cfg), Arc::new(runtime), store)?;
    info!("Connected to room: {}", room);

    let result = tokio::select! {
        result = supervisor.run(events) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, cleaning up...");
            Ok(())
        }
    };

    supervisor.close().await?;
    info!("Cleanup complete");

    result
}
