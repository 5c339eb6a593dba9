//! Command-line interface for post-process-forwarder
//!
//! # Usage Examples
//!
//! ## Forward
//! ```bash
//! # Consume `events`, publish tasks to `tasks.<queue>` topics
//! post-process-forwarder forward \
//!   --brokers localhost:9092 --group-id post-process-forwarder \
//!   --topic events --queue-topic-prefix tasks. \
//!   --concurrency 5 --max-pending 1000 \
//!   --flags-file /etc/forwarder/flags.toml
//! ```
//!
//! ## Decode
//! ```bash
//! # Inspect what a record would turn into
//! post-process-forwarder decode \
//!   --payload '[2, "insert", {"event_id": "e1", "project_id": 7}, {"is_new": true, ...}]'
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

use forwarder_core::{CommitSink, DecodeStrategy, Metrics, TracingMetrics};
use forwarder_types::Header;
use post_process_forwarder::{
    build_pool, decode_offline, parse_header_arg, run_forwarder, ForwardArgs, RunOptions,
};
use post_process_forwarder_kafka::{KafkaTransport, KafkaWorkQueue};

#[derive(Parser)]
#[command(name = "post-process-forwarder")]
#[command(about = "Forward post-process tasks from the event stream to work queues")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume events and forward their tasks until interrupted
    Forward(ForwardArgs),

    /// Decode a single record and print the task it carries
    Decode {
        /// Record header as KEY=VALUE, or KEY for a header with no value
        #[arg(long = "headers", value_name = "KEY=VALUE", value_parser = parse_header_arg)]
        headers: Vec<Header>,

        /// Record body
        #[arg(long)]
        payload: Option<String>,

        /// Ignore headers and decode only the body
        #[arg(long)]
        payload_only: bool,

        /// Queue for payload-encoded records that do not name one
        #[arg(long, default_value = "post_process_errors")]
        default_queue: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Forward(args) => forward(args).await,
        Commands::Decode {
            headers,
            payload,
            payload_only,
            default_queue,
        } => {
            let strategy = DecodeStrategy::from_flag(!payload_only);
            let descriptor = decode_offline(headers, payload.as_deref(), strategy, &default_queue)
                .context("Failed to decode record")?;
            match descriptor {
                Some(descriptor) => println!("{}", serde_json::to_string_pretty(&descriptor)?),
                None => println!("Record carries no task"),
            }
            Ok(())
        }
    }
}

async fn forward(args: ForwardArgs) -> anyhow::Result<()> {
    let transport = Arc::new(
        KafkaTransport::new(args.kafka.consumer_config())
            .context("Failed to create Kafka consumer")?,
    );
    let queue = Arc::new(
        KafkaWorkQueue::new(args.kafka.producer_config())
            .context("Failed to create Kafka work queue")?,
    );
    let (flags, refresh) = args.flags.build().context("Failed to load feature flags")?;

    let commits: Arc<dyn CommitSink> = transport.clone();
    let metrics: Arc<dyn Metrics> = Arc::new(TracingMetrics);
    let pool = build_pool(&args.forwarder, flags, queue, commits, metrics)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C, running until the stream fails: {e}");
            std::future::pending::<()>().await;
        }
    };

    let options = RunOptions::from_config(&args.forwarder, args.max_records);
    let result = run_forwarder(transport.as_ref(), pool, shutdown, options).await;

    if let Some(refresh) = refresh {
        refresh.abort();
    }

    let summary = result?;
    info!(
        submitted = summary.submitted,
        drained = summary.report.drained,
        uncommitted = summary.report.in_flight,
        "Forwarding finished"
    );
    Ok(())
}
