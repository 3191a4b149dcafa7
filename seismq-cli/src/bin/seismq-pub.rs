//! MQTT publish tool - publish one message once connected.

use std::io::{self, Read};

use bytes::Bytes;
use clap::Parser;
use seismq_cli::{init_logging, parse_qos, CliConfig, ConnectionArgs};
use seismq_client::Handlers;
use seismq_core::qos::QoS;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "seismq-pub")]
#[command(about = "Publish a message through a supervised MQTT connection")]
#[command(version)]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Topic to publish to
    #[arg(short = 't', long)]
    topic: String,

    /// Message payload (reads from stdin if not provided)
    #[arg(short = 'm', long)]
    message: Option<String>,

    /// QoS level (0, 1, or 2)
    #[arg(short = 'q', long, default_value = "0", value_parser = parse_qos)]
    qos: QoS,

    /// Retain the message on the broker
    #[arg(short = 'r', long)]
    retain: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = CliConfig::load(args.connection.config.as_deref())?;
    init_logging(args.connection.verbose, &config.logging.level);

    let (url, options) = args.connection.resolve(&config)?;

    let payload = match args.message {
        Some(msg) => msg,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let connection = seismq_client::open(&url, options, Handlers::new())?;
    connection.connected().await?;

    connection
        .publish(&args.topic, Bytes::from(payload), args.qos, args.retain)
        .await?;
    info!("Published to {}", args.topic);

    // DISCONNECT follows the publish on the same connection
    connection.close().await;

    Ok(())
}
