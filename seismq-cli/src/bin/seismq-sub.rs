//! MQTT subscribe tool - keep a supervised connection open and print messages.

use std::sync::Arc;

use clap::Parser;
use seismq_cli::{init_logging, parse_qos, CliConfig, ConnectionArgs};
use seismq_client::Handlers;
use seismq_core::qos::QoS;
use tokio::{signal, sync::Notify};

#[derive(Parser, Debug)]
#[command(name = "seismq-sub")]
#[command(about = "Subscribe to topics through a supervised MQTT connection")]
#[command(version)]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Topic filter(s) to subscribe to (can be specified multiple times)
    #[arg(short = 't', long)]
    topic: Vec<String>,

    /// QoS level for subscriptions (0, 1, or 2)
    #[arg(short = 'q', long, default_value = "0", value_parser = parse_qos)]
    qos: QoS,

    /// Print topic name before each message
    #[arg(short = 'T', long)]
    print_topic: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = CliConfig::load(args.connection.config.as_deref())?;
    init_logging(args.connection.verbose, &config.logging.level);

    let (url, options) = args.connection.resolve(&config)?;

    let topics = if args.topic.is_empty() {
        config.topics.clone()
    } else {
        args.topic
    };
    if topics.is_empty() {
        eprintln!("No topics given: use -t or set `topics` in the configuration file");
        std::process::exit(1);
    }

    let print_topic = args.print_topic;
    let closed = Arc::new(Notify::new());

    let handlers = Handlers::new()
        .on_message(move |topic, payload| {
            if print_topic {
                println!("{}: {}", topic, String::from_utf8_lossy(payload));
            } else {
                println!("{}", String::from_utf8_lossy(payload));
            }
        })
        .on_close({
            let closed = closed.clone();
            move || closed.notify_one()
        });

    let connection = seismq_client::open(&url, options, handlers)?;

    // Sent on the first successful connect if the broker is not up yet
    let subscriptions: Vec<(&str, QoS)> = topics.iter().map(|t| (t.as_str(), args.qos)).collect();
    connection.subscribe(&subscriptions).await?;

    // Handle Ctrl+C for graceful shutdown
    tokio::select! {
        _ = signal::ctrl_c() => {
            eprintln!("\nDisconnecting...");
        }
        _ = closed.notified() => {
            eprintln!("Connection closed");
        }
    }

    connection.close().await;

    Ok(())
}
