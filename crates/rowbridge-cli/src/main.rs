//! # rowbridge CLI
//!
//! Runs either half of the bridge from environment configuration, plus
//! codec debugging commands:
//!
//! - `publish`: publish values (arguments or stdin lines) to the broker
//! - `subscribe`: print arriving rows as JSON lines
//! - `encode` / `decode`: inspect the wire form of a single value

use anyhow::{bail, Context, Result};
use std::env;
use std::io::BufRead;
use tracing_subscriber::EnvFilter;

use rowbridge_broker::{ConnectionManager, RumqttBroker, SubscriptionSet};
use rowbridge_core::{
    FieldSchema, FieldValue, Row, RowSchema, RowSink, SemanticType, SinkError, ValueCodec,
};
use rowbridge_steps::{BridgeConfig, Publisher, RowOutcome, Subscriber};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "publish" => publish(&args[2..]).await,
        "subscribe" => subscribe().await,
        "encode" => encode(&args[2..]),
        "decode" => decode(&args[2..]),
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }
}

async fn publish(values: &[String]) -> Result<()> {
    let config = BridgeConfig::from_env()?;
    if config.publish.topic_from_field {
        bail!(
            "per-row topic fields need a pipeline schema; \
             configure a static ROWBRIDGE_TOPIC for the CLI"
        );
    }

    let message_type: SemanticType = config
        .subscribe
        .message_type
        .parse()
        .context("ROWBRIDGE_MESSAGE_TYPE")?;
    let schema = RowSchema::new(vec![FieldSchema::new(
        config.publish.message_field.clone(),
        message_type,
    )]);

    let manager = ConnectionManager::new(
        RumqttBroker::new(),
        config.publisher_endpoint(),
        SubscriptionSet::empty(),
    );
    let publisher = Publisher::new(
        manager,
        &schema,
        &config.publish.message_field,
        &config.topic_spec(),
        &config.qos,
        config.publish.error_handling,
    )?;
    publisher.start().await?;

    let inputs: Vec<String> = if values.is_empty() {
        std::io::stdin()
            .lock()
            .lines()
            .collect::<std::io::Result<_>>()
            .context("reading values from stdin")?
    } else {
        values.to_vec()
    };

    let mut published = 0_u64;
    let mut skipped = 0_u64;
    let mut diverted = 0_u64;

    for input in &inputs {
        let value = FieldValue::parse(message_type, input)?;
        let row = Row::new(vec![value]);
        match publisher.process_row(&row).await {
            Ok(RowOutcome::Published) => published += 1,
            Ok(RowOutcome::Skipped) => skipped += 1,
            Err(e) if publisher.error_handling() => {
                tracing::warn!(error = %e, input = %input, "diverting failed row");
                diverted += 1;
            }
            Err(e) => {
                tracing::error!(error = %e, "stopping after row failure");
                publisher.stop().await;
                return Err(e.into());
            }
        }
    }

    publisher.stop().await;
    tracing::info!(published, skipped, diverted, "publish finished");
    Ok(())
}

/// Prints each row as one JSON line on stdout.
struct JsonLineSink;

impl RowSink for JsonLineSink {
    fn put_row(&mut self, row: Row) -> Result<(), SinkError> {
        let line = serde_json::json!({
            "topic": row.get(0),
            "message": row.get(1),
        });
        println!("{line}");
        Ok(())
    }
}

async fn subscribe() -> Result<()> {
    let config = BridgeConfig::from_env()?;
    let manager = ConnectionManager::new(
        RumqttBroker::new(),
        config.subscriber_endpoint(),
        config.subscriptions()?,
    );
    let mut subscriber = Subscriber::new(manager, &config.subscriber_settings()?)?;
    subscriber.start().await?;

    tracing::info!("subscriber running, press Ctrl+C to stop");

    let mut sink = JsonLineSink;
    let outcome = tokio::select! {
        result = subscriber.run(&mut sink) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    };

    subscriber.stop().await;
    outcome?;
    Ok(())
}

fn encode(args: &[String]) -> Result<()> {
    if args.len() < 2 {
        eprintln!("Usage: rowbridge encode <type> <value>");
        std::process::exit(1);
    }
    let semantic_type: SemanticType = args[0].parse()?;
    let value = FieldValue::parse(semantic_type, &args[1])?;
    let codec = ValueCodec::new(semantic_type).with_allow_opaque(true);

    match codec.encode(&value)? {
        Some(bytes) => println!("{}", to_hex(&bytes)),
        None => println!("(no bytes)"),
    }
    Ok(())
}

fn decode(args: &[String]) -> Result<()> {
    if args.len() < 2 {
        eprintln!("Usage: rowbridge decode <type> <hex>");
        std::process::exit(1);
    }
    let semantic_type: SemanticType = args[0].parse()?;
    let payload = from_hex(&args[1])?;
    let codec = ValueCodec::new(semantic_type).with_allow_opaque(true);

    let value = codec.decode(&payload)?;
    println!("{}", serde_json::to_string(&value)?);
    Ok(())
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(
        String::with_capacity(bytes.len() * 2),
        |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        },
    )
}

fn from_hex(input: &str) -> Result<Vec<u8>> {
    let input = input.trim();
    if input.len() % 2 != 0 {
        bail!("hex input must have an even number of digits");
    }
    (0..input.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&input[i..i + 2], 16)
                .with_context(|| format!("invalid hex at offset {i}"))
        })
        .collect()
}

fn print_help() {
    println!(
        r#"rowbridge CLI

USAGE:
    rowbridge <COMMAND> [ARGS]

COMMANDS:
    publish [value...]     Publish values (or stdin lines) to the broker
    subscribe              Print arriving rows as JSON lines
    encode <type> <value>  Show the wire encoding of a value (hex)
    decode <type> <hex>    Decode a payload back into a value
    help                   Show this help message

Configuration comes from ROWBRIDGE_* environment variables; see the
rowbridge-steps documentation for the full list.

EXAMPLES:
    ROWBRIDGE_TOPIC=sensors/temp ROWBRIDGE_MESSAGE_TYPE=integer64 rowbridge publish 42
    ROWBRIDGE_TOPICS=sensors/# ROWBRIDGE_MESSAGE_TYPE=integer64 rowbridge subscribe
    rowbridge encode integer64 42
    rowbridge decode float64 3ff0000000000000
"#
    );
}
