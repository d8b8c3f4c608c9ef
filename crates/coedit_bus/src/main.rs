//! Control bus host speaking JSON lines over stdin/stdout.

use anyhow::Context;
use coedit_bus::{BusHost, HostHandle, RequestEnvelope};
use coedit_core::{Config, Document, RopeBuffer};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CliFlags {
    help: bool,
    text: Option<String>,
}

fn parse_cli_flags(args: &[String]) -> anyhow::Result<CliFlags> {
    let mut flags = CliFlags::default();
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--help" => flags.help = true,
            "--text" => {
                let value = rest
                    .next()
                    .context("--text requires a value. Use --help to see supported options.")?;
                flags.text = Some(value.clone());
            }
            value if value.starts_with("--text=") => {
                flags.text = Some(value["--text=".len()..].to_string());
            }
            value if value.starts_with('-') => {
                anyhow::bail!(
                    "Unknown option: '{}'. Use --help to see supported options.",
                    value
                );
            }
            value => {
                anyhow::bail!(
                    "Unexpected positional argument: '{}'. Use --help to see supported options.",
                    value
                );
            }
        }
    }
    Ok(flags)
}

/// Turn one input line into a request.
///
/// A line that is valid JSON with a numeric `requestId` but a broken envelope
/// is still forwarded (with an empty command) so the driver gets a
/// correlated validation failure instead of silence.
fn parse_request_line(line: &str) -> anyhow::Result<RequestEnvelope> {
    let value: Value = serde_json::from_str(line).context("request is not valid JSON")?;
    match serde_json::from_value::<RequestEnvelope>(value.clone()) {
        Ok(request) => Ok(request),
        Err(err) => {
            let request_id = value
                .get("requestId")
                .and_then(Value::as_u64)
                .with_context(|| format!("request has no usable requestId: {}", err))?;
            Ok(RequestEnvelope {
                request_id,
                command: String::new(),
                params: Value::Null,
            })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coedit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let cli_flags = parse_cli_flags(&args)?;

    if cli_flags.help {
        print_help();
        return Ok(());
    }

    let config = Config::from_env();
    tracing::info!(
        change_log_capacity = config.change_log_capacity,
        default_lock_ms = config.default_lock_duration_ms,
        "starting coedit host"
    );
    let initial = cli_flags.text.unwrap_or_default();
    let document = Document::with_buffer(RopeBuffer::new(&initial), config);
    let HostHandle {
        request_tx,
        mut message_rx,
        task,
    } = BusHost::spawn(document);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = message_rx.recv().await {
            let line = match serde_json::to_string(&message) {
                Ok(line) => line,
                Err(err) => {
                    tracing::error!(error = %err, "failed to encode host message");
                    continue;
                }
            };
            if let Err(err) = write_line(&mut stdout, &line).await {
                tracing::error!(error = %err, "stdout closed; stopping writer");
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_request_line(&line) {
            Ok(request) => {
                if request_tx.send(request).is_err() {
                    tracing::warn!("host stopped; ignoring further input");
                    break;
                }
            }
            Err(err) => tracing::warn!("Skipping input line: {:#}", err),
        }
    }

    drop(request_tx);
    task.await.context("host task failed")?;
    writer.await.context("writer task failed")?;
    Ok(())
}

async fn write_line(stdout: &mut tokio::io::Stdout, line: &str) -> std::io::Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

fn print_help() {
    println!("coedit host\n");
    println!("Usage: coedit-host [OPTIONS]\n");
    println!("Reads one JSON request per line on stdin and writes one JSON response");
    println!("or event per line on stdout. Logs go to stderr.\n");
    println!("Options:");
    println!("  --text <TEXT>     Initial document text (default: empty)");
    println!("  --help            Show this help message");
    println!("\nEnvironment variables:");
    println!("  COEDIT_CHANGE_LOG_CAPACITY    Change records kept (default: 1000)");
    println!("  COEDIT_CORRECTION_CAPACITY    Quick corrections kept (default: 100)");
    println!("  COEDIT_DEFAULT_LOCK_MS        Range lock lifetime (default: 30000)");
    println!("  COEDIT_PRESENCE_THRESHOLD_MS  Presence liveness window (default: 30000)");
    println!("  COEDIT_REQUEST_TIMEOUT_MS     Client request timeout (default: 30000)");
    println!("  COEDIT_STRICT_SUGGESTIONS     Reject stale suggestion accepts");
    println!("  RUST_LOG                      Log filter (default: coedit=info)");
}
