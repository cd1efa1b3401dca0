//! CantinaOS process entry point (spec §6): loads configuration, starts
//! the core services, and runs the line-oriented CLI read-eval-print
//! loop against the command dispatcher.

use cantina_app::{config::Config, wiring};
use cantina_bus::{topics, CliResponse, CommandAck, CommandSource, RawInput};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_tracing(&config.log_filter);

    let core = wiring::start(&config).await?;
    tracing::info!("cantina-os is running; type 'help' for a command list");

    run_repl(&core).await?;

    core.shutdown().await?;
    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_repl(core: &wiring::Core) -> anyhow::Result<()> {
    let (output_tx, mut output_rx) = mpsc::unbounded_channel::<String>();

    let ack_tx = output_tx.clone();
    core.bus
        .subscribe::<CommandAck, _, _>(topics::COMMAND_ACK, "cli_repl", move |envelope| {
            let ack_tx = ack_tx.clone();
            async move {
                if !envelope.body.success {
                    let _ = ack_tx.send(envelope.body.message);
                }
                Ok(())
            }
        })
        .expect("COMMAND_ACK is a registered topic");

    let response_tx = output_tx.clone();
    core.bus
        .subscribe::<CliResponse, _, _>(topics::CLI_RESPONSE, "cli_repl", move |envelope| {
            let response_tx = response_tx.clone();
            async move {
                let _ = response_tx.send(envelope.body.message);
                Ok(())
            }
        })
        .expect("CLI_RESPONSE is a registered topic");

    let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel::<()>();
    core.bus
        .subscribe::<(), _, _>(topics::SYSTEM_SHUTDOWN_REQUESTED, "cli_repl", move |_envelope| {
            let shutdown_tx = shutdown_tx.clone();
            async move {
                let _ = shutdown_tx.send(());
                Ok(())
            }
        })
        .expect("SYSTEM_SHUTDOWN_REQUESTED is a registered topic");

    let bus = core.bus.clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                println!("shutting down");
                break;
            }
            message = output_rx.recv() => {
                if let Some(message) = message {
                    println!("{message}");
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) if !line.trim().is_empty() => {
                        let _ = bus.publish(
                            topics::COMMAND_RAW_INPUT,
                            RawInput { line, source: CommandSource::Cli, sid: None },
                        );
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
        }
    }

    Ok(())
}
