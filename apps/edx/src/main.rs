//! edx - document exchange with the regulator's messaging portal
//!
//! Thin CLI over the transfer and envelope crates: it loads configuration,
//! runs one command and logs the events the libraries emit while it runs.

mod cli;
mod display;
mod error;
mod events;

use crate::cli::{Cli, Commands};
use crate::display::{error_document, OperationResult, OutputRenderer};
use crate::error::CliError;
use crate::events::log_event_with_tracing;
use clap::Parser;
use edx_config::Config;
use edx_events::{EventEmitter, EventReceiver, EventSender};
use edx_net::{
    DownloadCoordinator, DownloadOptions, NetClient, NetConfig, UploadCoordinator, UploadOptions,
};
use edx_signing::SignatureExtractor;
use std::path::{Path, PathBuf};
use std::process;
use tokio::select;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    init_tracing(json_mode, cli.global.debug);

    if let Err(e) = run(cli).await {
        error!("Application error: {}", e);
        if json_mode {
            println!("{}", error_document(&e));
        } else {
            eprintln!("Error: {e}");
        }
        process::exit(1);
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<(), CliError> {
    info!("Starting edx v{}", env!("CARGO_PKG_VERSION"));

    // Precedence: file (or defaults), then environment, then CLI flags
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.command);
    config.validate()?;

    let net_config = NetConfig::from_config(&config).with_bearer_token(cli.global.token.clone());
    let client = NetClient::new(net_config)?;

    let (event_sender, event_receiver) = edx_events::channel();
    let renderer = OutputRenderer::new(cli.global.json);

    let ctx = CommandContext {
        config,
        client,
        tx: event_sender,
    };
    let result = execute_command_with_events(cli.command, ctx, event_receiver).await?;

    renderer
        .render_result(&result)
        .map_err(|e| CliError::Edx(e.into()))?;
    info!("Command completed successfully");
    Ok(())
}

struct CommandContext {
    config: Config,
    client: NetClient,
    tx: EventSender,
}

/// Execute command with concurrent event handling
async fn execute_command_with_events(
    command: Commands,
    ctx: CommandContext,
    mut event_receiver: EventReceiver,
) -> Result<OperationResult, CliError> {
    let mut command_future = Box::pin(execute_command(command, ctx));

    loop {
        select! {
            result = &mut command_future => {
                // Drain any remaining events
                while let Ok(event) = event_receiver.try_recv() {
                    log_event_with_tracing(&event);
                }
                return result;
            }

            event = event_receiver.recv() => {
                match event {
                    Some(event) => log_event_with_tracing(&event),
                    None => { /* Channel closed: keep waiting for command to finish */ }
                }
            }
        }
    }
}

/// Execute the specified command
async fn execute_command(
    command: Commands,
    ctx: CommandContext,
) -> Result<OperationResult, CliError> {
    let operation = command.name();
    let tx = ctx.tx.clone();
    tx.emit_operation_started(operation);
    let result = run_operation(command, ctx).await;
    tx.emit_operation_completed(operation, result.is_ok());
    result
}

async fn run_operation(
    command: Commands,
    ctx: CommandContext,
) -> Result<OperationResult, CliError> {
    match command {
        Commands::Download {
            url,
            dest,
            overwrite,
            chunk_size: _,
        } => {
            let options = DownloadOptions::from_config(&ctx.config.transfer).with_overwrite(overwrite);
            let report = DownloadCoordinator::new(ctx.client, ctx.tx)
                .download(&url, &dest, &options)
                .await?;
            Ok(OperationResult::Download { dest, report })
        }

        Commands::Upload {
            file,
            session_url,
            chunk_size: _,
        } => upload(&ctx, &file, &session_url).await,

        Commands::Extract { src, dest } => extract(&ctx.config, src, dest).await,
    }
}

/// Create a session, upload, and tear the session down again on failure
async fn upload(
    ctx: &CommandContext,
    file: &Path,
    session_url: &str,
) -> Result<OperationResult, CliError> {
    if !tokio::fs::metadata(file).await?.is_file() {
        return Err(CliError::InvalidArguments(format!(
            "{} is not a regular file",
            file.display()
        )));
    }

    let options = UploadOptions::from_config(&ctx.config.transfer);
    let mut coordinator = UploadCoordinator::new(ctx.client.clone(), options, ctx.tx.clone());
    let session = coordinator.create_session(session_url).await?;

    match coordinator.upload_file(&session, file).await {
        Ok(report) => Ok(OperationResult::Upload {
            upload_url: session.upload_url,
            report,
        }),
        Err(e) => {
            warn!(state = %coordinator.state(), "Upload did not complete, cancelling session");
            if let Err(cancel) = coordinator.cancel_session(&session).await {
                warn!(error = %cancel, "Failed to cancel upload session");
            }
            Err(e.into())
        }
    }
}

/// Extract envelope content, discarding the partial output on failure
async fn extract(config: &Config, src: PathBuf, dest: PathBuf) -> Result<OperationResult, CliError> {
    if src == dest {
        return Err(CliError::InvalidArguments(
            "source and destination must differ".to_string(),
        ));
    }

    let extractor = SignatureExtractor::new(config.transfer.search_buffer_size);
    let (src_path, dest_path) = (src.clone(), dest.clone());
    let outcome = tokio::task::spawn_blocking(move || extractor.extract_file(&src_path, &dest_path))
        .await
        .map_err(|e| edx_errors::Error::internal(format!("extraction task failed: {e}")))?;

    match outcome {
        Ok(report) => Ok(OperationResult::Extract { dest, report }),
        Err(e) => {
            match tokio::fs::remove_file(&dest).await {
                Ok(()) => warn!(dest = %dest.display(), "Removed partial extraction output"),
                Err(rm) if rm.kind() == std::io::ErrorKind::NotFound => {}
                Err(rm) => warn!(dest = %dest.display(), error = %rm, "Failed to remove partial output"),
            }
            Err(e.into())
        }
    }
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, command: &Commands) {
    match command {
        Commands::Download {
            chunk_size: Some(size),
            ..
        } => config.transfer.download_chunk_size = *size,
        Commands::Upload {
            chunk_size: Some(size),
            ..
        } => config.transfer.upload_chunk_size = *size,
        _ => {}
    }
}

/// Initialize tracing/logging
///
/// `RUST_LOG` wins over the defaults; `--json` switches to JSON records.
fn init_tracing(json_mode: bool, debug_enabled: bool) {
    let default_directives = if debug_enabled {
        "warn,edx=debug"
    } else {
        "warn,edx=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directives));

    if json_mode {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }
}
