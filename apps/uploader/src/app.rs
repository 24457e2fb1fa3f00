//! Application orchestrator: wires the HTTP client, credentials and
//! scheduler together and drives them from stdin commands.

use std::sync::Arc;
use std::time::Duration;

use nimbus_transfer::FileSource;
use nimbus_upload::{
    CredentialStore, FinalizationClient, HttpClient, SessionContext, UploadEvent, UploadProgress,
    UploadScheduler, UploadState,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::cli::Cli;
use crate::config::Config;

/// Runs the uploads until the batch is idle or the user quits.
///
/// Returns `true` if every file was uploaded.
pub async fn run(config: Config, cli: Cli) -> anyhow::Result<bool> {
    let credentials = Arc::new(open_credentials(&config)?);
    if let (Some(email), Some(password)) = (&cli.email, &cli.password) {
        credentials.set_account(email, password, cli.display_name.as_deref())?;
        tracing::info!(email = %email, "account stored");
    }

    let http = Arc::new(HttpClient::new(
        &config.server_url,
        Duration::from_secs(config.request_timeout_secs),
    )?);
    let finalizer = Arc::new(FinalizationClient::new(http.clone(), credentials.clone()));
    let ctx = SessionContext::new(http, finalizer, credentials);

    let mut scheduler = UploadScheduler::new(config.upload_config(), ctx);
    if let Some(events) = scheduler.take_events() {
        tokio::spawn(log_events(events));
    }

    let mut sources = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        match FileSource::from_path(path) {
            Ok(source) => sources.push(source),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping file"),
        }
    }
    let added = scheduler.add_files(sources);
    if added.is_empty() {
        anyhow::bail!("no files to upload");
    }
    tracing::info!(
        files = added.len(),
        server = %config.server_url,
        "uploading"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = !cli.no_input;
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = scheduler.wait_idle() => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINT received, cancelling uploads");
                scheduler.reset();
                interrupted = true;
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !handle_command(&scheduler, line.trim()) {
                        scheduler.reset();
                        interrupted = true;
                        break;
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin closed");
                    stdin_open = false;
                }
            },
        }
    }

    let snapshot = scheduler.snapshot();
    print_status(&snapshot);
    let failed = snapshot
        .iter()
        .filter(|p| p.state != UploadState::Completed)
        .count();
    Ok(!interrupted && failed == 0)
}

fn open_credentials(config: &Config) -> anyhow::Result<CredentialStore> {
    match config.credentials_file() {
        Some(path) => Ok(CredentialStore::new(path)?),
        None => {
            tracing::warn!("no config directory, credentials will not be saved");
            Ok(CredentialStore::in_memory())
        }
    }
}

/// Applies one stdin command. Returns `false` on `quit`.
fn handle_command(scheduler: &UploadScheduler, command: &str) -> bool {
    match command {
        "" => {}
        "pause" => scheduler.pause(),
        "resume" => scheduler.resume(),
        "retry" => scheduler.retry_all(),
        "status" => print_status(&scheduler.snapshot()),
        "quit" | "exit" => return false,
        other => tracing::warn!(
            command = other,
            "unknown command (pause, resume, retry, status, quit)"
        ),
    }
    true
}

async fn log_events(mut events: mpsc::Receiver<UploadEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            UploadEvent::Progress(p) if p.state == UploadState::Uploading => {
                tracing::debug!(file = %p.display_name, percent = p.percent, "progress");
            }
            UploadEvent::Progress(_) => {}
            UploadEvent::Completed { record, .. } => {
                tracing::info!(
                    file = %record.file_name,
                    directory = %record.file_directory,
                    access_path = %record.access_path,
                    "upload complete"
                );
            }
            UploadEvent::Failed { file_id, error } => {
                tracing::error!(%file_id, error = %error, "upload failed");
            }
            UploadEvent::Idle => tracing::debug!("all uploads settled"),
        }
    }
}

fn print_status(snapshot: &[UploadProgress]) {
    for p in snapshot {
        let state = match p.state {
            UploadState::Pending => "pending",
            UploadState::Uploading => "uploading",
            UploadState::Completed => "done",
            UploadState::Error => "error",
        };
        match &p.error_message {
            Some(message) => println!("{:>4}%  {state:<9}  {}  ({message})", p.percent, p.display_name),
            None => println!("{:>4}%  {state:<9}  {}", p.percent, p.display_name),
        }
    }
}
