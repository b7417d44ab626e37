//! Subcommand runners.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use relayfile_session::{MediaKind, SessionKey, SessionStore, SourceHandle};
use relayfile_transfer::{
    HttpRangeSource, ProgressCallback, TransferCoordinator, TransferProgress,
};
use relayfile_workflow::render::{self, progress_status};
use relayfile_workflow::{IntakeEvent, RenameWorkflow, WorkflowConfig, WorkflowEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::local;

/// Session key used for the single local session.
const LOCAL_SESSION: SessionKey = SessionKey(0);

/// Arguments of the `fetch` subcommand.
pub struct FetchArgs {
    pub url: String,
    pub output: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub chunk_size: Option<u64>,
}

/// Arguments of the `rename` subcommand.
pub struct RenameArgs {
    pub input: PathBuf,
    pub name: String,
    pub kind: MediaKind,
    pub out_dir: PathBuf,
    pub caption: Option<String>,
    pub thumbnail: Option<PathBuf>,
}

/// Downloads `args.url` with parallel ranged requests.
pub async fn run_fetch(args: FetchArgs, config: &WorkflowConfig) -> anyhow::Result<()> {
    let mut options = config.transfer_options();
    if let Some(concurrency) = args.concurrency {
        options.concurrency = concurrency;
    }
    if let Some(chunk_size) = args.chunk_size {
        options.chunk_size = chunk_size;
    }

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(name_from_url(&args.url)));
    let source = HttpRangeSource::new(&args.url).context("building HTTP client")?;
    info!(url = %args.url, output = %output.display(), "fetching");

    let cancel = CancellationToken::new();
    let _ctrl_c = spawn_ctrl_c(cancel.clone());

    let title = format!("Downloading {}", local::file_name(&output));
    let on_progress: ProgressCallback = Arc::new(move |p: TransferProgress| {
        eprintln!("{}", one_line(&progress_status(&title, &p)));
    });

    let report = TransferCoordinator::new(options)
        .execute(Arc::new(source), 0, &output, cancel, Some(on_progress))
        .await?;

    eprintln!("{}", render::transfer_complete(report.total_size));
    info!(
        path = %report.path.display(),
        bytes = report.total_size,
        ranges = report.ranges,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "fetch finished"
    );
    Ok(())
}

/// Runs the full rename workflow on a local file.
pub async fn run_rename(args: RenameArgs, config: WorkflowConfig) -> anyhow::Result<()> {
    let collab = local::collaborators(&args.input, &args.out_dir, args.caption, args.thumbnail);
    let store = Arc::new(SessionStore::new());
    let mut workflow = RenameWorkflow::new(config, store, collab);
    let events = workflow.take_events();
    let workflow = Arc::new(workflow);

    let pump = events.map(|mut rx| {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                log_event(&event);
            }
        })
    });

    let declared_size = tokio::fs::metadata(&args.input)
        .await
        .with_context(|| format!("reading {}", args.input.display()))?
        .len();

    let summary = workflow.intake(IntakeEvent {
        key: LOCAL_SESSION,
        source: SourceHandle {
            message_id: 0,
            kind: args.kind,
        },
        declared_size,
        original_name: Some(local::file_name(&args.input)),
    })?;
    eprintln!("{}", one_line(&render::intake_prompt(&summary)));

    let named = workflow.submit_name(LOCAL_SESSION, &args.name)?;
    if named.fell_back {
        warn!(name = %named.name, "name was unusable, kept the original");
    }
    eprintln!("{}", one_line(&render::kind_prompt(&named.name)));

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let workflow = Arc::clone(&workflow);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                res = tokio::signal::ctrl_c() => {
                    if res.is_ok() && !workflow.cancel(LOCAL_SESSION) {
                        warn!("publishing is in progress and cannot be cancelled");
                    }
                }
            }
        })
    };

    let result = workflow.finalize(LOCAL_SESSION, args.kind).await;
    cancel.cancel();
    let _ = ctrl_c.await;
    drop(workflow);
    if let Some(pump) = pump {
        let _ = pump.await;
    }

    let published = result?;
    println!("{}", published.id);
    Ok(())
}

fn log_event(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::PhaseChanged { key, phase } => info!(key = %key, phase = %phase, "phase changed"),
        WorkflowEvent::Progress {
            key,
            stage,
            transferred,
            total,
        } => debug!(key = %key, ?stage, transferred, total, "progress"),
        WorkflowEvent::Completed { key, published } => {
            info!(key = %key, id = %published.id, "completed")
        }
        WorkflowEvent::Failed { key, error } => warn!(key = %key, error = %error, "failed"),
        WorkflowEvent::Cancelled { key } => info!(key = %key, "cancelled"),
    }
}

/// Cancels `token` on Ctrl-C.
fn spawn_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling transfer");
            token.cancel();
        }
    })
}

/// Status text collapsed onto one terminal line.
fn one_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Last path segment of a URL, without query or fragment.
fn name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or_default();
    let name = Path::new(last)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.is_empty() || !path.contains("://") || path.ends_with('/') || path.matches('/').count() < 3 {
        "download.bin".into()
    } else {
        name
    }
}
