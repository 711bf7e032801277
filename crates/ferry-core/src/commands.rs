use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::Local;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, instrument, warn};

use crate::api::RemoteTaskApi;
use crate::auth::TokenStore;
use crate::auto_sync::spawn_auto_sync;
use crate::cli::Command;
use crate::connectivity::{ConnectivityMonitor, ConnectivityProbe};
use crate::render::Renderer;
use crate::session::{MutationOutcome, Session};

/// What a command needs beyond its own arguments.
pub struct App {
    pub session: Session,
    pub tokens: TokenStore,
    pub renderer: Renderer,
    pub api: Arc<dyn RemoteTaskApi>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub auto_sync: bool,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Login { .. } => "login",
            Command::Logout => "logout",
            Command::Refresh => "refresh",
            Command::List { .. } => "list",
            Command::Projects => "projects",
            Command::Labels => "labels",
            Command::Sections => "sections",
            Command::Add(_) => "add",
            Command::Modify(_) => "modify",
            Command::Done { .. } => "done",
            Command::Reopen { .. } => "reopen",
            Command::Delete { .. } => "delete",
            Command::Pending => "pending",
            Command::Sync => "sync",
            Command::Watch { .. } => "watch",
        }
    }

    /// Commands that talk to the server when the network allows.
    pub fn touches_remote(&self) -> bool {
        matches!(
            self,
            Command::Refresh
                | Command::Add(_)
                | Command::Modify(_)
                | Command::Done { .. }
                | Command::Reopen { .. }
                | Command::Delete { .. }
                | Command::Sync
                | Command::Watch { .. }
        )
    }

    fn drains_first(&self) -> bool {
        self.touches_remote() && !matches!(self, Command::Sync | Command::Watch { .. })
    }
}

#[instrument(skip_all, fields(command = command.name()))]
pub async fn dispatch<W: Write>(app: &App, command: Command, out: &mut W) -> anyhow::Result<()> {
    if app.auto_sync && command.drains_first() && app.session.pending_count()? > 0 {
        let report = app.session.sync().await;
        debug!(?report, "drained before command");
    }

    match command {
        Command::Login { token } => cmd_login(app, &token, out),
        Command::Logout => cmd_logout(app, out),
        Command::Refresh => cmd_refresh(app, out).await,
        Command::List { project, all } => cmd_list(app, project.as_deref(), all, out),
        Command::Projects => {
            let projects = app.session.cache().projects()?;
            app.renderer.write_projects(out, &projects)
        }
        Command::Labels => {
            let labels = app.session.cache().labels()?;
            app.renderer.write_labels(out, &labels)
        }
        Command::Sections => {
            let cache = app.session.cache();
            app.renderer
                .write_sections(out, &cache.sections()?, &cache.projects()?)
        }
        Command::Add(args) => {
            let (task, outcome) = app.session.create_task(args.into_new_task()).await?;
            report_outcome(out, &format!("Created task {}", task.id), &outcome)
        }
        Command::Modify(args) => {
            let (id, patch) = args.into_patch();
            let outcome = app.session.update_task(&id, patch).await?;
            report_outcome(out, &format!("Modified task {id}"), &outcome)
        }
        Command::Done { id } => {
            let outcome = app.session.complete_task(&id).await?;
            report_outcome(out, &format!("Completed task {id}"), &outcome)
        }
        Command::Reopen { id } => {
            let outcome = app.session.reopen_task(&id).await?;
            report_outcome(out, &format!("Reopened task {id}"), &outcome)
        }
        Command::Delete { id } => {
            let outcome = app.session.delete_task(&id).await?;
            report_outcome(out, &format!("Deleted task {id}"), &outcome)
        }
        Command::Pending => cmd_pending(app, out),
        Command::Sync => cmd_sync(app, out).await,
        Command::Watch { interval } => cmd_watch(app, interval, out).await,
    }
}

fn cmd_login<W: Write>(app: &App, token: &str, out: &mut W) -> anyhow::Result<()> {
    if token.trim().is_empty() {
        return Err(anyhow!("token cannot be empty"));
    }
    app.tokens.save(token).context("failed to save token")?;
    writeln!(out, "Token saved.")?;
    Ok(())
}

fn cmd_logout<W: Write>(app: &App, out: &mut W) -> anyhow::Result<()> {
    let pending = app.session.pending_count()?;
    app.session.sign_out()?;
    if pending > 0 {
        writeln!(out, "Signed out; discarded {pending} unsynced change(s).")?;
    } else {
        writeln!(out, "Signed out.")?;
    }
    Ok(())
}

async fn cmd_refresh<W: Write>(app: &App, out: &mut W) -> anyhow::Result<()> {
    app.session.refresh().await?;
    let cache = app.session.cache();
    writeln!(
        out,
        "Fetched {} task(s) in {} project(s).",
        cache.tasks()?.len(),
        cache.projects()?.len()
    )?;
    Ok(())
}

fn cmd_list<W: Write>(
    app: &App,
    project: Option<&str>,
    all: bool,
    out: &mut W,
) -> anyhow::Result<()> {
    let cache = app.session.cache();
    let mut tasks = cache.tasks()?;
    tasks.retain(|task| all || !task.is_completed);
    if let Some(project) = project {
        tasks.retain(|task| task.project_id.as_deref() == Some(project));
    }
    tasks.sort_by(|a, b| {
        let a_due = a.due.as_ref().map(|due| due.date.as_str()).filter(|d| !d.is_empty());
        let b_due = b.due.as_ref().map(|due| due.date.as_str()).filter(|d| !d.is_empty());
        // Undated tasks sort last.
        match (a_due, b_due) {
            (Some(a_due), Some(b_due)) => a_due.cmp(b_due),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.order.cmp(&b.order))
    });

    let today = Local::now().date_naive();
    app.renderer
        .write_tasks(out, &tasks, &cache.projects()?, today)?;
    app.renderer
        .write_status(out, cache.last_sync()?, app.session.pending_count()?)
}

fn cmd_pending<W: Write>(app: &App, out: &mut W) -> anyhow::Result<()> {
    let mut changes = app
        .session
        .queue()
        .dequeue_all()
        .context("failed to read pending changes")?;
    changes.sort_by_key(|change| change.timestamp);
    app.renderer.write_pending(out, &changes)
}

async fn cmd_sync<W: Write>(app: &App, out: &mut W) -> anyhow::Result<()> {
    if !app.session.connectivity().is_online() {
        writeln!(out, "Offline; {} change(s) pending.", app.session.pending_count()?)?;
        return Ok(());
    }
    let report = app.session.sync().await;
    app.renderer
        .write_sync_report(out, &report, app.session.pending_count()?)
}

#[instrument(skip(app, out))]
async fn cmd_watch<W: Write>(app: &App, interval: u64, out: &mut W) -> anyhow::Result<()> {
    if interval == 0 {
        return Err(anyhow!("--interval must be at least 1 second"));
    }

    let mut reports = app.session.coordinator().subscribe();
    let probe = ConnectivityProbe::spawn(
        app.api.clone(),
        app.monitor.clone(),
        Duration::from_secs(interval),
    );
    let auto_sync = spawn_auto_sync(app.session.coordinator(), app.session.connectivity());
    info!(interval, "watching for connectivity changes");
    writeln!(out, "Watching; press Ctrl-C to stop.")?;
    out.flush()?;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                break;
            }
            received = reports.recv() => match received {
                Ok(report) => {
                    app.renderer
                        .write_sync_report(out, &report, app.session.pending_count()?)?;
                    out.flush()?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "missed sync reports");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    auto_sync.unsubscribe();
    probe.stop();
    info!("stopped watching");
    Ok(())
}

fn report_outcome<W: Write>(
    out: &mut W,
    summary: &str,
    outcome: &MutationOutcome,
) -> anyhow::Result<()> {
    match outcome {
        MutationOutcome::Applied => writeln!(out, "{summary}.")?,
        MutationOutcome::Queued(change) => {
            writeln!(out, "{summary} (queued as {}, will sync later).", change.id)?;
        }
    }
    Ok(())
}
