// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod observers;
pub mod orchestrator;
pub mod pipeline;
pub mod rules;
pub mod state;
pub mod types;
pub mod vcs;
pub mod watch;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, Config, GlobalSettings, RepositoryConfig};
use crate::exec::{ActionBackend, PipelineBackend};
use crate::fs::RealFileSystem;
use crate::observers::{spawn_observer, ConsoleObserver, JsonEventLog};
use crate::orchestrator::{BackendFactory, Orchestrator};
use crate::state::{Notification, StateStore};
use crate::vcs::build_engine;
use crate::watch::{spawn_watcher, watch_target, RoutedGroup, WatcherHandle};

const NOTIFICATION_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy)]
enum Control {
    Reload,
    Shutdown,
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - state store + observers
/// - one orchestrated runtime per repository
/// - one file watcher per repository
/// - Ctrl-C (shutdown) and SIGHUP (reload) handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone();
    let mut cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let store = StateStore::new(NOTIFICATION_CAPACITY);
    let _console = spawn_observer(&store, ConsoleObserver);
    let _event_log = args
        .event_log
        .as_ref()
        .map(|path| spawn_observer(&store, JsonEventLog::new(Arc::new(RealFileSystem), path.clone())));

    report_rejected(&store, &cfg);

    let mut orchestrator = Orchestrator::new(
        store.clone(),
        git_backends(&cfg.global),
        cfg.global.policy.clone(),
    );
    let started = orchestrator.start(&cfg.repositories);
    if started.is_empty() {
        warn!("no enabled repositories; waiting for a reload");
    }

    let (group_tx, mut group_rx) = mpsc::unbounded_channel::<RoutedGroup>();
    let mut watchers = start_watchers(&cfg, &group_tx, &store);

    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<Control>();
    spawn_signal_listeners(control_tx.clone());

    info!(repositories = started.len(), "savepoint running");

    loop {
        tokio::select! {
            Some(routed) = group_rx.recv() => {
                if let Err(e) = orchestrator.dispatch(&routed.repo_id, routed.group) {
                    debug!(repo = %routed.repo_id, error = %e, "change group dropped");
                }
            }
            Some(control) = control_rx.recv() => match control {
                Control::Shutdown => {
                    info!("shutdown requested");
                    break;
                }
                Control::Reload => match load_and_validate(&config_path) {
                    Ok(new_cfg) => {
                        // Dropping the watchers flushes their buffers first.
                        watchers.clear();
                        report_rejected(&store, &new_cfg);
                        orchestrator
                            .reload(&new_cfg.repositories, new_cfg.global.shutdown_grace)
                            .await;
                        watchers = start_watchers(&new_cfg, &group_tx, &store);
                        cfg = new_cfg;
                    }
                    Err(e) => error!(error = %e, "reload failed; keeping current configuration"),
                },
            },
        }
    }

    drop(watchers);
    orchestrator.shutdown(cfg.global.shutdown_grace).await;
    Ok(())
}

/// Real backends: a git engine per repository sharing one worker pool.
///
/// The pool is sized once at startup; reloads keep it.
fn git_backends(global: &GlobalSettings) -> BackendFactory {
    let workers = Arc::new(Semaphore::new(global.action_workers));
    let retry = global.retry.clone();
    Arc::new(move |repo: &RepositoryConfig| -> Arc<dyn ActionBackend> {
        let engine = build_engine(repo.engine.kind, repo.path.clone());
        Arc::new(PipelineBackend::new(engine, Arc::clone(&workers), retry.clone()))
    })
}

/// Watch every enabled repository. A repository that cannot be watched is
/// reported and skipped; the others keep running.
fn start_watchers(
    cfg: &Config,
    sink: &mpsc::UnboundedSender<RoutedGroup>,
    store: &StateStore,
) -> Vec<WatcherHandle> {
    let mut watchers = Vec::new();
    for repo in cfg.enabled_repositories() {
        let started = watch_target(repo, &cfg.global).and_then(|target| spawn_watcher(target, sink.clone()));
        match started {
            Ok(handle) => watchers.push(handle),
            Err(e) => {
                error!(repo = %repo.id, error = %e, "failed to watch repository");
                store.publish(Notification::Error {
                    repo_id: repo.id.clone(),
                    message: format!("failed to watch repository: {e:#}"),
                });
            }
        }
    }
    watchers
}

fn report_rejected(store: &StateStore, cfg: &Config) {
    for rejected in &cfg.rejected {
        store.publish(Notification::Error {
            repo_id: rejected.id.clone(),
            message: format!("configuration rejected: {}", rejected.reason),
        });
    }
}

fn spawn_signal_listeners(tx: mpsc::UnboundedSender<Control>) {
    let ctrl_c_tx = tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            return;
        }
        let _ = ctrl_c_tx.send(Control::Shutdown);
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to listen for SIGHUP; reload disabled: {e}");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            if tx.send(Control::Reload).is_err() {
                break;
            }
        }
    });

    #[cfg(not(unix))]
    drop(tx);
}

/// Simple dry-run output: print repositories, rules and engines.
fn print_dry_run(cfg: &Config) {
    let g = &cfg.global;
    println!("savepoint dry-run");
    println!("  global.grouping_mode = {:?}", g.grouping_mode);
    println!("  global.buffer_window = {:?}", g.buffer_window);
    println!("  global.action_workers = {}", g.action_workers);
    println!("  global.push_retries = {}", g.retry.attempts);
    if g.policy.bulk_change_threshold > 0 {
        println!(
            "  global.bulk_change = {} files / {:?}",
            g.policy.bulk_change_threshold, g.policy.bulk_change_window
        );
    }
    println!();

    println!("repositories ({}):", cfg.repositories.len());
    for repo in &cfg.repositories {
        let rules: Vec<String> = repo.rules.iter().map(|r| r.to_string()).collect();
        println!("  - {}{}", repo.id, if repo.enabled { "" } else { " (disabled)" });
        println!("      path: {}", repo.path.display());
        println!("      rules: {}", rules.join(", "));
        println!("      engine: {}", repo.engine.kind);
        if repo.engine.auto_push {
            let branch = repo.engine.branch.as_deref().unwrap_or("<current>");
            println!("      push: {} {}", repo.engine.remote, branch);
        }
    }

    if !cfg.rejected.is_empty() {
        println!();
        println!("rejected ({}):", cfg.rejected.len());
        for rejected in &cfg.rejected {
            println!("  - {}: {}", rejected.id, rejected.reason);
        }
    }

    debug!("dry-run complete (nothing watched)");
}
