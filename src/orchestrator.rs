//! Orchestrator: drives the external unit manager through the
//! solver's levels, reload→enable→start (or the reverse for stop),
//! status aggregation, and single-container convenience operations.
//!
//! Every unit action runs as the service user via
//! [`crate::gateway::exec_as_user`], so `systemctl --user`/`podman`
//! reach the correct session bus.

use crate::error::{Error, Result};
use crate::gateway::{self, ExecOptions};
use crate::retry::{Classification, Schedule};
use crate::solver::StartOrder;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Settings controlling how the orchestrator drives a stack.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// The service user whose systemd/podman session the orchestrator
    /// drives every command through.
    pub user: String,
    /// That user's numeric UID (feeds `XDG_RUNTIME_DIR`/bus wiring).
    pub uid: u32,
    /// Dispatch same-level units concurrently. `true` by default; set
    /// `false` to force strictly sequential dispatch even within a
    /// level (useful for deterministic test runs or debugging).
    pub parallel: bool,
}

impl OrchestratorOptions {
    /// Construct options for `user`/`uid` with `parallel` defaulted to
    /// `true`.
    #[must_use]
    pub fn new(user: impl Into<String>, uid: u32) -> Self {
        Self {
            user: user.into(),
            uid,
            parallel: true,
        }
    }
}

/// Per-unit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    /// Container/unit name (without the `.service` suffix).
    pub name: String,
    /// Whether `systemctl --user is-active` reported active.
    pub running: bool,
    /// Optional human-readable description, if the caller has one.
    pub description: Option<String>,
}

fn unit_name(container_name: &str) -> String {
    format!("{container_name}.service")
}

/// `systemctl --user daemon-reload`, required before any newly
/// installed unit file is recognized.
///
/// # Errors
/// Returns [`Error::ServiceReloadFailed`] if the reload itself fails.
pub async fn daemon_reload(opts: &OrchestratorOptions) -> Result<()> {
    let argv = vec![
        "systemctl".to_string(),
        "--user".to_string(),
        "daemon-reload".to_string(),
    ];
    gateway::exec_as_user_success(&opts.user, opts.uid, &argv, ExecOptions::new())
        .await
        .map_err(|source| Error::ServiceReloadFailed {
            unit: "daemon".to_string(),
            source: Box::new(source),
        })?;
    Ok(())
}

async fn start_unit_with_retry(opts: &OrchestratorOptions, name: &str) -> Result<()> {
    let unit = unit_name(name);
    let schedule = Schedule::heavy();
    let argv = vec![
        "systemctl".to_string(),
        "--user".to_string(),
        "start".to_string(),
        unit.clone(),
    ];

    let mut attempt = 0;
    loop {
        match gateway::exec_as_user_success(&opts.user, opts.uid, &argv, ExecOptions::new()).await {
            Ok(_) => return Ok(()),
            Err(err) if attempt < schedule.retries && Classification::Transient == crate::retry::classify(&err) => {
                warn!("transient failure starting {unit}, retrying: {err}");
                sleep(schedule.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(source) => {
                return Err(Error::ServiceStartFailed {
                    unit,
                    source: Box::new(source),
                })
            }
        }
    }
}

async fn stop_unit_with_retry(opts: &OrchestratorOptions, name: &str) -> Result<()> {
    let unit = unit_name(name);
    let schedule = Schedule::heavy();
    let argv = vec![
        "systemctl".to_string(),
        "--user".to_string(),
        "stop".to_string(),
        unit.clone(),
    ];

    let mut attempt = 0;
    loop {
        match gateway::exec_as_user_success(&opts.user, opts.uid, &argv, ExecOptions::new()).await {
            Ok(_) => return Ok(()),
            Err(err) if attempt < schedule.retries && Classification::Transient == crate::retry::classify(&err) => {
                warn!("transient failure stopping {unit}, retrying: {err}");
                sleep(schedule.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(source) => {
                return Err(Error::ServiceStopFailed {
                    unit,
                    source: Box::new(source),
                })
            }
        }
    }
}

/// Start every unit in `order.levels`, in level order, with all units
/// in one level dispatched concurrently when `opts.parallel` and the
/// level has more than one member. A level barrier is absolute: every
/// unit in level *i* completes before level *i+1* is dispatched. Any
/// unit failure aborts the whole start.
///
/// # Errors
/// Returns the first unit-start failure encountered; units in later
/// levels are never dispatched once a level has failed.
pub async fn start(opts: &OrchestratorOptions, order: &StartOrder) -> Result<()> {
    daemon_reload(opts).await?;

    for level in &order.levels {
        if opts.parallel && level.len() > 1 {
            let mut set = JoinSet::new();
            for name in level {
                let opts = opts.clone();
                let name = name.clone();
                set.spawn(async move { start_unit_with_retry(&opts, &name).await });
            }
            while let Some(joined) = set.join_next().await {
                joined.map_err(|e| Error::Container {
                    message: format!("start task panicked: {e}"),
                })??;
            }
        } else {
            for name in level {
                start_unit_with_retry(opts, name).await?;
            }
        }
    }
    Ok(())
}

/// Stop every unit in the reverse of `order.levels` (a [`StartOrder`]
/// as returned by [`crate::solver::resolve_stop_order`]). Unlike
/// [`start`], individual stop failures are logged but do not abort the
/// batch: leaving a service partly up is worse than leaving it partly
/// down.
pub async fn stop(opts: &OrchestratorOptions, order: &StartOrder) {
    for level in &order.levels {
        if opts.parallel && level.len() > 1 {
            let mut set = JoinSet::new();
            for name in level {
                let opts = opts.clone();
                let name = name.clone();
                set.spawn(async move { (name.clone(), stop_unit_with_retry(&opts, &name).await) });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((name, Err(err))) => warn!("failed to stop {name}: {err}"),
                    Err(e) => warn!("stop task panicked: {e}"),
                    Ok((_, Ok(()))) => {}
                }
            }
        } else {
            for name in level {
                if let Err(err) = stop_unit_with_retry(opts, name).await {
                    warn!("failed to stop {name}: {err}");
                }
            }
        }
    }
}

/// Stop then start, using the respective orders a caller has already
/// derived from [`crate::solver::resolve_stop_order`] and
/// [`crate::solver::resolve_start_order`] over the same graph.
///
/// # Errors
/// Propagates a [`start`] failure; [`stop`] failures along the way are
/// only logged, per its own contract.
pub async fn restart(opts: &OrchestratorOptions, stop_order: &StartOrder, start_order: &StartOrder) -> Result<()> {
    stop(opts, stop_order).await;
    start(opts, start_order).await
}

/// Whether `unit`'s `FragmentPath` (as reported by
/// `systemctl --user show`) lies under a Quadlet generator output
/// directory, meaning the generator already wires auto-start and an
/// explicit `enable` would be redundant.
async fn is_generator_managed(opts: &OrchestratorOptions, unit: &str) -> Result<bool> {
    let argv = vec![
        "systemctl".to_string(),
        "--user".to_string(),
        "show".to_string(),
        "--property=FragmentPath".to_string(),
        unit.to_string(),
    ];
    let output = gateway::exec_as_user(&opts.user, opts.uid, &argv, ExecOptions::new()).await?;
    let path = output.stdout.trim().strip_prefix("FragmentPath=").unwrap_or("");
    Ok(path.contains("/generator/") || path.starts_with("/run/"))
}

/// Enable every container whose unit is not already generator-managed.
/// Units produced by the Quadlet generator
/// auto-start without an explicit enable; calling `enable` on them
/// anyway is harmless but pointless, so this skips them.
///
/// # Errors
/// Propagates the first `systemctl --user enable` failure.
pub async fn enable(opts: &OrchestratorOptions, container_names: &[String]) -> Result<()> {
    for name in container_names {
        let unit = unit_name(name);
        if is_generator_managed(opts, &unit).await? {
            debug!("{unit} is generator-managed, skipping explicit enable");
            continue;
        }
        let argv = vec![
            "systemctl".to_string(),
            "--user".to_string(),
            "enable".to_string(),
            unit,
        ];
        gateway::exec_as_user_success(&opts.user, opts.uid, &argv, ExecOptions::new()).await?;
    }
    Ok(())
}

/// Whether a unit is currently active, via `systemctl --user is-active`.
async fn is_service_active(opts: &OrchestratorOptions, unit: &str) -> bool {
    let argv = vec![
        "systemctl".to_string(),
        "--user".to_string(),
        "is-active".to_string(),
        unit.to_string(),
    ];
    match gateway::exec_as_user(&opts.user, opts.uid, &argv, ExecOptions::new()).await {
        Ok(output) => output.stdout.trim() == "active",
        Err(_) => false,
    }
}

/// Aggregate status for every named container.
pub async fn status(opts: &OrchestratorOptions, container_names: &[String]) -> Vec<UnitStatus> {
    let mut out = Vec::with_capacity(container_names.len());
    for name in container_names {
        let running = is_service_active(opts, &unit_name(name)).await;
        out.push(UnitStatus {
            name: name.clone(),
            running,
            description: None,
        });
    }
    out
}

/// Reload the daemon and start a single unit; systemd's own unit
/// dependencies (`Requires=`/`After=`) bring up required peers.
///
/// # Errors
/// Propagates [`daemon_reload`] or the unit start failure.
pub async fn start_single(opts: &OrchestratorOptions, container_name: &str) -> Result<()> {
    daemon_reload(opts).await?;
    start_unit_with_retry(opts, container_name).await
}

/// Reload the daemon and stop a single unit.
///
/// # Errors
/// Propagates [`daemon_reload`] or the unit stop failure.
pub async fn stop_single(opts: &OrchestratorOptions, container_name: &str) -> Result<()> {
    daemon_reload(opts).await?;
    stop_unit_with_retry(opts, container_name).await
}
