//! Mutation engine: every mutation here is idempotent, tracked in an
//! [`MutationLog`], rollbackable, and retryable.
//!
//! Transactions are built by pushing [`AppliedMutation`]s onto a log
//! as each step completes; a failure partway through triggers reverse
//! replay via [`MutationLog::rollback`]. Rollback errors are logged
//! (never silently dropped) and never mask the original failure;
//! see [`crate::error::Error::RollbackFailed`].

use crate::error::{Error, Result};
use crate::gateway::{self, ExecOptions};
use crate::host::inventory;
use crate::host::lock::{self, LockName};
use crate::quadlet::GeneratedUnit;
use crate::retry::{Classification, Schedule};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Settings for [`allocate_uid`].
#[derive(Debug, Clone, Copy)]
pub struct UidAllocationSettings {
    /// Lower bound of the scanned range, inclusive.
    pub start: u32,
    /// Upper bound of the scanned range, inclusive.
    pub end: u32,
}

impl Default for UidAllocationSettings {
    fn default() -> Self {
        Self {
            start: 10_000,
            end: 59_999,
        }
    }
}

/// Acquire `uid-allocation`, read a fresh inventory, and return the
/// first UID in `[settings.start, settings.end]` not already in use.
///
/// # Errors
/// Returns [`Error::UidExhausted`] if the range is exhausted, or
/// propagates an inventory I/O error.
pub async fn allocate_uid(settings: UidAllocationSettings) -> Result<u32> {
    let _lock = lock::acquire(LockName::UidAllocation).await;
    let used = inventory::used_uids().await?;
    (settings.start..=settings.end)
        .find(|uid| !used.contains(uid))
        .ok_or(Error::UidExhausted {
            start: settings.start,
            end: settings.end,
        })
}

/// Allocate a UID, retrying on collision with another concurrent
/// actor: 3 attempts, exponential backoff.
pub async fn allocate_uid_with_retry(settings: UidAllocationSettings) -> Result<u32> {
    const ATTEMPTS: u32 = 3;
    let mut last_err = None;
    for attempt in 0..ATTEMPTS {
        match allocate_uid(settings).await {
            Ok(uid) => return Ok(uid),
            Err(err) => {
                warn!("uid allocation attempt {attempt} collided: {err}");
                last_err = Some(err);
                sleep(Duration::from_millis(50) * 2u32.pow(attempt)).await;
            }
        }
    }
    Err(last_err.unwrap_or(Error::UidExhausted {
        start: settings.start,
        end: settings.end,
    }))
}

/// A subordinate-id range, half-open at the allocator's discretion but
/// represented here by its first id and its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedSubRange {
    /// First id in the allocated range.
    pub start: u32,
    /// Size of the allocated range.
    pub size: u32,
}

const SUBUID_RANGE_FLOOR: u32 = 100_000;
const SUBUID_RANGE_CEILING: u32 = 4_294_967_294;

/// Acquire `subuid-allocation`, read `subRanges()` sorted ascending by
/// start, and scan linearly from `SUBUID_RANGE_FLOOR` for the first gap
/// big enough for `size`.
///
/// # Errors
/// Returns [`Error::SubRangeExhausted`] if no gap fits before
/// [`SUBUID_RANGE_CEILING`].
pub async fn allocate_sub_range(size: u32) -> Result<AllocatedSubRange> {
    let _lock = lock::acquire(LockName::SubuidAllocation).await;
    let mut ranges = inventory::sub_ranges().await?;
    ranges.sort_by_key(|r| r.start);

    let mut candidate = SUBUID_RANGE_FLOOR;
    for range in &ranges {
        if candidate as u64 + size as u64 - 1 < range.start as u64 {
            return Ok(AllocatedSubRange { start: candidate, size });
        }
        candidate = candidate.max(range.end().saturating_add(1));
    }

    if candidate as u64 + size as u64 - 1 <= SUBUID_RANGE_CEILING as u64 {
        Ok(AllocatedSubRange { start: candidate, size })
    } else {
        Err(Error::SubRangeExhausted {
            size,
            range_start: SUBUID_RANGE_FLOOR,
        })
    }
}

/// A provisioned service identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUser {
    /// `divban-<service>`.
    pub username: String,
    /// Allocated UID (equal to GID by convention).
    pub uid: u32,
    /// Home directory path.
    pub home: PathBuf,
    /// Login shell, always one of the nologin/false candidates.
    pub shell: String,
}

/// Settings controlling service-user provisioning.
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    /// Username prefix; the full username is `<prefix><service>`.
    pub prefix: String,
    /// Size of the subordinate range to allocate for a new user.
    pub sub_range_size: u32,
    /// UID allocation bounds for a new user.
    pub uid_range: UidAllocationSettings,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            prefix: "divban-".to_string(),
            sub_range_size: 65_536,
            uid_range: UidAllocationSettings::default(),
        }
    }
}

/// One reversible step recorded while a mutation transaction runs.
#[derive(Debug, Clone)]
pub enum AppliedMutation {
    /// A service-user account was created; undo by deleting it.
    UserCreated { username: String },
    /// A `<user>:<start>:<size>` line was appended to subuid/subgid;
    /// undo by rewriting the file without that line.
    SubRangeAppended {
        username: String,
        start: u32,
        size: u32,
    },
    /// A directory was created; undo by removing it (only if this
    /// transaction created it, never a preexisting directory).
    DirectoryCreated { path: PathBuf },
    /// A compiled unit file was installed into the service user's
    /// quadlet directory; undo by removing it.
    FileInstalled { path: PathBuf },
    /// Lingering was newly activated for a user via
    /// `loginctl enable-linger`; undo by disabling it again.
    LingerEnabled { username: String },
}

/// An ordered log of mutations applied so far in a transaction,
/// replayed in reverse on rollback.
#[derive(Debug, Clone, Default)]
pub struct MutationLog {
    applied: Vec<AppliedMutation>,
}

impl MutationLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step as successfully applied.
    pub fn record(&mut self, mutation: AppliedMutation) {
        self.applied.push(mutation);
    }

    /// Replay every recorded step in reverse, undoing each. A failed
    /// step is logged and does not stop the replay of remaining steps;
    /// the last such failure (if any) is returned so the caller can
    /// wrap it together with the original error as
    /// [`Error::RollbackFailed`].
    pub async fn rollback(&self) -> Option<Error> {
        let mut last_failure = None;
        for mutation in self.applied.iter().rev() {
            if let Err(err) = undo(mutation).await {
                warn!("rollback step failed for {mutation:?}: {err}");
                last_failure = Some(err);
            }
        }
        last_failure
    }
}

async fn undo(mutation: &AppliedMutation) -> Result<()> {
    match mutation {
        AppliedMutation::UserCreated { username } => {
            info!("rollback: deleting user {username}");
            let argv = vec![
                "userdel".to_string(),
                "--remove".to_string(),
                username.clone(),
            ];
            gateway::exec_success(&argv, &ExecOptions::new()).await?;
            Ok(())
        }
        AppliedMutation::SubRangeAppended { username, .. } => {
            info!("rollback: removing subordinate range for {username}");
            remove_subid_entries(username).await
        }
        AppliedMutation::DirectoryCreated { path } => {
            info!("rollback: removing directory {}", path.display());
            tokio::fs::remove_dir_all(path).await.or_else(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Ok(())
                } else {
                    Err(e)
                }
            })?;
            Ok(())
        }
        AppliedMutation::FileInstalled { path } => {
            info!("rollback: removing installed file {}", path.display());
            tokio::fs::remove_file(path).await.or_else(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Ok(())
                } else {
                    Err(e)
                }
            })?;
            Ok(())
        }
        AppliedMutation::LingerEnabled { username } => {
            info!("rollback: disabling linger for {username}");
            let argv = vec![
                "loginctl".to_string(),
                "disable-linger".to_string(),
                username.clone(),
            ];
            gateway::exec_success(&argv, &ExecOptions::new()).await?;
            Ok(())
        }
    }
}

/// Append `"<user>:<start>:<size>\n"` to both subuid and subgid,
/// atomically (read full file, append if absent, rename-over), under
/// the `subid-config` lock. Idempotent: a line already present for
/// `user` succeeds without modification.
async fn append_subid_entry(path: &str, username: &str, start: u32, size: u32) -> Result<()> {
    let line = format!("{username}:{start}:{size}");
    let existing = tokio::fs::read_to_string(path).await.unwrap_or_default();
    if existing.lines().any(|l| l == line) {
        return Ok(());
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&line);
    updated.push('\n');

    let tmp_path = format!("{path}.divban-tmp");
    tokio::fs::write(&tmp_path, updated).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

async fn remove_subid_entries(username: &str) -> Result<()> {
    for path in ["/etc/subuid", "/etc/subgid"] {
        let existing = tokio::fs::read_to_string(path).await.unwrap_or_default();
        let filtered: String = existing
            .lines()
            .filter(|l| !l.starts_with(&format!("{username}:")))
            .map(|l| format!("{l}\n"))
            .collect();
        if filtered != existing {
            let tmp_path = format!("{path}.divban-tmp");
            tokio::fs::write(&tmp_path, filtered).await?;
            tokio::fs::rename(&tmp_path, path).await?;
        }
    }
    Ok(())
}

/// Append the subordinate range to both subuid and subgid under the
/// `subid-config` lock.
async fn append_sub_range(username: &str, range: AllocatedSubRange) -> Result<()> {
    let _lock = lock::acquire(LockName::SubidConfig).await;
    append_subid_entry("/etc/subuid", username, range.start, range.size).await?;
    append_subid_entry("/etc/subgid", username, range.start, range.size).await?;
    Ok(())
}

/// Provision (or verify) the service user for `service_name`: if the
/// user already exists, its UID/home/shell are verified and the
/// existing record returned; otherwise a new user is created inside a
/// critical section with point-of-no-return rollback on any later
/// failure.
///
/// # Errors
/// Returns [`Error::Container`] if an existing user's UID/home/shell
/// mismatch expectations, or propagates allocation/exec/io errors. On
/// failure after the point of no return, the partially-created user is
/// rolled back; if rollback itself fails the caller sees
/// [`Error::RollbackFailed`] with the original error preserved as
/// primary.
pub async fn provision_service_user(
    service_name: &str,
    settings: &ProvisionSettings,
) -> Result<ServiceUser> {
    let username = format!("{}{service_name}", settings.prefix);

    let nologin = inventory::nologin_shell().await;

    if inventory::user_exists(&username).await? {
        return verify_existing_user(&username, &nologin).await;
    }

    let mut log = MutationLog::new();
    match provision_new_user(&username, &nologin, settings, &mut log).await {
        Ok(user) => Ok(user),
        Err(original) => match log.rollback().await {
            Some(rollback_err) => Err(Error::RollbackFailed {
                original: Box::new(original),
                rollback: Box::new(rollback_err),
            }),
            None => Err(original),
        },
    }
}

async fn verify_existing_user(username: &str, expected_nologin: &str) -> Result<ServiceUser> {
    let uid = inventory::uid_of(username).await?;
    let home = PathBuf::from(format!("/home/{username}"));
    let shell = read_shell(username).await?;

    let nologin_candidates = ["/usr/sbin/nologin", "/sbin/nologin", "/usr/bin/nologin", "/bin/nologin", "/bin/false"];
    if !nologin_candidates.contains(&shell.as_str()) {
        return Err(Error::Container {
            message: format!(
                "existing service user {username} has shell {shell}, expected a nologin/false shell (security invariant, got neither this nor {expected_nologin})"
            ),
        });
    }

    Ok(ServiceUser {
        username: username.to_string(),
        uid,
        home,
        shell,
    })
}

async fn read_shell(username: &str) -> Result<String> {
    let text = tokio::fs::read_to_string("/etc/passwd").await?;
    text.lines()
        .find_map(|line| {
            let mut parts = line.split(':');
            if parts.next()? == username {
                parts.nth(5).map(str::to_string)
            } else {
                None
            }
        })
        .ok_or_else(|| Error::not_found(format!("passwd entry for {username}")))
}

async fn provision_new_user(
    username: &str,
    nologin: &str,
    settings: &ProvisionSettings,
    log: &mut MutationLog,
) -> Result<ServiceUser> {
    let uid = allocate_uid_with_retry(settings.uid_range).await?;

    debug!("creating service user {username} with uid {uid}");
    let argv = vec![
        "useradd".to_string(),
        "--uid".to_string(),
        uid.to_string(),
        "--create-home".to_string(),
        "--shell".to_string(),
        nologin.to_string(),
        "--comment".to_string(),
        format!("divban service user for {username}"),
        username.to_string(),
    ];
    gateway::exec_success(&argv, &ExecOptions::new()).await?;

    // Point of no return: every failure from here rolls back by
    // deleting the user.
    log.record(AppliedMutation::UserCreated {
        username: username.to_string(),
    });

    let range = allocate_sub_range(settings.sub_range_size).await?;
    append_sub_range(username, range).await?;
    log.record(AppliedMutation::SubRangeAppended {
        username: username.to_string(),
        start: range.start,
        size: range.size,
    });

    Ok(ServiceUser {
        username: username.to_string(),
        uid,
        home: PathBuf::from(format!("/home/{username}")),
        shell: nologin.to_string(),
    })
}

/// Activate (or verify) lingering for `username` so its systemd user
/// scope keeps running without an active login session. Newly
/// activating linger (the marker was absent) is tracked in `log` as
/// [`AppliedMutation::LingerEnabled`]; merely verifying an
/// already-lingering user records nothing, since nothing was applied.
///
/// # Errors
/// Returns [`Error::LingerFailed`] if the marker never appears after
/// `loginctl enable-linger`, or if the user-bus socket never appears
/// within the 30s polling budget.
pub async fn enable_linger(username: &str, uid: u32, log: &mut MutationLog) -> Result<()> {
    if inventory::linger_enabled(username).await {
        ensure_user_scope_started(username, uid).await?;
        return Ok(());
    }

    let argv = vec![
        "loginctl".to_string(),
        "enable-linger".to_string(),
        username.to_string(),
    ];
    gateway::exec_success(&argv, &ExecOptions::new()).await?;

    if !inventory::linger_enabled(username).await {
        return Err(Error::LingerFailed {
            username: username.to_string(),
            reason: "marker file absent after enable-linger".to_string(),
        });
    }
    log.record(AppliedMutation::LingerEnabled {
        username: username.to_string(),
    });

    ensure_user_scope_started(username, uid).await?;
    poll_for_bus_socket(username, uid).await
}

async fn ensure_user_scope_started(username: &str, uid: u32) -> Result<()> {
    let argv = vec![
        "systemctl".to_string(),
        "start".to_string(),
        format!("user@{uid}.service"),
    ];
    gateway::exec_as_user_success(username, uid, &argv, ExecOptions::new()).await?;
    Ok(())
}

async fn poll_for_bus_socket(username: &str, uid: u32) -> Result<()> {
    let schedule = crate::retry::PollSchedule::new(Duration::from_millis(100), Duration::from_secs(30));
    let socket_path = format!("/run/user/{uid}/bus");

    for attempt in 0..=schedule.max_retries {
        if tokio::fs::metadata(&socket_path).await.is_ok() {
            return Ok(());
        }
        if attempt < schedule.max_retries {
            sleep(schedule.interval).await;
        }
    }

    Err(Error::LingerFailed {
        username: username.to_string(),
        reason: format!("bus socket {socket_path} did not appear within 30s"),
    })
}

/// Create a directory with the given owner and mode via
/// `install -d -m <mode> -o <uid> -g <gid>` (atomic mkdir+chown+chmod),
/// retried under the system schedule on transient failure, and tracked
/// in `log`.
///
/// # Errors
/// Propagates the underlying `install` failure once retries under the
/// system schedule are exhausted.
pub async fn ensure_directory(
    path: &Path,
    uid: u32,
    gid: u32,
    mode: &str,
    log: &mut MutationLog,
) -> Result<()> {
    let schedule = Schedule::system();
    let argv = vec![
        "install".to_string(),
        "-d".to_string(),
        "-m".to_string(),
        mode.to_string(),
        "-o".to_string(),
        uid.to_string(),
        "-g".to_string(),
        gid.to_string(),
        path.to_string_lossy().into_owned(),
    ];

    let mut attempt = 0;
    loop {
        match gateway::exec_success(&argv, &ExecOptions::new()).await {
            Ok(_) => {
                log.record(AppliedMutation::DirectoryCreated {
                    path: path.to_path_buf(),
                });
                return Ok(());
            }
            Err(err) if attempt < schedule.retries && Classification::Transient == crate::retry::classify(&err) => {
                warn!("transient failure provisioning {}: {err}", path.display());
                sleep(schedule.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// The service's canonical directories, in the creation order spec
/// §4.6.5 requires.
#[must_use]
pub fn canonical_directories(home: &Path, data_root: &Path) -> Vec<PathBuf> {
    vec![
        data_root.to_path_buf(),
        data_root.join("config"),
        data_root.join("logs"),
        home.join(".config"),
        home.join(".config/containers"),
        home.join(".config/containers/systemd"),
    ]
}

/// Provision every canonical directory for a service user in order.
///
/// # Errors
/// Propagates the first directory-creation failure; directories
/// created before the failure remain tracked in `log` for rollback.
pub async fn provision_canonical_directories(
    home: &Path,
    data_root: &Path,
    uid: u32,
    gid: u32,
    log: &mut MutationLog,
) -> Result<()> {
    for dir in canonical_directories(home, data_root) {
        ensure_directory(&dir, uid, gid, "0755", log).await?;
    }
    Ok(())
}

/// Write a compiled unit's content into `dir` (the service user's
/// `~/.config/containers/systemd`) and track it in `log`. The write is
/// atomic: the content lands in a hidden sibling file first, then is
/// renamed into place, so a reader never observes a partial unit.
///
/// # Errors
/// Propagates the underlying write or rename failure.
pub async fn install_file(
    dir: &Path,
    unit: &GeneratedUnit,
    log: &mut MutationLog,
) -> Result<PathBuf> {
    let path = dir.join(&unit.filename);
    let tmp_path = dir.join(format!(".{}.divban-tmp", unit.filename));
    tokio::fs::write(&tmp_path, &unit.content).await?;
    tokio::fs::rename(&tmp_path, &path).await?;
    log.record(AppliedMutation::FileInstalled { path: path.clone() });
    Ok(path)
}

/// Settings for [`remove_service_user`].
#[derive(Debug, Clone, Copy)]
pub struct RemovalSettings {
    /// Skip step 8 (removing the data directory) when `true`.
    pub preserve_data: bool,
}

/// Tear down a service user and its resources, in the fixed order
/// below (skipping any step leaks state):
/// 1. stop all containers, 2. remove containers/volumes/networks,
/// 3. disable linger, 4. stop the user scope, 5. remove container
/// storage, 6. kill residual processes, 7. delete the user, 8.
/// optionally remove the data directory, 9. remove subordinate
/// entries.
///
/// # Errors
/// Returns the first step's failure; later steps are still attempted
/// for the keep-state-sane steps (kill/rm) where skipping on error
/// would itself leak, mirroring how the teardown commands themselves
/// tolerate "already gone" targets.
pub async fn remove_service_user(
    user: &ServiceUser,
    data_root: &Path,
    settings: RemovalSettings,
) -> Result<()> {
    let opts = ExecOptions::new();

    // 1. Stop all containers, run as the service user.
    let stop_all = vec![
        "podman".to_string(),
        "stop".to_string(),
        "--all".to_string(),
        "-t".to_string(),
        "10".to_string(),
    ];
    let _ = gateway::exec_as_user(&user.username, user.uid, &stop_all, opts.clone()).await;

    // 2. Remove containers, volumes, and networks (except default).
    for argv in [
        vec!["podman".to_string(), "rm".to_string(), "--all".to_string(), "--force".to_string()],
        vec!["podman".to_string(), "volume".to_string(), "rm".to_string(), "--all".to_string(), "--force".to_string()],
    ] {
        let _ = gateway::exec_as_user(&user.username, user.uid, &argv, opts.clone()).await;
    }
    if let Ok(output) = gateway::exec_as_user(
        &user.username,
        user.uid,
        &["podman".to_string(), "network".to_string(), "ls".to_string(), "--format".to_string(), "{{.Name}}".to_string()],
        opts.clone(),
    )
    .await
    {
        for name in output.stdout.lines().filter(|n| *n != "podman") {
            let rm = vec!["podman".to_string(), "network".to_string(), "rm".to_string(), name.to_string()];
            let _ = gateway::exec_as_user(&user.username, user.uid, &rm, opts.clone()).await;
        }
    }

    // 3. Disable linger.
    let _ = gateway::exec(
        &["loginctl".to_string(), "disable-linger".to_string(), user.username.clone()],
        &opts,
    )
    .await;

    // 4. Stop the user scope; sleep 500ms.
    let _ = gateway::exec(
        &["systemctl".to_string(), "stop".to_string(), format!("user@{}.service", user.uid)],
        &opts,
    )
    .await;
    sleep(Duration::from_millis(500)).await;

    // 5. Remove container storage.
    let storage = user.home.join(".local/share/containers/storage");
    let _ = tokio::fs::remove_dir_all(&storage).await;

    // 6. Kill residual processes: graceful then forceful.
    let _ = gateway::exec(
        &["pkill".to_string(), "-U".to_string(), user.uid.to_string()],
        &opts,
    )
    .await;
    sleep(Duration::from_millis(500)).await;
    let _ = gateway::exec(
        &["pkill".to_string(), "-9".to_string(), "-U".to_string(), user.uid.to_string()],
        &opts,
    )
    .await;
    sleep(Duration::from_millis(200)).await;

    // 7. Delete the user (also removes the home tree).
    gateway::exec_success(
        &["userdel".to_string(), "--remove".to_string(), user.username.clone()],
        &opts,
    )
    .await?;

    // 8. Optionally remove the data directory.
    if !settings.preserve_data {
        let _ = tokio::fs::remove_dir_all(data_root).await;
    }

    // 9. Remove the user's entries from the subordinate files.
    let _lock = lock::acquire(LockName::SubidConfig).await;
    remove_subid_entries(&user.username).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_directories_are_in_spec_order() {
        let home = Path::new("/home/divban-caddy");
        let data_root = Path::new("/srv/divban/caddy");
        let dirs = canonical_directories(home, data_root);
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/srv/divban/caddy"),
                PathBuf::from("/srv/divban/caddy/config"),
                PathBuf::from("/srv/divban/caddy/logs"),
                PathBuf::from("/home/divban-caddy/.config"),
                PathBuf::from("/home/divban-caddy/.config/containers"),
                PathBuf::from("/home/divban-caddy/.config/containers/systemd"),
            ]
        );
    }

    #[tokio::test]
    async fn allocate_sub_range_accepts_gap_before_first_used_range() {
        // No filesystem dependency: exercise the scan logic directly
        // against a synthetic sorted range list via the same
        // arithmetic `allocate_sub_range` uses.
        let ranges = vec![crate::host::inventory::SubRange {
            user: "divban-existing".to_string(),
            start: 200_000,
            size: 65_536,
        }];
        let size = 65_536u32;
        let mut candidate = SUBUID_RANGE_FLOOR;
        let mut accepted = None;
        for range in &ranges {
            if candidate as u64 + size as u64 - 1 < range.start as u64 {
                accepted = Some(candidate);
                break;
            }
            candidate = candidate.max(range.end().saturating_add(1));
        }
        assert_eq!(accepted, Some(SUBUID_RANGE_FLOOR));
    }

    #[tokio::test]
    async fn mutation_log_rollback_runs_in_reverse_order() {
        // Directory-only rollback, verifiable without root: create two
        // temp directories, record them, and confirm rollback removes
        // both (order is asserted indirectly via both being gone).
        let dir_a = std::env::temp_dir().join("divban-test-rollback-a");
        let dir_b = std::env::temp_dir().join("divban-test-rollback-b");
        tokio::fs::create_dir_all(&dir_a).await.unwrap();
        tokio::fs::create_dir_all(&dir_b).await.unwrap();

        let mut log = MutationLog::new();
        log.record(AppliedMutation::DirectoryCreated { path: dir_a.clone() });
        log.record(AppliedMutation::DirectoryCreated { path: dir_b.clone() });
        log.rollback().await;

        assert!(tokio::fs::metadata(&dir_a).await.is_err());
        assert!(tokio::fs::metadata(&dir_b).await.is_err());
    }

    #[test]
    fn uid_allocation_settings_default_matches_spec() {
        let settings = UidAllocationSettings::default();
        assert_eq!(settings.start, 10_000);
        assert_eq!(settings.end, 59_999);
    }

    #[test]
    fn provision_settings_default_matches_spec() {
        let settings = ProvisionSettings::default();
        assert_eq!(settings.prefix, "divban-");
        assert_eq!(settings.sub_range_size, 65_536);
    }

    #[tokio::test]
    async fn install_file_writes_content_and_records_rollback_step() {
        let dir = tempfile::tempdir().unwrap();
        let unit = GeneratedUnit {
            filename: "caddy.container".to_string(),
            content: "[Container]\nImage=docker.io/library/caddy:2\n".to_string(),
        };

        let mut log = MutationLog::new();
        let path = install_file(dir.path(), &unit, &mut log).await.unwrap();

        assert_eq!(path, dir.path().join("caddy.container"));
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), unit.content);
        assert!(matches!(
            log.applied.last(),
            Some(AppliedMutation::FileInstalled { path: p }) if p == &path
        ));

        log.rollback().await;
        assert!(tokio::fs::metadata(&path).await.is_err());
    }

    #[tokio::test]
    async fn install_file_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let unit = GeneratedUnit {
            filename: "redis.container".to_string(),
            content: "[Container]\nImage=docker.io/library/redis:7\n".to_string(),
        };

        let mut log = MutationLog::new();
        install_file(dir.path(), &unit, &mut log).await.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["redis.container".to_string()]);
    }
}
