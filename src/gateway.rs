//! Process gateway: the only place in the crate that spawns an
//! external command.
//!
//! Splits a low-level executor (`tokio::process::Command` plumbing,
//! timeouts, captured output) from the call-site option struct.
//! User-scoped execution additionally wires
//! `XDG_RUNTIME_DIR`/`DBUS_SESSION_BUS_ADDRESS` so that
//! `systemctl --user` and `podman` reach the right session bus.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// Output of a completed process.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Process exit code (-1 if killed by a signal).
    pub exit_code: i32,
    /// Captured stdout, if capture was requested.
    pub stdout: String,
    /// Captured stderr, if capture was requested.
    pub stderr: String,
}

impl ExecOutput {
    /// Whether the process exited zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Options for a single [`exec`] call.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Extra environment variables to set.
    pub env: HashMap<String, String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Timeout for the whole invocation.
    pub timeout: Option<Duration>,
    /// Capture stdout (defaults true at the call site, see [`exec`]).
    pub capture_stdout: bool,
    /// Capture stderr (defaults true at the call site, see [`exec`]).
    pub capture_stderr: bool,
    /// Data to write to stdin, if any.
    pub stdin: Option<Vec<u8>>,
    /// Run as this user via `sudo -u <user>`, preserving
    /// `XDG_RUNTIME_DIR`/`DBUS_SESSION_BUS_ADDRESS`.
    pub user: Option<String>,
}

impl ExecOptions {
    /// Sensible defaults: capture both streams, no timeout, no user
    /// switch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capture_stdout: true,
            capture_stderr: true,
            ..Default::default()
        }
    }
}

/// Execute `argv` (argv\[0\] is the binary) and return its output,
/// regardless of exit code. Fails only on spawn/timeout errors, never
/// on a non-zero exit. Callers that want that to be an error should
/// use [`exec_success`].
///
/// # Errors
/// Returns [`Error::InvalidArgs`] for an empty argv, [`Error::Io`] if
/// the process cannot be spawned, or [`Error::Exec`] if the command
/// times out.
pub async fn exec(argv: &[String], opts: &ExecOptions) -> Result<ExecOutput> {
    if argv.is_empty() {
        return Err(Error::invalid_args("empty argv"));
    }

    let full_argv = wrap_for_user(argv, opts.user.as_deref());
    let command_str = full_argv.join(" ");
    debug!("executing: {command_str}");

    let mut command = TokioCommand::new(&full_argv[0]);
    command.args(&full_argv[1..]);

    command.stdin(if opts.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    command.stdout(if opts.capture_stdout {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    command.stderr(if opts.capture_stderr {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    for (k, v) in &opts.env {
        command.env(k, v);
    }
    if let Some(cwd) = &opts.cwd {
        command.current_dir(cwd);
    }

    let mut child = command.spawn()?;

    if let Some(data) = opts.stdin.clone() {
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&data).await?;
            stdin.shutdown().await?;
        }
    }

    let wait = async {
        let mut stdout_buf = String::new();
        let mut stderr_buf = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout.read_to_string(&mut stdout_buf).await.ok();
        }
        if let Some(mut stderr) = child.stderr.take() {
            stderr.read_to_string(&mut stderr_buf).await.ok();
        }
        let status = child.wait().await?;
        Ok::<_, Error>((status.code().unwrap_or(-1), stdout_buf, stderr_buf))
    };

    let (exit_code, stdout, stderr) = match opts.timeout {
        Some(duration) => match timeout(duration, wait).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::exec(
                    command_str,
                    -1,
                    format!("timed out after {duration:?}"),
                ))
            }
        },
        None => wait.await?,
    };

    trace!("exit code {exit_code}");
    Ok(ExecOutput {
        exit_code,
        stdout,
        stderr,
    })
}

/// Like [`exec`], but elevates a non-zero exit to [`Error::Exec`]
/// carrying the joined argv and trimmed stderr.
pub async fn exec_success(argv: &[String], opts: &ExecOptions) -> Result<ExecOutput> {
    let output = exec(argv, opts).await?;
    if !output.success() {
        warn!("command failed: {}", argv.join(" "));
        return Err(Error::exec(
            argv.join(" "),
            output.exit_code,
            output.stderr.trim(),
        ));
    }
    Ok(output)
}

/// Build the options [`exec_as_user`] passes to [`exec`]: the user
/// switch plus the bus environment, without actually spawning
/// anything. Split out so the environment wiring is unit-testable
/// without requiring a working `sudo`.
fn user_scoped_options(user: &str, uid: u32, mut opts: ExecOptions) -> ExecOptions {
    opts.user = Some(user.to_string());
    opts.env
        .entry("XDG_RUNTIME_DIR".to_string())
        .or_insert_with(|| format!("/run/user/{uid}"));
    opts.env
        .entry("DBUS_SESSION_BUS_ADDRESS".to_string())
        .or_insert_with(|| format!("unix:path=/run/user/{uid}/bus"));
    opts.cwd.get_or_insert_with(|| PathBuf::from("/tmp"));
    opts
}

/// Execute `argv` as `user`, with `XDG_RUNTIME_DIR=/run/user/<uid>`,
/// `DBUS_SESSION_BUS_ADDRESS=unix:path=/run/user/<uid>/bus`, and
/// `cwd=/tmp` unless the caller's `opts` already set those.
pub async fn exec_as_user(
    user: &str,
    uid: u32,
    argv: &[String],
    opts: ExecOptions,
) -> Result<ExecOutput> {
    exec(argv, &user_scoped_options(user, uid, opts)).await
}

/// Elevated variant of [`exec_as_user`] that fails on non-zero exit.
pub async fn exec_as_user_success(
    user: &str,
    uid: u32,
    argv: &[String],
    opts: ExecOptions,
) -> Result<ExecOutput> {
    let output = exec_as_user(user, uid, argv, opts).await?;
    if !output.success() {
        return Err(Error::exec(
            argv.join(" "),
            output.exit_code,
            output.stderr.trim(),
        ));
    }
    Ok(output)
}

/// Run a shell command line through `/bin/sh -c`, for the rare cases
/// that genuinely need piping or redirection (secret generation,
/// piping to `podman secret create`). Callers are responsible for
/// escaping any fragment that originates in user input before it
/// reaches `cmdline`.
pub async fn shell(cmdline: &str, opts: &ExecOptions) -> Result<ExecOutput> {
    let argv = vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        cmdline.to_string(),
    ];
    exec(&argv, opts).await
}

/// [`shell`], run as a specific user.
pub async fn shell_as_user(
    user: &str,
    uid: u32,
    cmdline: &str,
    opts: ExecOptions,
) -> Result<ExecOutput> {
    let argv = vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        cmdline.to_string(),
    ];
    exec_as_user(user, uid, &argv, opts).await
}

fn wrap_for_user(argv: &[String], user: Option<&str>) -> Vec<String> {
    match user {
        None => argv.to_vec(),
        Some(user) => {
            let mut wrapped = vec![
                "sudo".to_string(),
                "--preserve-env=XDG_RUNTIME_DIR,DBUS_SESSION_BUS_ADDRESS".to_string(),
                "-u".to_string(),
                user.to_string(),
                "--".to_string(),
            ];
            wrapped.extend(argv.iter().cloned());
            wrapped
        }
    }
}

/// Locate a binary on `PATH`, for process-gateway callers that want to
/// fail fast with [`Error::NotFound`] rather than surface a raw spawn
/// error from the OS.
pub fn find_binary(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::not_found(format!("executable `{name}` on PATH")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_for_user_prepends_sudo() {
        let argv = vec!["systemctl".to_string(), "--user".to_string(), "start".to_string()];
        let wrapped = wrap_for_user(&argv, Some("divban-caddy"));
        assert_eq!(
            wrapped,
            vec![
                "sudo",
                "--preserve-env=XDG_RUNTIME_DIR,DBUS_SESSION_BUS_ADDRESS",
                "-u",
                "divban-caddy",
                "--",
                "systemctl",
                "--user",
                "start",
            ]
        );
    }

    #[test]
    fn wrap_for_user_is_identity_without_user() {
        let argv = vec!["id".to_string()];
        assert_eq!(wrap_for_user(&argv, None), argv);
    }

    #[tokio::test]
    async fn empty_argv_is_invalid_args() {
        let err = exec(&[], &ExecOptions::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgs { .. }));
    }

    #[tokio::test]
    async fn exec_captures_stdout_and_exit_code() {
        let argv = vec!["/bin/echo".to_string(), "hello".to_string()];
        let out = exec(&argv, &ExecOptions::new()).await.unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn exec_success_surfaces_nonzero_exit() {
        let argv = vec!["/bin/sh".to_string(), "-c".to_string(), "exit 7".to_string()];
        let err = exec_success(&argv, &ExecOptions::new()).await.unwrap_err();
        match err {
            Error::Exec { exit_code, .. } => assert_eq!(exit_code, 7),
            other => panic!("expected Exec, got {other:?}"),
        }
    }

    #[test]
    fn user_scoped_options_sets_bus_environment_and_cwd() {
        let opts = user_scoped_options("divban-caddy", 1042, ExecOptions::new());
        assert_eq!(opts.user.as_deref(), Some("divban-caddy"));
        assert_eq!(
            opts.env.get("XDG_RUNTIME_DIR").map(String::as_str),
            Some("/run/user/1042")
        );
        assert_eq!(
            opts.env.get("DBUS_SESSION_BUS_ADDRESS").map(String::as_str),
            Some("unix:path=/run/user/1042/bus")
        );
        assert_eq!(opts.cwd, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn user_scoped_options_does_not_override_caller_cwd() {
        let mut opts = ExecOptions::new();
        opts.cwd = Some(PathBuf::from("/srv/app"));
        let opts = user_scoped_options("divban-caddy", 1042, opts);
        assert_eq!(opts.cwd, Some(PathBuf::from("/srv/app")));
    }
}
