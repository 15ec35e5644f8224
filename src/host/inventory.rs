//! Host inventory: read-only queries against the host at the
//! moment of invocation. Nothing here mutates anything; the mutation
//! engine ([`crate::host::mutation`]) is the only writer.

use crate::error::{Error, Result};
use crate::gateway::{self, ExecOptions};
use std::collections::HashSet;
use std::path::Path;

/// A parsed line of `/etc/subuid` or `/etc/subgid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubRange {
    /// Owning username.
    pub user: String,
    /// First subordinate id in the range.
    pub start: u32,
    /// Size of the range.
    pub size: u32,
}

impl SubRange {
    /// Last id in the range, inclusive.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.start + self.size - 1
    }
}

const PASSWD_PATH: &str = "/etc/passwd";
const SUBUID_PATH: &str = "/etc/subuid";
const LINGER_DIR: &str = "/var/lib/systemd/linger";

const NOLOGIN_CANDIDATES: &[&str] = &[
    "/usr/sbin/nologin",
    "/sbin/nologin",
    "/usr/bin/nologin",
    "/bin/nologin",
];

/// Parse UIDs out of `/etc/passwd`-formatted text (`name:x:uid:gid:...`).
fn parse_passwd_uids(text: &str) -> HashSet<u32> {
    text.lines()
        .filter_map(|line| line.split(':').nth(2))
        .filter_map(|uid| uid.parse::<u32>().ok())
        .collect()
}

/// Parse UIDs out of `getent passwd` output, which has the same
/// colon-separated shape as the flat file.
fn parse_getent_uids(text: &str) -> HashSet<u32> {
    parse_passwd_uids(text)
}

/// Union of UIDs from the host passwd file and, best-effort, from
/// `getent passwd` (NSS-backed sources like LDAP/sssd). A `getent`
/// failure (missing binary, no NSS switch configured) is not an error.
///
/// # Errors
/// Returns [`Error::Io`] if `/etc/passwd` cannot be read.
pub async fn used_uids() -> Result<HashSet<u32>> {
    let passwd_text = tokio::fs::read_to_string(PASSWD_PATH).await?;
    let mut uids = parse_passwd_uids(&passwd_text);

    if let Ok(argv) = gateway::find_binary("getent").map(|path| {
        vec![path.to_string_lossy().into_owned(), "passwd".to_string()]
    }) {
        if let Ok(output) = gateway::exec(&argv, &ExecOptions::new()).await {
            if output.success() {
                uids.extend(parse_getent_uids(&output.stdout));
            }
        }
    }

    Ok(uids)
}

/// Parse `/etc/subuid`/`/etc/subgid`-formatted text (`user:start:size`).
fn parse_subid_text(text: &str) -> Vec<SubRange> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, ':');
            let user = parts.next()?.to_string();
            let start = parts.next()?.parse::<u32>().ok()?;
            let size = parts.next()?.parse::<u32>().ok()?;
            Some(SubRange { user, start, size })
        })
        .collect()
}

/// All allocated subordinate ranges from the host subuid file.
///
/// # Errors
/// Returns [`Error::Io`] if the subuid file cannot be read.
pub async fn sub_ranges() -> Result<Vec<SubRange>> {
    let text = tokio::fs::read_to_string(SUBUID_PATH).await?;
    Ok(parse_subid_text(&text))
}

/// The numeric UID of `username`, via `id -u`.
///
/// # Errors
/// Returns [`Error::NotFound`] if the user does not exist or the
/// output does not parse.
pub async fn uid_of(username: &str) -> Result<u32> {
    let argv = vec!["id".to_string(), "-u".to_string(), username.to_string()];
    let output = gateway::exec(&argv, &ExecOptions::new()).await?;
    if !output.success() {
        return Err(Error::not_found(format!("user {username:?}")));
    }
    output
        .stdout
        .trim()
        .parse::<u32>()
        .map_err(|_| Error::not_found(format!("user {username:?}")))
}

/// Whether `username` exists, via `id`'s exit code.
///
/// # Errors
/// Returns [`Error::Io`] only if `id` itself cannot be spawned.
pub async fn user_exists(username: &str) -> Result<bool> {
    let argv = vec!["id".to_string(), username.to_string()];
    let output = gateway::exec(&argv, &ExecOptions::new()).await?;
    Ok(output.success())
}

/// The host's SELinux mode. `Disabled` if `getenforce` is absent or
/// its invocation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelinuxMode {
    /// SELinux is enforcing; relabeling (`:Z`/`:z`) is required.
    Enforcing,
    /// SELinux is loaded but permissive.
    Permissive,
    /// SELinux is not in use on this host.
    Disabled,
}

/// Query the host's current SELinux mode via `getenforce`.
pub async fn selinux_mode() -> SelinuxMode {
    let Ok(path) = gateway::find_binary("getenforce") else {
        return SelinuxMode::Disabled;
    };
    let argv = vec![path.to_string_lossy().into_owned()];
    let Ok(output) = gateway::exec(&argv, &ExecOptions::new()).await else {
        return SelinuxMode::Disabled;
    };
    match output.stdout.trim().to_lowercase().as_str() {
        "enforcing" => SelinuxMode::Enforcing,
        "permissive" => SelinuxMode::Permissive,
        _ => SelinuxMode::Disabled,
    }
}

/// The first existing nologin-style shell from the canonical list,
/// falling back to `/bin/false`.
pub async fn nologin_shell() -> String {
    for candidate in NOLOGIN_CANDIDATES {
        if tokio::fs::metadata(candidate).await.is_ok() {
            return (*candidate).to_string();
        }
    }
    "/bin/false".to_string()
}

/// Whether linger is enabled for `username`: presence of the marker
/// file `/var/lib/systemd/linger/<username>`.
pub async fn linger_enabled(username: &str) -> bool {
    let path = Path::new(LINGER_DIR).join(username);
    tokio::fs::metadata(&path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_passwd_uids_extracts_third_field() {
        let text = "root:x:0:0:root:/root:/bin/bash\ndivban-caddy:x:10007:10007::/home/divban-caddy:/usr/sbin/nologin\n";
        let uids = parse_passwd_uids(text);
        assert!(uids.contains(&0));
        assert!(uids.contains(&10007));
        assert_eq!(uids.len(), 2);
    }

    #[test]
    fn parse_passwd_uids_skips_malformed_lines() {
        let text = "incomplete:line\nroot:x:0:0:root:/root:/bin/bash\n";
        let uids = parse_passwd_uids(text);
        assert_eq!(uids, HashSet::from([0]));
    }

    #[test]
    fn parse_subid_text_reads_user_start_size() {
        let text = "divban-caddy:100000:65536\ndivban-redis:165536:65536\n";
        let ranges = parse_subid_text(text);
        assert_eq!(
            ranges,
            vec![
                SubRange {
                    user: "divban-caddy".to_string(),
                    start: 100_000,
                    size: 65_536
                },
                SubRange {
                    user: "divban-redis".to_string(),
                    start: 165_536,
                    size: 65_536
                },
            ]
        );
    }

    #[test]
    fn sub_range_end_is_inclusive() {
        let range = SubRange {
            user: "divban-caddy".to_string(),
            start: 100_000,
            size: 65_536,
        };
        assert_eq!(range.end(), 165_535);
    }

    #[tokio::test]
    async fn nologin_shell_falls_back_to_bin_false_if_nothing_matches() {
        // Sandboxed test environments frequently lack every nologin
        // path on NOLOGIN_CANDIDATES, so this only asserts the
        // contract: the result is always one of the known paths.
        let shell = nologin_shell().await;
        assert!(
            NOLOGIN_CANDIDATES.contains(&shell.as_str()) || shell == "/bin/false",
            "unexpected shell: {shell}"
        );
    }

    #[tokio::test]
    async fn linger_enabled_is_false_for_nonexistent_marker() {
        assert!(!linger_enabled("divban-definitely-not-a-real-user-xyz").await);
    }
}
