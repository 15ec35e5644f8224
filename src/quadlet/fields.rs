//! Small per-field algorithms shared by the container compiler: port
//! mappings, network mode, volume mount strings, SELinux relabeling,
//! and user namespace rendering. Kept apart from [`crate::quadlet::container`]
//! so each one is independently testable.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A single `PublishPort=` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Optional host IP to bind to.
    pub host_ip: Option<String>,
    /// Host port.
    pub host_port: u16,
    /// Container port.
    pub container_port: u16,
    /// Protocol, defaults to `tcp`.
    pub protocol: Option<String>,
}

impl PortMapping {
    /// Construct a mapping with no host IP and the default protocol.
    #[must_use]
    pub fn new(host_port: u16, container_port: u16) -> Self {
        Self {
            host_ip: None,
            host_port,
            container_port,
            protocol: None,
        }
    }

    /// Pin `host_ip` to `127.0.0.1`, the convention used for
    /// database-style templates that should never be reachable except
    /// from the host itself.
    #[must_use]
    pub fn create_localhost_port(host_port: u16, container_port: u16) -> Self {
        Self {
            host_ip: Some("127.0.0.1".to_string()),
            host_port,
            container_port,
            protocol: None,
        }
    }

    /// Render as `[<hostIp>:]<host>:<container>/<protocol>`. IPv6 host
    /// IPs are bracket-wrapped.
    #[must_use]
    pub fn render(&self) -> String {
        let protocol = self.protocol.as_deref().unwrap_or("tcp");
        match &self.host_ip {
            Some(ip) if ip.contains(':') => {
                format!("[{ip}]:{}:{}/{protocol}", self.host_port, self.container_port)
            }
            Some(ip) => format!("{ip}:{}:{}/{protocol}", self.host_port, self.container_port),
            None => format!("{}:{}/{protocol}", self.host_port, self.container_port),
        }
    }
}

/// Rootless network mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkMode {
    /// `pasta`, optionally with `--map-host-loopback=<addr>`.
    Pasta {
        /// Address to map the host loopback to, if set.
        map_host_loopback: Option<String>,
    },
    /// `slirp4netns`.
    Slirp4netns,
    /// `host`.
    Host,
    /// `none`.
    None,
}

impl NetworkMode {
    /// Render the `Network=` value for this mode.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Pasta {
                map_host_loopback: Some(addr),
            } => format!("pasta:--map-host-loopback={addr}"),
            Self::Pasta {
                map_host_loopback: None,
            } => "pasta".to_string(),
            Self::Slirp4netns => "slirp4netns".to_string(),
            Self::Host => "host".to_string(),
            Self::None => "none".to_string(),
        }
    }
}

/// Whether a volume `source` is a bind mount (starts with `/`).
#[must_use]
pub fn is_bind_mount(source: &str) -> bool {
    source.starts_with('/')
}

/// Whether a volume `source` refers to a named Quadlet volume unit
/// (ends with `.volume`).
#[must_use]
pub fn is_named_volume(source: &str) -> bool {
    source.ends_with(".volume")
}

/// A `Volume=` mount specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Mount source: host path, named volume, or `.volume` unit name.
    pub source: String,
    /// Mount target inside the container.
    pub target: String,
    /// Raw mount options (e.g. `"ro"`, `"z"`), comma-joined on render.
    pub options: Vec<String>,
}

impl VolumeMount {
    /// Render as `"<source>:<target>[:<options>]"`.
    #[must_use]
    pub fn render(&self) -> String {
        if self.options.is_empty() {
            format!("{}:{}", self.source, self.target)
        } else {
            format!("{}:{}:{}", self.source, self.target, self.options.join(","))
        }
    }

    /// Apply SELinux relabeling in place: if SELinux is enforcing,
    /// this is a bind mount, and the options don't already include
    /// `z`/`Z`, append `,Z` (or set `Z` if options were empty). Named
    /// volumes are never touched.
    pub fn relabel_for_selinux(&mut self, enforcing: bool) {
        if !enforcing || !is_bind_mount(&self.source) {
            return;
        }
        if self.options.iter().any(|o| o == "z" || o == "Z") {
            return;
        }
        self.options.push("Z".to_string());
    }
}

/// Rootless user namespace mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserNamespace {
    /// `keep-id`, optionally with a `uid=...,gid=...` suffix.
    KeepId {
        /// Target UID inside the container.
        uid: Option<u32>,
        /// Target GID inside the container.
        gid: Option<u32>,
    },
    /// `auto`, optionally with a `size=...` suffix.
    Auto {
        /// Size of the allocated namespace.
        size: Option<u32>,
    },
    /// `host`.
    Host,
}

impl UserNamespace {
    /// Render the `UserNS=` value.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::KeepId { uid, gid } => {
                let mut parts = Vec::new();
                if let Some(uid) = uid {
                    parts.push(format!("uid={uid}"));
                }
                if let Some(gid) = gid {
                    parts.push(format!("gid={gid}"));
                }
                if parts.is_empty() {
                    "keep-id".to_string()
                } else {
                    format!("keep-id:{}", parts.join(","))
                }
            }
            Self::Auto { size: Some(size) } => format!("auto:size={size}"),
            Self::Auto { size: None } => "auto".to_string(),
            Self::Host => "host".to_string(),
        }
    }
}

/// Parse a `"host:container/proto"`-ish user-authored port mapping
/// string into a [`PortMapping`]. Accepts `host:container`,
/// `hostIp:host:container`, and an optional trailing `/proto`.
///
/// # Errors
/// Returns [`Error::InvalidConfig`] if the mapping cannot be parsed.
pub fn parse_port_mapping(s: &str) -> Result<PortMapping> {
    let (body, protocol) = match s.rsplit_once('/') {
        Some((b, p)) => (b, Some(p.to_string())),
        None => (s, None),
    };
    let parts: Vec<&str> = body.rsplit(':').collect();
    let (host_port, container_port, host_ip) = match parts.as_slice() {
        [container, host] => (*host, *container, None),
        [container, host, ip_rest @ ..] if !ip_rest.is_empty() => {
            (*host, *container, Some(ip_rest.iter().rev().copied().collect::<Vec<_>>().join(":")))
        }
        _ => {
            return Err(Error::invalid_config(
                "ports",
                format!("malformed port mapping {s:?}"),
            ))
        }
    };
    let host_port: u16 = host_port
        .parse()
        .map_err(|_| Error::invalid_config("ports", format!("invalid host port in {s:?}")))?;
    let container_port: u16 = container_port
        .parse()
        .map_err(|_| Error::invalid_config("ports", format!("invalid container port in {s:?}")))?;
    Ok(PortMapping {
        host_ip,
        host_port,
        container_port,
        protocol,
    })
}
