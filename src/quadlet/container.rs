//! The `Container` variant of [`UnitDescriptor`](crate::quadlet::UnitDescriptor)
//! and its compiler.
//!
//! Field names mirror the Quadlet `.container` key names directly
//! (`AddCapability=`, `PublishPort=`, `HealthCmd=`, ...) the way
//! `podlet` documents them
//! (`examples/other_examples/10bb4b9b_containers-podlet__src-cli-container-quadlet.rs.rs`):
//! every compiler field doc comment below states the key it converts
//! to, for the same reason podlet's does: the mapping is the
//! contract, not an implementation detail worth re-deriving by
//! reading the compiler body.

use crate::entry::{self, Entries};
use crate::error::{Error, Result};
use crate::ini::IniSection;
use crate::quadlet::fields::{NetworkMode, PortMapping, UserNamespace, VolumeMount};
use crate::quadlet::image_ref::compiled_image_value;
use crate::quadlet::memory;
use serde::{Deserialize, Serialize};

/// Dependency wiring between containers in the same stack, or towards
/// plain systemd unit names. Peer names are rewritten to `<peer>.service`
/// by [`compile`]; `after` defaults to `requires` when unset. A caller
/// that wants membership without ordering sets `after` to an empty list
/// explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Hard dependencies.
    pub requires: Vec<String>,
    /// Ordering-only dependencies; `None` means "default to `requires`".
    pub after: Option<Vec<String>>,
    /// Soft dependencies.
    pub wants: Vec<String>,
    /// Reverse ordering constraint.
    pub before: Vec<String>,
}

/// `HealthCheck` sub-config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// `HealthCmd=`.
    pub cmd: Option<String>,
    /// `HealthInterval=`, a duration string (`30s`, `1m`, ...).
    pub interval: Option<String>,
    /// `HealthTimeout=`.
    pub timeout: Option<String>,
    /// `HealthStartPeriod=`.
    pub start_period: Option<String>,
    /// `HealthRetries=`.
    pub retries: Option<u32>,
}

/// `Security` sub-config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    /// `NoNewPrivileges=`. Defaults to `true` when unset; this field
    /// holds the already-resolved value by the time a bare `Container`
    /// reaches [`compile`].
    pub no_new_privileges: Option<bool>,
    /// `ReadOnly=`.
    pub read_only: Option<bool>,
    /// `SeccompProfile=`.
    pub seccomp_profile: Option<String>,
    /// `SELinux` enforcing at compile time, not a unit-file key
    /// itself, but the input the bind-mount relabeling algorithm needs.
    pub selinux_enforcing: bool,
}

/// `Resources` sub-config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// `Memory=`, a memory-size literal.
    pub memory: Option<String>,
    /// `ShmSize=`, a memory-size literal.
    pub shm_size: Option<String>,
    /// `PidsLimit=`.
    pub pids_limit: Option<i64>,
    /// `CPUs=`.
    pub cpus: Option<String>,
}

/// `Service` sub-config (the `[Service]` section).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// `Restart=`.
    pub restart: Option<String>,
    /// `RestartSec=`.
    pub restart_sec: Option<u32>,
    /// `TimeoutStartSec=`.
    pub timeout_start_sec: Option<u32>,
}

/// A single container unit descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Unit stem; must match `[a-z_][a-z0-9_-]{0,31}`.
    pub name: String,
    /// `Description=`.
    pub description: Option<String>,
    /// `Image=` base reference (before digest is folded in).
    pub image: String,
    /// Digest to append as `image@digest`.
    pub image_digest: Option<String>,
    /// `Pull=`.
    pub image_pull_policy: Option<String>,
    /// `AutoUpdate=`.
    pub auto_update: Option<String>,
    /// Peer/unit dependency wiring.
    pub dependencies: Dependencies,
    /// `Network=` mode.
    pub network: Option<NetworkMode>,
    /// `Volume=` mounts.
    pub volumes: Vec<VolumeMount>,
    /// `PublishPort=` mappings.
    pub ports: Vec<PortMapping>,
    /// `Environment=` pairs, in authored order.
    pub env: Vec<(String, String)>,
    /// `Secret=` references: `(name, options)`.
    pub secrets: Vec<(String, Vec<String>)>,
    /// User namespace mode.
    pub user_namespace: Option<UserNamespace>,
    /// Health-check config.
    pub health_check: HealthCheck,
    /// Security config.
    pub security: Security,
    /// Linux capability add/drop lists.
    pub capabilities: Capabilities,
    /// Resource limits.
    pub resources: Resources,
    /// Escape-hatch entries appended verbatim to `[Container]`, for
    /// keys this descriptor has no dedicated field for.
    pub misc: Vec<(String, String)>,
    /// `[Service]` section.
    pub service: ServiceConfig,
    /// `WantedBy=`; defaults to `default.target` if unset.
    pub wanted_by: Option<String>,
}

/// Linux capability add/drop lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// `AddCapability=`.
    pub add: Vec<String>,
    /// `DropCapability=`.
    pub drop: Vec<String>,
}

const NAME_MAX_LEN: usize = 32;

fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_first = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if !valid_first || !valid_rest || name.len() > NAME_MAX_LEN {
        return Err(Error::invalid_config(
            "name",
            format!("{name:?} does not match [a-z_][a-z0-9_-]{{0,31}}"),
        ));
    }
    Ok(())
}

fn rewrite_peers(names: &[String]) -> Vec<String> {
    names.iter().map(|n| format!("{n}.service")).collect()
}

/// Compile a [`Container`] into its `.container` unit file sections.
/// Emits `[Unit]`, `[Container]`, `[Service]`, `[Install]` in that
/// order (empty sections are dropped by the section writer).
///
/// # Errors
/// Returns [`Error::InvalidConfig`] if `name` is malformed, `image` is
/// empty, or a `resources.memory`/`resources.shm_size` literal does
/// not parse.
pub fn compile(container: &Container) -> Result<Vec<IniSection>> {
    validate_name(&container.name)?;
    if container.image.is_empty() {
        return Err(Error::invalid_config("image", "image must not be empty"));
    }

    let after = container
        .dependencies
        .after
        .clone()
        .unwrap_or_else(|| container.dependencies.requires.clone());

    let unit_entries = entry::concat(vec![
        entry::from_value("Description", container.description.as_ref()),
        entry::from_array("Requires", Some(rewrite_peers(&container.dependencies.requires).as_slice())),
        entry::from_array("After", Some(rewrite_peers(&after).as_slice())),
        entry::from_array("Wants", Some(rewrite_peers(&container.dependencies.wants).as_slice())),
        entry::from_array("Before", Some(rewrite_peers(&container.dependencies.before).as_slice())),
    ]);

    let container_entries = compile_container_section(container)?;

    let no_new_privileges = container.security.no_new_privileges.unwrap_or(true);
    let container_entries = entry::concat(vec![
        container_entries,
        entry::when(no_new_privileges, "NoNewPrivileges", entry::bool_str(true)),
    ]);

    let service_entries = entry::concat(vec![
        entry::from_value("Restart", container.service.restart.as_ref()),
        entry::from_value("RestartSec", container.service.restart_sec.as_ref()),
        entry::from_value(
            "TimeoutStartSec",
            container.service.timeout_start_sec.as_ref(),
        ),
    ]);

    let wanted_by = container
        .wanted_by
        .clone()
        .unwrap_or_else(|| "default.target".to_string());
    let install_entries = vec![entry::Entry::new("WantedBy", wanted_by)];

    Ok(vec![
        IniSection::new("Unit", unit_entries),
        IniSection::new("Container", container_entries),
        IniSection::new("Service", service_entries),
        IniSection::new("Install", install_entries),
    ])
}

fn compile_container_section(container: &Container) -> Result<Entries> {
    let image_value = compiled_image_value(&container.image, container.image_digest.as_deref());

    let mut volumes = container.volumes.clone();
    for mount in &mut volumes {
        mount.relabel_for_selinux(container.security.selinux_enforcing);
    }
    let volume_strings: Vec<String> = volumes.iter().map(VolumeMount::render).collect();
    let port_strings: Vec<String> = container.ports.iter().map(PortMapping::render).collect();
    let env_entries: Vec<entry::Entry> = container
        .env
        .iter()
        .map(|(k, v)| entry::Entry::new("Environment", format!("{k}={v}")))
        .collect();
    let secret_strings: Vec<String> = container
        .secrets
        .iter()
        .map(|(name, opts)| {
            if opts.is_empty() {
                name.clone()
            } else {
                format!("{name},{}", opts.join(","))
            }
        })
        .collect();

    let memory_value = container
        .resources
        .memory
        .as_deref()
        .map(memory::parse)
        .transpose()?
        .map(memory::format_bytes);
    let shm_size_value = container
        .resources
        .shm_size
        .as_deref()
        .map(memory::parse)
        .transpose()?
        .map(memory::format_bytes);

    Ok(entry::concat(vec![
        vec![entry::Entry::new("Image", image_value)],
        vec![entry::Entry::new("ContainerName", container.name.clone())],
        entry::from_value("Pull", container.image_pull_policy.as_ref()),
        entry::from_value("AutoUpdate", container.auto_update.as_ref()),
        entry::from_maybe("Network", container.network.as_ref(), NetworkMode::render),
        entry::from_array("PublishPort", Some(port_strings.as_slice())),
        entry::from_array("Volume", Some(volume_strings.as_slice())),
        env_entries,
        entry::from_array("Secret", Some(secret_strings.as_slice())),
        entry::from_maybe(
            "UserNS",
            container.user_namespace.as_ref(),
            UserNamespace::render,
        ),
        entry::from_array("AddCapability", Some(container.capabilities.add.as_slice())),
        entry::from_array("DropCapability", Some(container.capabilities.drop.as_slice())),
        entry::from_value("HealthCmd", container.health_check.cmd.as_ref()),
        entry::from_value("HealthInterval", container.health_check.interval.as_ref()),
        entry::from_value("HealthTimeout", container.health_check.timeout.as_ref()),
        entry::from_value(
            "HealthStartPeriod",
            container.health_check.start_period.as_ref(),
        ),
        entry::from_value("HealthRetries", container.health_check.retries.as_ref()),
        entry::from_maybe("ReadOnly", container.security.read_only.as_ref(), |b| {
            entry::bool_str(*b)
        }),
        entry::from_value(
            "SeccompProfile",
            container.security.seccomp_profile.as_ref(),
        ),
        entry::from_value("Memory", memory_value.as_ref()),
        entry::from_value("ShmSize", shm_size_value.as_ref()),
        entry::from_value("PidsLimit", container.resources.pids_limit.as_ref()),
        entry::from_value("CPUs", container.resources.cpus.as_ref()),
        misc_entries(&container.misc),
    ]))
}

fn misc_entries(misc: &[(String, String)]) -> Entries {
    misc.iter()
        .map(|(k, v)| entry::Entry::new(k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ini;

    fn minimal(name: &str, image: &str) -> Container {
        Container {
            name: name.to_string(),
            image: image.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn minimal_container_renders_expected_sections() {
        let mut c = minimal("caddy", "docker.io/library/caddy:2");
        c.description = Some("rev proxy".to_string());
        c.service.restart = Some("on-failure".to_string());

        let sections = compile(&c).unwrap();
        let out = ini::render(&sections);

        assert!(out.contains("[Unit]\nDescription=\"rev proxy\""));
        assert!(out.contains("Image=docker.io/library/caddy:2"));
        assert!(out.contains("ContainerName=caddy"));
        assert!(out.contains("[Service]\nRestart=on-failure"));
        assert!(out.contains("[Install]\nWantedBy=default.target"));
        assert!(out.find("[Unit]").unwrap() < out.find("[Container]").unwrap());
        assert!(out.find("[Container]").unwrap() < out.find("[Service]").unwrap());
        assert!(out.find("[Service]").unwrap() < out.find("[Install]").unwrap());
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn port_and_named_volume_no_relabel() {
        let mut c = minimal("caddy", "docker.io/library/caddy:2");
        c.ports.push(PortMapping::new(8080, 80));
        c.volumes.push(VolumeMount {
            source: "caddy-data.volume".to_string(),
            target: "/data".to_string(),
            options: Vec::new(),
        });
        c.security.selinux_enforcing = true;

        let out = ini::render(&compile(&c).unwrap());
        assert!(out.contains("PublishPort=8080:80/tcp"));
        assert!(out.contains("Volume=caddy-data.volume:/data"));
        assert!(!out.contains(":Z"));
    }

    #[test]
    fn selinux_enforcing_relabels_bind_mount() {
        let mut c = minimal("app", "example.com/app:1");
        c.volumes.push(VolumeMount {
            source: "/srv/app/data".to_string(),
            target: "/data".to_string(),
            options: Vec::new(),
        });
        c.security.selinux_enforcing = true;

        let out = ini::render(&compile(&c).unwrap());
        assert!(out.contains("Volume=/srv/app/data:/data:Z"));
    }

    #[test]
    fn after_defaults_to_requires_when_unset() {
        let mut c = minimal("app", "example.com/app:1");
        c.dependencies.requires = vec!["db".to_string()];
        let out = ini::render(&compile(&c).unwrap());
        assert!(out.contains("Requires=db.service"));
        assert!(out.contains("After=db.service"));
    }

    #[test]
    fn after_can_be_set_independently_of_requires() {
        let mut c = minimal("app", "example.com/app:1");
        c.dependencies.requires = vec!["db".to_string()];
        c.dependencies.after = Some(Vec::new());
        let out = ini::render(&compile(&c).unwrap());
        assert!(out.contains("Requires=db.service"));
        assert!(!out.contains("After="));
    }

    #[test]
    fn digest_is_appended_to_image() {
        let mut c = minimal("app", "docker.io/library/redis:7");
        c.image_digest = Some("sha256:deadbeef".to_string());
        let out = ini::render(&compile(&c).unwrap());
        assert!(out.contains("Image=docker.io/library/redis:7@sha256:deadbeef"));
    }

    #[test]
    fn empty_image_is_rejected() {
        let c = minimal("app", "");
        assert!(matches!(
            compile(&c),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn invalid_name_is_rejected() {
        let c = minimal("Invalid-Name", "image");
        assert!(matches!(compile(&c), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn no_new_privileges_defaults_true() {
        let c = minimal("app", "image");
        let out = ini::render(&compile(&c).unwrap());
        assert!(out.contains("NoNewPrivileges=true"));
    }

    #[test]
    fn no_new_privileges_can_be_turned_off() {
        let mut c = minimal("app", "image");
        c.security.no_new_privileges = Some(false);
        let out = ini::render(&compile(&c).unwrap());
        assert!(!out.contains("NoNewPrivileges=true"));
    }

    #[test]
    fn memory_fields_are_parsed_and_reformatted() {
        let mut c = minimal("app", "image");
        c.resources.memory = Some("512m".to_string());
        c.resources.shm_size = Some("64m".to_string());
        let out = ini::render(&compile(&c).unwrap());
        assert!(out.contains("Memory=512m"));
        assert!(out.contains("ShmSize=64m"));
    }

    #[test]
    fn invalid_memory_literal_surfaces_invalid_args() {
        let mut c = minimal("app", "image");
        c.resources.memory = Some("512x".to_string());
        assert!(matches!(compile(&c), Err(Error::InvalidArgs { .. })));
    }

    #[test]
    fn environment_entries_preserve_authored_order() {
        let mut c = minimal("app", "image");
        c.env.push(("B".to_string(), "2".to_string()));
        c.env.push(("A".to_string(), "1".to_string()));
        let out = ini::render(&compile(&c).unwrap());
        assert!(out.find("Environment=B=2").unwrap() < out.find("Environment=A=1").unwrap());
    }

    #[test]
    fn secret_with_options_is_comma_joined() {
        let mut c = minimal("app", "image");
        c.secrets.push((
            "db-password".to_string(),
            vec!["type=mount".to_string(), "target=/run/secrets/db-password".to_string()],
        ));
        let out = ini::render(&compile(&c).unwrap());
        assert!(out.contains("Secret=db-password,type=mount,target=/run/secrets/db-password"));
    }
}
