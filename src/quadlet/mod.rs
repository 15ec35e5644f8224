//! The Quadlet compiler: a pure transformation from a
//! service/stack description into one or more typed unit artifacts.
//!
//! Everything under this module is side-effect free: no file I/O, no
//! process spawning. [`compile`] and [`compile_stack`] are the only
//! entry points callers outside this module need.

pub mod container;
pub mod fields;
pub mod image_ref;
pub mod memory;
pub mod network;
pub mod stack;
pub mod volume;

use crate::error::Result;
use crate::ini;
use serde::{Deserialize, Serialize};

/// The closed sum of things the compiler can be asked to compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitDescriptor {
    /// A single container.
    Container(container::Container),
    /// A private network.
    Network(network::Network),
    /// A named volume.
    Volume(volume::Volume),
}

/// The kind of a compiled unit, mirroring the Quadlet filename suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    /// `.container`.
    Container,
    /// `.network`.
    Network,
    /// `.volume`.
    Volume,
}

impl UnitKind {
    /// The Quadlet filename suffix for this kind, without the dot.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Network => "network",
            Self::Volume => "volume",
        }
    }
}

/// One compiled unit: a filename and its rendered contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedUnit {
    /// `<stem>.<suffix>`.
    pub filename: String,
    /// Rendered INI text, ready to write to disk verbatim.
    pub content: String,
    /// The unit's kind.
    pub kind: UnitKind,
}

/// Compile a single [`UnitDescriptor`] to its [`GeneratedUnit`].
///
/// # Errors
/// Propagates validation errors from the per-kind compiler
/// ([`container::compile`], [`network::compile`], [`volume::compile`]).
pub fn compile(descriptor: &UnitDescriptor) -> Result<GeneratedUnit> {
    let (name, kind, sections) = match descriptor {
        UnitDescriptor::Container(c) => (c.name.clone(), UnitKind::Container, container::compile(c)?),
        UnitDescriptor::Network(n) => (n.name.clone(), UnitKind::Network, network::compile(n)?),
        UnitDescriptor::Volume(v) => (v.name.clone(), UnitKind::Volume, volume::compile(v)?),
    };
    Ok(GeneratedUnit {
        filename: format!("{name}.{}", kind.suffix()),
        content: ini::render(&sections),
        kind,
    })
}

/// Compile an entire [`stack::Stack`] into its member units: the
/// stack's network(s), its volumes, and every member container (with
/// stack-level defaults applied and peer references rewritten).
///
/// Member container peer references are validated (every `requires`/
/// `wants` name must resolve to another member of the same stack)
/// before any compilation happens.
///
/// # Errors
/// Returns [`crate::error::Error::InvalidConfig`] if a peer reference
/// does not resolve, or propagates a per-unit compile error.
pub fn compile_stack(s: &stack::Stack) -> Result<Vec<GeneratedUnit>> {
    stack::validate_peer_references(s)?;

    let mut units = Vec::new();
    for network in s.network.iter().chain(s.networks.iter()) {
        units.push(compile(&UnitDescriptor::Network(network.clone()))?);
    }
    for volume in &s.volumes {
        units.push(compile(&UnitDescriptor::Volume(volume.clone()))?);
    }
    for member in &s.containers {
        let resolved = stack::apply_stack_defaults(s, &member.container);
        units.push(compile(&UnitDescriptor::Container(resolved))?);
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quadlet::container::Container;
    use crate::quadlet::network::Network;
    use crate::quadlet::stack::{Stack, StackContainer};
    use crate::quadlet::volume::Volume;

    #[test]
    fn compile_container_picks_container_suffix() {
        let container = Container {
            name: "caddy".to_string(),
            image: "docker.io/library/caddy:2".to_string(),
            ..Default::default()
        };
        let unit = compile(&UnitDescriptor::Container(container)).unwrap();
        assert_eq!(unit.filename, "caddy.container");
        assert!(matches!(unit.kind, UnitKind::Container));
        assert!(unit.content.ends_with('\n'));
    }

    #[test]
    fn compile_network_and_volume_pick_matching_suffixes() {
        let network = Network {
            name: "app-net".to_string(),
            ..Default::default()
        };
        let unit = compile(&UnitDescriptor::Network(network)).unwrap();
        assert_eq!(unit.filename, "app-net.network");

        let volume = Volume {
            name: "app-data".to_string(),
            ..Default::default()
        };
        let unit = compile(&UnitDescriptor::Volume(volume)).unwrap();
        assert_eq!(unit.filename, "app-data.volume");
    }

    #[test]
    fn compile_stack_emits_network_volumes_and_containers() {
        let stack = Stack {
            name: "myapp".to_string(),
            network: Some(Network {
                name: "myapp-net".to_string(),
                ..Default::default()
            }),
            volumes: vec![Volume {
                name: "myapp-data".to_string(),
                ..Default::default()
            }],
            containers: vec![
                StackContainer {
                    container: Container {
                        name: "app".to_string(),
                        image: "example.com/app:1".to_string(),
                        dependencies: crate::quadlet::container::Dependencies {
                            requires: vec!["db".to_string()],
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                },
                StackContainer {
                    container: Container {
                        name: "db".to_string(),
                        image: "example.com/db:1".to_string(),
                        ..Default::default()
                    },
                },
            ],
            default_service_restart: Some("always".to_string()),
            ..Default::default()
        };

        let units = compile_stack(&stack).unwrap();
        let filenames: Vec<&str> = units.iter().map(|u| u.filename.as_str()).collect();
        assert_eq!(
            filenames,
            vec!["myapp-net.network", "myapp-data.volume", "app.container", "db.container"]
        );

        let app_unit = units.iter().find(|u| u.filename == "app.container").unwrap();
        assert!(app_unit.content.contains("Requires=db.service"));
        assert!(app_unit.content.contains("Restart=always"));
    }

    #[test]
    fn compile_stack_rejects_unresolved_peer() {
        let stack = Stack {
            name: "myapp".to_string(),
            containers: vec![StackContainer {
                container: Container {
                    name: "app".to_string(),
                    image: "example.com/app:1".to_string(),
                    dependencies: crate::quadlet::container::Dependencies {
                        requires: vec!["ghost".to_string()],
                        ..Default::default()
                    },
                    ..Default::default()
                },
            }],
            ..Default::default()
        };
        assert!(compile_stack(&stack).is_err());
    }
}
