//! Stacks: a named group of containers sharing a private network,
//! named volumes, and inter-container dependencies.

use crate::error::{Error, Result};
use crate::quadlet::container::Container;
use crate::quadlet::network::Network;
use crate::quadlet::volume::Volume;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A container within a stack. Identical to [`Container`] except that
/// `requires`/`wants` name *peers* in the same stack rather than
/// arbitrary systemd units, validated against the stack's own
/// container list before compile, then rewritten to `<peer>.service`
/// by the container compiler exactly as a standalone `Container`'s
/// dependencies are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackContainer {
    /// The underlying container descriptor.
    pub container: Container,
}

/// A multi-container stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    /// Stack name (used for default resource naming, not itself a
    /// unit stem).
    pub name: String,
    /// Optional stack description.
    pub description: Option<String>,
    /// The stack's primary private network, if any.
    pub network: Option<Network>,
    /// Additional networks beyond the primary one.
    pub networks: Vec<Network>,
    /// Named volumes owned by the stack.
    pub volumes: Vec<Volume>,
    /// Member containers.
    pub containers: Vec<StackContainer>,
    /// Default `[Service]` restart policy applied to members that
    /// don't set their own.
    pub default_service_restart: Option<String>,
    /// Default `AutoUpdate=` applied to members that don't set their
    /// own.
    pub default_auto_update: Option<String>,
}

/// Validate that every name referenced in a stack container's
/// `requires`/`wants` appears as some other container's `name` in the
/// same stack.
///
/// # Errors
/// Returns [`Error::InvalidConfig`] on an unresolvable peer reference.
pub fn validate_peer_references(stack: &Stack) -> Result<()> {
    let names: HashSet<&str> = stack
        .containers
        .iter()
        .map(|c| c.container.name.as_str())
        .collect();

    for member in &stack.containers {
        for peer in member
            .container
            .dependencies
            .requires
            .iter()
            .chain(member.container.dependencies.wants.iter())
        {
            if !names.contains(peer.as_str()) {
                return Err(Error::invalid_config(
                    format!("{}.dependencies", member.container.name),
                    format!("peer {peer:?} is not a member of stack {:?}", stack.name),
                ));
            }
        }
    }
    Ok(())
}

/// Apply stack-level defaults to a member container that did not set
/// its own values: restart policy and auto-update.
#[must_use]
pub fn apply_stack_defaults(stack: &Stack, container: &Container) -> Container {
    let mut container = container.clone();
    if container.service.restart.is_none() {
        container.service.restart = stack.default_service_restart.clone();
    }
    if container.auto_update.is_none() {
        container.auto_update = stack.default_auto_update.clone();
    }
    container
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, requires: &[&str]) -> StackContainer {
        StackContainer {
            container: Container {
                name: name.to_string(),
                image: "example.com/img:1".to_string(),
                dependencies: crate::quadlet::container::Dependencies {
                    requires: requires.iter().map(|s| s.to_string()).collect(),
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    #[test]
    fn peer_references_resolve_within_stack() {
        let stack = Stack {
            name: "myapp".to_string(),
            containers: vec![member("app", &["db"]), member("db", &[])],
            ..Default::default()
        };
        assert!(validate_peer_references(&stack).is_ok());
    }

    #[test]
    fn unresolved_peer_reference_is_rejected() {
        let stack = Stack {
            name: "myapp".to_string(),
            containers: vec![member("app", &["ghost"])],
            ..Default::default()
        };
        assert!(matches!(
            validate_peer_references(&stack),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn stack_defaults_apply_only_when_unset() {
        let stack = Stack {
            default_service_restart: Some("always".to_string()),
            ..Default::default()
        };
        let applied = apply_stack_defaults(&stack, &Container::default());
        assert_eq!(applied.service.restart.as_deref(), Some("always"));

        let mut explicit = Container::default();
        explicit.service.restart = Some("on-failure".to_string());
        let applied = apply_stack_defaults(&stack, &explicit);
        assert_eq!(applied.service.restart.as_deref(), Some("on-failure"));
    }
}
