//! The `Network` variant: compiles to a `.network` Quadlet unit.

use crate::entry;
use crate::error::{Error, Result};
use crate::ini::IniSection;
use serde::{Deserialize, Serialize};

/// A network unit descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Unit stem.
    pub name: String,
    /// `Description=`.
    pub description: Option<String>,
    /// `Internal=`.
    pub internal: Option<bool>,
    /// `Driver=`.
    pub driver: Option<String>,
    /// `IPv6=`.
    pub ipv6: Option<bool>,
    /// `Subnet=`.
    pub subnet: Option<String>,
    /// `Gateway=`.
    pub gateway: Option<String>,
    /// `IPRange=`.
    pub ip_range: Option<String>,
    /// `Options=`, one entry per `key=value` pair.
    pub options: Vec<(String, String)>,
    /// `DNS=`, one entry per server.
    pub dns: Vec<String>,
}

/// Compile a [`Network`] into its `.network` unit file sections.
/// Emits `[Unit]` (only if a description is set) and `[Network]`.
///
/// # Errors
/// Returns [`Error::InvalidConfig`] if `name` is empty.
pub fn compile(network: &Network) -> Result<Vec<IniSection>> {
    if network.name.is_empty() {
        return Err(Error::invalid_config("name", "network name must not be empty"));
    }

    let unit_entries = entry::from_value("Description", network.description.as_ref());

    let option_strings: Vec<String> = network
        .options
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    let network_entries = entry::concat(vec![
        entry::from_maybe("Internal", network.internal.as_ref(), |b| {
            entry::bool_str(*b)
        }),
        entry::from_value("Driver", network.driver.as_ref()),
        entry::from_maybe("IPv6", network.ipv6.as_ref(), |b| entry::bool_str(*b)),
        entry::from_value("Subnet", network.subnet.as_ref()),
        entry::from_value("Gateway", network.gateway.as_ref()),
        entry::from_value("IPRange", network.ip_range.as_ref()),
        entry::from_array("Options", Some(option_strings.as_slice())),
        entry::from_array("DNS", Some(network.dns.as_slice())),
    ]);

    Ok(vec![
        IniSection::new("Unit", unit_entries),
        IniSection::new("Network", network_entries),
    ])
}
