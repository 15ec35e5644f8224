//! The `Volume` variant: compiles to a `.volume` Quadlet unit.

use crate::entry;
use crate::error::{Error, Result};
use crate::ini::IniSection;
use serde::{Deserialize, Serialize};

/// A named-volume unit descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Unit stem.
    pub name: String,
    /// `Description=`.
    pub description: Option<String>,
    /// `Driver=`.
    pub driver: Option<String>,
    /// `Options=`, one entry per `key=value` pair.
    pub options: Vec<(String, String)>,
    /// `Label=`, one entry per `key=value` pair.
    pub labels: Vec<(String, String)>,
}

/// Compile a [`Volume`] into its `.volume` unit file sections. Emits
/// `[Unit]` (only if a description is set) and `[Volume]`.
///
/// # Errors
/// Returns [`Error::InvalidConfig`] if `name` is empty.
pub fn compile(volume: &Volume) -> Result<Vec<IniSection>> {
    if volume.name.is_empty() {
        return Err(Error::invalid_config("name", "volume name must not be empty"));
    }

    let unit_entries = entry::from_value("Description", volume.description.as_ref());

    let option_strings: Vec<String> = volume
        .options
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    let label_strings: Vec<String> = volume
        .labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    let volume_entries = entry::concat(vec![
        entry::from_value("Driver", volume.driver.as_ref()),
        entry::from_array("Options", Some(option_strings.as_slice())),
        entry::from_array("Label", Some(label_strings.as_slice())),
    ]);

    Ok(vec![
        IniSection::new("Unit", unit_entries),
        IniSection::new("Volume", volume_entries),
    ])
}
