//! INI section writer: turns [`IniSection`] values into the text
//! Quadlet expects on disk.
//!
//! The ordering and quoting rules here are bit-significant: the
//! Quadlet generator (external to this crate) parses the output with
//! its own INI reader, so every byte this module emits is part of the
//! contract, not cosmetic.

use crate::entry::Entries;

/// Canonical section ordering. Anything not in this list is emitted
/// after these, in the order first encountered.
const SECTION_ORDER: &[&str] = &["Unit", "Container", "Network", "Volume", "Service", "Install"];

/// One `[Name]` block with its entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniSection {
    /// The section name, e.g. `"Container"`.
    pub name: String,
    /// This section's entries, in authored order.
    pub entries: Entries,
}

impl IniSection {
    /// Construct a section. Pass entries in the order they should be
    /// rendered; this function does not reorder them.
    pub fn new(name: impl Into<String>, entries: Entries) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }
}

fn needs_quoting(value: &str) -> bool {
    value.contains(' ') || value.contains('"') || value.contains('\'') || value.contains('=')
}

fn escape_value(value: &str) -> String {
    if needs_quoting(value) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// Render a set of sections to the final unit-file text.
///
/// - Sections with zero entries are omitted entirely.
/// - Sections are emitted in [`SECTION_ORDER`]; unknown section names
///   are emitted last, in the order they first appear in `sections`.
/// - Entries within a section are never reordered or deduplicated.
/// - The file ends in exactly one trailing newline.
#[must_use]
pub fn render(sections: &[IniSection]) -> String {
    let non_empty: Vec<&IniSection> = sections.iter().filter(|s| !s.entries.is_empty()).collect();

    let mut ordered: Vec<&IniSection> = Vec::with_capacity(non_empty.len());
    for canonical in SECTION_ORDER {
        ordered.extend(non_empty.iter().filter(|s| s.name == *canonical).copied());
    }
    for section in &non_empty {
        if !SECTION_ORDER.contains(&section.name.as_str()) {
            ordered.push(section);
        }
    }

    let blocks: Vec<String> = ordered
        .iter()
        .map(|section| {
            let lines: Vec<String> = section
                .entries
                .iter()
                .map(|e| format!("{}={}", e.key, escape_value(&e.value)))
                .collect();
            format!("[{}]\n{}", section.name, lines.join("\n"))
        })
        .collect();

    if blocks.is_empty() {
        return String::new();
    }

    format!("{}\n", blocks.join("\n\n"))
}
