//! G-code text parser
//!
//! Splits text into lines and groups them into sections. Two comment
//! markers open a new section:
//! - `;TYPE:<name>` opens a section typed `<name>` (lower-cased)
//! - `;LAYER_CHANGE` opens a section typed `layer_change`
//!
//! The marker line itself becomes the first line of the new section.

use tracing::debug;

use super::{GcodeFile, Line, LAYER_CHANGE_SECTION};

const TYPE_MARKER: &str = ";TYPE:";
const LAYER_CHANGE_MARKER: &str = ";LAYER_CHANGE";

/// Section type opened by a marker line, if any
pub fn section_marker(text: &str) -> Option<String> {
    if let Some(kind) = text.strip_prefix(TYPE_MARKER) {
        Some(kind.to_lowercase())
    } else if text.starts_with(LAYER_CHANGE_MARKER) {
        Some(LAYER_CHANGE_SECTION.to_string())
    } else {
        None
    }
}

/// Parse G-code text into a [`GcodeFile`].
///
/// Accepts `\n` and `\r\n` line endings. Never fails.
pub fn parse(text: &str) -> GcodeFile {
    let mut file = GcodeFile::new();
    let mut section = file.first_section();
    let mut last = None;

    for raw in text.lines() {
        if let Some(kind) = section_marker(raw) {
            section = file.push_section(kind);
            last = None;
        }

        last = Some(file.insert_after(section, last, Line::parse(raw)));
    }

    debug!(
        "Parsed {} lines into {} sections",
        file.line_count(),
        file.section_count()
    );
    file
}
