//! Raw G-code injected at the start of matching sections

use gcodeforge_core::{GcodeFile, Line, SectionId};
use gcodeforge_settings::SectionGcodeSettings;
use tracing::info;

use super::insert_annotated;
use crate::error::ProcessorResult;
use crate::pipeline::FileProcessor;

/// Section G-code stage
#[derive(Debug, Clone)]
pub struct SectionGcode {
    settings: SectionGcodeSettings,
}

impl SectionGcode {
    pub fn new(settings: SectionGcodeSettings) -> Self {
        Self { settings }
    }

    fn snippet(&self, kind: &str) -> Option<Vec<Line>> {
        let text = self.settings.snippets.get(kind)?;
        let lines: Vec<Line> = text.lines().map(Line::parse).collect();
        (!lines.is_empty()).then_some(lines)
    }
}

impl FileProcessor for SectionGcode {
    fn name(&self) -> &str {
        "section_gcode"
    }

    fn description(&self) -> &str {
        "Prepends configured G-code to sections of matching types"
    }

    fn process(&mut self, file: &mut GcodeFile) -> ProcessorResult<()> {
        let mut injected = 0usize;
        let sections: Vec<SectionId> = file.sections().collect();

        for section in sections {
            let Some(lines) = self.snippet(file.section(section).kind()) else {
                continue;
            };
            let first = file.section(section).first();
            insert_annotated(file, section, first, lines);
            injected += 1;
        }

        info!("Injected G-code into {} sections", injected);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled
    }
}
