//! Pressure advance per section kind

use gcodeforge_core::{GcodeFile, SectionId};
use gcodeforge_settings::PressureAdvanceByTypeSettings;
use tracing::{debug, info};

use super::{insert_annotated, pressure_advance_line};
use crate::error::ProcessorResult;
use crate::pipeline::FileProcessor;

/// Prepends `SET_PRESSURE_ADVANCE` to every section.
///
/// Section kinds missing from the table keep whatever value the previous
/// section used; the first section falls back to `default_pa`.
#[derive(Debug, Clone)]
pub struct PressureAdvanceByType {
    settings: PressureAdvanceByTypeSettings,
}

impl PressureAdvanceByType {
    pub fn new(settings: PressureAdvanceByTypeSettings) -> Self {
        Self { settings }
    }
}

impl FileProcessor for PressureAdvanceByType {
    fn name(&self) -> &str {
        "pressure_advance_by_type"
    }

    fn description(&self) -> &str {
        "Sets extruder pressure advance at the start of each section by its type"
    }

    fn process(&mut self, file: &mut GcodeFile) -> ProcessorResult<()> {
        let mut current = self.settings.default_pa;
        let sections: Vec<SectionId> = file.sections().collect();

        for section in &sections {
            let kind = file.section(*section).kind();
            if let Some(pa) = self.settings.values.get(kind) {
                current = *pa;
            }
            debug!("Section '{}' uses pressure advance {:.3}", kind, current);

            let first = file.section(*section).first();
            insert_annotated(file, *section, first, [pressure_advance_line(current)]);
        }

        info!("Inserted pressure advance into {} sections", sections.len());
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcodeforge_core::annotate_file;
    use std::collections::BTreeMap;

    #[test]
    fn test_values_follow_section_types() {
        let mut file = GcodeFile::parse(concat!(
            "G90\n",
            ";TYPE:Outer wall\nG1 X1.000 Y1.000 E0.10000\n",
            ";TYPE:Ironing\nM400\n",
            ";TYPE:Sparse infill\nM400\n",
        ));
        annotate_file(&mut file);

        let mut values = BTreeMap::new();
        values.insert("outer wall".to_string(), 0.4);
        values.insert("sparse infill".to_string(), 0.0);
        let mut stage = PressureAdvanceByType::new(PressureAdvanceByTypeSettings {
            enabled: true,
            default_pa: 0.25,
            values,
        });
        stage.process(&mut file).unwrap();

        assert_eq!(
            file.to_string(),
            "SET_PRESSURE_ADVANCE ADVANCE=0.250\nG90\n\
             SET_PRESSURE_ADVANCE ADVANCE=0.400\n;TYPE:Outer wall\nG1 X1.000 Y1.000 E0.10000\n\
             SET_PRESSURE_ADVANCE ADVANCE=0.400\n;TYPE:Ironing\nM400\n\
             SET_PRESSURE_ADVANCE ADVANCE=0.000\n;TYPE:Sparse infill\nM400\n"
        );
        assert!(file.validate_links().is_ok());
    }

    #[test]
    fn test_inserted_lines_stay_in_their_section() {
        let mut file = GcodeFile::parse(";TYPE:Outer wall\nM400\n");
        let mut stage = PressureAdvanceByType::new(PressureAdvanceByTypeSettings::default());
        stage.process(&mut file).unwrap();

        for section in file.sections() {
            let first = file.section(section).first().unwrap();
            assert!(file
                .line(first)
                .to_string()
                .starts_with("SET_PRESSURE_ADVANCE"));
        }
    }
}
