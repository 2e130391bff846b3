//! # GCodeForge
//!
//! Post-processor for 3D-printer G-code. Reshapes feed rates around sharp
//! corners and injects extruder pressure-advance commands without
//! re-slicing.
//!
//! ## Architecture
//!
//! GCodeForge is organized as a workspace with multiple crates:
//!
//! 1. **gcodeforge-core** - Document model, annotator, segment splitter, velocity shaping
//! 2. **gcodeforge-settings** - Pipeline configuration, TOML/JSON persistence
//! 3. **gcodeforge-processors** - Processing stages and the stage pipeline
//! 4. **gcodeforge** - Command line binary that ties them together

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, info};

pub use gcodeforge_core::{annotate_file, GcodeFile, Line, LineId, MoveType, SectionId};
pub use gcodeforge_processors::{FileProcessor, ProcessorError, ProcessorPipeline};
pub use gcodeforge_settings::{default_config_path, Config, SettingsError, StageSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Logs go to stderr so that `--print-config` output stays clean. The
/// level follows `RUST_LOG`, with INFO always enabled.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Totals gathered before and after a run
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunSummary {
    pub lines_before: usize,
    pub lines_after: usize,
    /// Extruded filament volume in mm³
    pub volume_before_mm3: f64,
    pub volume_after_mm3: f64,
}

fn extruded_volume(file: &GcodeFile, filament_diameter_mm: f64) -> f64 {
    file.lines()
        .filter_map(|id| file.line(id).annotation.volume_mm3(filament_diameter_mm))
        .sum()
}

/// Parse, annotate and run the configured stages over `text`
pub fn process_text(text: &str, config: &Config) -> anyhow::Result<(String, RunSummary)> {
    let mut file = GcodeFile::parse(text);
    annotate_file(&mut file);

    let mut summary = RunSummary {
        lines_before: file.line_count(),
        volume_before_mm3: extruded_volume(&file, config.filament_diameter_mm),
        ..Default::default()
    };

    let mut pipeline = ProcessorPipeline::from_settings(&config.stages)
        .context("Failed to build processing pipeline")?;
    pipeline.run(&mut file).context("Processing failed")?;

    summary.lines_after = file.line_count();
    summary.volume_after_mm3 = extruded_volume(&file, config.filament_diameter_mm);
    Ok((file.to_string(), summary))
}

/// Process `input` and write the result to `output`.
///
/// The output is written to a temporary file next to `output` and renamed
/// into place, so `output` may equal `input`.
pub fn process_file(input: &Path, output: &Path, config: &Config) -> anyhow::Result<RunSummary> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    debug!("Read {} bytes from {}", text.len(), input.display());

    let (processed, summary) = process_text(&text, config)?;
    write_atomic(output, processed.as_bytes())?;

    info!(
        "Wrote {} ({} -> {} lines, {:.3} -> {:.3} mm³ extruded)",
        output.display(),
        summary.lines_before,
        summary.lines_after,
        summary.volume_before_mm3,
        summary.volume_after_mm3
    );
    Ok(summary)
}

fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    temp.write_all(contents)
        .context("Failed to write temporary output")?;
    temp.as_file()
        .sync_all()
        .context("Failed to flush temporary output")?;
    temp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcodeforge_settings::{PressureAdvanceByTypeSettings, SectionGcodeSettings};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const INPUT: &str = "\
G90
M83
;TYPE:Outer wall
G1 X0.000 Y0.000 F3600.000
G1 X20.000 Y0.000 E0.80000
G1 X20.000 Y20.000 E0.80000
G1 X0.000 Y20.000 E0.80000
;TYPE:Sparse infill
G1 X10.000 Y10.000 E0.40000
";

    #[test]
    fn test_process_text_with_no_stages() {
        let config = Config {
            stages: Vec::new(),
            ..Default::default()
        };
        let text = "G90\nG1 X1.000 Y1.000 F600.000\nG1 X2.000 Y1.000 E0.10000\n";
        let (out, summary) = process_text(text, &config).unwrap();
        assert_eq!(out, text);
        assert_eq!(summary.lines_before, 3);
        assert_eq!(summary.lines_after, 3);
        assert!(summary.volume_before_mm3 > 0.0);
        assert_eq!(summary.volume_before_mm3, summary.volume_after_mm3);
    }

    #[test]
    fn test_process_to_separate_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("part.gcode");
        let output = dir.path().join("part.out.gcode");
        std::fs::write(&input, INPUT).unwrap();

        let summary = process_file(&input, &output, &Config::default()).unwrap();

        assert_eq!(std::fs::read_to_string(&input).unwrap(), INPUT);
        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains("SET_PRESSURE_ADVANCE"));
        assert!(summary.lines_after > summary.lines_before);
        assert!((summary.volume_after_mm3 - summary.volume_before_mm3).abs() < 1e-6);
    }

    #[test]
    fn test_process_in_place() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("part.gcode");
        std::fs::write(&input, INPUT).unwrap();

        let mut snippets = BTreeMap::new();
        snippets.insert("sparse infill".to_string(), "M204 S5000".to_string());
        let config = Config {
            stages: vec![StageSettings::SectionGcode(SectionGcodeSettings {
                enabled: true,
                snippets,
            })],
            ..Default::default()
        };

        process_file(&input, &input, &config).unwrap();
        let written = std::fs::read_to_string(&input).unwrap();
        assert_eq!(
            written,
            INPUT.replace(";TYPE:Sparse infill", "M204 S5000\n;TYPE:Sparse infill")
        );

        // No temporary files are left behind
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_missing_input_fails_without_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("missing.gcode");
        let output = dir.path().join("out.gcode");

        let config = Config {
            stages: vec![StageSettings::PressureAdvanceByType(
                PressureAdvanceByTypeSettings::default(),
            )],
            ..Default::default()
        };
        assert!(process_file(&input, &output, &config).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
        assert!(!BUILD_DATE.is_empty());
    }
}
