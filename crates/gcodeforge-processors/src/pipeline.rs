//! Stage trait and ordered stage pipeline

use gcodeforge_core::GcodeFile;
use gcodeforge_settings::StageSettings;
use tracing::{debug, info, warn};

use crate::error::{ProcessorError, ProcessorResult};
use crate::stages::{CornerShaping, PressureAdvanceByType, SectionGcode, SpeedLutPressureAdvance};

/// A transformation applied to a whole annotated file.
///
/// Stages mutate the file in place. Every line a stage inserts or edits must
/// carry a valid annotation when `process` returns, since the next stage
/// reads annotations directly.
pub trait FileProcessor {
    /// Get the name/identifier of this stage
    fn name(&self) -> &str;

    /// Get a description of what this stage does
    fn description(&self) -> &str;

    /// Apply the stage to `file`
    fn process(&mut self, file: &mut GcodeFile) -> ProcessorResult<()>;

    /// Check if this stage is enabled
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Boxed stage owned by a pipeline
pub type ProcessorHandle = Box<dyn FileProcessor>;

/// Ordered list of stages.
///
/// Stages run strictly one after another; the first failure aborts the run.
///
/// # Example
/// ```ignore
/// let mut pipeline = ProcessorPipeline::from_settings(&config.stages)?;
/// pipeline.run(&mut file)?;
/// ```
#[derive(Default)]
pub struct ProcessorPipeline {
    processors: Vec<ProcessorHandle>,
}

impl ProcessorPipeline {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Build stages from configuration, in list order
    pub fn from_settings(stages: &[StageSettings]) -> ProcessorResult<Self> {
        let mut pipeline = Self::new();
        for stage in stages {
            let processor: ProcessorHandle = match stage {
                StageSettings::CornerShaping(s) => Box::new(CornerShaping::new(s.clone())?),
                StageSettings::PressureAdvanceByType(s) => {
                    Box::new(PressureAdvanceByType::new(s.clone()))
                }
                StageSettings::SpeedLutPressureAdvance(s) => {
                    Box::new(SpeedLutPressureAdvance::new(s.clone())?)
                }
                StageSettings::SectionGcode(s) => Box::new(SectionGcode::new(s.clone())),
            };
            pipeline.register(processor);
        }
        debug!("Built pipeline with {} stages", pipeline.processor_count());
        Ok(pipeline)
    }

    /// Register a stage; stages run in registration order
    pub fn register(&mut self, processor: ProcessorHandle) -> &mut Self {
        self.processors.push(processor);
        self
    }

    /// Get the number of registered stages
    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    /// List all registered stages as (name, description, enabled)
    pub fn list_processors(&self) -> Vec<(&str, &str, bool)> {
        self.processors
            .iter()
            .map(|p| (p.name(), p.description(), p.is_enabled()))
            .collect()
    }

    /// Run every enabled stage over `file`
    pub fn run(&mut self, file: &mut GcodeFile) -> ProcessorResult<()> {
        for processor in self.processors.iter_mut() {
            if !processor.is_enabled() {
                debug!("Skipping disabled stage '{}'", processor.name());
                continue;
            }

            let before = file.line_count();
            if let Err(e) = processor.process(file) {
                warn!("Stage '{}' failed: {}", processor.name(), e);
                return Err(ProcessorError::StageFailed {
                    stage: processor.name().to_string(),
                    source: Box::new(e),
                });
            }

            #[cfg(debug_assertions)]
            file.validate_links()
                .map_err(|e| ProcessorError::StageFailed {
                    stage: processor.name().to_string(),
                    source: Box::new(e.into()),
                })?;

            info!(
                "Stage '{}' done: {} -> {} lines",
                processor.name(),
                before,
                file.line_count()
            );
        }
        Ok(())
    }
}
