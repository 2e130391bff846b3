//! # GCodeForge Processors
//!
//! Processing stages applied to an annotated [`gcodeforge_core::GcodeFile`],
//! and the pipeline that runs them in configured order.

pub mod error;
pub mod pipeline;
pub mod stages;

pub use error::{ProcessorError, ProcessorResult};
pub use pipeline::{FileProcessor, ProcessorHandle, ProcessorPipeline};
pub use stages::{
    CornerShaping, NaturalCubicSpline, PressureAdvanceByType, SectionGcode,
    SpeedLutPressureAdvance,
};
