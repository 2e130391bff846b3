//! Corner velocity shaping
//!
//! For every extruding move in the configured sections whose junction speed
//! is noticeably below its desired feed, the run leading into the corner is
//! slowed down along an S-curve profile and the run leaving it is sped back
//! up along the same profile.

use gcodeforge_core::{
    accelerate_out_of, decelerate_into, deviation_from_square_corner_velocity, junction_speed,
    AccelerationProfile, GcodeFile, LineId, MoveType, SectionId,
};
use gcodeforge_settings::CornerShapingSettings;
use tracing::{debug, info};

use crate::error::{ProcessorError, ProcessorResult};
use crate::pipeline::FileProcessor;

const NAME: &str = "corner_shaping";

/// Corner shaping stage
#[derive(Debug)]
pub struct CornerShaping {
    settings: CornerShapingSettings,
    deviation: f64,
    profile: AccelerationProfile,
    shaped: usize,
}

impl CornerShaping {
    /// Create the stage and its acceleration profile
    pub fn new(settings: CornerShapingSettings) -> ProcessorResult<Self> {
        let deviation = match settings.junction_deviation_mm {
            Some(deviation) => deviation,
            None => deviation_from_square_corner_velocity(
                settings.square_corner_velocity_mms,
                settings.max_accel_mmss,
            ),
        };
        if !(deviation.is_finite() && deviation > 0.0) {
            return Err(ProcessorError::InvalidSettings {
                stage: NAME,
                reason: format!("junction deviation must be > 0, got {}", deviation),
            });
        }

        let profile = AccelerationProfile::s_curve(
            settings.ramp_time_s,
            settings.max_accel_mmss,
            settings.dt_s,
            settings.accel_step_mmss,
        )?
        .with_precision(settings.cache_precision)
        .with_cache_capacity(settings.cache_capacity);

        debug!(
            "Corner shaping with deviation {:.4} mm over {:?}",
            deviation, settings.section_types
        );

        Ok(Self {
            settings,
            deviation,
            profile,
            shaped: 0,
        })
    }

    /// Junction deviation in use (mm)
    pub fn deviation(&self) -> f64 {
        self.deviation
    }

    /// Corners shaped so far
    pub fn shaped(&self) -> usize {
        self.shaped
    }

    fn wants(&self, file: &GcodeFile, section: SectionId) -> bool {
        let kind = file.section(section).kind();
        self.settings.section_types.iter().any(|t| t == kind)
    }

    /// Shape the corner at `line` if it needs it.
    ///
    /// Returns the handle now standing for `line`.
    fn shape_corner(&mut self, file: &mut GcodeFile, line: LineId) -> ProcessorResult<LineId> {
        let annotation = &file.line(line).annotation;
        if annotation.move_type != Some(MoveType::MovingExtrude) {
            return Ok(line);
        }
        let (Some(desired), Some(cos_theta)) = (annotation.desired_feed_mms, annotation.cos_theta)
        else {
            return Ok(line);
        };
        if !cos_theta.is_finite() {
            return Ok(line);
        }

        let junction = junction_speed(
            self.settings.max_accel_mmss,
            self.deviation,
            cos_theta,
            desired,
        );
        let drop = desired - junction;
        if drop < self.settings.junction_threshold_mms || self.profile.quantize(drop) == 0 {
            return Ok(line);
        }

        let samples = self.profile.calc(junction, desired)?;
        let min_segment = self.settings.min_segment_length_mm;
        decelerate_into(file, line, &samples, min_segment);
        let corner = accelerate_out_of(file, line, &samples, min_segment);

        self.shaped += 1;
        Ok(corner)
    }

    fn shape_section(&mut self, file: &mut GcodeFile, section: SectionId) -> ProcessorResult<()> {
        let Some(mut line) = file.section(section).first() else {
            return Ok(());
        };

        loop {
            line = self.shape_corner(file, line)?;
            // The forward walk may have moved the section end
            if file.section(section).last() == Some(line) {
                break;
            }
            match file.next(line) {
                Some(next) => line = next,
                None => break,
            }
        }
        Ok(())
    }
}

impl FileProcessor for CornerShaping {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Slows extrusion into sharp corners and ramps back up along an S-curve"
    }

    fn process(&mut self, file: &mut GcodeFile) -> ProcessorResult<()> {
        let before = self.shaped;
        let sections: Vec<SectionId> = file.sections().collect();
        for section in sections {
            if self.wants(file, section) {
                self.shape_section(file, section)?;
            }
        }

        info!(
            "Shaped {} corners ({} profile solutions cached)",
            self.shaped - before,
            self.profile.cached()
        );
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcodeforge_core::{annotate_file, FEED_RESTORE_COMMENT};

    fn wall(body: &str) -> GcodeFile {
        let mut file = GcodeFile::parse(&format!(";TYPE:Outer wall\nG1 X0 Y0 F3600\n{}", body));
        annotate_file(&mut file);
        file
    }

    fn total_e(file: &GcodeFile) -> f64 {
        file.lines().filter_map(|id| file.line(id).number('E')).sum()
    }

    #[test]
    fn test_right_angle_is_shaped() {
        let mut file = wall("G1 X20 Y0 E1\nG1 X20 Y20 E1\n");
        let before_e = total_e(&file);
        let before_lines = file.line_count();

        let mut stage = CornerShaping::new(CornerShapingSettings::default()).unwrap();
        stage.process(&mut file).unwrap();

        assert_eq!(stage.shaped(), 1);
        assert!(file.line_count() > before_lines);
        assert!((total_e(&file) - before_e).abs() < 1e-9);
        assert!(file.validate_links().is_ok());
        assert!(file
            .lines()
            .any(|id| file.line(id).comment() == Some(FEED_RESTORE_COMMENT)));
    }

    #[test]
    fn test_straight_line_untouched() {
        let text = concat!(
            ";TYPE:Outer wall\n",
            "G1 X0.000 Y0.000 F3600.000\n",
            "G1 X10.000 Y0.000 E0.50000\n",
            "G1 X20.000 Y0.000 E0.50000\n",
        );
        let mut file = GcodeFile::parse(text);
        annotate_file(&mut file);

        let mut stage = CornerShaping::new(CornerShapingSettings::default()).unwrap();
        stage.process(&mut file).unwrap();

        assert_eq!(stage.shaped(), 0);
        assert_eq!(file.to_string(), text);
    }

    #[test]
    fn test_other_sections_untouched() {
        let text = concat!(
            ";TYPE:Sparse infill\n",
            "G1 X0.000 Y0.000 F3600.000\n",
            "G1 X20.000 Y0.000 E1.00000\n",
            "G1 X20.000 Y20.000 E1.00000\n",
        );
        let mut file = GcodeFile::parse(text);
        annotate_file(&mut file);

        let mut stage = CornerShaping::new(CornerShapingSettings::default()).unwrap();
        stage.process(&mut file).unwrap();

        assert_eq!(stage.shaped(), 0);
        assert_eq!(file.to_string(), text);
    }

    #[test]
    fn test_slow_corner_below_threshold_skipped() {
        // 10 mm/s desired, and a 90 degree corner allows the square corner velocity
        let text = concat!(
            ";TYPE:Outer wall\n",
            "G1 X0.000 Y0.000 F600.000\n",
            "G1 X20.000 Y0.000 E1.00000\n",
            "G1 X20.000 Y20.000 E1.00000\n",
        );
        let mut file = GcodeFile::parse(text);
        annotate_file(&mut file);

        let mut stage = CornerShaping::new(CornerShapingSettings::default()).unwrap();
        stage.process(&mut file).unwrap();
        assert_eq!(stage.shaped(), 0);
    }

    #[test]
    fn test_feeds_stay_below_desired_at_any_angle() {
        for tenths in (1..600).step_by(7) {
            let angle = f64::from(tenths) / 10.0;
            let (sin, cos) = angle.to_radians().sin_cos();
            let mut file = wall(&format!(
                "G1 X20 Y0 E1\nG1 X{:.3} Y{:.3} E1\n",
                20.0 + 20.0 * cos,
                20.0 * sin
            ));

            let mut stage = CornerShaping::new(CornerShapingSettings::default()).unwrap();
            stage.process(&mut file).unwrap();

            for id in file.lines() {
                let line = file.line(id);
                let (Some(feed), Some(desired)) =
                    (line.number('F'), line.annotation.desired_feed_mms)
                else {
                    continue;
                };
                assert!(
                    feed / 60.0 <= desired + 1e-9,
                    "feed {} over desired {} at {} deg",
                    feed / 60.0,
                    desired,
                    angle
                );
            }
        }
    }

    #[test]
    fn test_explicit_deviation() {
        let settings = CornerShapingSettings {
            junction_deviation_mm: Some(0.02),
            ..Default::default()
        };
        let stage = CornerShaping::new(settings).unwrap();
        assert_eq!(stage.deviation(), 0.02);

        let settings = CornerShapingSettings {
            junction_deviation_mm: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(
            CornerShaping::new(settings),
            Err(ProcessorError::InvalidSettings { .. })
        ));
    }
}
