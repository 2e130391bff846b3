//! Built-in processing stages
//!
//! - [`CornerShaping`]: slow down into and accelerate out of sharp corners
//! - [`PressureAdvanceByType`]: pressure advance per section kind
//! - [`SpeedLutPressureAdvance`]: pressure advance from a speed lookup table
//! - [`SectionGcode`]: raw G-code injected at the start of sections

pub mod corner_shaping;
pub mod pressure_advance;
pub mod section_gcode;
pub mod speed_lut;

pub use corner_shaping::CornerShaping;
pub use pressure_advance::PressureAdvanceByType;
pub use section_gcode::SectionGcode;
pub use speed_lut::{NaturalCubicSpline, SpeedLutPressureAdvance};

use gcodeforge_core::{reannotate_until_settled, GcodeFile, Line, LineId, SectionId};

/// Command used by both pressure advance stages
pub(crate) fn pressure_advance_line(pa: f64) -> Line {
    Line::new("SET_PRESSURE_ADVANCE").with_eq_param("ADVANCE", format!("{:.3}", pa))
}

/// Insert `lines` in order before `place`, or into the empty `section` when
/// `place` is `None`, then re-annotate from the line preceding the insertion
/// until the annotations downstream settle. Moves in `lines` shift the
/// geometry of the moves after them, so that range can reach past `place`.
///
/// Returns the first inserted line.
pub(crate) fn insert_annotated(
    file: &mut GcodeFile,
    section: SectionId,
    place: Option<LineId>,
    lines: impl IntoIterator<Item = Line>,
) -> Option<LineId> {
    let mut first = None;
    let mut last = None;
    for line in lines {
        let id = match (place, last) {
            (Some(place), _) => file.insert_before(section, Some(place), line),
            (None, previous) => file.insert_after(section, previous, line),
        };
        first.get_or_insert(id);
        last = Some(id);
    }

    let first = first?;
    let start = file.prev(first).unwrap_or(first);
    reannotate_until_settled(file, start);
    Some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcodeforge_core::annotate_file;

    #[test]
    fn test_insert_keeps_order_and_annotation() {
        let mut file =
            GcodeFile::parse("G1 X0.000 Y0.000 F1200.000\nG1 X10.000 Y0.000 E1.00000\n");
        annotate_file(&mut file);
        let ids: Vec<LineId> = file.lines().collect();
        let section = file.section_of(ids[1]);

        let first = insert_annotated(
            &mut file,
            section,
            Some(ids[1]),
            vec![Line::parse("M400"), Line::parse(";hello")],
        )
        .unwrap();

        assert_eq!(
            file.to_string(),
            "G1 X0.000 Y0.000 F1200.000\nM400\n;hello\nG1 X10.000 Y0.000 E1.00000\n"
        );
        let state = file.line(first).annotation.state.unwrap();
        assert_eq!(state.current_pos.x, 0.0);
        assert_eq!(file.line(ids[1]).annotation.distance_mm, Some(10.0));
        assert_eq!(file.line(ids[1]).annotation.desired_feed_mms, Some(20.0));
    }

    #[test]
    fn test_inserted_move_updates_later_moves() {
        let mut file = GcodeFile::parse(concat!(
            "G1 X0.000 Y0.000 F1200.000\n",
            "G1 X10.000 Y0.000 E1.00000\n",
            "G1 X10.000 Y10.000 E1.00000\n",
        ));
        annotate_file(&mut file);
        let ids: Vec<LineId> = file.lines().collect();
        let section = file.section_of(ids[1]);

        insert_annotated(&mut file, section, Some(ids[1]), [Line::parse("G1 X5.000 Y0.000")]);

        let wall = &file.line(ids[1]).annotation;
        assert_eq!(wall.distance_mm, Some(5.0));
        assert_eq!(wall.start_pos.map(|p| p.x), Some(5.0));
        let corner = file.line(ids[2]).annotation.state.unwrap();
        assert_eq!(corner.previous_length, 5.0);
    }

    #[test]
    fn test_insert_into_empty_section() {
        let mut file = GcodeFile::new();
        let section = file.first_section();
        insert_annotated(&mut file, section, None, vec![Line::parse("G90"), Line::parse("M83")]);
        assert_eq!(file.to_string(), "G90\nM83\n");
        assert!(file.validate_links().is_ok());
    }

    #[test]
    fn test_pressure_advance_line_format() {
        assert_eq!(
            pressure_advance_line(0.37).to_string(),
            "SET_PRESSURE_ADVANCE ADVANCE=0.370"
        );
    }
}
