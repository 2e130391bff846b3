//! Line navigation and distance-based segment splitting
//!
//! The splitters walk away from a line through a run of continuous
//! extrusion, summing segment lengths until a target distance is reached,
//! and cut the segment that crosses it in two. Both halves keep the
//! original's desired feed and share its extrusion by length, so total
//! distance and extruded volume are unchanged.
//!
//! Running out of room is normal control flow: the splitters return the
//! nearest usable boundary or `None` instead of an error.

use std::ops::ControlFlow;

use tracing::trace;

use crate::annotator::{annotate, AnnotateMode, MoveType};
use crate::document::{GcodeFile, Line, LineId};

/// Result of [`split_distance_forward`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardSplit {
    /// The starting line, replaced by the first half when it was itself cut
    pub start: LineId,
    /// Last line before the cut, `None` when no boundary was reachable
    pub cut: Option<LineId>,
}

/// Next move line after `line`, giving up once `stop` has been checked
pub fn next_move(file: &GcodeFile, line: LineId, stop: Option<LineId>) -> Option<LineId> {
    let mut current = file.next(line);
    while let Some(id) = current {
        if file.line(id).annotation.move_type.is_some() {
            return Some(id);
        }
        if Some(id) == stop {
            break;
        }
        current = file.next(id);
    }
    None
}

/// Previous move line before `line`, giving up once `stop` has been checked
pub fn prev_move(file: &GcodeFile, line: LineId, stop: Option<LineId>) -> Option<LineId> {
    let mut current = file.prev(line);
    while let Some(id) = current {
        if file.line(id).annotation.move_type.is_some() {
            return Some(id);
        }
        if Some(id) == stop {
            break;
        }
        current = file.prev(id);
    }
    None
}

/// Next move of `move_type` within the continuous extrusion run containing `line`
pub fn next_continuous_move(file: &GcodeFile, move_type: MoveType, line: LineId) -> Option<LineId> {
    continuous_move(file, move_type, file.next(line), GcodeFile::next)
}

/// Previous move of `move_type` within the continuous extrusion run containing `line`
pub fn prev_continuous_move(file: &GcodeFile, move_type: MoveType, line: LineId) -> Option<LineId> {
    continuous_move(file, move_type, file.prev(line), GcodeFile::prev)
}

fn continuous_move(
    file: &GcodeFile,
    move_type: MoveType,
    mut current: Option<LineId>,
    step: fn(&GcodeFile, LineId) -> Option<LineId>,
) -> Option<LineId> {
    while let Some(id) = current {
        match file.line(id).annotation.move_type {
            Some(found) if found.breaks_continuity() => return None,
            Some(found) if found == move_type => return Some(id),
            _ => {}
        }
        current = step(file, id);
    }
    None
}

/// Visit lines from `from.prev` back to `to` inclusive.
///
/// Stops early when the visitor breaks or the file start is reached.
pub fn for_each_back<F>(
    file: &mut GcodeFile,
    from: LineId,
    to: LineId,
    mut visit: F,
) -> ControlFlow<()>
where
    F: FnMut(&mut Line) -> ControlFlow<()>,
{
    let mut current = file.prev(from);
    while let Some(id) = current {
        visit(file.line_mut(id))?;
        if id == to {
            break;
        }
        current = file.prev(id);
    }
    ControlFlow::Continue(())
}

/// Visit lines from `from` forward to `to` inclusive.
///
/// Stops early when the visitor breaks or the file end is reached.
pub fn for_each_forward<F>(
    file: &mut GcodeFile,
    from: LineId,
    to: LineId,
    mut visit: F,
) -> ControlFlow<()>
where
    F: FnMut(&mut Line) -> ControlFlow<()>,
{
    let mut current = Some(from);
    while let Some(id) = current {
        visit(file.line_mut(id))?;
        if id == to {
            break;
        }
        current = file.next(id);
    }
    ControlFlow::Continue(())
}

fn is_moving_extrude(file: &GcodeFile, id: LineId) -> bool {
    file.line(id).annotation.move_type == Some(MoveType::MovingExtrude)
}

fn breaks_continuity(file: &GcodeFile, id: LineId) -> bool {
    file.line(id)
        .annotation
        .move_type
        .is_some_and(MoveType::breaks_continuity)
}

/// First extruding move walking forward from `from` (inclusive), or `None`
/// if `line` is reached first
fn first_extrude_before(file: &GcodeFile, from: Option<LineId>, line: LineId) -> Option<LineId> {
    let mut current = from;
    while let Some(id) = current {
        if id == line {
            return None;
        }
        if is_moving_extrude(file, id) {
            return Some(id);
        }
        current = file.next(id);
    }
    None
}

/// Last extruding move walking back from `to` (inclusive) to `line` (inclusive)
fn last_extrude_from(file: &GcodeFile, line: LineId, to: Option<LineId>) -> Option<LineId> {
    let mut current = to;
    while let Some(id) = current {
        if is_moving_extrude(file, id) {
            return Some(id);
        }
        if id == line {
            break;
        }
        current = file.prev(id);
    }
    None
}

/// Split the segment `distance` back from the start of `line`.
///
/// Returns the line nearest the cut on the `line` side. When the cut would
/// leave a piece shorter than `min_segment_length`, the closest existing
/// boundary is returned instead. When continuous extrusion ends first, the
/// first extruding move after the break is returned, or `None` if the
/// break is directly before `line`.
pub fn split_distance_back(
    file: &mut GcodeFile,
    line: LineId,
    distance: f64,
    min_segment_length: f64,
) -> Option<LineId> {
    if distance.is_nan() || distance <= 0.0 {
        return Some(line);
    }

    let section = file.section_of(line);
    let mut current = line;
    let mut traveled = 0.0;
    while traveled < distance {
        let prev = match file.prev(current) {
            Some(prev) if file.section_of(prev) == section => prev,
            _ => return first_extrude_before(file, Some(current), line),
        };
        current = prev;

        if breaks_continuity(file, current) {
            return first_extrude_before(file, file.next(current), line);
        }
        traveled += file.line(current).annotation.distance_mm.unwrap_or(0.0);
    }

    // a -> b -> line
    let current_length = file.line(current).annotation.distance_mm.unwrap_or(0.0);
    let a_length = traveled - distance;
    let b_length = current_length - a_length;

    if a_length < min_segment_length || b_length < min_segment_length {
        if a_length < b_length {
            return Some(current);
        }
        return match next_extruding_toward(file, current, line) {
            Some(next) if next != line => Some(next),
            _ => Some(current),
        };
    }

    let (a, b) = split_line(file, current, a_length, b_length);
    annotate(file, a, Some(line), AnnotateMode::Reannotate);
    Some(b)
}

/// Split the segment `distance` forward from the start of `line`.
///
/// `line`'s own length counts first, so `line` itself may be cut; the
/// returned [`ForwardSplit::start`] then refers to its first half.
pub fn split_distance_forward(
    file: &mut GcodeFile,
    line: LineId,
    distance: f64,
    min_segment_length: f64,
) -> ForwardSplit {
    if distance.is_nan() || distance <= 0.0 {
        return ForwardSplit {
            start: line,
            cut: Some(line),
        };
    }

    let section = file.section_of(line);
    let mut current = line;
    let mut traveled = file.line(line).annotation.distance_mm.unwrap_or(0.0);
    while traveled < distance {
        let next = match file.next(current) {
            Some(next) if file.section_of(next) == section => next,
            _ => {
                return ForwardSplit {
                    start: line,
                    cut: last_extrude_from(file, line, Some(current)),
                }
            }
        };

        if breaks_continuity(file, next) {
            return ForwardSplit {
                start: line,
                cut: last_extrude_from(file, line, Some(current)),
            };
        }
        current = next;
        traveled += file.line(current).annotation.distance_mm.unwrap_or(0.0);
    }

    // line -> a -> b
    let current_length = file.line(current).annotation.distance_mm.unwrap_or(0.0);
    let b_length = traveled - distance;
    let a_length = current_length - b_length;

    if a_length < min_segment_length || b_length < min_segment_length {
        let cut = if a_length < b_length {
            prev_extruding_toward(file, current, line)
        } else {
            Some(current)
        };
        return ForwardSplit { start: line, cut };
    }

    let (a, b) = split_line(file, current, a_length, b_length);
    annotate(file, a, Some(b), AnnotateMode::Reannotate);

    ForwardSplit {
        start: if current == line { a } else { line },
        cut: Some(a),
    }
}

/// Next extruding move after `from`, not looking past `stop`
fn next_extruding_toward(file: &GcodeFile, from: LineId, stop: LineId) -> Option<LineId> {
    let mut current = file.next(from);
    while let Some(id) = current {
        if is_moving_extrude(file, id) {
            return Some(id);
        }
        if id == stop {
            break;
        }
        current = file.next(id);
    }
    None
}

/// Previous extruding move before `from`, not looking past `stop`
fn prev_extruding_toward(file: &GcodeFile, from: LineId, stop: LineId) -> Option<LineId> {
    if from == stop {
        return None;
    }
    let mut current = file.prev(from);
    while let Some(id) = current {
        if is_moving_extrude(file, id) {
            return Some(id);
        }
        if id == stop {
            break;
        }
        current = file.prev(id);
    }
    None
}

/// Replace `target` with two lines of the given lengths.
///
/// The first half ends at the interpolated cut point, the second keeps the
/// original end point. Only axes the original carried are written.
fn split_line(
    file: &mut GcodeFile,
    target: LineId,
    a_length: f64,
    b_length: f64,
) -> (LineId, LineId) {
    let original = file.line(target);
    let annotation = &original.annotation;
    let (Some(start), Some(vector)) = (annotation.start_pos, annotation.vector) else {
        panic!("line {:?} has no segment geometry to split", target);
    };

    let total = a_length + b_length;
    let a_factor = a_length / total;
    let b_factor = b_length / total;

    let mut a = original.duplicate();
    let mut b = original.duplicate();
    a.annotation.state = annotation.state;
    a.annotation.desired_feed_mms = annotation.desired_feed_mms;
    b.annotation.desired_feed_mms = annotation.desired_feed_mms;

    for (axis, letter) in [(0, 'X'), (1, 'Y')] {
        if original.number(letter).is_some() {
            let value = start[axis] + vector[axis] * a_factor;
            assert!(
                value.is_finite(),
                "cannot split line {:?}: axis {} was never positioned",
                target,
                letter
            );
            a.set_number(letter, value);
        }
    }

    if let Some(e) = original.number('E').filter(|e| *e != 0.0) {
        a.set_number('E', e * a_factor);
        b.set_number('E', e * b_factor);
    }

    trace!(
        "Splitting {:?} into {:.4} mm and {:.4} mm",
        target,
        a_length,
        b_length
    );

    let section = file.section_of(target);
    let a = file.insert_after(section, Some(target), a);
    let b = file.insert_after(section, Some(a), b);
    file.remove(section, target);
    (a, b)
}
