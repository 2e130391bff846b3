//! Feed shaping around a corner
//!
//! Given profile samples running from the junction speed up to the desired
//! feed, the approach walk cuts the extrusion run before the corner into
//! steps and slows each one down, and the departure walk does the same
//! after the corner while speeding back up.

use std::ops::ControlFlow;

use tracing::trace;

use super::ProfileSamples;
use crate::annotator::{annotate, AnnotateMode, MoveType};
use crate::document::{GcodeFile, Line, LineId};
use crate::edit::{
    for_each_back, for_each_forward, next_continuous_move, split_distance_back,
    split_distance_forward,
};

/// Comment carried by the feed restore line emitted after a departure walk
pub const FEED_RESTORE_COMMENT: &str = "feed restore";

fn mm_per_min(mms: f64) -> f64 {
    mms * 60.0
}

/// Profile velocity limited to the line's own desired feed
fn capped(line: &Line, velocity: f64) -> f64 {
    line.annotation
        .desired_feed_mms
        .map_or(velocity, |desired| velocity.min(desired))
}

/// Slow down the extrusion run leading into `corner`.
///
/// `samples` must run from the junction speed up to the desired feed. The
/// corner itself is reset to its desired feed; the departure walk lowers it
/// again. Never raises a feed that an earlier edit already lowered.
pub fn decelerate_into(
    file: &mut GcodeFile,
    corner: LineId,
    samples: &ProfileSamples,
    min_segment_length: f64,
) {
    let Some(desired) = file.line(corner).annotation.desired_feed_mms else {
        return;
    };
    file.line_mut(corner).set_number('F', mm_per_min(desired));

    let mut current = corner;
    let mut steps = 0usize;
    for (dx, velocity) in samples.steps() {
        let Some(cut) = split_distance_back(file, current, dx, min_segment_length) else {
            break;
        };
        if cut == current {
            break;
        }

        let flow = for_each_back(file, current, cut, |line: &mut Line| {
            if !line.is_move() {
                return ControlFlow::Continue(());
            }
            let velocity = capped(line, velocity);
            if line.number('F').is_some_and(|f| f / 60.0 <= velocity) {
                return ControlFlow::Break(());
            }
            line.set_number('F', mm_per_min(velocity));
            ControlFlow::Continue(())
        });
        steps += 1;
        if flow.is_break() {
            break;
        }

        current = cut;
        match file.line(current).annotation.desired_feed_mms {
            Some(desired) if velocity < desired => {}
            _ => break,
        }
    }

    trace!("Approach to {:?} shaped in {} steps", corner, steps);
}

/// Speed the extrusion run leaving `corner` back up to its desired feed.
///
/// Emits a feed restore line after the last shaped step. Returns the
/// handle that now stands for `corner`, which changes if the corner line
/// itself was split.
pub fn accelerate_out_of(
    file: &mut GcodeFile,
    corner: LineId,
    samples: &ProfileSamples,
    min_segment_length: f64,
) -> LineId {
    let mut corner_now = corner;
    let mut start = corner;
    let mut last_cut = None;
    let mut steps = 0usize;

    for (dx, velocity) in samples.steps() {
        let split = split_distance_forward(file, start, dx, min_segment_length);
        if start == corner_now {
            corner_now = split.start;
        }
        start = split.start;

        let Some(cut) = split.cut else {
            break;
        };
        last_cut = Some(cut);

        let _ = for_each_forward(file, start, cut, |line: &mut Line| {
            if line.is_move() {
                let velocity = capped(line, velocity);
                line.set_number('F', mm_per_min(velocity));
            }
            ControlFlow::Continue(())
        });
        steps += 1;

        let Some(next) = next_continuous_move(file, MoveType::MovingExtrude, cut) else {
            break;
        };
        start = next;
        match file.line(start).annotation.desired_feed_mms {
            Some(desired) if velocity < desired => {}
            _ => break,
        }
    }

    if let Some(cut) = last_cut {
        insert_feed_restore(file, cut);
    }

    trace!("Departure from {:?} shaped in {} steps", corner_now, steps);
    corner_now
}

/// Insert `G1 F<desired>` after `cut` and annotate it
fn insert_feed_restore(file: &mut GcodeFile, cut: LineId) -> Option<LineId> {
    let desired = file.line(cut).annotation.desired_feed_mms?;
    let restore = Line::new("G1")
        .with_number('F', mm_per_min(desired))
        .with_comment(FEED_RESTORE_COMMENT);

    let section = file.section_of(cut);
    let id = file.insert_after(section, Some(cut), restore);
    annotate(file, cut, Some(id), AnnotateMode::Reannotate);
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotator::annotate_file;
    use crate::velocity::AccelerationProfile;

    fn square() -> (GcodeFile, Vec<LineId>) {
        let mut file = GcodeFile::parse(
            "G1 X0 Y0\nG1 F3600\nG1 X20 Y0 E1\nG1 X20 Y20 E1\nG1 X40 Y20 E1\n",
        );
        annotate_file(&mut file);
        let ids = file.lines().collect();
        (file, ids)
    }

    fn total_e(file: &GcodeFile) -> f64 {
        file.lines().filter_map(|id| file.line(id).number('E')).sum()
    }

    #[test]
    fn test_decelerate_into_slows_approach() {
        let (mut file, ids) = square();
        let mut profile = AccelerationProfile::s_curve(0.05, 1000.0, 0.01, 10.0).unwrap();
        let samples = profile.calc(20.0, 60.0).unwrap();

        decelerate_into(&mut file, ids[3], &samples, 0.001);

        assert_eq!(file.line(ids[3]).number('F'), Some(3600.0));
        let before = file.prev(ids[3]).unwrap();
        let feed = file.line(before).number('F').unwrap() / 60.0;
        assert!(feed < 60.0 && feed > 20.0);
        assert!((total_e(&file) - 3.0).abs() < 1e-9);
        assert!(file.validate_links().is_ok());
    }

    #[test]
    fn test_accelerate_out_of_emits_restore() {
        let (mut file, ids) = square();
        let mut profile = AccelerationProfile::s_curve(0.05, 1000.0, 0.01, 10.0).unwrap();
        let samples = profile.calc(20.0, 60.0).unwrap();

        let corner = accelerate_out_of(&mut file, ids[3], &samples, 0.001);

        assert!(!file.contains_line(ids[3]));
        let feed = file.line(corner).number('F').unwrap() / 60.0;
        assert!(feed < 60.0 && feed > 20.0);

        let restore = file
            .lines()
            .find(|id| file.line(*id).comment() == Some(FEED_RESTORE_COMMENT))
            .unwrap();
        assert_eq!(file.line(restore).number('F'), Some(3600.0));
        assert_eq!(
            file.line(restore).annotation.move_type,
            Some(MoveType::SetFeed)
        );
        assert!((total_e(&file) - 3.0).abs() < 1e-9);
        assert!(file.validate_links().is_ok());
    }

    #[test]
    fn test_walks_stop_at_travel() {
        let mut file = GcodeFile::parse("G1 X0 Y0 F3600\nG0 X10 Y0\nG1 X10 Y10 E1\n");
        annotate_file(&mut file);
        let ids: Vec<LineId> = file.lines().collect();
        let mut profile = AccelerationProfile::s_curve(0.05, 1000.0, 0.01, 10.0).unwrap();
        let samples = profile.calc(20.0, 60.0).unwrap();

        decelerate_into(&mut file, ids[2], &samples, 0.001);
        assert_eq!(file.line(ids[1]).number('F'), None);
        assert_eq!(file.line_count(), 3);
    }
}
