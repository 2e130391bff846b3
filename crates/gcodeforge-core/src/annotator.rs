//! Geometric annotation pass
//!
//! Walks a range of lines and records, per move, the start and end XY
//! position, the move vector and length, the cosine of the junction with
//! the previous segment, a move classification and the desired feed.
//!
//! The running state is an explicit [`AnnotatorState`] value. It is
//! snapshotted onto every line before the line is processed so that a later
//! partial pass can resume from any line.
//!
//! Extrusion is assumed to be relative (`M83`).

use std::f64::consts::PI;
use std::fmt;

use nalgebra::{Point2, Vector2};
use tracing::trace;

use crate::document::{GcodeFile, Line, LineId};

/// Segments shorter than this are treated as stationary
pub const STATIONARY_LENGTH_MM: f64 = 1e-4;

/// Extrusion deltas within this band are treated as zero
pub const EXTRUSION_EPSILON_MM: f64 = 1e-6;

/// Classification of a move line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveType {
    /// Stationary positive extrusion (unretract)
    Extrude,
    /// Stationary negative extrusion
    Retract,
    /// Stationary move carrying a Z parameter
    Z,
    /// Stationary move that only sets a feed rate
    SetFeed,
    /// Stationary move with no effect
    Noop,
    /// Translating move with positive extrusion
    MovingExtrude,
    /// Translating move with negative extrusion
    MovingRetract,
    /// Translating move without extrusion
    Travel,
}

impl MoveType {
    /// Whether this move ends a run of continuous extrusion
    pub fn breaks_continuity(self) -> bool {
        matches!(
            self,
            Self::Extrude | Self::Retract | Self::Z | Self::Travel | Self::MovingRetract
        )
    }

    /// Whether the move changes the XY position
    pub fn is_translating(self) -> bool {
        matches!(self, Self::MovingExtrude | Self::MovingRetract | Self::Travel)
    }

    fn classify(length: f64, extrude: f64, line: &Line) -> Self {
        // NaN lengths (unknown start position) count as translating
        if length < STATIONARY_LENGTH_MM {
            if extrude > EXTRUSION_EPSILON_MM {
                Self::Extrude
            } else if extrude < -EXTRUSION_EPSILON_MM {
                Self::Retract
            } else if line.has_param('Z') {
                Self::Z
            } else if line.has_param('F') {
                Self::SetFeed
            } else {
                Self::Noop
            }
        } else if extrude > EXTRUSION_EPSILON_MM {
            Self::MovingExtrude
        } else if extrude < -EXTRUSION_EPSILON_MM {
            Self::MovingRetract
        } else {
            Self::Travel
        }
    }
}

impl fmt::Display for MoveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extrude => "extrude",
            Self::Retract => "retract",
            Self::Z => "z",
            Self::SetFeed => "set_feed",
            Self::Noop => "noop",
            Self::MovingExtrude => "moving_extrude",
            Self::MovingRetract => "moving_retract",
            Self::Travel => "travel",
        };
        f.write_str(name)
    }
}

/// Running state carried from line to line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotatorState {
    /// Start of the previous segment
    pub previous_pos: Point2<f64>,
    /// Current tool position
    pub current_pos: Point2<f64>,
    /// Length of the previous segment
    pub previous_length: f64,
    /// Last known desired feed (mm/s)
    pub desired_feed: Option<f64>,
}

impl AnnotatorState {
    /// State before any position is known
    pub fn unknown() -> Self {
        Self {
            previous_pos: Point2::new(f64::NAN, f64::NAN),
            current_pos: Point2::new(f64::NAN, f64::NAN),
            previous_length: f64::NAN,
            desired_feed: None,
        }
    }
}

impl Default for AnnotatorState {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Per-line data derived by the annotator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotation {
    /// State before this line was processed
    pub state: Option<AnnotatorState>,
    /// Segment start (axes never set are NaN)
    pub start_pos: Option<Point2<f64>>,
    /// Segment end
    pub end_pos: Option<Point2<f64>>,
    /// Segment vector, end minus start
    pub vector: Option<Vector2<f64>>,
    /// Segment length
    pub distance_mm: Option<f64>,
    /// Cosine between the reversed previous segment and this one
    pub cos_theta: Option<f64>,
    /// Move classification, `None` for non-move lines
    pub move_type: Option<MoveType>,
    /// Feed requested by the source file (mm/s)
    pub desired_feed_mms: Option<f64>,
    /// Extrusion delta (filament mm)
    pub extrude_mm: Option<f64>,
}

impl Annotation {
    /// Extruded filament volume for a given filament diameter
    pub fn volume_mm3(&self, filament_diameter_mm: f64) -> Option<f64> {
        let radius = filament_diameter_mm / 2.0;
        self.extrude_mm.map(|e| e * PI * radius * radius)
    }

    /// Junction angle in degrees, derived from the stored cosine
    pub fn angle_deg(&self) -> Option<f64> {
        self.cos_theta.map(|c| c.acos().to_degrees())
    }
}

/// How desired feed is established during a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnnotateMode {
    /// Read desired feed from `F` parameters
    #[default]
    Normal,
    /// Keep the desired feed already stored on each line so that edited
    /// `F` values never change the original intent
    Reannotate,
}

/// Annotate `[first, last]` inclusive, or to the end of the file.
///
/// The pass resumes from `first`'s stored state if it has one, otherwise
/// from [`AnnotatorState::unknown`].
pub fn annotate(
    file: &mut GcodeFile,
    first: LineId,
    last: Option<LineId>,
    mode: AnnotateMode,
) {
    let mut state = file
        .line(first)
        .annotation
        .state
        .unwrap_or_else(AnnotatorState::unknown);

    let mut current = Some(first);
    let mut count = 0usize;
    while let Some(id) = current {
        let line = file.line_mut(id);
        state = annotate_line(line, state, mode);
        count += 1;

        if Some(id) == last {
            break;
        }
        current = line.next();
    }

    trace!("Annotated {} lines in {:?} mode", count, mode);
}

/// Re-annotate from `first` until the pass settles.
///
/// Stops at the first line after `first` whose stored snapshot already
/// equals the state flowing into it, since that line and everything after
/// it would come out unchanged. Lines never annotated always differ, so
/// freshly inserted lines are covered. Returns the number of lines visited.
pub fn reannotate_until_settled(file: &mut GcodeFile, first: LineId) -> usize {
    let mut state = file
        .line(first)
        .annotation
        .state
        .unwrap_or_else(AnnotatorState::unknown);

    let mut current = Some(first);
    let mut count = 0usize;
    while let Some(id) = current {
        let line = file.line_mut(id);
        if count > 0 && line.annotation.state == Some(state) {
            break;
        }
        state = annotate_line(line, state, AnnotateMode::Reannotate);
        count += 1;
        current = line.next();
    }

    trace!("Re-annotated {} lines until settled", count);
    count
}

/// Annotate the whole file from its first line
pub fn annotate_file(file: &mut GcodeFile) {
    if let Some(first) = file.first_line() {
        annotate(file, first, None, AnnotateMode::Normal);
    }
}

/// Annotate one line and return the state after it
pub fn annotate_line(
    line: &mut Line,
    mut state: AnnotatorState,
    mode: AnnotateMode,
) -> AnnotatorState {
    let stored_feed = line.annotation.desired_feed_mms;
    let seen_before = line.annotation.state.is_some();
    line.annotation = Annotation {
        state: Some(state),
        ..Annotation::default()
    };

    if !line.is_move() {
        return state;
    }

    let explicit_feed = line.number('F').map(|f| f / 60.0);
    state.desired_feed = match mode {
        AnnotateMode::Normal => explicit_feed.or(state.desired_feed),
        // Only lines never annotated before may take their intent from `F`
        AnnotateMode::Reannotate => stored_feed
            .or(explicit_feed.filter(|_| !seen_before))
            .or(state.desired_feed),
    };
    line.annotation.desired_feed_mms = state.desired_feed;

    // Absent axes stay put and contribute no motion, even while unknown
    let x = line.number('X');
    let y = line.number('Y');
    let new_pos = Point2::new(
        x.unwrap_or(state.current_pos.x),
        y.unwrap_or(state.current_pos.y),
    );
    let bc = Vector2::new(
        x.map_or(0.0, |x| x - state.current_pos.x),
        y.map_or(0.0, |y| y - state.current_pos.y),
    );
    let ba = state.previous_pos - state.current_pos;
    let bc_norm = bc.norm();

    if bc_norm.is_nan() || bc_norm > 0.0 {
        if bc_norm.is_finite() {
            let annotation = &mut line.annotation;
            annotation.start_pos = Some(state.current_pos);
            annotation.end_pos = Some(new_pos);
            annotation.vector = Some(bc);
            annotation.distance_mm = Some(bc_norm);

            let ba_norm = state.previous_length;
            if ba_norm.is_finite() && ba_norm > 0.0 {
                let cos_theta = (ba.dot(&bc) / (ba_norm * bc_norm)).clamp(-1.0, 1.0);
                if !cos_theta.is_nan() {
                    annotation.cos_theta = Some(cos_theta);
                }
            }
        }

        state.previous_pos = state.current_pos;
        state.current_pos = new_pos;
        state.previous_length = bc_norm;
    }

    let extrude = line.number('E').unwrap_or(0.0);
    line.annotation.extrude_mm = line.number('E');
    line.annotation.move_type = Some(MoveType::classify(bc_norm, extrude, line));

    state
}
