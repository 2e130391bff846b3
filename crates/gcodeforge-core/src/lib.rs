//! # GCodeForge Core
//!
//! Document model and motion editing primitives for post-processing
//! 3D-printer G-code.
//!
//! ## Modules
//!
//! - **document**: line/section arena with O(1) splicing, parser and serializer
//! - **annotator**: per-line geometry, junction cosine and move classification
//! - **edit**: navigation helpers and distance-based segment splitting
//! - **velocity**: junction speed, acceleration profiles and corner shaping walks

pub mod annotator;
pub mod document;
pub mod edit;
pub mod error;
pub mod velocity;

pub use annotator::{
    annotate, annotate_file, reannotate_until_settled, AnnotateMode, Annotation, AnnotatorState,
    MoveType,
};

pub use document::{
    GcodeFile, Line, LineId, Param, ParamValue, Section, SectionId, LAYER_CHANGE_SECTION,
    START_SECTION,
};

pub use edit::{
    for_each_back, for_each_forward, next_continuous_move, next_move, prev_continuous_move,
    prev_move, split_distance_back, split_distance_forward, ForwardSplit,
};

pub use error::{DocumentError, VelocityError};

pub use velocity::{
    accelerate_out_of, decelerate_into, deviation_from_square_corner_velocity, junction_speed,
    AccelerationProfile, ProfileSamples, FEED_RESTORE_COMMENT,
};
