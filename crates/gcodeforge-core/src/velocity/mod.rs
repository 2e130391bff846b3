//! Velocity shaping
//!
//! - [`junction`]: closed-form junction speed from cornering deviation
//! - [`profile`]: sampled acceleration profiles with memoization
//! - [`shaping`]: walking a profile outward from a corner with the splitter

pub mod junction;
pub mod profile;
pub mod shaping;

pub use junction::{deviation_from_square_corner_velocity, junction_speed};
pub use profile::{AccelerationProfile, ProfileSamples, RampSolution};
pub use shaping::{accelerate_out_of, decelerate_into, FEED_RESTORE_COMMENT};
