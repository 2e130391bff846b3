//! Junction speed from cornering deviation
//!
//! Uses the centripetal model popularised by Grbl: a corner is treated as
//! an arc tangent to both segments whose distance from the sharp corner is
//! the configured deviation. The speed is the one at which that arc's
//! centripetal acceleration equals the machine limit.

use std::f64::consts::SQRT_2;

/// Deviation equivalent to a square-corner velocity.
///
/// A 90 degree corner taken with this deviation allows exactly
/// `square_corner_velocity`.
pub fn deviation_from_square_corner_velocity(square_corner_velocity: f64, max_accel: f64) -> f64 {
    square_corner_velocity * square_corner_velocity * (SQRT_2 - 1.0) / max_accel
}

/// Maximum speed through a junction.
///
/// `cos_theta` is the cosine between the reversed incoming segment and the
/// outgoing segment, so straight continuation is -1 and a full reversal is
/// 1. The result never exceeds `desired_feed`.
pub fn junction_speed(max_accel: f64, deviation: f64, cos_theta: f64, desired_feed: f64) -> f64 {
    // No direction change; the formula below would divide by zero
    if cos_theta <= (-1.0f64).next_up() {
        return desired_feed;
    }

    let sin_half_theta = ((1.0 - cos_theta) / 2.0).sqrt();
    let radius = deviation * sin_half_theta / (1.0 - sin_half_theta);
    (max_accel * radius).sqrt().min(desired_feed)
}
