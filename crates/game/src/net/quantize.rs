//! Lossy 16-bit encodings for angles and percentages.

const STEPS: f32 = 65536.0;

/// Degrees over [0, 360), wrapping.
pub fn quantize_angle(degrees: f32) -> u16 {
    let wrapped = degrees.rem_euclid(360.0);
    let scaled = (wrapped / 360.0 * STEPS).round();
    (scaled as u32 & 0xFFFF) as u16
}

pub fn dequantize_angle(value: u16) -> f32 {
    value as f32 * 360.0 / STEPS
}

/// Fractions over [0, 1], clamped.
pub fn quantize_percentage(value: f32) -> u16 {
    (value.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16
}

pub fn dequantize_percentage(value: u16) -> f32 {
    value as f32 / u16::MAX as f32
}

/// One quantization step, for tolerance checks.
pub const ANGLE_STEP: f32 = 360.0 / STEPS;
pub const PERCENTAGE_STEP: f32 = 1.0 / u16::MAX as f32;

/// Shortest signed difference `to - from` in degrees, in (-180, 180].
pub fn angle_delta(from: f32, to: f32) -> f32 {
    let delta = (to - from).rem_euclid(360.0);
    if delta > 180.0 { delta - 360.0 } else { delta }
}
