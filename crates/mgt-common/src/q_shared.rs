// q_shared.rs — math and small helpers shared by every crate

pub type Vec3 = [f32; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

/// World units are inches.
pub const UNITS_TO_METERS: f32 = 0.0254;
pub const METERS_TO_UNITS: f32 = 1.0 / UNITS_TO_METERS;

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn vector_length(v: &Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Distance between two points in world units.
pub fn distance(a: &Vec3, b: &Vec3) -> f32 {
    vector_length(&vector_subtract(a, b))
}

/// Seconds to whole milliseconds, rounded to nearest.
#[inline]
pub fn sec_to_ms(seconds: f32) -> i32 {
    (seconds * 1000.0).round() as i32
}
