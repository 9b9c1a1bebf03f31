//! Plain value types carried on the wire.
//!
//! These are pass-through containers, not a linear-algebra library: the
//! engine never multiplies matrices, it only moves them between the
//! transport and the rendering collaborator. Everything serializes as a
//! flat float array.

use serde::{Deserialize, Serialize};

/// Column-major 4x4 transform, serialized as 16 floats.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mat4(pub [f32; 16]);

impl Mat4 {
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    pub const ZERO: Self = Self([0.0; 16]);

    /// Identity rotation/scale with the given translation. Handy in tests
    /// and demos; the engine itself never composes transforms.
    #[must_use]
    pub fn from_translation(x: f32, y: f32, z: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.0[12] = x;
        m.0[13] = y;
        m.0[14] = z;
        m
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A point or direction, serialized as 3 floats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3(pub [f32; 3]);

impl Vec3 {
    pub const ZERO: Self = Self([0.0; 3]);

    #[must_use]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self([x, y, z])
    }
}

/// An RGB color with components in `0.0..=1.0`, serialized as 3 floats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rgb(pub [f32; 3]);

impl Rgb {
    pub const WHITE: Self = Self([1.0; 3]);

    #[must_use]
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self([r, g, b])
    }
}

#[cfg(test)]
#[path = "math_test.rs"]
mod tests;
