//! Unit quaternion helpers for formats that only store x, y and z.

use crate::Quat;

/// Which root of `w² = 1 - x² - y² - z²` to keep.
///
/// id Tech 4 tools write joints whose orientation lives in the negative-w
/// hemisphere, so that is the default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WSign {
    #[default]
    Negative,
    Positive,
}

/// Reconstruct the W component of a unit quaternion from x, y and z.
///
/// Returns `0.0` when the squared length of the stored part exceeds one.
#[inline]
pub fn reconstruct_w(x: f32, y: f32, z: f32, sign: WSign) -> f32 {
    let t = 1.0 - x * x - y * y - z * z;
    if t < 0.0 {
        return 0.0;
    }
    match sign {
        WSign::Negative => -t.sqrt(),
        WSign::Positive => t.sqrt(),
    }
}

/// Build a full quaternion from its stored x, y, z part.
#[inline]
pub fn from_xyz(x: f32, y: f32, z: f32, sign: WSign) -> Quat {
    Quat::from_xyzw(x, y, z, reconstruct_w(x, y, z, sign))
}
