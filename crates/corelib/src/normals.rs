//! Smooth vertex normals from indexed triangles.

use crate::Vec3;

/// Un-normalized face normal of the triangle `(a, b, c)`.
///
/// Counter-clockwise winding (seen from the front) points the normal
/// towards the viewer.
#[inline]
pub fn face_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (b - a).cross(c - a)
}

/// Accumulate face normals into every vertex a triangle touches and
/// normalize the sums.
///
/// Larger triangles weigh more since face normals are summed before
/// normalizing. Vertices referenced by no triangle (or only by degenerate
/// ones) keep a zero normal. Callers must validate indices first; an index
/// outside `positions` is skipped.
pub fn vertex_normals(positions: &[Vec3], triangles: &[[u32; 3]]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];

    for tri in triangles {
        let [i0, i1, i2] = tri.map(|i| i as usize);
        let (Some(&a), Some(&b), Some(&c)) =
            (positions.get(i0), positions.get(i1), positions.get(i2))
        else {
            continue;
        };
        let n = face_normal(a, b, c);
        normals[i0] += n;
        normals[i1] += n;
        normals[i2] += n;
    }

    for n in &mut normals {
        *n = n.normalize_or_zero();
    }
    normals
}
