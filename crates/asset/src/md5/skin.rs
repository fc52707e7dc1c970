//! Joint-weighted vertex positions.

use corelib::{Transform, Vec3};

use super::mesh::{Vertex, Weight};

/// Object-space position of every vertex against `skeleton`:
/// `sum(bias * (joint.translation + joint.rotation * weight.position))`.
///
/// Returns `None` if a vertex's weight range or a weight's joint is out of
/// bounds.
pub(crate) fn skin_positions(
    vertices: &[Vertex],
    weights: &[Weight],
    skeleton: &[Transform],
) -> Option<Vec<Vec3>> {
    vertices
        .iter()
        .map(|vertex| {
            let end = vertex.weight_start.checked_add(vertex.weight_count)?;
            weights
                .get(vertex.weight_start..end)?
                .iter()
                .try_fold(Vec3::ZERO, |acc, weight| {
                    let joint = skeleton.get(weight.joint)?;
                    Some(acc + joint.transform_point(weight.position) * weight.bias)
                })
        })
        .collect()
}
