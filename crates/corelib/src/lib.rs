//! Core math: glam re-exports, joint transforms, quaternion and normal helpers.

pub use glam::{Mat4, Quat, Vec2, Vec3, vec2, vec3};

pub mod normals;
pub mod quat;
pub mod transform;

pub use quat::WSign;
pub use transform::Transform;
