//! Asset loading/parsers (MD5 skeletal meshes and animations, Wavefront OBJ/MTL).
//! MD5: skeleton, weights and skinned bind pose; per-frame joint poses.
//! OBJ: statement-dispatched geometry with group/material mesh splitting.

pub mod fields;
pub mod lexer;
pub mod md5;
pub mod mesh;
pub mod obj;
pub mod options;
pub mod seek;

pub use options::{ComponentLayout, Md5Options, ObjOptions, WSign};
