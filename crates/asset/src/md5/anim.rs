//! `.md5anim` parser: joint hierarchy, per-frame bounds, base frame and the
//! raw animated components of every frame.
//!
//! Frames are stored as the flat float arrays found in the file. Per-joint
//! poses are resolved on demand by merging a joint's slice of the frame with
//! its base-frame values ([`Md5Anim::joint_pose`]).

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result};
use corelib::{Quat, Transform, Vec3, quat, vec3};
use meshcore::{ParseError, ParseResult};

use super::{Md5Mesh, parse_header, parse_parent};
use crate::lexer::{Lexer, Statement};
use crate::options::{ComponentLayout, Md5Options};
use crate::seek::{Seek, header_value, next_line, open_block, seek_to};

#[derive(Clone, Debug, PartialEq)]
pub struct HierarchyJoint {
    pub name: String,
    pub parent: Option<usize>,
    /// Raw component field as written in the file.
    pub components: u32,
    /// Offset of this joint's first animated value within a frame.
    pub start_index: usize,
    /// Animated channels (`tx ty tz qx qy qz`) per the configured layout.
    pub channels: [bool; 6],
}

impl HierarchyJoint {
    pub fn num_animated(&self) -> usize {
        self.channels.iter().filter(|&&c| c).count()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

/// Position and orientation of a joint relative to its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl JointPose {
    #[inline]
    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.orientation)
    }
}

/// A joint's frame values before base-frame substitution.
///
/// `None` marks a channel inherited from the base frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PartialPose {
    pub position: [Option<f32>; 3],
    pub orientation: [Option<f32>; 3],
}

/// Raw animated components of one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    pub components: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Md5Anim {
    pub version: i32,
    pub commandline: Option<String>,
    pub frame_rate: u32,
    pub num_animated_components: usize,
    pub hierarchy: Vec<HierarchyJoint>,
    pub bounds: Vec<Bounds>,
    pub base_frame: Vec<JointPose>,
    pub frames: Vec<Frame>,
    options: Md5Options,
}

impl Md5Anim {
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn num_joints(&self) -> usize {
        self.hierarchy.len()
    }

    pub fn options(&self) -> Md5Options {
        self.options
    }

    /// Length in seconds; zero when the frame rate is zero.
    pub fn duration(&self) -> f32 {
        if self.frame_rate == 0 {
            return 0.0;
        }
        self.frames.len() as f32 / self.frame_rate as f32
    }

    /// The frame values of `joint` with unanimated channels left as `None`.
    pub fn partial_pose(&self, frame: usize, joint: usize) -> Option<PartialPose> {
        let components = &self.frames.get(frame)?.components;
        let info = self.hierarchy.get(joint)?;

        let mut values = [None; 6];
        let mut next = info.start_index;
        for (slot, animated) in values.iter_mut().zip(info.channels) {
            if animated {
                *slot = Some(*components.get(next)?);
                next += 1;
            }
        }

        Some(PartialPose {
            position: [values[0], values[1], values[2]],
            orientation: [values[3], values[4], values[5]],
        })
    }

    /// Parent-relative pose of `joint` at `frame`, channels not animated by
    /// the frame taken from the base frame.
    pub fn joint_pose(&self, frame: usize, joint: usize) -> Option<JointPose> {
        let partial = self.partial_pose(frame, joint)?;
        let base = self.base_frame.get(joint)?;

        let p = base.position;
        let q = base.orientation;
        let px = partial.position[0].unwrap_or(p.x);
        let py = partial.position[1].unwrap_or(p.y);
        let pz = partial.position[2].unwrap_or(p.z);
        let qx = partial.orientation[0].unwrap_or(q.x);
        let qy = partial.orientation[1].unwrap_or(q.y);
        let qz = partial.orientation[2].unwrap_or(q.z);

        Some(JointPose {
            position: vec3(px, py, pz),
            orientation: quat::from_xyz(qx, qy, qz, self.options.w_sign),
        })
    }

    /// All parent-relative joint poses of `frame`.
    pub fn frame_poses(&self, frame: usize) -> Option<Vec<JointPose>> {
        (0..self.hierarchy.len())
            .map(|joint| self.joint_pose(frame, joint))
            .collect()
    }

    /// Object-space joint transforms of `frame`, ready for
    /// [`SubMesh::skin`](super::SubMesh::skin).
    pub fn skeleton(&self, frame: usize) -> Option<Vec<Transform>> {
        let poses = self.frame_poses(frame)?;
        let mut skeleton: Vec<Transform> = Vec::with_capacity(poses.len());
        for (info, pose) in self.hierarchy.iter().zip(&poses) {
            let local = pose.transform();
            let world = match info.parent {
                // Parents always precede their children.
                Some(parent) => skeleton.get(parent)?.then_child(&local),
                None => local,
            };
            skeleton.push(world);
        }
        Some(skeleton)
    }

    /// Whether this animation drives the skeleton of `mesh`: same joint
    /// count, names and parents.
    pub fn is_compatible(&self, mesh: &Md5Mesh) -> bool {
        self.hierarchy.len() == mesh.joints.len()
            && self
                .hierarchy
                .iter()
                .zip(&mesh.joints)
                .all(|(a, m)| a.name == m.name && a.parent == m.parent)
    }
}

/// Load an MD5 animation from a file path.
pub fn load_md5_anim_from_path(path: impl AsRef<Path>, options: Md5Options) -> Result<Md5Anim> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open MD5 anim: {}", path.display()))?;
    load_md5_anim_from_reader(BufReader::new(file), options)
        .with_context(|| format!("Failed to parse MD5 anim: {}", path.display()))
}

/// Load an MD5 animation from a [`BufRead`] implementation.
pub fn load_md5_anim_from_reader<R: BufRead>(reader: R, options: Md5Options) -> ParseResult<Md5Anim> {
    let mut lexer = Lexer::md5(reader);
    let anim = parse_md5_anim(&mut lexer, options)?;
    log::info!(
        "Loaded MD5 anim: {} joints, {} frames at {} fps, {} components per frame",
        anim.num_joints(),
        anim.num_frames(),
        anim.frame_rate,
        anim.num_animated_components
    );
    Ok(anim)
}

/// Convenience helper to parse an MD5 animation string with default options.
pub fn load_md5_anim_from_str(contents: &str) -> ParseResult<Md5Anim> {
    load_md5_anim_from_reader(io::Cursor::new(contents), Md5Options::default())
}

fn parse_md5_anim<R: BufRead>(lexer: &mut Lexer<R>, options: Md5Options) -> ParseResult<Md5Anim> {
    let header = parse_header(lexer)?;
    let num_frames: usize = header_value(lexer, "numFrames")?;
    let num_joints: usize = header_value(lexer, "numJoints")?;
    let frame_rate: u32 = header_value(lexer, "frameRate")?;
    let num_animated_components: usize = header_value(lexer, "numAnimatedComponents")?;
    log::debug!(
        "MD5 anim header: {num_frames} frames, {num_joints} joints, {frame_rate} fps, \
         {num_animated_components} components"
    );

    let hierarchy = parse_hierarchy(lexer, num_joints, num_animated_components, Seek::Scan, options)?;
    let bounds = parse_bounds(lexer, num_frames, Seek::Scan)?;
    let base_frame = parse_base_frame(lexer, num_joints, Seek::Scan, options)?;
    let frames = (0..num_frames)
        .map(|index| parse_frame(lexer, index, num_animated_components, Seek::Scan))
        .collect::<ParseResult<Vec<_>>>()?;

    Ok(Md5Anim {
        version: header.version,
        commandline: header.commandline,
        frame_rate,
        num_animated_components,
        hierarchy,
        bounds,
        base_frame,
        frames,
        options,
    })
}

/// Parse `count` lines of a `hierarchy { ... }` block:
/// `"name" parent components start_index`.
///
/// Each joint's animated range must fit within `num_animated_components`.
pub fn parse_hierarchy<R: BufRead>(
    lexer: &mut Lexer<R>,
    count: usize,
    num_animated_components: usize,
    seek: Seek,
    options: Md5Options,
) -> ParseResult<Vec<HierarchyJoint>> {
    open_block(lexer, "hierarchy", seek)?;
    (0..count)
        .map(|index| {
            let statement = next_line(lexer, "hierarchy joint")?;
            parse_hierarchy_joint(&statement, index, num_animated_components, options)
        })
        .collect()
}

fn parse_hierarchy_joint(
    statement: &Statement,
    index: usize,
    num_animated_components: usize,
    options: Md5Options,
) -> ParseResult<HierarchyJoint> {
    let mut fields = statement.fields();
    let name = fields.name("joint name")?;
    let parent = parse_parent(&mut fields, index)?;
    let components: u32 = fields.parse("component field")?;
    let start_index: usize = fields.parse("frame start index")?;
    fields.finish()?;

    let channels = options
        .component_layout
        .animated_channels(components)
        .ok_or_else(|| {
            let hint = match options.component_layout {
                ComponentLayout::Prefix if components < 64 => {
                    "; bit-mask exports need ComponentLayout::Flags"
                }
                _ => "",
            };
            statement.malformed(format!(
                "component field {components} is invalid for {:?} layout{hint}",
                options.component_layout
            ))
        })?;

    let joint = HierarchyJoint {
        name,
        parent,
        components,
        start_index,
        channels,
    };
    let end = start_index.checked_add(joint.num_animated());
    if end.is_none_or(|end| end > num_animated_components) {
        return Err(statement.malformed(format!(
            "joint '{}' reads {} components from {start_index}, past the {num_animated_components} per frame",
            joint.name,
            joint.num_animated()
        )));
    }
    Ok(joint)
}

/// Parse `count` lines of a `bounds { ... }` block: `( min ) ( max )`.
pub fn parse_bounds<R: BufRead>(lexer: &mut Lexer<R>, count: usize, seek: Seek) -> ParseResult<Vec<Bounds>> {
    open_block(lexer, "bounds", seek)?;
    (0..count)
        .map(|_| {
            let statement = next_line(lexer, "bounds")?;
            let mut fields = statement.fields();
            let min = fields.vec3("bounds minimum")?;
            let max = fields.vec3("bounds maximum")?;
            fields.finish()?;
            Ok(Bounds { min, max })
        })
        .collect()
}

/// Parse `count` lines of a `baseframe { ... }` block:
/// `( px py pz ) ( qx qy qz )`.
pub fn parse_base_frame<R: BufRead>(
    lexer: &mut Lexer<R>,
    count: usize,
    seek: Seek,
    options: Md5Options,
) -> ParseResult<Vec<JointPose>> {
    open_block(lexer, "baseframe", seek)?;
    (0..count)
        .map(|_| {
            let statement = next_line(lexer, "base frame joint")?;
            let mut fields = statement.fields();
            let position = fields.vec3("base position")?;
            let q = fields.vec3("base orientation")?;
            fields.finish()?;
            Ok(JointPose {
                position,
                orientation: quat::from_xyz(q.x, q.y, q.z, options.w_sign),
            })
        })
        .collect()
}

/// Parse one `frame N { ... }` block. The block has no line count; values
/// are read until a line starting with `}` and must total `expected`.
pub fn parse_frame<R: BufRead>(
    lexer: &mut Lexer<R>,
    ordinal: usize,
    expected: usize,
    seek: Seek,
) -> ParseResult<Frame> {
    if seek == Seek::Scan {
        let opener = seek_to(lexer, "frame")?;
        let mut fields = opener.fields();
        fields.literal("frame")?;
        let _index: usize = fields.parse("frame index")?;
        fields.optional_literal("{");
        fields.finish()?;
    }

    let mut components = Vec::new();
    loop {
        let statement = next_line(lexer, "}")?;
        if statement.text.starts_with('}') {
            break;
        }
        let mut fields = statement.fields();
        while !fields.remaining().is_empty() {
            components.push(fields.f32("frame component")?);
        }
    }

    if components.len() != expected {
        return Err(ParseError::ComponentCountMismatch {
            frame: ordinal,
            expected,
            found: components.len(),
        });
    }
    Ok(Frame { components })
}
