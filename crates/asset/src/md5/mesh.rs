//! `.md5mesh` parser: bind-pose skeleton plus weighted submeshes.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result};
use corelib::{Mat4, Quat, Transform, Vec2, Vec3, normals, quat};
use meshcore::{ParseError, ParseResult};

use super::{parse_header, parse_parent, skin::skin_positions};
use crate::lexer::{Lexer, Statement};
use crate::mesh::{MeshData, MeshVertex};
use crate::options::Md5Options;
use crate::seek::{Seek, header_value, next_line, open_block, seek_to};

/// Bind-pose joint, in object space.
#[derive(Clone, Debug, PartialEq)]
pub struct Joint {
    pub name: String,
    /// `None` for a root; otherwise an index lower than this joint's own.
    pub parent: Option<usize>,
    pub position: Vec3,
    pub orientation: Quat,
}

impl Joint {
    #[inline]
    pub fn transform(&self) -> Transform {
        Transform::new(self.position, self.orientation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub texcoord: Vec2,
    pub weight_start: usize,
    pub weight_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Weight {
    pub joint: usize,
    pub bias: f32,
    /// Offset in the joint's local space.
    pub position: Vec3,
}

/// One `mesh { ... }` block with its derived bind-pose geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct SubMesh {
    pub shader: String,
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<[u32; 3]>,
    pub weights: Vec<Weight>,
    /// Object-space bind-pose position per vertex.
    pub positions: Vec<Vec3>,
    /// Unit normal per vertex; zero for vertices no triangle covers.
    pub normals: Vec<Vec3>,
}

impl SubMesh {
    /// Vertex positions against another object-space skeleton, e.g. one
    /// built by [`Md5Anim::skeleton`](super::Md5Anim::skeleton).
    ///
    /// Returns `None` when `skeleton` lacks a joint a weight refers to.
    pub fn skin(&self, skeleton: &[Transform]) -> Option<Vec<Vec3>> {
        skin_positions(&self.vertices, &self.weights, skeleton)
    }

    /// Flatten into an indexed vertex buffer using the bind pose.
    pub fn to_mesh_data(&self) -> MeshData {
        let vertices = self
            .positions
            .iter()
            .zip(&self.normals)
            .zip(&self.vertices)
            .map(|((p, n), v)| MeshVertex::new(p.to_array(), n.to_array(), v.texcoord.to_array()))
            .collect();
        let indices = self.triangles.iter().flatten().copied().collect();
        MeshData::new(vertices, indices)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Md5Mesh {
    pub version: i32,
    pub commandline: Option<String>,
    pub joints: Vec<Joint>,
    pub meshes: Vec<SubMesh>,
}

impl Md5Mesh {
    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    pub fn num_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.meshes.iter().map(|m| m.vertices.len()).sum()
    }

    pub fn num_triangles(&self) -> usize {
        self.meshes.iter().map(|m| m.triangles.len()).sum()
    }

    pub fn bind_pose(&self) -> Vec<Transform> {
        self.joints.iter().map(Joint::transform).collect()
    }

    /// Per-joint matrices taking bind-pose object space to `skeleton`'s
    /// object space (`posed * bind^-1`), for skinning on the GPU.
    ///
    /// Returns `None` unless `skeleton` has one transform per joint.
    pub fn skinning_matrices(&self, skeleton: &[Transform]) -> Option<Vec<Mat4>> {
        if skeleton.len() != self.joints.len() {
            return None;
        }
        let matrices = self
            .joints
            .iter()
            .zip(skeleton)
            .map(|(joint, posed)| posed.matrix() * joint.transform().matrix().inverse())
            .collect();
        Some(matrices)
    }
}

/// Load an MD5 mesh from a file path.
pub fn load_md5_mesh_from_path(path: impl AsRef<Path>, options: Md5Options) -> Result<Md5Mesh> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open MD5 mesh: {}", path.display()))?;
    load_md5_mesh_from_reader(BufReader::new(file), options)
        .with_context(|| format!("Failed to parse MD5 mesh: {}", path.display()))
}

/// Load an MD5 mesh from a [`BufRead`] implementation.
pub fn load_md5_mesh_from_reader<R: BufRead>(reader: R, options: Md5Options) -> ParseResult<Md5Mesh> {
    let mut lexer = Lexer::md5(reader);
    let mesh = parse_md5_mesh(&mut lexer, options)?;
    log::info!(
        "Loaded MD5 mesh: {} joints, {} meshes, {} vertices, {} triangles",
        mesh.num_joints(),
        mesh.num_meshes(),
        mesh.num_vertices(),
        mesh.num_triangles()
    );
    Ok(mesh)
}

/// Convenience helper to parse an MD5 mesh string with default options.
pub fn load_md5_mesh_from_str(contents: &str) -> ParseResult<Md5Mesh> {
    load_md5_mesh_from_reader(io::Cursor::new(contents), Md5Options::default())
}

fn parse_md5_mesh<R: BufRead>(lexer: &mut Lexer<R>, options: Md5Options) -> ParseResult<Md5Mesh> {
    let header = parse_header(lexer)?;
    let num_joints: usize = header_value(lexer, "numJoints")?;
    let num_meshes: usize = header_value(lexer, "numMeshes")?;
    log::debug!("MD5 mesh header: {num_joints} joints, {num_meshes} meshes");

    let joints = parse_joints(lexer, num_joints, Seek::Scan, options)?;
    let skeleton: Vec<Transform> = joints.iter().map(Joint::transform).collect();

    let meshes = (0..num_meshes)
        .map(|_| parse_submesh(lexer, &skeleton, Seek::Scan))
        .collect::<ParseResult<Vec<_>>>()?;

    Ok(Md5Mesh {
        version: header.version,
        commandline: header.commandline,
        joints,
        meshes,
    })
}

/// Parse `count` joint lines of a `joints { ... }` block.
///
/// Lines have the form `"name" parent ( px py pz ) ( qx qy qz )`.
pub fn parse_joints<R: BufRead>(
    lexer: &mut Lexer<R>,
    count: usize,
    seek: Seek,
    options: Md5Options,
) -> ParseResult<Vec<Joint>> {
    open_block(lexer, "joints", seek)?;
    (0..count)
        .map(|index| {
            let statement = next_line(lexer, "joint")?;
            parse_joint(&statement, index, options)
        })
        .collect()
}

fn parse_joint(statement: &Statement, index: usize, options: Md5Options) -> ParseResult<Joint> {
    let mut fields = statement.fields();
    let name = fields.name("joint name")?;
    let parent = parse_parent(&mut fields, index)?;
    let position = fields.vec3("joint position")?;
    let q = fields.vec3("joint orientation")?;
    fields.finish()?;

    Ok(Joint {
        name,
        parent,
        position,
        orientation: quat::from_xyz(q.x, q.y, q.z, options.w_sign),
    })
}

/// Parse one `mesh { ... }` block and derive its bind-pose geometry from
/// `skeleton` (object-space joint transforms).
pub fn parse_submesh<R: BufRead>(
    lexer: &mut Lexer<R>,
    skeleton: &[Transform],
    seek: Seek,
) -> ParseResult<SubMesh> {
    open_block(lexer, "mesh", seek)?;

    let shader = {
        let statement = seek_to(lexer, "shader")?;
        let mut fields = statement.fields();
        fields.literal("shader")?;
        let shader = fields.name("shader name")?;
        fields.finish()?;
        shader
    };

    let num_verts: usize = header_value(lexer, "numverts")?;
    let mut vertex_lines = Vec::new();
    let mut vertices = Vec::new();
    for _ in 0..num_verts {
        let statement = next_line(lexer, "vert")?;
        vertices.push(parse_vertex(&statement)?);
        vertex_lines.push(statement.line);
    }

    let num_tris: usize = header_value(lexer, "numtris")?;
    let triangles = (0..num_tris)
        .map(|_| parse_triangle(&next_line(lexer, "tri")?, vertices.len()))
        .collect::<ParseResult<Vec<_>>>()?;

    let num_weights: usize = header_value(lexer, "numweights")?;
    let weights = (0..num_weights)
        .map(|_| parse_weight(&next_line(lexer, "weight")?, skeleton.len()))
        .collect::<ParseResult<Vec<_>>>()?;

    for (vertex, &line) in vertices.iter().zip(&vertex_lines) {
        let in_range = vertex
            .weight_start
            .checked_add(vertex.weight_count)
            .is_some_and(|end| end <= weights.len());
        if !in_range {
            return Err(ParseError::malformed(
                line,
                format!(
                    "weights {}..+{} exceed the {} weights of the mesh",
                    vertex.weight_start,
                    vertex.weight_count,
                    weights.len()
                ),
            ));
        }
    }

    // Weight ranges and joint indices are checked above.
    let positions = skin_positions(&vertices, &weights, skeleton)
        .ok_or_else(|| ParseError::malformed(lexer.line_no(), "vertex weights out of range"))?;
    let normals = normals::vertex_normals(&positions, &triangles);

    log::debug!(
        "MD5 submesh '{shader}': {} vertices, {} triangles, {} weights",
        vertices.len(),
        triangles.len(),
        weights.len()
    );

    Ok(SubMesh {
        shader,
        vertices,
        triangles,
        weights,
        positions,
        normals,
    })
}

/// `vert index ( u v ) weight_start weight_count`
fn parse_vertex(statement: &Statement) -> ParseResult<Vertex> {
    let mut fields = statement.fields();
    fields.literal("vert")?;
    let _index: usize = fields.parse("vertex index")?;
    let texcoord = fields.vec2("texture coordinate")?;
    let weight_start = fields.parse("weight start")?;
    let weight_count = fields.parse("weight count")?;
    fields.finish()?;
    Ok(Vertex {
        texcoord,
        weight_start,
        weight_count,
    })
}

/// `tri index v0 v1 v2`
fn parse_triangle(statement: &Statement, num_verts: usize) -> ParseResult<[u32; 3]> {
    let mut fields = statement.fields();
    fields.literal("tri")?;
    let _index: usize = fields.parse("triangle index")?;
    let mut tri = [0u32; 3];
    for slot in &mut tri {
        let v: u32 = fields.parse("vertex index")?;
        if v as usize >= num_verts {
            return Err(statement.malformed(format!(
                "vertex {v} out of range for {num_verts} vertices"
            )));
        }
        *slot = v;
    }
    fields.finish()?;
    Ok(tri)
}

/// `weight index joint bias ( x y z )`
fn parse_weight(statement: &Statement, num_joints: usize) -> ParseResult<Weight> {
    let mut fields = statement.fields();
    fields.literal("weight")?;
    let _index: usize = fields.parse("weight index")?;
    let joint: usize = fields.parse("joint index")?;
    if joint >= num_joints {
        return Err(statement.malformed(format!(
            "joint {joint} out of range for {num_joints} joints"
        )));
    }
    let bias = fields.f32("weight bias")?;
    let position = fields.vec3("weight position")?;
    fields.finish()?;
    Ok(Weight {
        joint,
        bias,
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::{WSign, vec3};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    const SINGLE_VERTEX: &str = r#"
        MD5Version 10
        commandline ""

        numJoints 1
        numMeshes 1

        joints {
            "origin" -1 ( 0 0 0 ) ( 0 0 0 )
        }

        mesh {
            shader "models/box"
            numverts 1
            vert 0 ( 0.5 0.25 ) 0 1
            numtris 1
            tri 0 0 0 0
            numweights 1
            weight 0 0 1.0 ( 1 0 0 )
        }
    "#;

    const QUAD: &str = r#"
        MD5Version 10 // exported by hand
        numJoints 2
        numMeshes 1

        joints {
            "root"  -1 ( 0 0 0 ) ( 0 0 0 )        //
            "child"  0 ( 0 0 2 ) ( 0 0 0 )        // root
        }

        mesh {
            // meshes: quad
            shader "quad"

            numverts 4
            vert 0 ( 0 0 ) 0 1
            vert 1 ( 1 0 ) 1 1
            vert 2 ( 1 1 ) 2 1
            vert 3 ( 0 1 ) 3 2

            numtris 2
            tri 0 0 1 2
            tri 1 0 2 3

            numweights 5
            weight 0 0 1.0 ( 0 0 0 )
            weight 1 0 1.0 ( 1 0 0 )
            weight 2 1 1.0 ( 1 1 -2 )
            weight 3 0 0.5 ( 0 1 0 )
            weight 4 1 0.5 ( 0 1 -2 )
        }
    "#;

    #[test]
    fn single_vertex_bound_to_root() {
        init_logger();
        let mesh = load_md5_mesh_from_str(SINGLE_VERTEX).expect("parse mesh");
        assert_eq!(mesh.commandline.as_deref(), Some(""));
        assert_eq!(mesh.num_joints(), 1);
        assert_eq!(mesh.joints[0].name, "origin");
        assert_eq!(mesh.joints[0].parent, None);

        let sub = &mesh.meshes[0];
        assert_eq!(sub.shader, "models/box");
        assert_eq!(sub.vertices[0].texcoord, Vec2::new(0.5, 0.25));
        assert!((sub.positions[0] - vec3(1.0, 0.0, 0.0)).length() < 1e-6);
        // Degenerate triangle contributes nothing.
        assert_eq!(sub.normals[0], Vec3::ZERO);
    }

    #[test]
    fn quad_positions_and_normals() {
        init_logger();
        let mesh = load_md5_mesh_from_str(QUAD).expect("parse quad");
        assert_eq!(mesh.num_joints(), 2);
        assert_eq!(mesh.joints[1].parent, Some(0));
        for (i, joint) in mesh.joints.iter().enumerate() {
            assert!(joint.parent.is_none_or(|p| p < i));
        }

        let sub = &mesh.meshes[0];
        let expected = [
            vec3(0.0, 0.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(1.0, 1.0, 0.0),
            vec3(0.0, 1.0, 0.0),
        ];
        for (got, want) in sub.positions.iter().zip(expected) {
            assert!((*got - want).length() < 1e-5, "{got:?} != {want:?}");
        }
        for n in &sub.normals {
            assert!((*n - Vec3::Z).length() < 1e-5, "{n:?}");
        }

        let data = sub.to_mesh_data();
        assert!(data.is_valid());
        assert_eq!(data.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(data.vertices[2].uv, [1.0, 1.0]);
    }

    #[test]
    fn skin_against_moved_skeleton() {
        let mesh = load_md5_mesh_from_str(SINGLE_VERTEX).unwrap();
        let moved = [Transform::new(vec3(0.0, 5.0, 0.0), Quat::IDENTITY)];
        let positions = mesh.meshes[0].skin(&moved).unwrap();
        assert!((positions[0] - vec3(1.0, 5.0, 0.0)).length() < 1e-6);
        assert!(mesh.meshes[0].skin(&[]).is_none());
    }

    #[test]
    fn w_sign_follows_options() {
        let src = SINGLE_VERTEX.replace("( 0 0 0 ) ( 0 0 0 )", "( 0 0 0 ) ( 0.6 0 0 )");
        let neg = load_md5_mesh_from_reader(src.as_bytes(), Md5Options::default()).unwrap();
        let pos = load_md5_mesh_from_reader(
            src.as_bytes(),
            Md5Options::default().with_w_sign(WSign::Positive),
        )
        .unwrap();
        assert!((neg.joints[0].orientation.w + 0.8).abs() < 1e-6);
        assert!((pos.joints[0].orientation.w - 0.8).abs() < 1e-6);
    }

    #[test]
    fn version_mismatch_aborts_before_joints() {
        let src = SINGLE_VERTEX.replace("MD5Version 10", "MD5Version 9");
        let err = load_md5_mesh_from_str(&src).unwrap_err();
        assert!(matches!(
            err,
            ParseError::VersionMismatch {
                expected: 10,
                found: 9
            }
        ));
    }

    #[test]
    fn bind_pose_skinning_matrices_are_identity() {
        let mesh = load_md5_mesh_from_str(QUAD).unwrap();
        let matrices = mesh.skinning_matrices(&mesh.bind_pose()).unwrap();
        assert_eq!(matrices.len(), mesh.num_joints());
        for m in matrices {
            assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-5), "{m:?}");
        }
        assert!(mesh.skinning_matrices(&[]).is_none());
    }

    #[test]
    fn byte_order_mark_before_version_is_accepted() {
        let src = format!("\u{feff}{}", SINGLE_VERTEX.trim_start());
        let mesh = load_md5_mesh_from_str(&src).unwrap();
        assert_eq!(mesh.num_vertices(), 1);
    }

    #[test]
    fn missing_mesh_block_is_structural() {
        let src = SINGLE_VERTEX.replace("numMeshes 1", "numMeshes 2");
        let err = load_md5_mesh_from_str(&src).unwrap_err();
        assert!(matches!(err, ParseError::Structural { ref expected } if expected == "mesh"));
    }

    #[test]
    fn malformed_lines_are_rejected() {
        let cases = [
            // non-numeric bias
            ("weight 0 0 1.0 ( 1 0 0 )", "weight 0 0 heavy ( 1 0 0 )"),
            // missing coordinate
            ("weight 0 0 1.0 ( 1 0 0 )", "weight 0 0 1.0 ( 1 0 )"),
            // weight on a joint that does not exist
            ("weight 0 0 1.0 ( 1 0 0 )", "weight 0 3 1.0 ( 1 0 0 )"),
            // vertex reads past the weight list
            ("vert 0 ( 0.5 0.25 ) 0 1", "vert 0 ( 0.5 0.25 ) 0 2"),
            // triangle references a missing vertex
            ("tri 0 0 0 0", "tri 0 0 0 1"),
            // forward parent reference
            ("\"origin\" -1", "\"origin\" 0"),
        ];
        for (from, to) in cases {
            let src = SINGLE_VERTEX.replace(from, to);
            let err = load_md5_mesh_from_str(&src).unwrap_err();
            assert!(matches!(err, ParseError::Malformed { .. }), "{to}: {err}");
        }
    }

    #[test]
    fn path_loader_reads_file_and_names_it_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("box.md5mesh");
        std::fs::write(&path, SINGLE_VERTEX).unwrap();
        let mesh = load_md5_mesh_from_path(&path, Md5Options::default()).unwrap();
        assert_eq!(mesh.num_vertices(), 1);

        let broken = dir.path().join("broken.md5mesh");
        std::fs::write(&broken, SINGLE_VERTEX.replace("MD5Version 10", "MD5Version 11")).unwrap();
        let err = load_md5_mesh_from_path(&broken, Md5Options::default()).unwrap_err();
        assert!(err.to_string().contains(&broken.display().to_string()), "{err:#}");
        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::VersionMismatch { found: 11, .. })
        ));

        let missing = dir.path().join("missing.md5mesh");
        let err = load_md5_mesh_from_path(&missing, Md5Options::default()).unwrap_err();
        assert!(err.to_string().contains(&missing.display().to_string()), "{err:#}");
    }

    #[test]
    fn embedded_submesh_parses_in_place() {
        let src = r#"
            shader "embedded"
            numverts 1
            vert 0 ( 0 0 ) 0 1
            numtris 0
            numweights 1
            weight 0 0 1.0 ( 0 2 0 )
        "#;
        let mut lexer = Lexer::md5(src.as_bytes());
        let skeleton = [Transform::identity()];
        let sub = parse_submesh(&mut lexer, &skeleton, Seek::InPlace).unwrap();
        assert_eq!(sub.shader, "embedded");
        assert!((sub.positions[0] - vec3(0.0, 2.0, 0.0)).length() < 1e-6);
        assert_eq!(sub.normals[0], Vec3::ZERO);
    }
}
