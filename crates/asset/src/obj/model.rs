//! OBJ geometry model and the statement dispatcher that builds it.

use std::{
    collections::{BTreeSet, HashMap},
    sync::LazyLock,
};

use anyhow::{Result, anyhow};
use corelib::{Vec3, vec3};
use meshcore::{ParseError, ParseResult};

use crate::{
    fields::Fields,
    lexer::Statement,
    mesh::{MeshData, MeshVertex},
};

/// Group every mesh belongs to until a `g` statement says otherwise.
pub const DEFAULT_GROUP: &str = "default";

/// One `v/vt/vn` corner, already resolved to 0-based indices into the
/// model's position, texcoord and normal lists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexRef {
    pub position: usize,
    pub texcoord: Option<usize>,
    pub normal: Option<usize>,
}

impl VertexRef {
    pub fn new(position: usize, texcoord: Option<usize>, normal: Option<usize>) -> Self {
        Self {
            position,
            texcoord,
            normal,
        }
    }
}

/// A run of geometry sharing one name, group set, smoothing group, material
/// and texture.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjMesh {
    pub name: Option<String>,
    pub groups: Vec<String>,
    pub smoothing: Option<u32>,
    pub material: Option<String>,
    pub texture: Option<String>,
    pub points: Vec<VertexRef>,
    pub lines: Vec<Vec<VertexRef>>,
    pub faces: Vec<Vec<VertexRef>>,
}

impl Default for ObjMesh {
    fn default() -> Self {
        Self {
            name: None,
            groups: vec![DEFAULT_GROUP.to_owned()],
            smoothing: None,
            material: None,
            texture: None,
            points: Vec::new(),
            lines: Vec::new(),
            faces: Vec::new(),
        }
    }
}

impl ObjMesh {
    pub fn has_geometry(&self) -> bool {
        !self.points.is_empty() || !self.lines.is_empty() || !self.faces.is_empty()
    }

    /// Same metadata, no geometry.
    pub fn split(&self) -> Self {
        Self {
            name: self.name.clone(),
            groups: self.groups.clone(),
            smoothing: self.smoothing,
            material: self.material.clone(),
            texture: self.texture.clone(),
            ..Self::default()
        }
    }

    /// Fan-triangulate the faces into an indexed triangle list, sharing
    /// vertices with identical `v/vt/vn` triples. Points and lines are
    /// ignored.
    pub fn triangulate(&self, model: &ObjModel) -> Result<MeshData> {
        let mut unique: HashMap<VertexRef, u32> = HashMap::new();
        let mut vertices: Vec<MeshVertex> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();

        for face in &self.faces {
            let mut face_indices: Vec<u32> = Vec::with_capacity(face.len());
            for corner in face {
                let index = match unique.get(corner) {
                    Some(&idx) => idx,
                    None => {
                        let position = model.positions.get(corner.position).ok_or_else(|| {
                            anyhow!("Position index {} out of bounds", corner.position)
                        })?;
                        let uv = match corner.texcoord {
                            Some(i) => {
                                let t = model
                                    .texcoords
                                    .get(i)
                                    .ok_or_else(|| anyhow!("Texcoord index {i} out of bounds"))?;
                                [t.x, t.y]
                            }
                            None => [0.0, 0.0],
                        };
                        let normal = match corner.normal {
                            Some(i) => model
                                .normals
                                .get(i)
                                .ok_or_else(|| anyhow!("Normal index {i} out of bounds"))?
                                .to_array(),
                            None => [0.0, 0.0, 1.0],
                        };

                        let idx = u32::try_from(vertices.len())
                            .map_err(|_| anyhow!("Too many vertices in OBJ mesh (>{})", u32::MAX))?;
                        vertices.push(MeshVertex::new(position.to_array(), normal, uv));
                        unique.insert(*corner, idx);
                        idx
                    }
                };
                face_indices.push(index);
            }

            if face_indices.len() < 3 {
                continue;
            }
            for tri in 1..(face_indices.len() - 1) {
                indices.push(face_indices[0]);
                indices.push(face_indices[tri]);
                indices.push(face_indices[tri + 1]);
            }
        }

        if vertices.is_empty() || indices.is_empty() {
            anyhow::bail!("OBJ mesh contained no triangles");
        }

        Ok(MeshData::new(vertices, indices))
    }
}

/// Everything an OBJ file (and the files it `call`s) defines.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjModel {
    pub positions: Vec<Vec3>,
    /// `u v w`, missing components are 0.
    pub texcoords: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub meshes: Vec<ObjMesh>,
    pub names: BTreeSet<String>,
    pub groups: BTreeSet<String>,
    /// `mtllib` file names in declaration order.
    pub material_libraries: Vec<String>,
    /// `maplib` file names in declaration order.
    pub texture_libraries: Vec<String>,
    pub shadow_obj: Option<String>,
    pub trace_obj: Option<String>,
}

impl ObjModel {
    pub fn num_faces(&self) -> usize {
        self.meshes.iter().map(|m| m.faces.len()).sum()
    }
}

type Handler = fn(&mut ObjBuilder, &Statement) -> ParseResult<()>;

const HANDLERS: &[(&str, Handler)] = &[
    ("v", ObjBuilder::position),
    ("vt", ObjBuilder::texcoord),
    ("vn", ObjBuilder::normal),
    ("f", ObjBuilder::face),
    ("fo", ObjBuilder::face),
    ("p", ObjBuilder::points),
    ("l", ObjBuilder::line),
    ("o", ObjBuilder::object),
    ("g", ObjBuilder::group),
    ("s", ObjBuilder::smoothing),
    ("usemtl", ObjBuilder::use_material),
    ("usemap", ObjBuilder::use_map),
    ("mtllib", ObjBuilder::material_library),
    ("maplib", ObjBuilder::texture_library),
    ("shadow_obj", ObjBuilder::shadow_obj),
    ("trace_obj", ObjBuilder::trace_obj),
];

/// Recognised free-form geometry, rendering and display statements that are
/// not implemented.
const UNSUPPORTED: &[&str] = &[
    "csh", "vp", "cstype", "deg", "bmat", "step", "curv", "curv2", "surf", "parm", "trim", "hole",
    "scrv", "sp", "end", "con", "mg", "bevel", "c_interp", "d_interp", "lod", "ctech", "stech",
    "bsp", "bzp", "cdc", "cdp", "res", "pl", "lp", "lq", "ld", "c",
];

static DISPATCH: LazyLock<HashMap<&'static str, Handler>> = LazyLock::new(|| {
    HANDLERS
        .iter()
        .copied()
        .chain(UNSUPPORTED.iter().map(|&k| (k, unsupported::<ObjBuilder> as Handler)))
        .collect()
});

pub(crate) fn unsupported<T>(_: &mut T, statement: &Statement) -> ParseResult<()> {
    Err(ParseError::Unsupported {
        line: statement.line,
        keyword: statement.keyword().to_owned(),
    })
}

pub(crate) fn unknown(statement: &Statement) -> ParseError {
    ParseError::Unknown {
        line: statement.line,
        keyword: statement.keyword().to_owned(),
    }
}

/// Token cursor positioned after the keyword.
pub(crate) fn arguments(statement: &Statement) -> Fields<'_> {
    let mut fields = statement.fields();
    fields.next_token();
    fields
}

/// Statement-by-statement OBJ model builder. The current mesh is only
/// committed once a split happens or input ends.
#[derive(Debug, Default)]
pub(crate) struct ObjBuilder {
    model: ObjModel,
    current: Option<ObjMesh>,
}

impl ObjBuilder {
    pub fn dispatch(&mut self, statement: &Statement) -> ParseResult<()> {
        match DISPATCH.get(statement.keyword()) {
            Some(handler) => handler(self, statement),
            None => Err(unknown(statement)),
        }
    }

    /// Commit the last mesh (if it has geometry) and hand over the model.
    pub fn finish(mut self) -> ObjModel {
        if let Some(mesh) = self.current.take() {
            if mesh.has_geometry() {
                self.model.meshes.push(mesh);
            }
        }
        self.model
    }

    fn geometry_mesh(&mut self) -> &mut ObjMesh {
        self.current.get_or_insert_with(ObjMesh::default)
    }

    /// Mesh a metadata statement applies to: a fresh split if the current
    /// mesh already has geometry, otherwise the current mesh itself.
    fn metadata_mesh(&mut self) -> &mut ObjMesh {
        if let Some(mesh) = self.current.take() {
            if mesh.has_geometry() {
                let next = mesh.split();
                self.model.meshes.push(mesh);
                self.current = Some(next);
            } else {
                self.current = Some(mesh);
            }
        }
        self.current.get_or_insert_with(ObjMesh::default)
    }

    fn position(&mut self, statement: &Statement) -> ParseResult<()> {
        let mut fields = arguments(statement);
        let mut v = bare_vec3(&mut fields, "vertex")?;
        if fields.remaining().is_empty() {
            self.model.positions.push(v);
            return fields.finish();
        }
        let w = fields.f32("vertex w")?;
        fields.finish()?;
        if w == 0.0 {
            return Err(statement.malformed("vertex w must be non-zero"));
        }
        v /= w;
        self.model.positions.push(v);
        Ok(())
    }

    fn texcoord(&mut self, statement: &Statement) -> ParseResult<()> {
        let mut fields = arguments(statement);
        let u = fields.f32("texture u")?;
        let v = optional_f32(&mut fields, "texture v")?;
        let w = optional_f32(&mut fields, "texture w")?;
        fields.finish()?;
        self.model.texcoords.push(vec3(u, v, w));
        Ok(())
    }

    fn normal(&mut self, statement: &Statement) -> ParseResult<()> {
        let mut fields = arguments(statement);
        let n = bare_vec3(&mut fields, "normal")?;
        fields.finish()?;
        self.model.normals.push(n);
        Ok(())
    }

    fn face(&mut self, statement: &Statement) -> ParseResult<()> {
        let corners = self.vertex_refs(statement, 3)?;
        self.geometry_mesh().faces.push(corners);
        Ok(())
    }

    fn points(&mut self, statement: &Statement) -> ParseResult<()> {
        let corners = self.vertex_refs(statement, 1)?;
        self.geometry_mesh().points.extend(corners);
        Ok(())
    }

    fn line(&mut self, statement: &Statement) -> ParseResult<()> {
        let corners = self.vertex_refs(statement, 2)?;
        self.geometry_mesh().lines.push(corners);
        Ok(())
    }

    fn object(&mut self, statement: &Statement) -> ParseResult<()> {
        let name = required_args(statement, "object name")?.to_owned();
        self.model.names.insert(name.clone());
        self.metadata_mesh().name = Some(name);
        Ok(())
    }

    fn group(&mut self, statement: &Statement) -> ParseResult<()> {
        let mut groups: Vec<String> = statement
            .args()
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        if groups.is_empty() {
            groups.push(DEFAULT_GROUP.to_owned());
        }
        self.model.groups.extend(groups.iter().cloned());
        self.metadata_mesh().groups = groups;
        Ok(())
    }

    fn smoothing(&mut self, statement: &Statement) -> ParseResult<()> {
        let mut fields = arguments(statement);
        let value = fields.token("smoothing group")?;
        let smoothing = match value {
            "off" | "0" => None,
            other => Some(other.parse::<u32>().map_err(|e| {
                statement.malformed(format!("invalid smoothing group '{other}': {e}"))
            })?),
        };
        fields.finish()?;
        self.metadata_mesh().smoothing = smoothing;
        Ok(())
    }

    fn use_material(&mut self, statement: &Statement) -> ParseResult<()> {
        let name = required_args(statement, "material name")?.to_owned();
        self.metadata_mesh().material = Some(name);
        Ok(())
    }

    fn use_map(&mut self, statement: &Statement) -> ParseResult<()> {
        let name = required_args(statement, "texture map name")?.to_owned();
        self.metadata_mesh().texture = Some(name);
        Ok(())
    }

    fn material_library(&mut self, statement: &Statement) -> ParseResult<()> {
        let files = file_list(statement)?;
        self.model.material_libraries.extend(files);
        Ok(())
    }

    fn texture_library(&mut self, statement: &Statement) -> ParseResult<()> {
        let files = file_list(statement)?;
        self.model.texture_libraries.extend(files);
        Ok(())
    }

    fn shadow_obj(&mut self, statement: &Statement) -> ParseResult<()> {
        self.model.shadow_obj = Some(single_file(statement)?);
        Ok(())
    }

    fn trace_obj(&mut self, statement: &Statement) -> ParseResult<()> {
        self.model.trace_obj = Some(single_file(statement)?);
        Ok(())
    }

    /// Resolve every `v[/vt][/vn]` token of a `f`/`p`/`l` statement against
    /// the lists as they stand right now.
    fn vertex_refs(&self, statement: &Statement, min: usize) -> ParseResult<Vec<VertexRef>> {
        let refs = statement
            .args()
            .split_whitespace()
            .map(|token| self.vertex_ref(token, statement.line))
            .collect::<ParseResult<Vec<_>>>()?;
        if refs.len() < min {
            return Err(statement.malformed(format!(
                "'{}' needs at least {min} vertices, found {}",
                statement.keyword(),
                refs.len()
            )));
        }
        Ok(refs)
    }

    fn vertex_ref(&self, token: &str, line: usize) -> ParseResult<VertexRef> {
        let mut split = token.split('/');
        let position = match split.next() {
            Some(value) if !value.is_empty() => {
                resolve_index(value, self.model.positions.len(), line)?
            }
            _ => {
                return Err(ParseError::malformed(
                    line,
                    format!("vertex '{token}' has no position index"),
                ));
            }
        };
        let texcoord = match split.next() {
            Some(value) if !value.is_empty() => {
                Some(resolve_index(value, self.model.texcoords.len(), line)?)
            }
            _ => None,
        };
        let normal = match split.next() {
            Some(value) if !value.is_empty() => {
                Some(resolve_index(value, self.model.normals.len(), line)?)
            }
            _ => None,
        };
        if split.next().is_some() {
            return Err(ParseError::malformed(
                line,
                format!("vertex '{token}' has more than three indices"),
            ));
        }
        Ok(VertexRef::new(position, texcoord, normal))
    }
}

/// 1-based index, or negative for "counting back from the end of the list".
fn resolve_index(token: &str, len: usize, line: usize) -> ParseResult<usize> {
    let raw = token
        .parse::<i64>()
        .map_err(|e| ParseError::malformed(line, format!("invalid index '{token}': {e}")))?;
    if raw == 0 {
        return Err(ParseError::malformed(line, "OBJ indices are 1-based; found 0"));
    }

    let idx = if raw > 0 {
        raw - 1
    } else {
        len as i64 + raw
    };

    if idx < 0 || idx as usize >= len {
        return Err(ParseError::malformed(
            line,
            format!("index {raw} resolved out of bounds (len={len})"),
        ));
    }

    Ok(idx as usize)
}

/// `x y z` without parentheses.
fn bare_vec3(fields: &mut Fields<'_>, what: &str) -> ParseResult<Vec3> {
    let x = fields.f32(what)?;
    let y = fields.f32(what)?;
    let z = fields.f32(what)?;
    Ok(vec3(x, y, z))
}

fn optional_f32(fields: &mut Fields<'_>, what: &str) -> ParseResult<f32> {
    if fields.remaining().is_empty() {
        Ok(0.0)
    } else {
        fields.f32(what)
    }
}

fn required_args<'a>(statement: &'a Statement, what: &str) -> ParseResult<&'a str> {
    match statement.args() {
        "" => Err(statement.malformed(format!("missing {what}"))),
        args => Ok(args),
    }
}

fn file_list(statement: &Statement) -> ParseResult<Vec<String>> {
    let files: Vec<String> = statement
        .args()
        .split_whitespace()
        .map(str::to_owned)
        .collect();
    if files.is_empty() {
        return Err(statement.malformed("missing file name"));
    }
    Ok(files)
}

fn single_file(statement: &Statement) -> ParseResult<String> {
    let mut fields = arguments(statement);
    let file = fields.token("file name")?.to_owned();
    fields.finish()?;
    Ok(file)
}
