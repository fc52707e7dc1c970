//! Wavefront OBJ geometry and MTL material libraries.
//!
//! Both are dispatched statement by statement through keyword tables.
//! Recognised-but-unimplemented statements yield
//! [`ParseError::Unsupported`], statements without a handler yield
//! [`ParseError::Unknown`]; with [`ObjOptions::strict`] unset both are
//! logged and skipped.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Cursor},
    path::Path,
};

use anyhow::{Context, Result};
use meshcore::{ParseError, ParseResult};

use crate::{
    lexer::{Lexer, Statement},
    options::ObjOptions,
};

mod material;
mod model;
mod source;

pub use material::{Material, MaterialTextures, MtlLibrary};
pub use model::{DEFAULT_GROUP, ObjMesh, ObjModel, VertexRef};
pub use source::{FsResolver, IncludeResolver, MAX_INCLUDE_DEPTH, NoIncludes};

use material::MtlBuilder;
use model::ObjBuilder;
use source::SourceStack;

/// Load an OBJ model from a file path. `call` statements are resolved
/// relative to the file's directory.
pub fn load_obj_from_path(path: impl AsRef<Path>, options: ObjOptions) -> Result<ObjModel> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open OBJ file: {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut resolver = FsResolver::new(base);
    load_obj_from_reader(BufReader::new(file), &mut resolver, options)
        .with_context(|| format!("Failed to parse OBJ file: {}", path.display()))
}

/// Load an OBJ model from a [`BufRead`] implementation.
pub fn load_obj_from_reader<'a>(
    reader: impl BufRead + 'a,
    resolver: &mut dyn IncludeResolver,
    options: ObjOptions,
) -> ParseResult<ObjModel> {
    let mut sources = SourceStack::new(reader);
    let mut builder = ObjBuilder::default();

    while let Some(statement) = sources.next_statement()? {
        let result = if statement.keyword() == "call" {
            include(&mut sources, resolver, &statement)
        } else {
            builder.dispatch(&statement)
        };
        recover(result, options)?;
    }

    let model = builder.finish();
    log::info!(
        "Loaded OBJ: {} positions, {} meshes, {} faces",
        model.positions.len(),
        model.meshes.len(),
        model.num_faces()
    );
    Ok(model)
}

/// Convenience helper to parse an OBJ string literal. `call` is refused.
pub fn load_obj_from_str(contents: &str) -> ParseResult<ObjModel> {
    load_obj_from_reader(Cursor::new(contents), &mut NoIncludes, ObjOptions::default())
}

/// Load a material library from a file path.
pub fn load_mtl_from_path(path: impl AsRef<Path>, options: ObjOptions) -> Result<MtlLibrary> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open MTL file: {}", path.display()))?;
    load_mtl_from_reader(BufReader::new(file), options)
        .with_context(|| format!("Failed to parse MTL file: {}", path.display()))
}

/// Load a material library from a [`BufRead`] implementation.
pub fn load_mtl_from_reader<R: BufRead>(reader: R, options: ObjOptions) -> ParseResult<MtlLibrary> {
    let mut lexer = Lexer::obj(reader);
    let mut builder = MtlBuilder::default();

    while let Some(statement) = lexer.next_statement()? {
        recover(builder.dispatch(&statement), options)?;
    }

    let library = builder.finish();
    log::info!(
        "Loaded MTL: {} materials, {} textures",
        library.materials.len(),
        library.textures.len()
    );
    Ok(library)
}

/// Convenience helper to parse an MTL string literal.
pub fn load_mtl_from_str(contents: &str) -> ParseResult<MtlLibrary> {
    load_mtl_from_reader(Cursor::new(contents), ObjOptions::default())
}

/// Skip recoverable statement errors unless running strict.
fn recover(result: ParseResult<()>, options: ObjOptions) -> ParseResult<()> {
    match result {
        Err(err) if err.is_recoverable() && !options.strict => {
            log::warn!("Skipping statement: {err}");
            Ok(())
        }
        other => other,
    }
}

/// `call file [args...]`: push the named file onto the source stack.
fn include(
    sources: &mut SourceStack<'_>,
    resolver: &mut dyn IncludeResolver,
    statement: &Statement,
) -> ParseResult<()> {
    let args: Vec<String> = statement
        .args()
        .split_whitespace()
        .map(str::to_owned)
        .collect();
    let Some(name) = args.first() else {
        return Err(statement.malformed("missing file name"));
    };
    if sources.depth() > MAX_INCLUDE_DEPTH {
        return Err(statement.malformed(format!(
            "includes nested deeper than {MAX_INCLUDE_DEPTH}"
        )));
    }

    let reader = resolver.open(name).map_err(|e| {
        ParseError::Io(io::Error::new(
            e.kind(),
            format!("cannot open '{name}' (line {}): {e}", statement.line),
        ))
    })?;
    log::debug!("OBJ include '{name}' at depth {}", sources.depth());
    sources.push(reader, args);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// In-memory include table.
    #[derive(Default)]
    struct MemResolver {
        files: HashMap<&'static str, &'static str>,
    }

    impl IncludeResolver for MemResolver {
        fn open(&mut self, name: &str) -> io::Result<Box<dyn BufRead>> {
            match self.files.get(name) {
                Some(src) => Ok(Box::new(Cursor::new(*src))),
                None => Err(io::Error::new(io::ErrorKind::NotFound, name.to_owned())),
            }
        }
    }

    fn strict() -> ObjOptions {
        ObjOptions::new().with_strict(true)
    }

    const CUBE_FACE: &str = r#"
        # one quad with a material switch
        mtllib cube.mtl
        v 0 0 0
        v 1 0 0
        v 1 1 0
        v 0 1 0
        vt 0 0
        vt 1 0
        vt 1 1
        vt 0 1
        vn 0 0 1
        o front
        usemtl red
        f 1/1/1 2/2/1 3/3/1 4/4/1
    "#;

    #[test]
    fn parse_simple_quad() {
        init_logger();
        let model = load_obj_from_str(CUBE_FACE).expect("parse quad");
        assert_eq!(model.positions.len(), 4);
        assert_eq!(model.material_libraries, vec!["cube.mtl"]);
        assert_eq!(model.meshes.len(), 1);

        let mesh = model.meshes[0].triangulate(&model).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.is_valid());
    }

    #[test]
    fn continuation_joins_lines() {
        let model = load_obj_from_str("v 1 \\\n  2 3\nv 4 5 6 # trailing\n").unwrap();
        assert_eq!(model.positions.len(), 2);
        assert_eq!(model.positions[0].to_array(), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn lenient_mode_skips_unsupported_and_unknown() {
        init_logger();
        let src = "v 0 0 0\ncstype bezier\nfrobnicate\nv 1 0 0\n";
        let model = load_obj_from_str(src).unwrap();
        assert_eq!(model.positions.len(), 2);

        let err = load_obj_from_reader(Cursor::new(src), &mut NoIncludes, strict()).unwrap_err();
        assert!(matches!(err, ParseError::Unsupported { line: 2, .. }));
    }

    #[test]
    fn fatal_errors_abort_even_when_lenient() {
        let err = load_obj_from_str("v 0 0 0\nf 1 2 3\n").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { line: 2, .. }));
    }

    #[test]
    fn call_substitutes_arguments() {
        let mut resolver = MemResolver::default();
        resolver
            .files
            .insert("tri.obj", "v 0 0 $1\nv 1 0 $1\nv 0 1 $1\nusemtl $2\nf -3 -2 -1\n");
        let src = "call tri.obj 5 steel\ncall tri.obj 7 brass\n";
        let model = load_obj_from_reader(Cursor::new(src), &mut resolver, strict()).unwrap();

        assert_eq!(model.positions.len(), 6);
        assert_eq!(model.positions[0].z, 5.0);
        assert_eq!(model.positions[5].z, 7.0);
        assert_eq!(model.meshes.len(), 2);
        assert_eq!(model.meshes[0].material.as_deref(), Some("steel"));
        assert_eq!(model.meshes[1].material.as_deref(), Some("brass"));
        let second: Vec<usize> = model.meshes[1].faces[0].iter().map(|c| c.position).collect();
        assert_eq!(second, vec![3, 4, 5]);
    }

    #[test]
    fn call_with_missing_argument_is_malformed() {
        let mut resolver = MemResolver::default();
        resolver.files.insert("part.obj", "v $1 $2 0\n");
        let err = load_obj_from_reader(Cursor::new("call part.obj 1\n"), &mut resolver, strict())
            .unwrap_err();
        assert!(matches!(err, ParseError::Malformed { line: 1, .. }));
    }

    #[test]
    fn call_failures() {
        let err = load_obj_from_str("call missing.obj\n").unwrap_err();
        assert!(matches!(err, ParseError::Io(_)));

        let mut resolver = MemResolver::default();
        resolver.files.insert("loop.obj", "call loop.obj\n");
        let err = load_obj_from_reader(Cursor::new("call loop.obj\n"), &mut resolver, strict())
            .unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn path_loader_calls_sibling_files() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("corner.obj"),
            "v 0 0 $1\nv 1 0 $1\nv 0 1 $1\nf -3 -2 -1\n",
        )
        .unwrap();
        let parent = dir.path().join("scene.obj");
        std::fs::write(&parent, "mtllib scene.mtl\ncall corner.obj 2\n").unwrap();

        let model = load_obj_from_path(&parent, strict()).unwrap();
        assert_eq!(model.material_libraries, vec!["scene.mtl"]);
        assert_eq!(model.positions.len(), 3);
        assert_eq!(model.positions[2].z, 2.0);
        assert_eq!(model.num_faces(), 1);
    }

    #[test]
    fn path_loaders_name_the_file_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.obj");
        let err = load_obj_from_path(&missing, ObjOptions::default()).unwrap_err();
        assert!(err.to_string().contains(&missing.display().to_string()), "{err:#}");

        let bad = dir.path().join("bad.mtl");
        std::fs::write(&bad, "Kd 1 1 1\n").unwrap();
        let err = load_mtl_from_path(&bad, ObjOptions::default()).unwrap_err();
        assert!(err.to_string().contains(&bad.display().to_string()), "{err:#}");
        assert!(matches!(
            err.downcast_ref::<ParseError>(),
            Some(ParseError::Malformed { line: 1, .. })
        ));

        let good = dir.path().join("good.mtl");
        std::fs::write(&good, "newmtl a\nNs 8\n").unwrap();
        let lib = load_mtl_from_path(&good, ObjOptions::default()).unwrap();
        assert_eq!(lib.get("a").unwrap().shininess, 8.0);
    }

    #[test]
    fn fs_resolver_opens_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("part.obj"), "v 1 2 3\n").unwrap();
        let mut resolver = FsResolver::new(dir.path());
        let mut line = String::new();
        resolver.open("part.obj").unwrap().read_line(&mut line).unwrap();
        assert_eq!(line.trim(), "v 1 2 3");
        assert!(resolver.open("absent.obj").is_err());
    }

    #[test]
    fn mtl_lenient_and_strict() {
        init_logger();
        let src = "newmtl a\nKd 1 0 0\nrefl -type sphere sky.png\nmap_Kd a.png\n";
        let lib = load_mtl_from_str(src).unwrap();
        assert_eq!(lib.get("a").unwrap().textures.diffuse.as_deref(), Some("a.png"));

        let err = load_mtl_from_reader(Cursor::new(src), strict()).unwrap_err();
        assert!(matches!(err, ParseError::Unsupported { line: 3, .. }));
    }
}
