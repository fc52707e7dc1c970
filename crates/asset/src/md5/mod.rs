//! id Tech 4 MD5 skeletal meshes (`.md5mesh`) and animations (`.md5anim`).
//!
//! Both formats are line oriented: keyword headers, `{ }` blocks and `//`
//! comments. Blocks are located with [`seek_to`](crate::seek::seek_to) and
//! their contents read positionally, so fields must appear in the canonical
//! order. Every load is all-or-nothing.

use std::io::BufRead;

use meshcore::{ParseError, ParseResult};

use crate::fields::Fields;
use crate::lexer::Lexer;
use crate::seek::seek_to;

pub mod anim;
pub mod mesh;
mod skin;

pub use anim::{
    Bounds, Frame, HierarchyJoint, JointPose, Md5Anim, PartialPose, load_md5_anim_from_path,
    load_md5_anim_from_reader, load_md5_anim_from_str,
};
pub use mesh::{
    Joint, Md5Mesh, SubMesh, Vertex, Weight, load_md5_mesh_from_path, load_md5_mesh_from_reader,
    load_md5_mesh_from_str,
};

/// The only MD5 revision understood here.
pub const MD5_VERSION: i32 = 10;

/// `MD5Version` plus the optional `commandline` that follows it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Header {
    pub version: i32,
    pub commandline: Option<String>,
}

pub(crate) fn parse_header<R: BufRead>(lexer: &mut Lexer<R>) -> ParseResult<Header> {
    let statement = seek_to(lexer, "MD5Version")?;
    let mut fields = statement.fields();
    fields.literal("MD5Version")?;
    let version: i32 = fields.parse("version")?;
    fields.finish()?;

    if version != MD5_VERSION {
        return Err(ParseError::VersionMismatch {
            expected: MD5_VERSION,
            found: version,
        });
    }

    let mut commandline = None;
    if lexer.peek()?.is_some_and(|st| st.keyword() == "commandline") {
        if let Some(statement) = lexer.next_statement()? {
            let mut fields = statement.fields();
            fields.literal("commandline")?;
            commandline = Some(fields.name("commandline")?);
            fields.finish()?;
        }
    }

    Ok(Header {
        version,
        commandline,
    })
}

/// Parent index of joint `index`: `-1` is a root, anything else must point
/// at an earlier joint.
pub(crate) fn parse_parent(fields: &mut Fields<'_>, index: usize) -> ParseResult<Option<usize>> {
    let parent: i64 = fields.parse("parent index")?;
    match parent {
        -1 => Ok(None),
        p if p >= 0 && (p as usize) < index => Ok(Some(p as usize)),
        p => Err(ParseError::malformed(
            fields.line(),
            format!("parent {p} of joint {index} must be -1 or an earlier joint"),
        )),
    }
}
