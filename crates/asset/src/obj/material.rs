//! Wavefront material libraries (`.mtl`).

use std::{
    collections::{BTreeSet, HashMap},
    sync::LazyLock,
};

use corelib::{Vec3, vec3};
use meshcore::{ParseError, ParseResult};

use crate::lexer::Statement;

use super::model::{arguments, unknown, unsupported};

/// Texture file names referenced by one material.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MaterialTextures {
    pub ambient: Option<String>,
    pub diffuse: Option<String>,
    pub specular: Option<String>,
    pub shininess: Option<String>,
    pub alpha: Option<String>,
    pub bump: Option<String>,
    pub displacement: Option<String>,
    pub decal: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    /// `d` / `Tr`.
    pub alpha: f32,
    /// `d -halo`.
    pub halo: f32,
    /// `Ns`.
    pub shininess: f32,
    /// `Ni` optical density.
    pub density: Option<f32>,
    pub illum: u32,
    pub sharpness: u32,
    /// `r`.
    pub reflectivity: f32,
    /// `map_aat on|off`.
    pub anti_alias: bool,
    pub textures: MaterialTextures,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ambient: Vec3::splat(0.2),
            diffuse: Vec3::splat(0.8),
            specular: Vec3::ONE,
            alpha: 1.0,
            halo: 1.0,
            shininess: 0.0,
            density: None,
            illum: 1,
            sharpness: 60,
            reflectivity: 0.0,
            anti_alias: false,
            textures: MaterialTextures::default(),
        }
    }
}

/// Materials in declaration order plus every texture file they mention.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MtlLibrary {
    pub materials: Vec<Material>,
    pub textures: BTreeSet<String>,
}

impl MtlLibrary {
    /// Look up a material by name; a redefinition shadows earlier ones.
    pub fn get(&self, name: &str) -> Option<&Material> {
        self.materials.iter().rev().find(|m| m.name == name)
    }
}

type Handler = fn(&mut MtlBuilder, &Statement) -> ParseResult<()>;

const HANDLERS: &[(&str, Handler)] = &[
    ("newmtl", MtlBuilder::new_material),
    ("Ka", MtlBuilder::ambient),
    ("Kd", MtlBuilder::diffuse),
    ("Ks", MtlBuilder::specular),
    ("d", MtlBuilder::dissolve),
    ("Tr", MtlBuilder::dissolve),
    ("Ns", MtlBuilder::shininess),
    ("Ni", MtlBuilder::density),
    ("illum", MtlBuilder::illum),
    ("sharpness", MtlBuilder::sharpness),
    ("r", MtlBuilder::reflectivity),
    ("map_aat", MtlBuilder::anti_alias),
    ("map_Ka", MtlBuilder::map_ambient),
    ("map_Kd", MtlBuilder::map_diffuse),
    ("map_Ks", MtlBuilder::map_specular),
    ("map_Ns", MtlBuilder::map_shininess),
    ("map_d", MtlBuilder::map_alpha),
    ("bump", MtlBuilder::map_bump),
    ("disp", MtlBuilder::map_displacement),
    ("decal", MtlBuilder::map_decal),
    ("refl", unsupported::<MtlBuilder>),
];

static DISPATCH: LazyLock<HashMap<&'static str, Handler>> =
    LazyLock::new(|| HANDLERS.iter().copied().collect());

#[derive(Debug, Default)]
pub(crate) struct MtlBuilder {
    library: MtlLibrary,
}

impl MtlBuilder {
    pub fn dispatch(&mut self, statement: &Statement) -> ParseResult<()> {
        match DISPATCH.get(statement.keyword()) {
            Some(handler) => handler(self, statement),
            None => Err(unknown(statement)),
        }
    }

    pub fn finish(self) -> MtlLibrary {
        self.library
    }

    fn current(&mut self, statement: &Statement) -> ParseResult<&mut Material> {
        self.library.materials.last_mut().ok_or_else(|| {
            statement.malformed(format!("'{}' before any newmtl", statement.keyword()))
        })
    }

    fn new_material(&mut self, statement: &Statement) -> ParseResult<()> {
        let name = statement.args();
        if name.is_empty() {
            return Err(statement.malformed("missing material name"));
        }
        log::debug!("MTL material '{name}' on line {}", statement.line);
        self.library.materials.push(Material::new(name));
        Ok(())
    }

    fn ambient(&mut self, statement: &Statement) -> ParseResult<()> {
        let color = color(statement)?;
        self.current(statement)?.ambient = color;
        Ok(())
    }

    fn diffuse(&mut self, statement: &Statement) -> ParseResult<()> {
        let color = color(statement)?;
        self.current(statement)?.diffuse = color;
        Ok(())
    }

    fn specular(&mut self, statement: &Statement) -> ParseResult<()> {
        let color = color(statement)?;
        self.current(statement)?.specular = color;
        Ok(())
    }

    /// `d alpha` or `d -halo factor`.
    fn dissolve(&mut self, statement: &Statement) -> ParseResult<()> {
        let mut fields = arguments(statement);
        let halo = fields.optional_literal("-halo");
        let value = fields.f32("dissolve")?;
        fields.finish()?;
        let material = self.current(statement)?;
        if halo {
            material.halo = value;
        } else {
            material.alpha = value;
        }
        Ok(())
    }

    fn shininess(&mut self, statement: &Statement) -> ParseResult<()> {
        let value = single(statement, "shininess")?;
        self.current(statement)?.shininess = value;
        Ok(())
    }

    fn density(&mut self, statement: &Statement) -> ParseResult<()> {
        let value = single(statement, "optical density")?;
        self.current(statement)?.density = Some(value);
        Ok(())
    }

    fn illum(&mut self, statement: &Statement) -> ParseResult<()> {
        let value = single(statement, "illumination model")?;
        self.current(statement)?.illum = value;
        Ok(())
    }

    fn sharpness(&mut self, statement: &Statement) -> ParseResult<()> {
        let value = single(statement, "sharpness")?;
        self.current(statement)?.sharpness = value;
        Ok(())
    }

    fn reflectivity(&mut self, statement: &Statement) -> ParseResult<()> {
        let value = single(statement, "reflectivity")?;
        self.current(statement)?.reflectivity = value;
        Ok(())
    }

    fn anti_alias(&mut self, statement: &Statement) -> ParseResult<()> {
        let mut fields = arguments(statement);
        let enabled = match fields.token("on/off")? {
            "on" => true,
            "off" => false,
            other => {
                return Err(statement.malformed(format!("expected on or off, found '{other}'")));
            }
        };
        fields.finish()?;
        self.current(statement)?.anti_alias = enabled;
        Ok(())
    }

    fn map_ambient(&mut self, statement: &Statement) -> ParseResult<()> {
        self.texture(statement, |t| &mut t.ambient)
    }

    fn map_diffuse(&mut self, statement: &Statement) -> ParseResult<()> {
        self.texture(statement, |t| &mut t.diffuse)
    }

    fn map_specular(&mut self, statement: &Statement) -> ParseResult<()> {
        self.texture(statement, |t| &mut t.specular)
    }

    fn map_shininess(&mut self, statement: &Statement) -> ParseResult<()> {
        self.texture(statement, |t| &mut t.shininess)
    }

    fn map_alpha(&mut self, statement: &Statement) -> ParseResult<()> {
        self.texture(statement, |t| &mut t.alpha)
    }

    fn map_bump(&mut self, statement: &Statement) -> ParseResult<()> {
        self.texture(statement, |t| &mut t.bump)
    }

    fn map_displacement(&mut self, statement: &Statement) -> ParseResult<()> {
        self.texture(statement, |t| &mut t.displacement)
    }

    fn map_decal(&mut self, statement: &Statement) -> ParseResult<()> {
        self.texture(statement, |t| &mut t.decal)
    }

    /// Texture options are skipped; the last token is the file name.
    fn texture(
        &mut self,
        statement: &Statement,
        slot: fn(&mut MaterialTextures) -> &mut Option<String>,
    ) -> ParseResult<()> {
        let Some(file) = statement.args().split_whitespace().last() else {
            return Err(statement.malformed("missing texture file name"));
        };
        let file = file.to_owned();
        *slot(&mut self.current(statement)?.textures) = Some(file.clone());
        self.library.textures.insert(file);
        Ok(())
    }
}

/// `r [g b]`; a lone value is used for all three channels. The `spectral`
/// and `xyz` forms are not implemented.
fn color(statement: &Statement) -> ParseResult<Vec3> {
    let mut fields = arguments(statement);
    let mut lookahead = fields;
    if matches!(lookahead.next_token(), Some("spectral" | "xyz")) {
        return Err(ParseError::Unsupported {
            line: statement.line,
            keyword: statement.keyword().to_owned(),
        });
    }

    let r = fields.f32("red")?;
    if fields.remaining().is_empty() {
        return Ok(Vec3::splat(r));
    }
    let g = fields.f32("green")?;
    let b = fields.f32("blue")?;
    fields.finish()?;
    Ok(vec3(r, g, b))
}

fn single<T>(statement: &Statement, what: &str) -> ParseResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let mut fields = arguments(statement);
    let value = fields.parse(what)?;
    fields.finish()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(src: &str) -> ParseResult<MtlLibrary> {
        let mut builder = MtlBuilder::default();
        for (i, line) in src.lines().enumerate() {
            let line = line.trim();
            if !line.is_empty() {
                builder.dispatch(&Statement::new(i + 1, line))?;
            }
        }
        Ok(builder.finish())
    }

    #[test]
    fn new_material_has_defaults() {
        let lib = build("newmtl plain\n").unwrap();
        let m = lib.get("plain").unwrap();
        assert_eq!(m.ambient, Vec3::splat(0.2));
        assert_eq!(m.diffuse, Vec3::splat(0.8));
        assert_eq!(m.specular, Vec3::ONE);
        assert_eq!((m.alpha, m.halo, m.shininess), (1.0, 1.0, 0.0));
        assert_eq!((m.illum, m.sharpness), (1, 60));
        assert_eq!(m.reflectivity, 0.0);
        assert!(m.density.is_none());
        assert!(!m.anti_alias);
        assert_eq!(m.textures, MaterialTextures::default());
    }

    #[test]
    fn attributes_apply_to_latest_material() {
        let src = "newmtl red paint\nKa 0.1\nKd 1 0 0\nKs 0.5 0.5 0.5\nd 0.25\nTr -halo 0.75\n\
                   Ns 32\nNi 1.45\nillum 2\nsharpness 100\nr 0.3\nmap_aat on\n";
        let lib = build(src).unwrap();
        let m = lib.get("red paint").unwrap();
        assert_eq!(m.ambient, Vec3::splat(0.1));
        assert_eq!(m.diffuse, vec3(1.0, 0.0, 0.0));
        assert_eq!(m.specular, Vec3::splat(0.5));
        assert_eq!(m.alpha, 0.25);
        assert_eq!(m.halo, 0.75);
        assert_eq!(m.shininess, 32.0);
        assert_eq!(m.density, Some(1.45));
        assert_eq!((m.illum, m.sharpness), (2, 100));
        assert_eq!(m.reflectivity, 0.3);
        assert!(m.anti_alias);
    }

    #[test]
    fn texture_maps_take_last_token() {
        let src = "newmtl wood\nmap_Kd -o 0 0 0 -s 2 2 1 oak.png\nbump -bm 0.5 oak_n.png\nmap_d oak_a.png\n";
        let lib = build(src).unwrap();
        let t = &lib.get("wood").unwrap().textures;
        assert_eq!(t.diffuse.as_deref(), Some("oak.png"));
        assert_eq!(t.bump.as_deref(), Some("oak_n.png"));
        assert_eq!(t.alpha.as_deref(), Some("oak_a.png"));
        let all: Vec<&str> = lib.textures.iter().map(String::as_str).collect();
        assert_eq!(all, vec!["oak.png", "oak_a.png", "oak_n.png"]);
    }

    #[test]
    fn attribute_before_newmtl_is_malformed() {
        let err = build("Kd 1 1 1\n").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { line: 1, .. }));
    }

    #[test]
    fn refl_and_spectral_are_unsupported() {
        let err = build("newmtl m\nrefl -type sphere sky.png\n").unwrap_err();
        assert!(err.is_recoverable());
        let err = build("newmtl m\nKa spectral sun.rfl\n").unwrap_err();
        assert!(matches!(err, ParseError::Unsupported { line: 2, .. }));
        let err = build("newmtl m\nKe 1 1 1\n").unwrap_err();
        assert!(matches!(err, ParseError::Unknown { line: 2, .. }));
    }

    #[test]
    fn redefinition_shadows_earlier() {
        let lib = build("newmtl m\nNs 1\nnewmtl m\nNs 2\n").unwrap();
        assert_eq!(lib.materials.len(), 2);
        assert_eq!(lib.get("m").unwrap().shininess, 2.0);
    }
}
