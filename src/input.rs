//! Reading the resolved type and entry-point document.
//!
//! The upstream resolver hands over a JSON document:
//!
//! ```json
//! {
//!   "types": [
//!     { "name": "Value", "variants": [
//!       { "name": "Foo", "fields": [{ "prim": "str" }] },
//!       { "name": "Baz" }
//!     ] }
//!   ],
//!   "entry_points": [
//!     { "name": "make", "direction": "export", "params": [], "ret": { "sum": "Value" } }
//!   ]
//! }
//! ```

use std::{fs::read_to_string, path::Path, sync::Arc};

use serde::Deserialize;

use crate::{
    boundary::{BoundaryType, Direction, EntryPoint},
    common::{Ident, Position, PositionGenerator},
    error::{InternalError, ParsingError, context::Context},
    types::{FieldType, SumType, TypeEnv, Variant},
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Document {
    #[serde(default)]
    types: Vec<TypeDecl>,
    #[serde(default)]
    entry_points: Vec<EntryDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeDecl {
    name: String,
    #[serde(default)]
    variants: Vec<VariantDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VariantDecl {
    name: String,
    #[serde(default)]
    fields: Vec<FieldType>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntryDecl {
    name: String,
    direction: Direction,
    #[serde(default)]
    params: Vec<BoundaryType>,
    #[serde(default)]
    ret: Option<BoundaryType>,
}

/// Everything one compilation run works on.
#[derive(Debug, Default)]
pub struct Program {
    pub env: TypeEnv,
    pub entry_points: Vec<EntryPoint>,
}

/// Read and parse the document at `path`.
///
/// Returns `None` if the document could not be decoded; the reason has been
/// reported to `ctx`.
pub fn parse_file(ctx: &mut Context, path: &Path) -> Result<Option<Program>, InternalError> {
    let source = read_to_string(path)?;
    let filename: Arc<str> = path
        .to_str()
        .ok_or(InternalError::AnyMsg(
            "can't parse filename into str".into(),
        ))?
        .into();
    Ok(parse_source(ctx, filename, source))
}

pub fn parse_source(ctx: &mut Context, filename: Arc<str>, source: String) -> Option<Program> {
    let pg = Position::generator(filename.clone());
    let doc = serde_json::from_str::<Document>(&source);
    ctx.add_source(filename, source.clone());

    let doc = match doc {
        Ok(doc) => doc,
        Err(e) => {
            let pos = pg.line_col(&source, e.line(), e.column());
            ctx.report(
                ParsingError::InvalidDocument {
                    message: e.to_string(),
                    pos,
                }
                .into(),
            );
            return None;
        }
    };

    let mut prog = Program::default();

    let mut names = Cursor::new(&pg, &source, "types");
    for decl in doc.types {
        let name = names.ident(decl.name);
        let variants = decl
            .variants
            .into_iter()
            .map(|v| Variant::new(names.ident(v.name), v.fields))
            .collect();
        let inserted = SumType::new(name, variants).and_then(|ty| prog.env.insert(ty));
        if let Err(err) = inserted {
            ctx.report(err.into());
        }
    }

    let mut names = Cursor::new(&pg, &source, "entry_points");
    prog.entry_points = doc
        .entry_points
        .into_iter()
        .map(|e| EntryPoint {
            name: names.ident(e.name),
            direction: e.direction,
            params: e.params,
            ret: e.ret,
        })
        .collect();

    Some(prog)
}

/// Finds declaration names in document order.
struct Cursor<'a> {
    pg: &'a PositionGenerator,
    source: &'a str,
    at: usize,
}

impl<'a> Cursor<'a> {
    fn new(pg: &'a PositionGenerator, source: &'a str, section: &str) -> Self {
        let at = pg.literal(source, section, 0).end;
        Self { pg, source, at }
    }

    fn ident(&mut self, name: String) -> Ident {
        let pos = self.pg.literal(self.source, &name, self.at);
        if pos.end > self.at {
            self.at = pos.end;
        }
        Ident::new(name, pos)
    }
}
