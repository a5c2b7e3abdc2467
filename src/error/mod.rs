use std::fmt::Display;

use colored::Colorize;

use crate::{
    common::Position,
    error::diagnostic::{Diagnostic, Label},
};

pub mod ariadne_renderer;
pub mod context;
pub mod diagnostic;

/// Failures of the driver or native backend; never caused by user input.
#[derive(Debug, thiserror::Error)]
pub enum InternalError {
    #[error("{0}")]
    AnyMsg(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codegen error: {0}")]
    Codegen(String),

    #[error("codegen error: {0}")]
    Module(#[from] cranelift_module::ModuleError),

    #[error("generated glue `{name}` is malformed: {reason}")]
    MalformedGlue { name: String, reason: String },
}

/// Malformed input documents.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParsingError {
    #[error("invalid input document: {message}")]
    InvalidDocument { message: String, pos: Position },
}

impl From<ParsingError> for Diagnostic {
    fn from(value: ParsingError) -> Self {
        let message = value.to_string();
        match value {
            ParsingError::InvalidDocument { pos, .. } => Diagnostic::error(&pos, message)
                .with_label(Label::new(&pos).with_msg("here".into())),
        }
    }
}

/// Why a type cannot travel across the host boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryIssue {
    DiscriminantTooWide { width: u32, max: u32 },
    UnalignedDiscriminant { offset: u32, width: u32 },
    OverAligned { align: u32, max: u32 },
    UnsupportedScalar(String),
}

impl Display for BoundaryIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundaryIssue::DiscriminantTooWide { width, max } => write!(
                f,
                "its {width}-byte discriminant is wider than the host's {max}-byte limit"
            ),
            BoundaryIssue::UnalignedDiscriminant { offset, width } => write!(
                f,
                "its {width}-byte discriminant sits at unaligned offset {offset}"
            ),
            BoundaryIssue::OverAligned { align, max } => write!(
                f,
                "its alignment of {align} bytes exceeds the host maximum of {max}"
            ),
            BoundaryIssue::UnsupportedScalar(name) => {
                write!(f, "`{name}` has no host calling-convention representation")
            }
        }
    }
}

/// Errors raised while computing layouts, generating glue or planning
/// boundary crossings. All are detected at compile time.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LayoutError {
    #[error("field {field} of `{ty}::{variant}` has type `{field_ty}` whose size is not yet known")]
    UnresolvedFieldType {
        ty: String,
        variant: String,
        field: usize,
        field_ty: String,
        pos: Position,
    },

    #[error("`{ty}` cannot cross the host boundary at `{entry}`: {issue}")]
    UnsupportedBoundaryType {
        ty: String,
        entry: String,
        issue: BoundaryIssue,
        pos: Position,
    },

    #[error("`{ty}` contains itself without indirection")]
    RecursiveLayoutUnsupported { ty: String, pos: Position },

    #[error("variant `{variant}` is declared more than once in `{ty}`")]
    DuplicateVariant {
        ty: String,
        variant: String,
        pos: Position,
        first: Position,
    },

    #[error("type `{ty}` is declared more than once")]
    DuplicateType {
        ty: String,
        pos: Position,
        first: Position,
    },

    #[error("unknown type `{name}`")]
    UnknownType { name: String, pos: Position },

    #[error("`{ty}` is too large to lay out")]
    LayoutTooLarge { ty: String, pos: Position },
}

impl LayoutError {
    pub fn pos(&self) -> &Position {
        match self {
            LayoutError::UnresolvedFieldType { pos, .. }
            | LayoutError::UnsupportedBoundaryType { pos, .. }
            | LayoutError::RecursiveLayoutUnsupported { pos, .. }
            | LayoutError::DuplicateVariant { pos, .. }
            | LayoutError::DuplicateType { pos, .. }
            | LayoutError::UnknownType { pos, .. }
            | LayoutError::LayoutTooLarge { pos, .. } => pos,
        }
    }
}

impl From<LayoutError> for Diagnostic {
    fn from(value: LayoutError) -> Self {
        let message = value.to_string();
        match value {
            LayoutError::UnresolvedFieldType { pos, field_ty, .. } => {
                Diagnostic::error(&pos, message)
                    .with_label(
                        Label::new(&pos).with_msg(format!("`{}` is unresolved", field_ty.bright_red())),
                    )
                    .with_note("resolve the field's type before requesting this layout".into())
            }
            LayoutError::UnsupportedBoundaryType { pos, ty, .. } => Diagnostic::error(&pos, message)
                .with_label(Label::new(&pos).with_msg(format!("`{ty}` crosses the host boundary here"))),
            LayoutError::RecursiveLayoutUnsupported { pos, .. } => Diagnostic::error(&pos, message)
                .with_label(Label::new(&pos).with_msg("recursive type".into()))
                .with_note("store the recursive field behind a pointer".into()),
            LayoutError::DuplicateVariant { pos, first, .. } => Diagnostic::error(&pos, message)
                .with_label(Label::new(&pos).with_msg("declared again here".into()))
                .with_label(
                    Label::new(&first)
                        .with_msg("first declared here".into())
                        .with_color(colored::Color::Blue),
                ),
            LayoutError::DuplicateType { pos, first, .. } => Diagnostic::error(&pos, message)
                .with_label(Label::new(&pos).with_msg("declared again here".into()))
                .with_label(
                    Label::new(&first)
                        .with_msg("first declared here".into())
                        .with_color(colored::Color::Blue),
                ),
            LayoutError::UnknownType { pos, .. } => Diagnostic::error(&pos, message)
                .with_label(Label::new(&pos).with_msg("not a declared sum type".into())),
            LayoutError::LayoutTooLarge { pos, .. } => Diagnostic::error(&pos, message)
                .with_label(Label::new(&pos).with_msg("size overflows 32 bits here".into()))
                .with_note("sizes and offsets are limited to 4 GiB".into()),
        }
    }
}
