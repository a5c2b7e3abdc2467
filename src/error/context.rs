use std::sync::Arc;

use ariadne::Source;

use crate::{
    common::sources::SourceMap,
    error::{
        InternalError,
        diagnostic::{Diagnostic, DiagnosticRenderer, Severity},
    },
};

/// Represents context of compilation.
#[derive(Debug)]
pub struct Context {
    renderer: Box<dyn DiagnosticRenderer>,
    diagnostics: Vec<Diagnostic>,
    sources: SourceMap,
}

impl Context {
    /// Create a new context.
    pub fn init(renderer: Box<dyn DiagnosticRenderer>) -> Self {
        Self {
            renderer,
            diagnostics: vec![],
            sources: SourceMap::new(),
        }
    }

    /// Print all diagnostic using provided renderer and destroy context.
    ///
    /// Returns the number of errors that were reported.
    pub fn finish(self) -> Result<usize, InternalError> {
        let errors = self.error_count();
        for diag in self.diagnostics {
            self.renderer
                .show(diag, &self.sources)
                .map_err(|_| InternalError::AnyMsg("Failed to show diagnostic".into()))?
        }
        Ok(errors)
    }

    /// Add a diagnostic to this context.
    pub fn report(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Add source.
    pub fn add_source(&mut self, filename: Arc<str>, source: String) {
        self.sources.add(filename, source);
    }

    /// Get source associated with given filename.
    pub fn get_source(&self, filename: &Arc<str>) -> Option<&Source> {
        self.sources.get(filename)
    }
}
