use std::fmt;

use crate::{Diagnostics, MergedSchema};

/// The result of a [`merge()`](crate::merge()) invocation.
pub struct CompositionResult {
    pub(crate) merged_schema: Option<MergedSchema>,
    pub(crate) diagnostics: Diagnostics,
}

impl CompositionResult {
    /// Simplify the result data to a yes-no answer: did the merge succeed?
    ///
    /// `Ok()` contains the [MergedSchema].
    /// `Err()` contains all [Diagnostics].
    pub fn into_result(self) -> Result<MergedSchema, ConflictError> {
        match self.merged_schema {
            Some(merged_schema) => Ok(merged_schema),
            None => Err(ConflictError {
                diagnostics: self.diagnostics,
            }),
        }
    }

    /// Merge warnings and errors.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

/// Subschemas could not be merged into one consistent type system.
#[derive(Debug, thiserror::Error)]
pub struct ConflictError {
    diagnostics: Diagnostics,
}

impl ConflictError {
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

impl fmt::Display for ConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Could not merge the subschemas:")?;
        for message in self.diagnostics.iter_errors() {
            write!(f, "\n- {message}")?;
        }
        Ok(())
    }
}
