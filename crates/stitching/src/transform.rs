//! Reversible rewrites between the logical schema and a subschema's native shape.
//!
//! Schema and request steps run in registration order. Result steps run in reverse
//! registration order, so each step undoes its rewrite after every later step has undone
//! theirs.

mod add_arguments;
mod add_selection_set;
mod filter_to_schema;
mod rename_types;
mod wrap_root_field;

use graphql_stitching_schema::{MergedSchema, SchemaDefinition};

pub use add_arguments::AddArgumentsAsVariables;
pub use add_selection_set::AddSelectionSet;
pub use filter_to_schema::FilterToSchema;
pub use rename_types::RenameTypes;
pub use wrap_root_field::WrapRootField;

use crate::delegate::{DelegatedRequest, DelegatedResult};

bitflags::bitflags! {
    /// What a transform step rewrites.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const SCHEMA = 1 << 0;
        const REQUEST = 1 << 1;
        const RESULT = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct TransformError(pub String);

/// What request steps can see besides the request itself.
#[derive(Clone, Copy)]
pub struct TransformContext<'a> {
    pub merged: &'a MergedSchema,
}

/// Per-request memory of a step, handed back to it when the result comes in.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum StepState {
    #[default]
    None,
    WrappedRoot {
        response_keys: Vec<String>,
        /// The wrapper was selected under several response keys, and the fields of each were
        /// aliased `{response_key}__{field}` to keep them apart.
        prefixed: bool,
    },
}

/// The shared interface of all transform steps. A step only implements the methods matching
/// its [Capabilities].
pub(crate) trait TransformStep {
    fn capabilities(&self) -> Capabilities;

    fn transform_schema(&mut self, schema: SchemaDefinition) -> Result<SchemaDefinition, TransformError> {
        Ok(schema)
    }

    fn transform_request(&self, request: &mut DelegatedRequest, context: TransformContext<'_>) -> StepState {
        let _ = (request, context);
        StepState::None
    }

    fn transform_result(&self, result: &mut DelegatedResult, state: &StepState) {
        let _ = (result, state);
    }
}

/// The closed set of transform steps.
pub enum Transform {
    RenameTypes(RenameTypes),
    FilterToSchema(FilterToSchema),
    WrapRootField(WrapRootField),
    AddSelectionSet(AddSelectionSet),
    AddArgumentsAsVariables(AddArgumentsAsVariables),
}

impl Transform {
    pub fn capabilities(&self) -> Capabilities {
        self.step().capabilities()
    }

    fn step(&self) -> &dyn TransformStep {
        match self {
            Transform::RenameTypes(step) => step,
            Transform::FilterToSchema(step) => step,
            Transform::WrapRootField(step) => step,
            Transform::AddSelectionSet(step) => step,
            Transform::AddArgumentsAsVariables(step) => step,
        }
    }

    fn step_mut(&mut self) -> &mut dyn TransformStep {
        match self {
            Transform::RenameTypes(step) => step,
            Transform::FilterToSchema(step) => step,
            Transform::WrapRootField(step) => step,
            Transform::AddSelectionSet(step) => step,
            Transform::AddArgumentsAsVariables(step) => step,
        }
    }
}

impl From<RenameTypes> for Transform {
    fn from(step: RenameTypes) -> Self {
        Transform::RenameTypes(step)
    }
}

impl From<FilterToSchema> for Transform {
    fn from(step: FilterToSchema) -> Self {
        Transform::FilterToSchema(step)
    }
}

impl From<WrapRootField> for Transform {
    fn from(step: WrapRootField) -> Self {
        Transform::WrapRootField(step)
    }
}

impl From<AddSelectionSet> for Transform {
    fn from(step: AddSelectionSet) -> Self {
        Transform::AddSelectionSet(step)
    }
}

impl From<AddArgumentsAsVariables> for Transform {
    fn from(step: AddArgumentsAsVariables) -> Self {
        Transform::AddArgumentsAsVariables(step)
    }
}

impl std::fmt::Debug for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Transform::RenameTypes(_) => "RenameTypes",
            Transform::FilterToSchema(_) => "FilterToSchema",
            Transform::WrapRootField(_) => "WrapRootField",
            Transform::AddSelectionSet(_) => "AddSelectionSet",
            Transform::AddArgumentsAsVariables(_) => "AddArgumentsAsVariables",
        };
        f.debug_tuple(name).finish_non_exhaustive()
    }
}

/// State of every step for one request, aligned with the pipeline's steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestState(Vec<StepState>);

#[derive(Debug, Default)]
pub struct TransformPipeline {
    steps: Vec<Transform>,
}

impl TransformPipeline {
    pub fn new(steps: impl IntoIterator<Item = Transform>) -> Self {
        TransformPipeline {
            steps: steps.into_iter().collect(),
        }
    }

    pub fn push(&mut self, step: impl Into<Transform>) {
        self.steps.push(step.into());
    }

    pub fn insert(&mut self, index: usize, step: impl Into<Transform>) {
        self.steps.insert(index, step.into());
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.steps
            .iter()
            .fold(Capabilities::empty(), |capabilities, step| capabilities | step.capabilities())
    }

    /// Native to logical, in registration order.
    pub fn transform_schema(&mut self, schema: SchemaDefinition) -> Result<SchemaDefinition, TransformError> {
        self.steps
            .iter_mut()
            .filter(|step| step.capabilities().contains(Capabilities::SCHEMA))
            .try_fold(schema, |schema, step| step.step_mut().transform_schema(schema))
    }

    /// Logical to native, in registration order.
    pub fn transform_request(&self, request: &mut DelegatedRequest, context: TransformContext<'_>) -> RequestState {
        RequestState(
            self.steps
                .iter()
                .map(|step| {
                    if step.capabilities().contains(Capabilities::REQUEST) {
                        step.step().transform_request(request, context)
                    } else {
                        StepState::None
                    }
                })
                .collect(),
        )
    }

    /// Native to logical, in reverse registration order.
    pub fn transform_result(&self, result: &mut DelegatedResult, state: &RequestState) {
        for (index, step) in self.steps.iter().enumerate().rev() {
            if step.capabilities().contains(Capabilities::RESULT) {
                let step_state = state.0.get(index).cloned().unwrap_or_default();
                step.step().transform_result(result, &step_state);
            }
        }
    }
}
