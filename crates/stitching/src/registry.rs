use std::{sync::Arc, time::Duration};

use graphql_stitching_schema::{
    MergeOptions, MergeTypeConfig, MergedSchema, SchemaDefinition, SubschemaId, SubschemaSource, merge,
};
use indexmap::IndexMap;
use stitching_runtime::{Executor, ExecutorHandle};

use crate::{
    config::StitchingConfig,
    error::BuildError,
    transform::{AddArgumentsAsVariables, AddSelectionSet, FilterToSchema, Transform, TransformPipeline},
};

/// Everything needed to register one subschema.
pub struct SubschemaConfig {
    name: String,
    schema: SchemaDefinition,
    executor: ExecutorHandle,
    batch: bool,
    merge: IndexMap<String, MergeTypeConfig>,
    transforms: Vec<Transform>,
    timeout: Option<Duration>,
}

impl SubschemaConfig {
    pub fn new(name: impl Into<String>, schema: SchemaDefinition, executor: impl Executor + 'static) -> Self {
        SubschemaConfig::with_handle(name, schema, ExecutorHandle::new(executor))
    }

    pub fn with_handle(name: impl Into<String>, schema: SchemaDefinition, executor: ExecutorHandle) -> Self {
        SubschemaConfig {
            name: name.into(),
            schema,
            executor,
            batch: true,
            merge: IndexMap::new(),
            transforms: Vec::new(),
            timeout: None,
        }
    }

    pub fn from_sdl(name: impl Into<String>, sdl: &str, executor: impl Executor + 'static) -> Result<Self, BuildError> {
        let name = name.into();
        let schema = SchemaDefinition::from_sdl(sdl).map_err(|source| BuildError::Schema {
            subschema: name.clone(),
            source,
        })?;
        Ok(SubschemaConfig::new(name, schema, executor))
    }

    /// Whether delegations to this subschema may be coalesced. Defaults to `true`.
    #[must_use]
    pub fn batch(mut self, batch: bool) -> Self {
        self.batch = batch;
        self
    }

    /// `type_name` is the name of the type in the logical schema.
    #[must_use]
    pub fn merge(mut self, type_name: impl Into<String>, config: MergeTypeConfig) -> Self {
        self.merge.insert(type_name.into(), config);
        self
    }

    #[must_use]
    pub fn transform(mut self, transform: impl Into<Transform>) -> Self {
        self.transforms.push(transform.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A registered subschema. Immutable once the registry is built.
pub struct Subschema {
    id: SubschemaId,
    name: Arc<str>,
    executor: ExecutorHandle,
    batchable: bool,
    merge: IndexMap<String, MergeTypeConfig>,
    pipeline: TransformPipeline,
}

impl Subschema {
    pub fn id(&self) -> SubschemaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn executor(&self) -> &ExecutorHandle {
        &self.executor
    }

    pub fn is_batchable(&self) -> bool {
        self.batchable
    }

    pub fn merge_config(&self, type_name: &str) -> Option<&MergeTypeConfig> {
        self.merge.get(type_name)
    }

    /// Built-in steps first, then the registered transforms, then the filter to the native
    /// schema.
    pub fn pipeline(&self) -> &TransformPipeline {
        &self.pipeline
    }
}

/// The subschemas and the logical schema merged from them.
pub struct Registry {
    subschemas: Vec<Arc<Subschema>>,
    merged: MergedSchema,
}

impl Registry {
    #[tracing::instrument(name = "build_registry", skip_all, fields(subschemas = configs.len()))]
    pub fn build(configs: Vec<SubschemaConfig>, config: &StitchingConfig) -> Result<Registry, BuildError> {
        let mut prepared = Vec::with_capacity(configs.len());

        for subschema in configs {
            let SubschemaConfig {
                name,
                schema,
                executor,
                batch,
                merge,
                transforms,
                timeout,
            } = subschema;

            let mut pipeline = TransformPipeline::new(transforms);
            let logical = pipeline
                .transform_schema(schema.clone())
                .map_err(|error| BuildError::InvalidTransform {
                    subschema: name.clone(),
                    message: error.to_string(),
                })?;

            prepared.push(Prepared {
                name,
                native: schema,
                logical,
                executor: executor.with_timeout(timeout.or(config.default_timeout)),
                batchable: batch && config.batching.enabled,
                merge,
                pipeline,
            });
        }

        let sources = prepared
            .iter()
            .map(|subschema| SubschemaSource::new(&subschema.name, &subschema.logical).with_merge(&subschema.merge))
            .collect::<Vec<_>>();

        let composition = merge(
            &sources,
            &MergeOptions {
                type_conflict: config.type_conflict,
            },
        );
        for warning in composition.diagnostics().iter_warnings() {
            tracing::warn!("{warning}");
        }
        let merged = composition.into_result()?;

        let subschemas = prepared
            .into_iter()
            .enumerate()
            .map(|(index, subschema)| {
                let id = SubschemaId::from(index);
                let mut pipeline = subschema.pipeline;
                pipeline.insert(
                    0,
                    AddArgumentsAsVariables::new(subschema.merge.values().map(|config| config.field_name.clone())),
                );
                pipeline.insert(1, AddSelectionSet::for_subschema(&merged, id));
                pipeline.push(FilterToSchema::new(subschema.native));

                Arc::new(Subschema {
                    id,
                    name: subschema.name.into(),
                    executor: subschema.executor,
                    batchable: subschema.batchable,
                    merge: subschema.merge,
                    pipeline,
                })
            })
            .collect::<Vec<_>>();

        tracing::debug!(types = merged.iter_types().len(), "registry built");

        Ok(Registry { subschemas, merged })
    }

    pub fn merged(&self) -> &MergedSchema {
        &self.merged
    }

    pub fn subschema(&self, id: SubschemaId) -> &Subschema {
        &self.subschemas[id.index()]
    }

    pub(crate) fn subschema_arc(&self, id: SubschemaId) -> Arc<Subschema> {
        self.subschemas[id.index()].clone()
    }

    pub fn subschema_by_name(&self, name: &str) -> Option<&Subschema> {
        self.merged.subschema_id(name).map(|id| self.subschema(id))
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Subschema> {
        self.subschemas.iter().map(|subschema| subschema.as_ref())
    }
}

struct Prepared {
    name: String,
    native: SchemaDefinition,
    logical: SchemaDefinition,
    executor: ExecutorHandle,
    batchable: bool,
    merge: IndexMap<String, MergeTypeConfig>,
    pipeline: TransformPipeline,
}
