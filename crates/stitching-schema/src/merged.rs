use indexmap::IndexMap;

use crate::{
    EnumValueDefinition, FieldDefinition, InputValueDefinition, KeySelection, OperationType, SchemaDefinition,
    TypeDefinition, TypeKind, TypeRef,
};

/// Position of a subschema in the registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubschemaId(usize);

impl SubschemaId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for SubschemaId {
    fn from(index: usize) -> Self {
        SubschemaId(index)
    }
}

/// One subschema's contribution to a merged type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSource {
    pub subschema: SubschemaId,
    /// Defined with `type`, as opposed to only extended with `extend type`.
    pub is_authoritative: bool,
}

#[derive(Debug, Clone)]
pub struct MergedField {
    pub name: String,
    pub description: Option<String>,
    pub deprecation_reason: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputValueDefinition>,
    /// Every subschema able to resolve the field, in routing order.
    pub owners: Vec<SubschemaId>,
}

impl MergedField {
    pub fn is_resolvable_by(&self, subschema: SubschemaId) -> bool {
        self.owners.contains(&subschema)
    }
}

/// A subschema able to fetch objects of a type by key.
#[derive(Debug, Clone)]
pub struct MergeTarget {
    pub subschema: SubschemaId,
    pub field_name: String,
    pub key_selection: KeySelection,
    pub returns_list: bool,
    pub canonical: bool,
}

#[derive(Debug, Clone)]
pub struct MergedType {
    pub name: String,
    pub kind: TypeKind,
    pub description: Option<String>,
    /// In registration order.
    pub sources: Vec<TypeSource>,
    pub fields: IndexMap<String, MergedField>,
    pub input_fields: IndexMap<String, InputValueDefinition>,
    pub interfaces: Vec<String>,
    pub members: Vec<String>,
    pub enum_values: Vec<EnumValueDefinition>,
    /// In routing order.
    pub merge_targets: Vec<MergeTarget>,
}

impl MergedType {
    pub fn is_defined_in(&self, subschema: SubschemaId) -> bool {
        self.sources.iter().any(|source| source.subschema == subschema)
    }

    pub fn merge_target(&self, subschema: SubschemaId) -> Option<&MergeTarget> {
        self.merge_targets.iter().find(|target| target.subschema == subschema)
    }

    pub fn field(&self, name: &str) -> Option<&MergedField> {
        self.fields.get(name)
    }
}

/// The logical type system assembled from all subschemas.
#[derive(Debug, Clone)]
pub struct MergedSchema {
    pub(crate) subschema_names: Vec<String>,
    pub(crate) query_type: Option<String>,
    pub(crate) mutation_type: Option<String>,
    pub(crate) subscription_type: Option<String>,
    pub(crate) types: IndexMap<String, MergedType>,
}

impl MergedSchema {
    pub fn subschema_name(&self, id: SubschemaId) -> &str {
        &self.subschema_names[id.0]
    }

    pub fn subschema_count(&self) -> usize {
        self.subschema_names.len()
    }

    pub fn subschema_id(&self, name: &str) -> Option<SubschemaId> {
        self.subschema_names
            .iter()
            .position(|candidate| candidate == name)
            .map(SubschemaId)
    }

    pub fn iter_types(&self) -> impl ExactSizeIterator<Item = &MergedType> {
        self.types.values()
    }

    pub fn type_definition(&self, name: &str) -> Option<&MergedType> {
        self.types.get(name)
    }

    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&MergedField> {
        self.types.get(type_name)?.fields.get(field_name)
    }

    pub fn root_type_name(&self, operation_type: OperationType) -> Option<&str> {
        match operation_type {
            OperationType::Query => self.query_type.as_deref(),
            OperationType::Mutation => self.mutation_type.as_deref(),
            OperationType::Subscription => self.subscription_type.as_deref(),
        }
    }

    pub fn root_type(&self, operation_type: OperationType) -> Option<&MergedType> {
        self.root_type_name(operation_type)
            .and_then(|name| self.type_definition(name))
    }

    /// Object types a value of `type_name` can be at runtime.
    pub fn possible_types(&self, type_name: &str) -> Vec<&str> {
        let Some(ty) = self.types.get(type_name) else {
            return Vec::new();
        };
        match ty.kind {
            TypeKind::Object => vec![ty.name.as_str()],
            TypeKind::Union => ty.members.iter().map(String::as_str).collect(),
            TypeKind::Interface => self
                .types
                .values()
                .filter(|candidate| {
                    candidate.kind == TypeKind::Object && candidate.interfaces.iter().any(|name| name == type_name)
                })
                .map(|candidate| candidate.name.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether an object of type `object_type` matches a fragment on `type_condition`.
    pub fn type_condition_applies(&self, type_condition: &str, object_type: &str) -> bool {
        type_condition == object_type || self.possible_types(type_condition).contains(&object_type)
    }

    /// The logical type system as a plain [SchemaDefinition], for validators and printers.
    pub fn to_schema_definition(&self) -> SchemaDefinition {
        let mut schema = SchemaDefinition {
            query_type: self.query_type.clone(),
            mutation_type: self.mutation_type.clone(),
            subscription_type: self.subscription_type.clone(),
            types: IndexMap::with_capacity(self.types.len()),
        };

        for ty in self.types.values() {
            schema.insert_type(TypeDefinition {
                name: ty.name.clone(),
                kind: ty.kind,
                description: ty.description.clone(),
                fields: ty
                    .fields
                    .values()
                    .map(|field| {
                        (
                            field.name.clone(),
                            FieldDefinition {
                                name: field.name.clone(),
                                description: field.description.clone(),
                                ty: field.ty.clone(),
                                arguments: field.arguments.clone(),
                                deprecation_reason: field.deprecation_reason.clone(),
                            },
                        )
                    })
                    .collect(),
                input_fields: ty.input_fields.clone(),
                interfaces: ty.interfaces.clone(),
                members: ty.members.clone(),
                enum_values: ty.enum_values.clone(),
                is_extension: false,
            });
        }

        schema
    }
}
