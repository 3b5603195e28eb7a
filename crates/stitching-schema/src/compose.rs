mod merge_targets;

use std::collections::HashSet;

use indexmap::IndexMap;
use itertools::Itertools;

use crate::{
    CompositionResult, Diagnostics, FieldDefinition, InputValueDefinition, MergeTypeConfig,
    MergedField, MergedSchema, MergedType, OperationType, SchemaDefinition, SubschemaId, TypeDefinition, TypeRef,
    TypeSource, definition::BUILTIN_SCALARS,
};

/// One subschema as seen by [merge()]: its type system, already transformed into the logical
/// names, and its merge configuration.
#[derive(Debug, Clone, Copy)]
pub struct SubschemaSource<'a> {
    pub(crate) name: &'a str,
    pub(crate) schema: &'a SchemaDefinition,
    pub(crate) merge: Option<&'a IndexMap<String, MergeTypeConfig>>,
}

impl<'a> SubschemaSource<'a> {
    pub fn new(name: &'a str, schema: &'a SchemaDefinition) -> Self {
        SubschemaSource {
            name,
            schema,
            merge: None,
        }
    }

    #[must_use]
    pub fn with_merge(mut self, merge: &'a IndexMap<String, MergeTypeConfig>) -> Self {
        self.merge = Some(merge);
        self
    }

    pub(crate) fn merge_config(&self, type_name: &str) -> Option<&'a MergeTypeConfig> {
        self.merge.and_then(|merge| merge.get(type_name))
    }
}

/// What to do when subschemas define the same type name with different kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeConflictStrategy {
    /// Fail the merge.
    #[default]
    Error,
    /// Keep the definitions matching the kind of the first registered subschema.
    FirstWins,
    /// Keep the definitions matching the kind of the last registered subschema.
    LastWins,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub type_conflict: TypeConflictStrategy,
}

/// Merges the type systems of `subschemas` into one logical type system. Registration order is
/// the order of the slice.
pub fn merge(subschemas: &[SubschemaSource<'_>], options: &MergeOptions) -> CompositionResult {
    let mut context = Context {
        sources: subschemas,
        options,
        diagnostics: Diagnostics::default(),
    };

    if subschemas.is_empty() {
        context
            .diagnostics
            .push_fatal("At least one subschema is required".to_owned());
        return context.finish(None);
    }

    let mut names = HashSet::new();
    for source in subschemas {
        if !names.insert(source.name) {
            context
                .diagnostics
                .push_fatal(format!("The subschema name `{}` is used more than once", source.name));
        }
    }

    let mut types = IndexMap::new();
    for (name, definitions) in context.group_definitions() {
        let Some(definitions) = context.resolve_kind(name, definitions) else {
            continue;
        };
        let merged = context.merge_type(name, &definitions);
        types.insert(name.to_owned(), merged);
    }

    merge_targets::collect_merge_targets(&mut context, &mut types);

    let root_type = |operation_type: OperationType| {
        subschemas
            .iter()
            .any(|source| source.schema.root_type_name(operation_type).is_some())
            .then(|| operation_type.default_root_type_name().to_owned())
    };

    let merged_schema = MergedSchema {
        subschema_names: subschemas.iter().map(|source| source.name.to_owned()).collect(),
        query_type: root_type(OperationType::Query),
        mutation_type: root_type(OperationType::Mutation),
        subscription_type: root_type(OperationType::Subscription),
        types,
    };

    context.finish(Some(merged_schema))
}

type Definitions<'a> = Vec<(SubschemaId, &'a TypeDefinition)>;

pub(crate) struct Context<'a> {
    pub(crate) sources: &'a [SubschemaSource<'a>],
    options: &'a MergeOptions,
    pub(crate) diagnostics: Diagnostics,
}

impl<'a> Context<'a> {
    fn finish(self, merged_schema: Option<MergedSchema>) -> CompositionResult {
        let merged_schema = merged_schema.filter(|_| !self.diagnostics.any_fatal());
        CompositionResult {
            merged_schema,
            diagnostics: self.diagnostics,
        }
    }

    pub(crate) fn source(&self, id: SubschemaId) -> &SubschemaSource<'a> {
        &self.sources[id.index()]
    }

    fn subschema_name(&self, id: SubschemaId) -> &'a str {
        self.sources[id.index()].name
    }

    /// Definitions by logical type name, in registration order.
    fn group_definitions(&self) -> IndexMap<&'a str, Definitions<'a>> {
        let mut groups: IndexMap<&'a str, Definitions<'a>> = IndexMap::new();

        for (index, source) in self.sources.iter().enumerate() {
            for definition in source.schema.types.values() {
                let name = logical_type_name(source.schema, &definition.name);
                groups
                    .entry(name)
                    .or_default()
                    .push((SubschemaId::from(index), definition));
            }
        }

        groups
    }

    fn resolve_kind(&mut self, name: &str, mut definitions: Definitions<'a>) -> Option<Definitions<'a>> {
        let first_kind = definitions.first()?.1.kind;
        if definitions.iter().all(|(_, definition)| definition.kind == first_kind) {
            return Some(definitions);
        }

        let described = definitions
            .iter()
            .map(|(id, definition)| format!("{} in [{}]", definition.kind, self.subschema_name(*id)))
            .join(", ");

        let kept_kind = match self.options.type_conflict {
            TypeConflictStrategy::Error => {
                self.diagnostics
                    .push_fatal(format!("The type `{name}` is defined with conflicting kinds: {described}"));
                return None;
            }
            TypeConflictStrategy::FirstWins => first_kind,
            TypeConflictStrategy::LastWins => definitions.last()?.1.kind,
        };

        self.diagnostics.push_warning(format!(
            "The type `{name}` is defined with conflicting kinds: {described}. Keeping the {kept_kind} definitions."
        ));
        definitions.retain(|(_, definition)| definition.kind == kept_kind);

        Some(definitions)
    }

    fn canonical_subschema(&mut self, name: &str, definitions: &Definitions<'a>) -> Option<SubschemaId> {
        let canonical = definitions
            .iter()
            .map(|(id, _)| *id)
            .filter(|id| self.source(*id).merge_config(name).is_some_and(|config| config.canonical))
            .collect::<Vec<_>>();

        match canonical.as_slice() {
            [] => None,
            [id] => Some(*id),
            _ => {
                let subschemas = canonical.iter().map(|id| self.subschema_name(*id)).join("], [");
                self.diagnostics.push_fatal(format!(
                    "The type `{name}` has more than one canonical definition: [{subschemas}]"
                ));
                None
            }
        }
    }

    fn merge_type(&mut self, name: &str, definitions: &Definitions<'a>) -> MergedType {
        let canonical = self.canonical_subschema(name, definitions);

        // Metadata order: canonical first, then registration order.
        let ordered = definitions
            .iter()
            .copied()
            .sorted_by_key(|(id, _)| Some(*id) != canonical)
            .collect::<Vec<_>>();

        let sources = definitions
            .iter()
            .map(|(id, definition)| TypeSource {
                subschema: *id,
                is_authoritative: !definition.is_extension,
            })
            .collect::<Vec<_>>();

        if !BUILTIN_SCALARS.contains(&name) && sources.iter().all(|source| !source.is_authoritative) {
            self.diagnostics.push_warning(format!(
                "The type `{name}` is only extended and never defined by any subschema"
            ));
        }

        let kind = ordered[0].1.kind;

        let mut merged = MergedType {
            name: name.to_owned(),
            kind,
            description: ordered.iter().find_map(|(_, definition)| definition.description.clone()),
            sources,
            fields: IndexMap::new(),
            input_fields: IndexMap::new(),
            interfaces: Vec::new(),
            members: Vec::new(),
            enum_values: Vec::new(),
            merge_targets: Vec::new(),
        };

        if kind.has_fields() {
            merged.fields = self.merge_fields(name, definitions, canonical);
        }

        for (id, definition) in &ordered {
            let schema = self.source(*id).schema;

            for (field_name, input_field) in &definition.input_fields {
                merged
                    .input_fields
                    .entry(field_name.clone())
                    .or_insert_with(|| input_field.clone());
            }

            merged.interfaces.extend(
                definition
                    .interfaces
                    .iter()
                    .map(|interface| logical_type_name(schema, interface).to_owned()),
            );
            merged.members.extend(
                definition
                    .members
                    .iter()
                    .map(|member| logical_type_name(schema, member).to_owned()),
            );

            for value in &definition.enum_values {
                if !merged.enum_values.iter().any(|known| known.value == value.value) {
                    merged.enum_values.push(value.clone());
                }
            }
        }

        merged.interfaces = merged.interfaces.into_iter().unique().collect();
        merged.members = merged.members.into_iter().unique().collect();

        merged
    }

    fn merge_fields(
        &mut self,
        type_name: &str,
        definitions: &Definitions<'a>,
        canonical: Option<SubschemaId>,
    ) -> IndexMap<String, MergedField> {
        let mut by_name: IndexMap<&'a str, Vec<(SubschemaId, &'a FieldDefinition)>> = IndexMap::new();
        for (id, definition) in definitions {
            for field in definition.fields.values() {
                by_name.entry(field.name.as_str()).or_default().push((*id, field));
            }
        }

        let mut fields = IndexMap::with_capacity(by_name.len());

        for (field_name, candidates) in by_name {
            let Some(&(winner_id, winner)) = candidates
                .iter()
                .find(|(id, _)| Some(*id) == canonical)
                .or_else(|| candidates.first())
            else {
                continue;
            };

            let winner_ty = self.logical_type_ref(winner_id, &winner.ty);
            let winner_name = self.subschema_name(winner_id);

            for &(id, field) in &candidates {
                if id == winner_id {
                    continue;
                }

                let ty = self.logical_type_ref(id, &field.ty);
                let other_name = self.subschema_name(id);

                if ty.name() != winner_ty.name() {
                    self.diagnostics.push_fatal(format!(
                        "The field `{type_name}.{field_name}` has the type `{winner_ty}` in [{winner_name}] but `{ty}` in [{other_name}]"
                    ));
                } else if ty != winner_ty || !arguments_match(&field.arguments, &winner.arguments) {
                    self.diagnostics.push_warning(format!(
                        "The field `{type_name}.{field_name}` has different signatures in [{winner_name}] and [{other_name}]. Using the one from [{winner_name}]."
                    ));
                }
            }

            let owners = candidates
                .iter()
                .map(|(id, _)| *id)
                .sorted_by_key(|id| Some(*id) != canonical)
                .collect();

            fields.insert(
                field_name.to_owned(),
                MergedField {
                    name: field_name.to_owned(),
                    description: winner
                        .description
                        .clone()
                        .or_else(|| candidates.iter().find_map(|(_, field)| field.description.clone())),
                    deprecation_reason: winner.deprecation_reason.clone(),
                    ty: winner_ty,
                    arguments: winner.arguments.clone(),
                    owners,
                },
            );
        }

        fields
    }

    fn logical_type_ref(&self, id: SubschemaId, ty: &TypeRef) -> TypeRef {
        let schema = self.source(id).schema;
        let mut ty = ty.clone();
        let name = logical_type_name(schema, ty.name()).to_owned();
        ty.rename(name);
        ty
    }
}

/// Root types are merged under their default names, whatever each subschema calls them.
fn logical_type_name<'b>(schema: &SchemaDefinition, name: &'b str) -> &'b str {
    match schema.root_operation_of(name) {
        Some(operation_type) => operation_type.default_root_type_name(),
        None => name,
    }
}

fn arguments_match(
    left: &IndexMap<String, InputValueDefinition>,
    right: &IndexMap<String, InputValueDefinition>,
) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .all(|(name, argument)| right.get(name).is_some_and(|other| other.ty == argument.ty))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{ConflictError, TypeKind};

    fn sdl(sdl: &str) -> SchemaDefinition {
        SchemaDefinition::from_sdl(sdl).unwrap()
    }

    fn merge_all(sources: &[SubschemaSource<'_>]) -> Result<MergedSchema, ConflictError> {
        merge(sources, &MergeOptions::default()).into_result()
    }

    fn owners<'a>(merged: &'a MergedSchema, type_name: &str, field_name: &str) -> Vec<&'a str> {
        merged
            .field(type_name, field_name)
            .unwrap()
            .owners
            .iter()
            .map(|id| merged.subschema_name(*id))
            .collect()
    }

    #[test]
    fn union_of_disjoint_subschemas() {
        let books = sdl("type Book { title: String } type Query { books: [Book] }");
        let authors = sdl("type Author { name: String } type Query { authors: [Author] }");

        let merged = merge_all(&[
            SubschemaSource::new("books", &books),
            SubschemaSource::new("authors", &authors),
        ])
        .unwrap();

        for (type_name, field_name) in [
            ("Book", "title"),
            ("Author", "name"),
            ("Query", "books"),
            ("Query", "authors"),
        ] {
            assert!(merged.field(type_name, field_name).is_some(), "{type_name}.{field_name}");
        }
        assert_eq!(owners(&merged, "Query", "books"), vec!["books"]);
        assert_eq!(owners(&merged, "Query", "authors"), vec!["authors"]);
        assert_eq!(merged.root_type_name(OperationType::Query), Some("Query"));
        assert_eq!(merged.root_type_name(OperationType::Mutation), None);
    }

    #[test]
    fn extended_type_is_represented_by_sources() {
        let accounts = sdl("type User { id: ID name: String } type Query { user: User }");
        let emails = sdl("extend type User { email: String } type Query { userById(id: ID): User }");
        let emails_merge = IndexMap::from([("User".to_owned(), MergeTypeConfig::by_key("id", "userById", "id"))]);

        let merged = merge_all(&[
            SubschemaSource::new("accounts", &accounts),
            SubschemaSource::new("emails", &emails).with_merge(&emails_merge),
        ])
        .unwrap();

        let user = merged.type_definition("User").unwrap();
        assert_eq!(
            user.sources,
            vec![
                TypeSource {
                    subschema: SubschemaId::from(0),
                    is_authoritative: true
                },
                TypeSource {
                    subschema: SubschemaId::from(1),
                    is_authoritative: false
                },
            ]
        );
        assert_eq!(user.fields.keys().collect::<Vec<_>>(), vec!["id", "name", "email"]);
        assert_eq!(owners(&merged, "User", "email"), vec!["emails"]);
        assert_eq!(owners(&merged, "User", "id"), vec!["accounts"]);

        let target = user.merge_target(SubschemaId::from(1)).unwrap();
        assert_eq!(target.field_name, "userById");
        assert!(!target.returns_list);
        assert!(user.merge_target(SubschemaId::from(0)).is_none());
    }

    #[test]
    fn shared_fields_are_resolvable_everywhere_in_registration_order() {
        let a = sdl("type User { id: ID! name: String } type Query { a: User }");
        let b = sdl("type User { id: ID! name: String } type Query { b: User }");

        let merged = merge_all(&[SubschemaSource::new("a", &a), SubschemaSource::new("b", &b)]).unwrap();

        assert_eq!(owners(&merged, "User", "name"), vec!["a", "b"]);
    }

    #[test]
    fn kind_conflict_is_fatal_by_default() {
        let a = sdl("type Node { id: ID } type Query { a: Node }");
        let b = sdl("interface Node { id: ID } type Query { b: Node }");

        let error = merge_all(&[SubschemaSource::new("a", &a), SubschemaSource::new("b", &b)]).unwrap_err();

        assert_eq!(
            error.to_string(),
            "Could not merge the subschemas:\n- The type `Node` is defined with conflicting kinds: Object in [a], Interface in [b]"
        );
    }

    #[test]
    fn kind_conflict_strategies() {
        let a = sdl("type Node { id: ID } type Query { a: Node }");
        let b = sdl("interface Node { id: ID } type Query { b: Node }");
        let sources = [SubschemaSource::new("a", &a), SubschemaSource::new("b", &b)];

        let first = merge(
            &sources,
            &MergeOptions {
                type_conflict: TypeConflictStrategy::FirstWins,
            },
        );
        assert_eq!(first.diagnostics().iter_warnings().count(), 1);
        let first = first.into_result().unwrap();
        assert_eq!(first.type_definition("Node").unwrap().kind, TypeKind::Object);
        assert_eq!(owners(&first, "Node", "id"), vec!["a"]);

        let last = merge(
            &sources,
            &MergeOptions {
                type_conflict: TypeConflictStrategy::LastWins,
            },
        )
        .into_result()
        .unwrap();
        assert_eq!(last.type_definition("Node").unwrap().kind, TypeKind::Interface);
        assert_eq!(owners(&last, "Node", "id"), vec!["b"]);
    }

    #[test]
    fn different_named_field_types_are_fatal() {
        let a = sdl("type User { age: Int } type Query { a: User }");
        let b = sdl("type User { age: String } type Query { b: User }");

        let result = merge(
            &[SubschemaSource::new("a", &a), SubschemaSource::new("b", &b)],
            &MergeOptions::default(),
        );

        assert_eq!(
            result.diagnostics().iter_errors().collect::<Vec<_>>(),
            vec!["The field `User.age` has the type `Int` in [a] but `String` in [b]"]
        );
        assert!(result.into_result().is_err());
    }

    #[test]
    fn different_nullability_warns_and_first_wins() {
        let a = sdl("type User { name: String } type Query { a: User }");
        let b = sdl(r#"type User { "full name" name(format: String): String! } type Query { b: User }"#);

        let result = merge(
            &[SubschemaSource::new("a", &a), SubschemaSource::new("b", &b)],
            &MergeOptions::default(),
        );

        assert_eq!(
            result.diagnostics().iter_warnings().collect::<Vec<_>>(),
            vec!["The field `User.name` has different signatures in [a] and [b]. Using the one from [a]."]
        );

        let merged = result.into_result().unwrap();
        let name = merged.field("User", "name").unwrap();
        assert_eq!(name.ty.to_string(), "String");
        assert!(name.arguments.is_empty());
        // Metadata falls back to the other definitions when the winner has none.
        assert_eq!(name.description.as_deref(), Some("full name"));
        assert_eq!(owners(&merged, "User", "name"), vec!["a", "b"]);
    }

    #[test]
    fn canonical_definition_wins_metadata_and_routing() {
        let a = sdl(r#""from a" type User { id: ID! name: String } type Query { a: User }"#);
        let b = sdl(
            r#""from b" type User { id: ID! name: String @deprecated(reason: "gone") } type Query { userById(id: ID!): User }"#,
        );
        let b_merge = IndexMap::from([(
            "User".to_owned(),
            MergeTypeConfig::by_key("id", "userById", "id").canonical(),
        )]);

        let merged = merge_all(&[
            SubschemaSource::new("a", &a),
            SubschemaSource::new("b", &b).with_merge(&b_merge),
        ])
        .unwrap();

        let user = merged.type_definition("User").unwrap();
        assert_eq!(user.description.as_deref(), Some("from b"));
        assert_eq!(user.fields["name"].deprecation_reason.as_deref(), Some("gone"));
        assert_eq!(owners(&merged, "User", "name"), vec!["b", "a"]);
        assert!(user.merge_targets[0].canonical);
    }

    #[test]
    fn two_canonical_definitions_are_fatal() {
        let a = sdl("type User { id: ID! } type Query { userA(id: ID!): User }");
        let b = sdl("type User { id: ID! } type Query { userB(id: ID!): User }");
        let a_merge = IndexMap::from([("User".to_owned(), MergeTypeConfig::by_key("id", "userA", "id").canonical())]);
        let b_merge = IndexMap::from([("User".to_owned(), MergeTypeConfig::by_key("id", "userB", "id").canonical())]);

        let error = merge_all(&[
            SubschemaSource::new("a", &a).with_merge(&a_merge),
            SubschemaSource::new("b", &b).with_merge(&b_merge),
        ])
        .unwrap_err();

        assert_eq!(
            error.diagnostics().iter_errors().collect::<Vec<_>>(),
            vec!["The type `User` has more than one canonical definition: [a], [b]"]
        );
    }

    #[test]
    fn custom_root_type_names_are_merged() {
        let a = sdl("schema { query: RootQuery } type RootQuery { a: Int }");
        let b = sdl("type Query { b: Int } type Mutation { doIt: Boolean }");

        let merged = merge_all(&[SubschemaSource::new("a", &a), SubschemaSource::new("b", &b)]).unwrap();

        assert!(merged.type_definition("RootQuery").is_none());
        assert_eq!(
            merged.root_type(OperationType::Query).unwrap().fields.keys().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(merged.root_type_name(OperationType::Mutation), Some("Mutation"));
    }

    #[test]
    fn duplicate_and_missing_subschemas() {
        let a = sdl("type Query { a: Int }");
        let error = merge_all(&[SubschemaSource::new("a", &a), SubschemaSource::new("a", &a)]).unwrap_err();
        assert_eq!(
            error.diagnostics().iter_errors().collect::<Vec<_>>(),
            vec!["The subschema name `a` is used more than once"]
        );

        assert!(merge_all(&[]).is_err());
    }

    #[test]
    fn only_extended_types_warn() {
        let a = sdl("extend type User { email: String } type Query { a: User }");

        let result = merge(&[SubschemaSource::new("a", &a)], &MergeOptions::default());

        assert_eq!(
            result.diagnostics().iter_warnings().collect::<Vec<_>>(),
            vec!["The type `User` is only extended and never defined by any subschema"]
        );
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn unions_and_enums_are_merged() {
        let a = sdl("union Result = Book enum Color { RED } type Book { id: ID } type Query { a: Result c: Color }");
        let b = sdl("union Result = Film enum Color { RED BLUE } type Film { id: ID } type Query { b: Result }");

        let merged = merge_all(&[SubschemaSource::new("a", &a), SubschemaSource::new("b", &b)]).unwrap();

        assert_eq!(merged.possible_types("Result"), vec!["Book", "Film"]);
        let colors = merged
            .type_definition("Color")
            .unwrap()
            .enum_values
            .iter()
            .map(|value| value.value.as_str())
            .collect::<Vec<_>>();
        assert_eq!(colors, vec!["RED", "BLUE"]);
    }
}
