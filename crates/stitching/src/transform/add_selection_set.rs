use std::collections::HashMap;

use graphql_stitching_schema::{KeySelection, MergedSchema, SubschemaId};

use super::{Capabilities, StepState, TransformContext, TransformStep};
use crate::{
    delegate::DelegatedRequest,
    operation::{Field, InlineFragment, Selection, SelectionSet, TypeLookup},
};

/// Adds the selections a type needs beyond what the caller asked for: the key fields other
/// subschemas need to complete its objects, and `__typename` on abstract types.
pub struct AddSelectionSet {
    selections: HashMap<String, SelectionSet>,
}

impl AddSelectionSet {
    pub fn new(selections: HashMap<String, SelectionSet>) -> Self {
        AddSelectionSet { selections }
    }

    /// The keys of every merge target of other subschemas, by type.
    pub fn for_subschema(merged: &MergedSchema, subschema: SubschemaId) -> Self {
        let mut selections = HashMap::new();

        for ty in merged.iter_types() {
            let mut required = SelectionSet::default();
            for target in ty.merge_targets.iter().filter(|target| target.subschema != subschema) {
                merge_into(&mut required, &aliased_key_selection_set(&target.key_selection));
            }
            if !required.is_empty() {
                selections.insert(ty.name.clone(), required);
            }
        }

        AddSelectionSet { selections }
    }

    fn add(&self, selection_set: &mut SelectionSet, parent_type: &str, merged: &MergedSchema) {
        for selection in &mut selection_set.items {
            match selection {
                Selection::Field(field) => {
                    let Some(field_type) = merged.field_type_name(parent_type, &field.name) else {
                        continue;
                    };
                    if merged.type_kind(field_type).is_some_and(|kind| kind.is_composite()) {
                        let field_type = field_type.to_string();
                        self.add(&mut field.selection_set, &field_type, merged);
                    }
                }
                Selection::InlineFragment(fragment) => {
                    let type_condition = fragment
                        .type_condition
                        .clone()
                        .unwrap_or_else(|| parent_type.to_string());
                    self.add(&mut fragment.selection_set, &type_condition, merged);
                }
            }
        }

        if merged.is_abstract(parent_type) {
            if !selection_set.selects_response_key("__typename") {
                selection_set.push_field(Field::new("__typename"));
            }
            for possible_type in merged.possible_types(parent_type) {
                if let Some(required) = self.selections.get(possible_type) {
                    selection_set.items.push(Selection::InlineFragment(InlineFragment {
                        type_condition: Some(possible_type.to_string()),
                        directives: Vec::new(),
                        selection_set: required.clone(),
                    }));
                }
            }
        } else if let Some(required) = self.selections.get(parent_type) {
            merge_into(selection_set, required);
        }
    }
}

impl TransformStep for AddSelectionSet {
    fn capabilities(&self) -> Capabilities {
        Capabilities::REQUEST
    }

    fn transform_request(&self, request: &mut DelegatedRequest, context: TransformContext<'_>) -> StepState {
        let operation_type = request.operation.operation_type;
        if let Some(root) = context.merged.root_type_name(operation_type) {
            self.add(&mut request.operation.selection_set, root, context.merged);
        }
        StepState::None
    }
}

/// Top-level key fields go under their reserved alias, their sub-selections keep plain names.
fn aliased_key_selection_set(key: &KeySelection) -> SelectionSet {
    key.fields
        .iter()
        .map(|key_field| {
            Field::new(key_field.name.clone())
                .with_alias(KeySelection::alias(&key_field.name))
                .with_selection_set(key_selection_set(&key_field.subselection))
        })
        .collect::<Vec<_>>()
        .into()
}

fn key_selection_set(key: &KeySelection) -> SelectionSet {
    key.fields
        .iter()
        .map(|key_field| Field::new(key_field.name.clone()).with_selection_set(key_selection_set(&key_field.subselection)))
        .collect::<Vec<_>>()
        .into()
}

/// Adds the fields of `addition` missing from `target`, by response key.
fn merge_into(target: &mut SelectionSet, addition: &SelectionSet) {
    for added in addition.fields() {
        let existing = target.items.iter_mut().find_map(|selection| match selection {
            Selection::Field(field) if field.response_key() == added.response_key() => Some(field),
            _ => None,
        });

        match existing {
            Some(existing) if existing.name == added.name => merge_into(&mut existing.selection_set, &added.selection_set),
            // The response key is taken by another field.
            Some(_) => (),
            None => target.push_field(added.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use graphql_stitching_schema::{MergeOptions, MergeTypeConfig, SchemaDefinition, SubschemaSource, merge};
    use indexmap::IndexMap;

    use super::*;
    use crate::operation::Operation;

    fn merged() -> MergedSchema {
        let a = SchemaDefinition::from_sdl(
            r#"
            type User { id: ID! name: String org: Org }
            type Org { id: ID! }
            type Bot { id: ID! }
            union Actor = User | Bot
            type Query { me: User actors: [Actor] }
            "#,
        )
        .unwrap();
        let b = SchemaDefinition::from_sdl(
            "type User { id: ID! org: Org email: String } type Org { id: ID! } type Query { user(id: ID!, org: ID!): User }",
        )
        .unwrap();
        let b_merge = IndexMap::from([(
            "User".to_string(),
            MergeTypeConfig::by_key("id org { id }", "user", "id"),
        )]);

        merge(
            &[
                SubschemaSource::new("a", &a),
                SubschemaSource::new("b", &b).with_merge(&b_merge),
            ],
            &MergeOptions::default(),
        )
        .into_result()
        .unwrap()
    }

    fn transformed(document: &str) -> String {
        let merged = merged();
        let step = AddSelectionSet::for_subschema(&merged, SubschemaId::from(0));
        let mut request = DelegatedRequest::new(Operation::parse(document, None).unwrap());
        step.transform_request(&mut request, TransformContext { merged: &merged });
        request.operation.to_string()
    }

    #[test]
    fn adds_missing_key_fields() {
        insta::assert_snapshot!(
            transformed("{ me { name } }"),
            @"query { me { name __key_id: id __key_org: org { id } } }"
        );
        insta::assert_snapshot!(
            transformed("{ me { id org { __typename } } }"),
            @"query { me { id org { __typename } __key_id: id __key_org: org { id } } }"
        );
    }

    #[test]
    fn key_fields_never_reuse_the_caller_response_keys() {
        insta::assert_snapshot!(
            transformed("{ me { id: name org: name } }"),
            @"query { me { id: name org: name __key_id: id __key_org: org { id } } }"
        );
    }

    #[test]
    fn adds_typename_and_keys_on_abstract_types() {
        insta::assert_snapshot!(
            transformed("{ actors { ... on Bot { id } } }"),
            @"query { actors { ... on Bot { id } __typename ... on User { __key_id: id __key_org: org { id } } } }"
        );
    }

    #[test]
    fn keys_of_own_merge_targets_are_not_added() {
        let merged = merged();
        let step = AddSelectionSet::for_subschema(&merged, SubschemaId::from(1));
        assert!(step.selections.is_empty());
    }
}
