use graphql_stitching_schema::{MergedSchema, SchemaDefinition, TypeKind, TypeRef};
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};

use super::{Field, Selection, SelectionSet, is_included};

/// What a typed walk over an operation needs to know about a type system. Implemented for the
/// merged schema (logical operations) and for subschema definitions (native operations).
pub(crate) trait TypeLookup {
    fn type_kind(&self, type_name: &str) -> Option<TypeKind>;

    fn field_type(&self, parent_type: &str, field_name: &str) -> Option<&TypeRef>;

    fn argument_type(&self, parent_type: &str, field_name: &str, argument_name: &str) -> Option<&TypeRef>;

    fn has_type(&self, type_name: &str) -> bool {
        self.type_kind(type_name).is_some()
    }

    fn is_abstract(&self, type_name: &str) -> bool {
        matches!(
            self.type_kind(type_name),
            Some(TypeKind::Interface | TypeKind::Union)
        )
    }

    /// Named type of `parent_type.field_name`. `__typename` is a `String`.
    fn field_type_name(&self, parent_type: &str, field_name: &str) -> Option<&str> {
        if field_name == "__typename" {
            return Some("String");
        }
        self.field_type(parent_type, field_name).map(TypeRef::name)
    }
}

impl TypeLookup for SchemaDefinition {
    fn type_kind(&self, type_name: &str) -> Option<TypeKind> {
        self.type_definition(type_name).map(|definition| definition.kind)
    }

    fn field_type(&self, parent_type: &str, field_name: &str) -> Option<&TypeRef> {
        self.field(parent_type, field_name).map(|field| &field.ty)
    }

    fn argument_type(&self, parent_type: &str, field_name: &str, argument_name: &str) -> Option<&TypeRef> {
        self.field(parent_type, field_name)?
            .arguments
            .get(argument_name)
            .map(|argument| &argument.ty)
    }
}

impl TypeLookup for MergedSchema {
    fn type_kind(&self, type_name: &str) -> Option<TypeKind> {
        self.type_definition(type_name).map(|definition| definition.kind)
    }

    fn field_type(&self, parent_type: &str, field_name: &str) -> Option<&TypeRef> {
        self.field(parent_type, field_name).map(|field| &field.ty)
    }

    fn argument_type(&self, parent_type: &str, field_name: &str, argument_name: &str) -> Option<&TypeRef> {
        self.field(parent_type, field_name)?
            .arguments
            .get(argument_name)
            .map(|argument| &argument.ty)
    }
}

/// The fields of `selection_set` applying to an object of type `object_type`, by response key.
/// Fragments are flattened, `@skip`/`@include` evaluated, and the selection sets of fields
/// sharing a response key merged.
pub(crate) fn collect_fields(
    selection_set: &SelectionSet,
    object_type: &str,
    schema: &MergedSchema,
    variables: &Map<String, JsonValue>,
) -> IndexMap<String, Field> {
    let mut fields = IndexMap::new();
    collect_fields_into(selection_set, object_type, schema, variables, &mut fields);
    fields
}

fn collect_fields_into(
    selection_set: &SelectionSet,
    object_type: &str,
    schema: &MergedSchema,
    variables: &Map<String, JsonValue>,
    fields: &mut IndexMap<String, Field>,
) {
    for selection in &selection_set.items {
        match selection {
            Selection::Field(field) => {
                if !is_included(&field.directives, variables) {
                    continue;
                }
                match fields.get_mut(field.response_key()) {
                    Some(existing) => existing
                        .selection_set
                        .items
                        .extend(field.selection_set.items.iter().cloned()),
                    None => {
                        fields.insert(field.response_key().to_string(), field.clone());
                    }
                }
            }
            Selection::InlineFragment(fragment) => {
                let applies = fragment
                    .type_condition
                    .as_deref()
                    .is_none_or(|type_condition| schema.type_condition_applies(type_condition, object_type));
                if applies && is_included(&fragment.directives, variables) {
                    collect_fields_into(&fragment.selection_set, object_type, schema, variables, fields);
                }
            }
        }
    }
}
