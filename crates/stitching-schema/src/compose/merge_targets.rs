use indexmap::IndexMap;

use super::{Context, SubschemaSource};
use crate::{KeySelection, MergeTarget, MergeTypeConfig, MergedType, OperationType, SubschemaId};

/// Validates every merge configuration and records it as a [MergeTarget] on the merged type.
pub(super) fn collect_merge_targets(context: &mut Context<'_>, types: &mut IndexMap<String, MergedType>) {
    for (index, source) in context.sources.iter().enumerate() {
        let Some(merge) = source.merge else {
            continue;
        };

        for (type_name, config) in merge {
            let subschema = SubschemaId::from(index);
            match validate_merge_target(source, type_name, config, types) {
                Ok(key_selection) => {
                    if let Some(ty) = types.get_mut(type_name) {
                        ty.merge_targets.push(MergeTarget {
                            subschema,
                            field_name: config.field_name.clone(),
                            key_selection,
                            returns_list: config.returns_list,
                            canonical: config.canonical,
                        });
                    }
                }
                Err(message) => context.diagnostics.push_subschema_fatal(source.name, message),
            }
        }
    }

    for ty in types.values_mut() {
        // Stable: registration order among the non-canonical targets.
        ty.merge_targets.sort_by_key(|target| !target.canonical);
    }
}

fn validate_merge_target(
    source: &SubschemaSource<'_>,
    type_name: &str,
    config: &MergeTypeConfig,
    types: &IndexMap<String, MergedType>,
) -> Result<KeySelection, String> {
    let Some(definition) = source.schema.type_definition(type_name) else {
        return Err(format!("The merge configuration refers to the unknown type `{type_name}`"));
    };

    if !definition.kind.has_fields() {
        return Err(format!(
            "The merge configuration of `{type_name}` targets a {}, only objects and interfaces can be merged",
            definition.kind
        ));
    }

    let key_selection = KeySelection::parse(&config.selection_set)?;

    if let Some(missing) = missing_key_field(types, type_name, &key_selection) {
        return Err(format!(
            "The key of `{type_name}` selects `{missing}`, which no subschema defines"
        ));
    }

    let Some(entrypoint) = source
        .schema
        .root_type(OperationType::Query)
        .and_then(|query| query.field(&config.field_name))
    else {
        return Err(format!(
            "The merge configuration of `{type_name}` uses the entrypoint `{}`, which is not a field of the query root",
            config.field_name
        ));
    };

    if entrypoint.ty.is_list() != config.returns_list {
        let expected = if config.returns_list { "a list" } else { "a single object" };
        return Err(format!(
            "The entrypoint `{}` must return {expected} for the merge configuration of `{type_name}`, found `{}`",
            config.field_name, entrypoint.ty
        ));
    }

    let returned = entrypoint.ty.name();
    if returned != type_name && !source.schema.possible_types(returned).contains(&type_name) {
        return Err(format!(
            "The entrypoint `{}` returns `{returned}`, which cannot be a `{type_name}`",
            config.field_name
        ));
    }

    Ok(key_selection)
}

/// First `Type.field` of the selection that the merged type system lacks.
fn missing_key_field(
    types: &IndexMap<String, MergedType>,
    type_name: &str,
    selection: &KeySelection,
) -> Option<String> {
    let ty = types.get(type_name)?;

    selection.fields.iter().find_map(|key_field| {
        let Some(field) = ty.fields.get(&key_field.name) else {
            return Some(format!("{type_name}.{}", key_field.name));
        };
        if key_field.subselection.is_empty() {
            return None;
        }
        missing_key_field(types, field.ty.name(), &key_field.subselection)
    })
}
