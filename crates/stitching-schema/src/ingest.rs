//! Builds a [SchemaDefinition] from SDL. Kept apart so that only this module depends on the
//! parser's AST.

use cynic_parser::{ConstValue, common::WrappingType, type_system as ast};

use crate::definition::{
    EnumValueDefinition, FieldDefinition, InputValueDefinition, SchemaDefinition, TypeDefinition, TypeKind, TypeRef,
    Wrapper,
};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Could not parse the schema: {0}")]
    Parse(String),
    #[error("Type `{name}` is defined as {first} and as {second} in the same schema")]
    KindMismatch {
        name: String,
        first: TypeKind,
        second: TypeKind,
    },
}

impl SchemaDefinition {
    /// Reads a type system document. `extend type` blocks are folded into the base definition
    /// when it is part of the same document and otherwise produce a definition flagged as an
    /// extension.
    pub fn from_sdl(sdl: &str) -> Result<SchemaDefinition, IngestError> {
        let document = cynic_parser::parse_type_system_document(sdl).map_err(|err| IngestError::Parse(err.to_string()))?;

        let mut schema = SchemaDefinition::new();

        for definition in document.definitions() {
            match definition {
                ast::Definition::Schema(definition) | ast::Definition::SchemaExtension(definition) => {
                    if let Some(root) = definition.query_type() {
                        schema.query_type = Some(root.named_type().to_string());
                    }
                    if let Some(root) = definition.mutation_type() {
                        schema.mutation_type = Some(root.named_type().to_string());
                    }
                    if let Some(root) = definition.subscription_type() {
                        schema.subscription_type = Some(root.named_type().to_string());
                    }
                }
                ast::Definition::Type(definition) => ingest_type_definition(&mut schema, definition, false)?,
                ast::Definition::TypeExtension(definition) => ingest_type_definition(&mut schema, definition, true)?,
                ast::Definition::Directive(_) => (),
            }
        }

        schema.resolve_default_root_types();

        Ok(schema)
    }
}

fn ingest_type_definition(
    schema: &mut SchemaDefinition,
    definition: ast::TypeDefinition<'_>,
    is_extension: bool,
) -> Result<(), IngestError> {
    let kind = match definition {
        ast::TypeDefinition::Scalar(_) => TypeKind::Scalar,
        ast::TypeDefinition::Object(_) => TypeKind::Object,
        ast::TypeDefinition::Interface(_) => TypeKind::Interface,
        ast::TypeDefinition::Union(_) => TypeKind::Union,
        ast::TypeDefinition::Enum(_) => TypeKind::Enum,
        ast::TypeDefinition::InputObject(_) => TypeKind::InputObject,
    };
    let name = definition.name();

    let target = schema
        .types
        .entry(name.to_string())
        .or_insert_with(|| {
            let mut target = TypeDefinition::new(name, kind);
            target.is_extension = is_extension;
            target
        });

    if target.kind != kind {
        return Err(IngestError::KindMismatch {
            name: name.to_string(),
            first: target.kind,
            second: kind,
        });
    }

    if !is_extension {
        // A base definition after an extension in the same document.
        target.is_extension = false;
    }

    if let Some(description) = definition.description() {
        target.description = Some(description.to_cow().into_owned());
    }

    match definition {
        ast::TypeDefinition::Scalar(_) => (),
        ast::TypeDefinition::Object(object) => {
            target
                .interfaces
                .extend(object.implements_interfaces().map(str::to_string));
            for field in object.fields() {
                target.fields.insert(field.name().to_string(), ingest_field(field));
            }
        }
        ast::TypeDefinition::Interface(interface) => {
            target
                .interfaces
                .extend(interface.implements_interfaces().map(str::to_string));
            for field in interface.fields() {
                target.fields.insert(field.name().to_string(), ingest_field(field));
            }
        }
        ast::TypeDefinition::Union(union) => {
            target.members.extend(union.members().map(|member| member.name().to_string()));
        }
        ast::TypeDefinition::Enum(r#enum) => {
            for value in r#enum.values() {
                target.enum_values.push(EnumValueDefinition {
                    value: value.value().to_string(),
                    description: value.description().map(|description| description.to_cow().into_owned()),
                    deprecation_reason: deprecation_reason(value.directives()),
                });
            }
        }
        ast::TypeDefinition::InputObject(input_object) => {
            for field in input_object.fields() {
                target
                    .input_fields
                    .insert(field.name().to_string(), ingest_input_value(field));
            }
        }
    }

    Ok(())
}

fn ingest_field(field: ast::FieldDefinition<'_>) -> FieldDefinition {
    FieldDefinition {
        name: field.name().to_string(),
        description: field.description().map(|description| description.to_cow().into_owned()),
        ty: ingest_type(field.ty()),
        arguments: field
            .arguments()
            .map(|argument| (argument.name().to_string(), ingest_input_value(argument)))
            .collect(),
        deprecation_reason: deprecation_reason(field.directives()),
    }
}

fn ingest_input_value(value: ast::InputValueDefinition<'_>) -> InputValueDefinition {
    InputValueDefinition {
        name: value.name().to_string(),
        description: value.description().map(|description| description.to_cow().into_owned()),
        ty: ingest_type(value.ty()),
        default_value: value.default_value().map(const_value_to_json),
    }
}

fn ingest_type(ty: ast::Type<'_>) -> TypeRef {
    let wrappers = ty
        .wrappers()
        .map(|wrapper| match wrapper {
            WrappingType::NonNull => Wrapper::NonNull,
            WrappingType::List => Wrapper::List,
        })
        .collect();
    TypeRef::from_parts(ty.name(), wrappers)
}

fn deprecation_reason<'a>(mut directives: impl Iterator<Item = ast::Directive<'a>>) -> Option<String> {
    let directive = directives.find(|directive| directive.name() == "deprecated")?;
    let reason = directive
        .arguments()
        .find(|argument| argument.name() == "reason")
        .and_then(|argument| match argument.value() {
            ConstValue::String(reason) => Some(reason.as_str().to_string()),
            _ => None,
        });
    Some(reason.unwrap_or_else(|| "No longer supported".to_string()))
}

pub(crate) fn const_value_to_json(value: ConstValue<'_>) -> serde_json::Value {
    match value {
        ConstValue::Null(_) => serde_json::Value::Null,
        ConstValue::Int(n) => n.as_i64().into(),
        ConstValue::Float(n) => serde_json::Number::from_f64(n.as_f64())
            .map(serde_json::Value::Number)
            .unwrap_or_default(),
        ConstValue::String(s) => s.as_str().into(),
        ConstValue::Boolean(b) => b.value().into(),
        ConstValue::Enum(e) => e.name().into(),
        ConstValue::List(list) => list.items().map(const_value_to_json).collect(),
        ConstValue::Object(object) => serde_json::Value::Object(
            object
                .fields()
                .map(|field| (field.name().to_string(), const_value_to_json(field.value())))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn ingest_objects_and_roots() {
        let schema = SchemaDefinition::from_sdl(
            r#"
            schema { query: RootQuery }

            "A person"
            type User implements Node {
              id: ID!
              name(format: String = "full"): String @deprecated(reason: "use fullName")
              friends: [User!]!
            }

            interface Node { id: ID! }

            type RootQuery { user(id: ID!): User }
            "#,
        )
        .unwrap();

        assert_eq!(schema.query_type.as_deref(), Some("RootQuery"));
        assert_eq!(schema.mutation_type, None);

        let user = schema.type_definition("User").unwrap();
        assert_eq!(user.kind, TypeKind::Object);
        assert_eq!(user.description.as_deref(), Some("A person"));
        assert_eq!(user.interfaces, vec!["Node".to_string()]);
        assert!(!user.is_extension);

        let name = &user.fields["name"];
        assert_eq!(name.deprecation_reason.as_deref(), Some("use fullName"));
        assert_eq!(name.arguments["format"].default_value, Some("full".into()));
        assert_eq!(user.fields["friends"].ty.to_string(), "[User!]!");

        assert!(schema.type_definition("ID").is_some());
    }

    #[test]
    fn extension_without_base() {
        let schema = SchemaDefinition::from_sdl(
            r#"
            extend type User { email: String }
            type Query { userById(id: ID!): User }
            "#,
        )
        .unwrap();

        let user = schema.type_definition("User").unwrap();
        assert!(user.is_extension);
        assert_eq!(user.fields.keys().collect::<Vec<_>>(), vec!["email"]);
        assert_eq!(schema.query_type.as_deref(), Some("Query"));
    }

    #[test]
    fn extension_with_base_in_same_document() {
        let schema = SchemaDefinition::from_sdl(
            r#"
            type User { id: ID! }
            extend type User { email: String }
            "#,
        )
        .unwrap();

        let user = schema.type_definition("User").unwrap();
        assert!(!user.is_extension);
        assert_eq!(user.fields.keys().collect::<Vec<_>>(), vec!["id", "email"]);
    }

    #[test]
    fn unions_enums_inputs() {
        let schema = SchemaDefinition::from_sdl(
            r#"
            union SearchResult = User | Post
            enum Role { ADMIN MEMBER @deprecated }
            input Filter { role: Role = MEMBER, limit: Int = 10 }
            type User { id: ID }
            type Post { id: ID }
            "#,
        )
        .unwrap();

        assert_eq!(
            schema.type_definition("SearchResult").unwrap().members,
            vec!["User".to_string(), "Post".to_string()]
        );

        let role = schema.type_definition("Role").unwrap();
        assert_eq!(role.enum_values.len(), 2);
        assert_eq!(
            role.enum_values[1].deprecation_reason.as_deref(),
            Some("No longer supported")
        );

        let filter = schema.type_definition("Filter").unwrap();
        assert_eq!(filter.input_fields["role"].default_value, Some("MEMBER".into()));
        assert_eq!(filter.input_fields["limit"].default_value, Some(10.into()));
    }

    #[test]
    fn kind_mismatch() {
        let error = SchemaDefinition::from_sdl("type User { id: ID } extend interface User { name: String }").unwrap_err();
        assert_eq!(
            error.to_string(),
            "Type `User` is defined as Object and as Interface in the same schema"
        );
    }

    #[test]
    fn parse_error() {
        assert!(matches!(
            SchemaDefinition::from_sdl("type User {"),
            Err(IngestError::Parse(_))
        ));
    }
}
