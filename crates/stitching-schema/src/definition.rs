use std::fmt;

use indexmap::IndexMap;

pub(crate) const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

impl OperationType {
    /// Name of the root type when the schema does not say otherwise.
    pub fn default_root_type_name(self) -> &'static str {
        match self {
            OperationType::Query => "Query",
            OperationType::Mutation => "Mutation",
            OperationType::Subscription => "Subscription",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
}

impl TypeKind {
    pub fn is_composite(self) -> bool {
        matches!(self, TypeKind::Object | TypeKind::Interface | TypeKind::Union)
    }

    pub fn has_fields(self) -> bool {
        matches!(self, TypeKind::Object | TypeKind::Interface)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wrapper {
    List,
    NonNull,
}

/// A reference to a named type with its list and non-null wrappers, e.g. `[User!]!`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    name: String,
    /// Outermost first.
    wrappers: Vec<Wrapper>,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef {
            name: name.into(),
            wrappers: Vec::new(),
        }
    }

    /// `wrappers` are outermost first.
    pub fn from_parts(name: impl Into<String>, wrappers: Vec<Wrapper>) -> Self {
        TypeRef {
            name: name.into(),
            wrappers,
        }
    }

    #[must_use]
    pub fn non_null(mut self) -> Self {
        if !self.is_non_null() {
            self.wrappers.insert(0, Wrapper::NonNull);
        }
        self
    }

    #[must_use]
    pub fn list(mut self) -> Self {
        self.wrappers.insert(0, Wrapper::List);
        self
    }

    /// Parses the SDL notation of a type reference.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Some(inner) = input.strip_suffix('!') {
            let inner = TypeRef::parse(inner)?;
            if inner.is_non_null() {
                return None;
            }
            return Some(inner.non_null());
        }
        if let Some(inner) = input.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            return TypeRef::parse(inner).map(TypeRef::list);
        }
        let is_name = !input.is_empty()
            && !input.starts_with(|c: char| c.is_ascii_digit())
            && input.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        is_name.then(|| TypeRef::named(input))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wrappers(&self) -> &[Wrapper] {
        &self.wrappers
    }

    pub fn is_non_null(&self) -> bool {
        self.wrappers.first() == Some(&Wrapper::NonNull)
    }

    pub fn is_list(&self) -> bool {
        self.wrappers.contains(&Wrapper::List)
    }

    /// The type without its outermost non-null wrapper.
    pub fn nullable(&self) -> TypeRef {
        let mut ty = self.clone();
        if ty.is_non_null() {
            ty.wrappers.remove(0);
        }
        ty
    }

    /// The type of the items if this is a list, ignoring nullability.
    pub fn list_item(&self) -> Option<TypeRef> {
        let nullable = self.nullable();
        match nullable.wrappers.first() {
            Some(Wrapper::List) => Some(TypeRef {
                name: nullable.name,
                wrappers: nullable.wrappers[1..].to_vec(),
            }),
            _ => None,
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rendered = self.name.clone();
        for wrapper in self.wrappers.iter().rev() {
            rendered = match wrapper {
                Wrapper::List => format!("[{rendered}]"),
                Wrapper::NonNull => format!("{rendered}!"),
            };
        }
        f.write_str(&rendered)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputValueDefinition {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub default_value: Option<serde_json::Value>,
}

impl InputValueDefinition {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            default_value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputValueDefinition>,
    pub deprecation_reason: Option<String>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            arguments: IndexMap::new(),
            deprecation_reason: None,
        }
    }

    #[must_use]
    pub fn with_argument(mut self, argument: InputValueDefinition) -> Self {
        self.arguments.insert(argument.name.clone(), argument);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDefinition {
    pub value: String,
    pub description: Option<String>,
    pub deprecation_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    pub name: String,
    pub kind: TypeKind,
    pub description: Option<String>,
    /// Object and interface fields.
    pub fields: IndexMap<String, FieldDefinition>,
    /// Input object fields.
    pub input_fields: IndexMap<String, InputValueDefinition>,
    pub interfaces: Vec<String>,
    /// Union members.
    pub members: Vec<String>,
    pub enum_values: Vec<EnumValueDefinition>,
    /// Only known through `extend type`: the type is owned by another subschema.
    pub is_extension: bool,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            fields: IndexMap::new(),
            input_fields: IndexMap::new(),
            interfaces: Vec::new(),
            members: Vec::new(),
            enum_values: Vec::new(),
            is_extension: false,
        }
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Object)
    }

    #[must_use]
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }
}

/// The type system of one subschema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDefinition {
    pub query_type: Option<String>,
    pub mutation_type: Option<String>,
    pub subscription_type: Option<String>,
    pub types: IndexMap<String, TypeDefinition>,
}

impl SchemaDefinition {
    pub fn new() -> Self {
        let mut schema = SchemaDefinition::default();
        for scalar in BUILTIN_SCALARS {
            schema.insert_type(TypeDefinition::new(scalar, TypeKind::Scalar));
        }
        schema
    }

    pub fn insert_type(&mut self, definition: TypeDefinition) {
        self.types.insert(definition.name.clone(), definition);
    }

    #[must_use]
    pub fn with_type(mut self, definition: TypeDefinition) -> Self {
        self.insert_type(definition);
        self
    }

    pub fn type_definition(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDefinition> {
        self.types.get(type_name)?.fields.get(field_name)
    }

    pub fn root_type_name(&self, operation_type: OperationType) -> Option<&str> {
        match operation_type {
            OperationType::Query => self.query_type.as_deref(),
            OperationType::Mutation => self.mutation_type.as_deref(),
            OperationType::Subscription => self.subscription_type.as_deref(),
        }
    }

    pub fn root_type(&self, operation_type: OperationType) -> Option<&TypeDefinition> {
        self.root_type_name(operation_type)
            .and_then(|name| self.type_definition(name))
    }

    /// Which operation type, if any, has `type_name` as its root.
    pub fn root_operation_of(&self, type_name: &str) -> Option<OperationType> {
        [OperationType::Query, OperationType::Mutation, OperationType::Subscription]
            .into_iter()
            .find(|operation_type| self.root_type_name(*operation_type) == Some(type_name))
    }

    /// Fills unset root types with the default names when such types exist.
    pub fn resolve_default_root_types(&mut self) {
        for operation_type in [OperationType::Query, OperationType::Mutation, OperationType::Subscription] {
            let default_name = operation_type.default_root_type_name();
            let slot = match operation_type {
                OperationType::Query => &mut self.query_type,
                OperationType::Mutation => &mut self.mutation_type,
                OperationType::Subscription => &mut self.subscription_type,
            };
            if slot.is_none() && self.types.contains_key(default_name) {
                *slot = Some(default_name.to_string());
            }
        }
    }

    /// Object types a value of `type_name` can be at runtime.
    pub fn possible_types(&self, type_name: &str) -> Vec<&str> {
        let Some(definition) = self.types.get(type_name) else {
            return Vec::new();
        };
        match definition.kind {
            TypeKind::Object => vec![definition.name.as_str()],
            TypeKind::Union => definition.members.iter().map(String::as_str).collect(),
            TypeKind::Interface => self
                .types
                .values()
                .filter(|ty| ty.kind == TypeKind::Object && ty.interfaces.iter().any(|name| name == type_name))
                .map(|ty| ty.name.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn type_ref_roundtrip_notation() {
        for notation in ["User", "User!", "[User]", "[User!]!", "[[Int]!]"] {
            let ty = TypeRef::parse(notation).unwrap();
            assert_eq!(ty.to_string(), notation);
        }
        assert!(TypeRef::parse("User!!").is_none());
        assert!(TypeRef::parse("[User").is_none());
        assert!(TypeRef::parse("").is_none());
    }

    #[test]
    fn type_ref_wrappers() {
        let ty = TypeRef::parse("[User!]!").unwrap();
        assert!(ty.is_non_null());
        assert!(ty.is_list());
        assert_eq!(ty.nullable().to_string(), "[User!]");
        assert_eq!(ty.list_item().unwrap().to_string(), "User!");
        assert_eq!(TypeRef::parse("User").unwrap().list_item(), None);
    }

    #[test]
    fn possible_types() {
        let mut node = TypeDefinition::new("Node", TypeKind::Interface);
        node.fields
            .insert("id".into(), FieldDefinition::new("id", TypeRef::named("ID").non_null()));
        let mut user = TypeDefinition::object("User");
        user.interfaces.push("Node".into());
        let mut result = TypeDefinition::new("Result", TypeKind::Union);
        result.members = vec!["User".into(), "Post".into()];

        let schema = SchemaDefinition::new()
            .with_type(node)
            .with_type(user)
            .with_type(TypeDefinition::object("Post"))
            .with_type(result);

        assert_eq!(schema.possible_types("Node"), vec!["User"]);
        assert_eq!(schema.possible_types("Result"), vec!["User", "Post"]);
        assert_eq!(schema.possible_types("User"), vec!["User"]);
        assert!(schema.possible_types("String").is_empty());
    }
}
