use std::{fmt, sync::Arc};

use serde_json::{Map, Value};

/// Computes the key of an object from the fields selected by the key selection.
pub type KeyFn = Arc<dyn Fn(&Map<String, Value>) -> Value + Send + Sync>;

/// Builds the entrypoint arguments for a set of keys.
pub type ArgsFromKeysFn = Arc<dyn Fn(&[Value]) -> Map<String, Value> + Send + Sync>;

/// How to complete a partially resolved object of one type from one subschema.
#[derive(Clone)]
pub struct MergeTypeConfig {
    /// Fields required to compute the key, e.g. `"id"` or `"{ id organization { id } }"`.
    pub selection_set: String,
    /// Root query field of the subschema used to fetch objects by key.
    pub field_name: String,
    /// The entrypoint takes all keys at once and returns a list aligned with them.
    pub returns_list: bool,
    /// This subschema's definition of the type wins for metadata and routing.
    pub canonical: bool,
    key: Option<KeyFn>,
    args_from_keys: ArgsFromKeysFn,
}

impl MergeTypeConfig {
    /// Entrypoint taking a single key through `argument_name`, e.g. `userById(id: ID!): User`.
    /// Several objects fetched in the same tick are coalesced by aliasing.
    pub fn by_key(selection_set: impl Into<String>, field_name: impl Into<String>, argument_name: &str) -> Self {
        let argument_name = argument_name.to_string();
        Self {
            selection_set: selection_set.into(),
            field_name: field_name.into(),
            returns_list: false,
            canonical: false,
            key: None,
            args_from_keys: Arc::new(move |keys| {
                let mut arguments = Map::new();
                arguments.insert(argument_name.clone(), keys.first().cloned().unwrap_or_default());
                arguments
            }),
        }
    }

    /// Entrypoint taking all keys as a list through `argument_name` and returning a list aligned
    /// with it, e.g. `usersByIds(ids: [ID!]!): [User]!`.
    pub fn by_keys(selection_set: impl Into<String>, field_name: impl Into<String>, argument_name: &str) -> Self {
        let argument_name = argument_name.to_string();
        Self {
            selection_set: selection_set.into(),
            field_name: field_name.into(),
            returns_list: true,
            canonical: false,
            key: None,
            args_from_keys: Arc::new(move |keys| {
                let mut arguments = Map::new();
                arguments.insert(argument_name.clone(), Value::Array(keys.to_vec()));
                arguments
            }),
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Fn(&Map<String, Value>) -> Value + Send + Sync + 'static) -> Self {
        self.key = Some(Arc::new(key));
        self
    }

    #[must_use]
    pub fn with_args_from_keys(
        mut self,
        args_from_keys: impl Fn(&[Value]) -> Map<String, Value> + Send + Sync + 'static,
    ) -> Self {
        self.args_from_keys = Arc::new(args_from_keys);
        self
    }

    #[must_use]
    pub fn canonical(mut self) -> Self {
        self.canonical = true;
        self
    }

    /// The key of an object, given its key fields as returned by [KeySelection::key_fields].
    /// Without a custom key function, the fields are projected through the key selection, and a
    /// selection of a single leaf field yields that field's bare value.
    pub fn key(&self, object: &Map<String, Value>, selection: &KeySelection) -> Value {
        match &self.key {
            Some(key) => key(object),
            None => selection.default_key(object),
        }
    }

    pub fn args_from_keys(&self, keys: &[Value]) -> Map<String, Value> {
        (self.args_from_keys)(keys)
    }
}

impl fmt::Debug for MergeTypeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeTypeConfig")
            .field("selection_set", &self.selection_set)
            .field("field_name", &self.field_name)
            .field("returns_list", &self.returns_list)
            .field("canonical", &self.canonical)
            .field("custom_key", &self.key.is_some())
            .finish_non_exhaustive()
    }
}

/// Parsed form of [MergeTypeConfig::selection_set].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySelection {
    pub fields: Vec<KeyField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyField {
    pub name: String,
    pub subselection: KeySelection,
}

/// Prefix of the response keys under which key fields are fetched from subschemas.
const KEY_ALIAS_PREFIX: &str = "__key_";

impl KeySelection {
    /// Response key under which the top-level key field `field_name` is fetched, so that it
    /// never collides with a field the caller selected.
    pub fn alias(field_name: &str) -> String {
        format!("{KEY_ALIAS_PREFIX}{field_name}")
    }

    pub fn parse(selection_set: &str) -> Result<KeySelection, String> {
        use cynic_parser::executable as ast;

        let trimmed = selection_set.trim();
        let document = if trimmed.starts_with('{') {
            trimmed.to_string()
        } else {
            format!("{{ {trimmed} }}")
        };

        let parsed = cynic_parser::parse_executable_document(&document)
            .map_err(|err| format!("could not parse the key selection `{trimmed}`: {err}"))?;

        let Some(operation) = parsed.operations().next() else {
            return Err(format!("the key selection `{trimmed}` must be a selection set"));
        };

        fn build<'a>(selections: ast::Iter<'a, ast::Selection<'a>>) -> Result<KeySelection, String> {
            let fields = selections
                .map(|selection| match selection {
                    ast::Selection::Field(field) => {
                        if field.alias().is_some() || field.arguments().next().is_some() {
                            return Err("aliases and arguments are not allowed".to_string());
                        }
                        Ok(KeyField {
                            name: field.name().to_string(),
                            subselection: build(field.selection_set())?,
                        })
                    }
                    _ => Err("fragments are not allowed".to_string()),
                })
                .collect::<Result<Vec<_>, String>>()?;
            Ok(KeySelection { fields })
        }

        let selection = build(operation.selection_set())
            .map_err(|err| format!("the key selection `{trimmed}` is invalid: {err}"))?;

        if selection.fields.is_empty() {
            return Err(format!("the key selection `{trimmed}` is empty"));
        }

        Ok(selection)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Projects `object` through this selection.
    pub fn project(&self, object: &Map<String, Value>) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|field| {
                let value = object.get(&field.name).cloned().unwrap_or_default();
                (field.name.clone(), field.subselection.project_value(value))
            })
            .collect()
    }

    fn project_value(&self, value: Value) -> Value {
        if self.is_empty() {
            return value;
        }
        match value {
            Value::Object(object) => Value::Object(self.project(&object)),
            Value::Array(items) => Value::Array(items.into_iter().map(|item| self.project_value(item)).collect()),
            other => other,
        }
    }

    fn default_key(&self, object: &Map<String, Value>) -> Value {
        match self.fields.as_slice() {
            [field] if field.subselection.is_empty() => object.get(&field.name).cloned().unwrap_or_default(),
            _ => Value::Object(self.project(object)),
        }
    }

    /// The key fields of a response object, read from their [aliases](KeySelection::alias) and
    /// named after the fields. Fields that were not fetched are left out.
    pub fn key_fields(&self, object: &Map<String, Value>) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|field| {
                let value = object.get(&Self::alias(&field.name))?;
                Some((field.name.clone(), value.clone()))
            })
            .collect()
    }

    /// Whether every selected leaf is present and non-null in `key_fields`. A key cannot be
    /// computed otherwise.
    pub fn is_satisfied_by(&self, key_fields: &Map<String, Value>) -> bool {
        self.fields.iter().all(|field| match key_fields.get(&field.name) {
            None | Some(Value::Null) => false,
            Some(Value::Object(inner)) if !field.subselection.is_empty() => field.subselection.is_satisfied_by(inner),
            Some(_) => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(object) => object,
            _ => unreachable!(),
        }
    }

    #[test]
    fn parse_bare_and_braced() {
        let bare = KeySelection::parse("id").unwrap();
        let braced = KeySelection::parse("{ id }").unwrap();
        assert_eq!(bare, braced);

        let nested = KeySelection::parse("id organization { id }").unwrap();
        assert_eq!(nested.fields.len(), 2);
        assert_eq!(nested.fields[1].subselection.fields[0].name, "id");
    }

    #[test]
    fn parse_rejects_fragments_and_arguments() {
        assert!(KeySelection::parse("... on User { id }").is_err());
        assert!(KeySelection::parse("id(format: 1)").is_err());
        assert!(KeySelection::parse("").is_err());
    }

    #[test]
    fn default_key_single_field() {
        let config = MergeTypeConfig::by_key("id", "userById", "id");
        let selection = KeySelection::parse(&config.selection_set).unwrap();
        let user = object(json!({ "id": "1", "name": "Ada" }));
        assert_eq!(config.key(&user, &selection), json!("1"));
        assert_eq!(config.args_from_keys(&[json!("1")]), object(json!({ "id": "1" })));
    }

    #[test]
    fn default_key_composite() {
        let config = MergeTypeConfig::by_keys("id organization { id }", "users", "keys");
        let selection = KeySelection::parse(&config.selection_set).unwrap();
        let user = object(json!({ "id": "1", "name": "Ada", "organization": { "id": "o", "name": "x" } }));
        let key = config.key(&user, &selection);
        assert_eq!(key, json!({ "id": "1", "organization": { "id": "o" } }));
        assert_eq!(
            config.args_from_keys(&[key.clone(), key.clone()]),
            object(json!({ "keys": [key.clone(), key] }))
        );
    }

    #[test]
    fn custom_key() {
        let config = MergeTypeConfig::by_key("id", "userById", "id").with_key(|object| object["id"].clone());
        let selection = KeySelection::parse("id").unwrap();
        assert_eq!(config.key(&object(json!({ "id": 3 })), &selection), json!(3));
    }

    #[test]
    fn satisfied() {
        let selection = KeySelection::parse("id organization { id }").unwrap();
        assert!(selection.is_satisfied_by(&object(json!({ "id": 1, "organization": { "id": 2 } }))));
        assert!(!selection.is_satisfied_by(&object(json!({ "id": 1 }))));
        assert!(!selection.is_satisfied_by(&object(json!({ "id": 1, "organization": {} }))));
    }

    #[test]
    fn null_key_leaves_are_not_satisfied() {
        let selection = KeySelection::parse("id organization { id }").unwrap();
        assert!(!selection.is_satisfied_by(&object(json!({ "id": null, "organization": { "id": 2 } }))));
        assert!(!selection.is_satisfied_by(&object(json!({ "id": 1, "organization": { "id": null } }))));
        assert!(!selection.is_satisfied_by(&object(json!({ "id": 1, "organization": null }))));
    }

    #[test]
    fn key_fields_are_read_from_their_aliases() {
        let selection = KeySelection::parse("id organization { id }").unwrap();
        let response = object(json!({
            "id": "caller's own",
            "__key_id": "1",
            "__key_organization": { "id": "o" }
        }));

        let key_fields = selection.key_fields(&response);

        assert_eq!(Value::Object(key_fields.clone()), json!({ "id": "1", "organization": { "id": "o" } }));
        assert!(selection.is_satisfied_by(&key_fields));
        assert!(!selection.is_satisfied_by(&selection.key_fields(&object(json!({ "id": "1" })))));
    }
}
