//! Static half of schema stitching: a model for the type system of each subschema, and the
//! merge that turns N of them into one logical type system.
//!
//! ```
//! use graphql_stitching_schema::{merge, MergeOptions, MergeTypeConfig, SchemaDefinition, SubschemaSource};
//! use indexmap::IndexMap;
//!
//! let accounts = SchemaDefinition::from_sdl("type User { id: ID! name: String } type Query { user: User }").unwrap();
//! let emails = SchemaDefinition::from_sdl("type User { id: ID! email: String } type Query { userById(id: ID!): User }").unwrap();
//! let emails_merge = IndexMap::from([("User".to_owned(), MergeTypeConfig::by_key("id", "userById", "id"))]);
//!
//! let merged = merge(
//!     &[
//!         SubschemaSource::new("accounts", &accounts),
//!         SubschemaSource::new("emails", &emails).with_merge(&emails_merge),
//!     ],
//!     &MergeOptions::default(),
//! )
//! .into_result()
//! .unwrap();
//!
//! assert_eq!(merged.field("User", "email").unwrap().owners.len(), 1);
//! ```

mod compose;
mod definition;
mod diagnostics;
mod ingest;
mod merge_config;
mod merged;
mod result;

pub use compose::{MergeOptions, SubschemaSource, TypeConflictStrategy, merge};
pub use definition::{
    EnumValueDefinition, FieldDefinition, InputValueDefinition, OperationType, SchemaDefinition, TypeDefinition,
    TypeKind, TypeRef, Wrapper,
};
pub use diagnostics::Diagnostics;
pub use ingest::IngestError;
pub use merge_config::{ArgsFromKeysFn, KeyField, KeyFn, KeySelection, MergeTypeConfig};
pub use merged::{MergeTarget, MergedField, MergedSchema, MergedType, SubschemaId, TypeSource};
pub use result::{CompositionResult, ConflictError};
