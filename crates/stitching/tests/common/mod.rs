#![allow(dead_code)]

use graphql_stitching::{
    Engine, ExecutorRequest, ExecutorResponse, MergeTypeConfig, StitchingConfig, SubschemaConfig,
};
use serde_json::{Map, Value, json};
use stitching_runtime::test_utils::MockExecutor;

pub const ACCOUNTS_SDL: &str = r#"
    type User {
        id: ID!
        name: String
    }

    type Query {
        me: User
        user(id: ID!): User
        users: [User]
    }

    type Mutation {
        rename(name: String!): User
    }

    type Subscription {
        userCreated: User
    }
"#;

pub const EMAILS_SDL: &str = r#"
    type User {
        id: ID!
        email: String
    }

    type Query {
        userById(id: ID!): User
    }

    type Mutation {
        setEmail(email: String!): User
    }
"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Users as the accounts subschema returns them, with the `__key_id` merge key the engine asks
/// for next to the caller's fields.
pub fn users() -> Value {
    json!({
        "1": { "id": "1", "__key_id": "1", "name": "Ada" },
        "2": { "id": "2", "__key_id": "2", "name": "Bob" },
        "3": { "id": "3", "__key_id": "3", "name": "Cy" }
    })
}

/// Answers every root field the accounts subschema knows, whatever the document asks for.
pub fn accounts() -> MockExecutor {
    MockExecutor::new(|_| {
        let users = users();
        Ok(ExecutorResponse::from_data(json!({
            "me": users["1"],
            "a": users["1"],
            "b": users["2"],
            "users": [users["1"], users["2"], users["3"]]
        })))
    })
}

/// Resolves every `userById` entrypoint from its hoisted `id` variable, aliased or not:
/// `$userById_id` answers `userById`, `$_1_userById_id` answers `_1_userById`.
pub fn emails() -> MockExecutor {
    MockExecutor::new(|request| Ok(ExecutorResponse::from_data(Value::Object(user_by_id(request)))))
}

pub fn user_by_id(request: &ExecutorRequest) -> Map<String, Value> {
    request
        .variables
        .iter()
        .filter_map(|(name, value)| {
            let response_key = name.strip_suffix("_id").filter(|key| key.ends_with("userById"))?;
            let id = value.as_str()?;
            Some((
                response_key.to_string(),
                json!({ "id": id, "email": format!("{id}@example.com") }),
            ))
        })
        .collect()
}

pub fn engine(accounts: &MockExecutor, emails: &MockExecutor, batch: bool) -> Engine {
    engine_with_config(accounts, emails, batch, StitchingConfig::default())
}

pub fn engine_with_config(accounts: &MockExecutor, emails: &MockExecutor, batch: bool, config: StitchingConfig) -> Engine {
    init_tracing();
    Engine::build(
        vec![
            SubschemaConfig::from_sdl("accounts", ACCOUNTS_SDL, accounts.clone()).unwrap(),
            SubschemaConfig::from_sdl("emails", EMAILS_SDL, emails.clone())
                .unwrap()
                .merge("User", MergeTypeConfig::by_key("id", "userById", "id"))
                .batch(batch),
        ],
        config,
    )
    .unwrap()
}
