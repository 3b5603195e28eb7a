mod common;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use common::*;
use graphql_stitching::{
    Engine, Executor, ExecutorError, ExecutorRequest, ExecutorResponse, MergeTypeConfig, Operation, Request,
    StitchingConfig, SubschemaConfig,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use stitching_runtime::test_utils::MockExecutor;

#[tokio::test]
async fn completes_objects_from_another_subschema() {
    let (accounts, emails) = (accounts(), emails());
    let engine = engine(&accounts, &emails, true);

    let response = engine.execute(Request::new("{ me { id name email } }")).await;

    assert_eq!(
        response.to_json(),
        json!({ "data": { "me": { "id": "1", "name": "Ada", "email": "1@example.com" } } })
    );
    assert_eq!(accounts.invocations(), 1);
    assert_eq!(emails.invocations(), 1);

    let documents = emails.documents();
    assert!(documents[0].contains("userById(id: $userById_id)"), "{documents:?}");
    assert!(!accounts.documents()[0].contains("email"));
}

#[tokio::test]
async fn key_fields_are_fetched_but_not_returned() {
    let (accounts, emails) = (accounts(), emails());
    let engine = engine(&accounts, &emails, true);

    let response = engine.execute(Request::new("{ me { email } }")).await;

    assert_eq!(response.to_json(), json!({ "data": { "me": { "email": "1@example.com" } } }));
    assert!(accounts.documents()[0].contains("id"));
}

#[tokio::test]
async fn fields_of_a_single_subschema_need_no_follow_up() {
    let (accounts, emails) = (accounts(), emails());
    let engine = engine(&accounts, &emails, true);

    let response = engine.execute(Request::new("{ me { name } }")).await;

    assert_eq!(response.to_json(), json!({ "data": { "me": { "name": "Ada" } } }));
    assert_eq!(emails.invocations(), 0);
}

#[tokio::test]
async fn merge_keys_are_not_read_from_the_caller_aliases() {
    let accounts = MockExecutor::new(|_| {
        Ok(ExecutorResponse::from_data(
            json!({ "me": { "id": "Ada", "__key_id": "1" } }),
        ))
    });
    let emails = emails();
    let engine = engine(&accounts, &emails, true);

    let response = engine.execute(Request::new("{ me { id: name email } }")).await;

    assert_eq!(
        response.to_json(),
        json!({ "data": { "me": { "id": "Ada", "email": "1@example.com" } } })
    );

    let document = &accounts.documents()[0];
    assert!(document.contains("id: name"), "{document}");
    assert!(document.contains("__key_id: id"), "{document}");
    assert_eq!(emails.requests()[0].variables["userById_id"], json!("1"));
}

#[tokio::test]
async fn null_merge_keys_are_reported() {
    let accounts = MockExecutor::new(|_| {
        Ok(ExecutorResponse::from_data(
            json!({ "me": { "__key_id": null, "name": "Ada" } }),
        ))
    });
    let emails = emails();
    let engine = engine(&accounts, &emails, true);

    let response = engine.execute(Request::new("{ me { name email } }")).await;

    assert_eq!(emails.invocations(), 0);
    assert_eq!(response.data_json(), json!({ "me": { "name": "Ada", "email": null } }));
    assert_eq!(response.errors.len(), 1);

    let error = &response.errors[0];
    assert_eq!(error.code(), Some("PENDING_RESOLUTION_ERROR"));
    assert_eq!(error.path.as_ref().map(ToString::to_string).as_deref(), Some("me.email"));
}

#[tokio::test]
async fn failed_delegation_nulls_the_missing_fields() {
    let accounts = accounts();
    let emails = MockExecutor::new(|_| Err(ExecutorError::transport("connection refused")));
    let engine = engine(&accounts, &emails, true);

    let response = engine.execute(Request::new("{ me { name email } }")).await;

    assert_eq!(response.data_json(), json!({ "me": { "name": "Ada", "email": null } }));
    assert_eq!(response.errors.len(), 1);

    let error = &response.errors[0];
    assert_eq!(error.code(), Some("DELEGATION_ERROR"));
    assert_eq!(error.path.as_ref().map(ToString::to_string).as_deref(), Some("me"));
    assert!(error.message.contains("connection refused"), "{}", error.message);
}

#[tokio::test]
async fn failed_root_delegation_nulls_the_root_fields() {
    let accounts = MockExecutor::new(|_| Err(ExecutorError::transport("connection refused")));
    let emails = emails();
    let engine = engine(&accounts, &emails, true);

    let response = engine.execute(Request::new("{ me { name email } }")).await;

    assert_eq!(response.data_json(), json!({ "me": null }));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].code(), Some("DELEGATION_ERROR"));
    assert_eq!(emails.invocations(), 0);
}

#[tokio::test]
async fn subschema_errors_are_rebased_onto_the_object() {
    let accounts = accounts();
    let emails = MockExecutor::new(|_| {
        Ok(serde_json::from_value::<ExecutorResponse>(json!({
            "data": { "userById": { "id": "1", "email": null } },
            "errors": [{ "message": "mailbox locked", "path": ["userById", "email"] }]
        }))
        .unwrap())
    });
    let engine = engine(&accounts, &emails, true);

    let response = engine.execute(Request::new("{ me { name email } }")).await;

    assert_eq!(
        response.to_json(),
        json!({
            "data": { "me": { "name": "Ada", "email": null } },
            "errors": [{ "message": "mailbox locked", "path": ["me", "email"] }]
        })
    );
}

#[tokio::test]
async fn cancellation_keeps_partial_data() {
    let accounts = MockExecutor::new(|request| {
        request.abort.abort();
        Ok(ExecutorResponse::from_data(json!({ "me": { "__key_id": "1", "name": "Ada" } })))
    });
    let emails = emails();
    let engine = engine(&accounts, &emails, true);

    let response = engine.execute(Request::new("{ me { name email } }")).await;

    assert_eq!(emails.invocations(), 0);
    assert_eq!(response.data_json(), json!({ "me": { "name": "Ada", "email": null } }));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].code(), Some("CANCELLED"));
}

#[tokio::test]
async fn resolution_rounds_are_bounded() {
    let (accounts, emails) = (accounts(), emails());
    let config = StitchingConfig {
        max_resolution_rounds: 0,
        ..Default::default()
    };
    let engine = engine_with_config(&accounts, &emails, true, config);

    let response = engine.execute(Request::new("{ me { name email } }")).await;

    assert_eq!(emails.invocations(), 0);
    assert_eq!(response.data_json(), json!({ "me": { "name": "Ada", "email": null } }));
    insta::assert_json_snapshot!(response.errors, @r#"
    [
      {
        "message": "Too many resolution rounds: cannot resolve `User.email`",
        "path": [
          "me",
          "email"
        ],
        "extensions": {
          "code": "PENDING_RESOLUTION_ERROR"
        }
      }
    ]
    "#);
}

#[tokio::test]
async fn fields_without_merge_target_are_reported() {
    init_tracing();
    let (accounts, emails) = (accounts(), emails());
    let engine = Engine::build(
        vec![
            SubschemaConfig::from_sdl("accounts", ACCOUNTS_SDL, accounts.clone()).unwrap(),
            SubschemaConfig::from_sdl("emails", EMAILS_SDL, emails.clone()).unwrap(),
        ],
        StitchingConfig::default(),
    )
    .unwrap();

    let response = engine.execute(Request::new("{ me { name email } }")).await;

    assert_eq!(emails.invocations(), 0);
    assert_eq!(response.data_json(), json!({ "me": { "name": "Ada", "email": null } }));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].code(), Some("PENDING_RESOLUTION_ERROR"));
    assert_eq!(
        response.errors[0].message,
        "No subschema can complete this object: cannot resolve `User.email`"
    );
}

#[tokio::test]
async fn entrypoints_taking_all_keys_at_once() {
    init_tracing();
    let accounts = accounts();
    let emails = MockExecutor::new(|request| {
        let users = request.variables["usersByIds_ids"]
            .as_array()
            .unwrap()
            .iter()
            .map(|id| json!({ "id": id, "email": format!("{}@example.com", id.as_str().unwrap()) }))
            .collect::<Vec<_>>();
        Ok(ExecutorResponse::from_data(json!({ "usersByIds": users })))
    });
    let engine = Engine::build(
        vec![
            SubschemaConfig::from_sdl("accounts", ACCOUNTS_SDL, accounts.clone()).unwrap(),
            SubschemaConfig::from_sdl(
                "emails",
                "type User { id: ID! email: String } type Query { usersByIds(ids: [ID!]!): [User]! }",
                emails.clone(),
            )
            .unwrap()
            .merge("User", MergeTypeConfig::by_keys("id", "usersByIds", "ids")),
        ],
        StitchingConfig::default(),
    )
    .unwrap();

    let response = engine.execute(Request::new("{ users { name email } }")).await;

    assert_eq!(
        response.data_json(),
        json!({
            "users": [
                { "name": "Ada", "email": "1@example.com" },
                { "name": "Bob", "email": "2@example.com" },
                { "name": "Cy", "email": "3@example.com" }
            ]
        })
    );
    assert_eq!(emails.invocations(), 1);
    assert_eq!(emails.requests()[0].variables["usersByIds_ids"], json!(["1", "2", "3"]));
}

#[tokio::test]
async fn mutation_root_fields_run_in_order() {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));

    let accounts = MockExecutor::new({
        let log = Arc::clone(&log);
        move |request| {
            let key = if request.document.contains("first:") { "first" } else { "third" };
            log.lock().unwrap().push(key);
            let mut data = serde_json::Map::new();
            data.insert(key.to_string(), json!({ "id": "1", "name": key }));
            Ok(ExecutorResponse::from_data(data.into()))
        }
    });
    let emails = MockExecutor::new({
        let log = Arc::clone(&log);
        move |_| {
            log.lock().unwrap().push("second");
            Ok(ExecutorResponse::from_data(
                json!({ "second": { "id": "1", "email": "new@example.com" } }),
            ))
        }
    });
    let engine = engine(&accounts, &emails, true);

    let response = engine
        .execute(Request::new(
            r#"mutation {
                first: rename(name: "first") { name }
                second: setEmail(email: "new@example.com") { email }
                third: rename(name: "third") { name }
            }"#,
        ))
        .await;

    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    assert_eq!(
        response.data_json(),
        json!({
            "first": { "name": "first" },
            "second": { "email": "new@example.com" },
            "third": { "name": "third" }
        })
    );
}

#[tokio::test]
async fn unknown_root_fields_are_rejected() {
    let (accounts, emails) = (accounts(), emails());
    let engine = engine(&accounts, &emails, true);

    let response = engine.execute(Request::new("{ nope }")).await;

    assert_eq!(response.data, None);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(accounts.invocations(), 0);
}

#[tokio::test]
async fn variables_and_operation_name_are_forwarded() {
    let (accounts, emails) = (accounts(), emails());
    let engine = engine(&accounts, &emails, true);

    let response = engine
        .execute(
            Request::new("query Other { me { name } } query Named($id: ID!) { user(id: $id) { name } }")
                .operation_name("Named")
                .variables(json!({ "id": "2" })),
        )
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let request = &accounts.requests()[0];
    assert_eq!(request.operation_name.as_deref(), Some("Named"));
    assert_eq!(request.variables["id"], json!("2"));
}

#[tokio::test]
async fn parsed_operations_skip_the_document() {
    let (accounts, emails) = (accounts(), emails());
    let engine = engine(&accounts, &emails, true);

    let operation = Operation::parse("query Me { me { name email } }", None).unwrap();
    let request = Request::from_operation(operation);
    assert!(request.document.is_empty());

    let response = engine.execute(request).await;

    assert_eq!(
        response.to_json(),
        json!({ "data": { "me": { "name": "Ada", "email": "1@example.com" } } })
    );
    assert_eq!(accounts.requests()[0].operation_name.as_deref(), Some("Me"));
}

struct Slow;

#[async_trait::async_trait]
impl Executor for Slow {
    async fn execute(&self, _: ExecutorRequest) -> Result<ExecutorResponse, ExecutorError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(ExecutorResponse::default())
    }
}

#[tokio::test(start_paused = true)]
async fn slow_subschemas_time_out() {
    init_tracing();
    let accounts = accounts();
    let engine = Engine::build(
        vec![
            SubschemaConfig::from_sdl("accounts", ACCOUNTS_SDL, accounts.clone()).unwrap(),
            SubschemaConfig::from_sdl("emails", EMAILS_SDL, Slow)
                .unwrap()
                .merge("User", MergeTypeConfig::by_key("id", "userById", "id"))
                .timeout(Duration::from_millis(100)),
        ],
        StitchingConfig::default(),
    )
    .unwrap();

    let response = engine.execute(Request::new("{ me { name email } }")).await;

    assert_eq!(response.data_json(), json!({ "me": { "name": "Ada", "email": null } }));
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].message.contains("timed out"), "{}", response.errors[0].message);
}
