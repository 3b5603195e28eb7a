mod common;

use common::init_tracing;
use graphql_stitching::{
    Engine, ExecutorResponse, OperationType, RenameTypes, Request, StitchingConfig, SubschemaConfig, WrapRootField,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use stitching_runtime::test_utils::MockExecutor;

#[tokio::test]
async fn renamed_types_round_trip() {
    init_tracing();
    let inventory = MockExecutor::new(|_| {
        Ok(ExecutorResponse::from_data(json!({
            "topProducts": [{ "__typename": "Product", "upc": "1", "price": 3 }]
        })))
    });
    let engine = Engine::build(
        vec![
            SubschemaConfig::from_sdl(
                "inventory",
                "type Product { upc: ID! price: Int } type Query { topProducts: [Product] }",
                inventory.clone(),
            )
            .unwrap()
            .transform(RenameTypes::with_prefix("Inventory_")),
        ],
        StitchingConfig::default(),
    )
    .unwrap();

    assert!(engine.schema().type_definition("Inventory_Product").is_some());
    assert!(engine.schema().type_definition("Product").is_none());

    let response = engine
        .execute(Request::new(
            "{ topProducts { __typename ... on Inventory_Product { upc price } } }",
        ))
        .await;

    assert_eq!(
        response.to_json(),
        json!({
            "data": { "topProducts": [{ "__typename": "Inventory_Product", "upc": "1", "price": 3 }] }
        })
    );

    let document = &inventory.documents()[0];
    assert!(document.contains("on Product"), "{document}");
    assert!(!document.contains("Inventory_"), "{document}");
}

#[tokio::test]
async fn wrapped_root_fields_round_trip() {
    init_tracing();
    let github = MockExecutor::new(|_| {
        Ok(ExecutorResponse::from_data(json!({
            "repository": { "name": "stitching", "stars": 42 }
        })))
    });
    let engine = Engine::build(
        vec![
            SubschemaConfig::from_sdl(
                "github",
                "type Repository { name: String stars: Int } type Query { repository(name: String!): Repository }",
                github.clone(),
            )
            .unwrap()
            .transform(WrapRootField::new(OperationType::Query, "GitHubQuery", "github")),
        ],
        StitchingConfig::default(),
    )
    .unwrap();

    let response = engine
        .execute(Request::new(r#"{ github { repository(name: "stitching") { name } } }"#))
        .await;

    assert_eq!(
        response.to_json(),
        json!({ "data": { "github": { "repository": { "name": "stitching" } } } })
    );

    let document = &github.documents()[0];
    assert!(document.contains(r#"repository(name: "stitching")"#), "{document}");
    assert!(!document.contains("github"), "{document}");
}
