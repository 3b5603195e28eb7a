//! Coalesces the delegations issued to one subschema within one scheduling tick.
//!
//! The first delegation entering an empty group becomes its leader: it yields once to the
//! scheduler, letting every sibling future enqueue its own operation, then takes the whole
//! group and executes it as a single aliased operation. Root fields of entry `i` are aliased
//! `_{i}_{response key}` and its variables renamed `_{i}_{name}`, so the response splits back
//! by prefix.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use futures_util::future::join_all;
use graphql_stitching_schema::{OperationType, SubschemaId};
use serde_json::{Map, Value as JsonValue};
use stitching_runtime::{
    AbortSignal, Context, ExecutorError, ExecutorRequest, ExecutorResponse, ExecutorResult, GraphqlError, PathSegment,
};
use tokio::sync::oneshot;

use crate::{
    operation::{Operation, Selection, SelectionSet},
    registry::Subschema,
};

type BatchKey = (SubschemaId, OperationType);

struct Entry {
    operation: Operation,
    variables: Map<String, JsonValue>,
    sender: oneshot::Sender<ExecutorResult<ExecutorResponse>>,
}

pub(crate) struct BatchCoordinator {
    groups: Mutex<HashMap<BatchKey, Vec<Entry>>>,
    max_batch_size: usize,
}

impl BatchCoordinator {
    pub(crate) fn new(max_batch_size: usize) -> Self {
        BatchCoordinator {
            groups: Mutex::default(),
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub(crate) async fn enqueue(
        &self,
        subschema: &Subschema,
        operation: Operation,
        variables: Map<String, JsonValue>,
        context: &Context,
        abort: &AbortSignal,
    ) -> ExecutorResult<ExecutorResponse> {
        let key = (subschema.id(), operation.operation_type);
        let (sender, receiver) = oneshot::channel();

        let is_leader = {
            let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
            let group = groups.entry(key).or_default();
            group.push(Entry {
                operation,
                variables,
                sender,
            });
            group.len() == 1
        };

        if is_leader {
            let mut leader = Leader {
                coordinator: self,
                key,
                done: false,
            };
            tokio::task::yield_now().await;
            let entries = leader.take();
            self.dispatch(subschema, entries, context, abort).await;
        }

        receiver.await.unwrap_or_else(|_| {
            Err(ExecutorError::Cancelled {
                subschema: subschema.name().to_string(),
            })
        })
    }

    async fn dispatch(&self, subschema: &Subschema, mut entries: Vec<Entry>, context: &Context, abort: &AbortSignal) {
        if entries.is_empty() {
            return;
        }

        let mut chunks = Vec::new();
        while entries.len() > self.max_batch_size {
            let rest = entries.split_off(self.max_batch_size);
            chunks.push(std::mem::replace(&mut entries, rest));
        }
        chunks.push(entries);

        join_all(
            chunks
                .into_iter()
                .map(|chunk| dispatch_chunk(subschema, chunk, context, abort)),
        )
        .await;
    }
}

/// Removes the group when the leader goes away before dispatching it. The followers' senders
/// are dropped with it and they observe a cancellation.
struct Leader<'a> {
    coordinator: &'a BatchCoordinator,
    key: BatchKey,
    done: bool,
}

impl Leader<'_> {
    fn take(&mut self) -> Vec<Entry> {
        self.done = true;
        self.coordinator
            .groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key)
            .unwrap_or_default()
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.take();
        }
    }
}

async fn dispatch_chunk(subschema: &Subschema, mut chunk: Vec<Entry>, context: &Context, abort: &AbortSignal) {
    if chunk.len() == 1 {
        if let Some(entry) = chunk.pop() {
            let document = entry.operation.to_string();
            tracing::debug!(subschema = %subschema.name(), document, "executing");
            let response = subschema
                .executor()
                .execute(ExecutorRequest {
                    subschema_name: subschema.name_arc(),
                    document,
                    operation_name: entry.operation.name.clone(),
                    variables: entry.variables,
                    context: context.clone(),
                    abort: abort.clone(),
                })
                .await;
            let _ = entry.sender.send(response);
        }
        return;
    }

    let (operation, variables, senders) = combine(chunk);
    let document = operation.to_string();
    tracing::debug!(subschema = %subschema.name(), size = senders.len(), document, "executing batch");

    let response = subschema
        .executor()
        .execute(ExecutorRequest {
            subschema_name: subschema.name_arc(),
            document,
            operation_name: operation.name.clone(),
            variables,
            context: context.clone(),
            abort: abort.clone(),
        })
        .await;

    match response {
        Ok(response) => {
            let responses = split(response, senders.len());
            for (sender, response) in senders.into_iter().zip(responses) {
                let _ = sender.send(Ok(response));
            }
        }
        Err(error) => {
            for sender in senders {
                let _ = sender.send(Err(error.clone()));
            }
        }
    }
}

type Senders = Vec<oneshot::Sender<ExecutorResult<ExecutorResponse>>>;

fn combine(chunk: Vec<Entry>) -> (Operation, Map<String, JsonValue>, Senders) {
    let operation_type = chunk
        .first()
        .map(|entry| entry.operation.operation_type)
        .unwrap_or(OperationType::Query);
    let mut combined = Operation::new(operation_type, SelectionSet::default());
    combined.name = chunk.first().and_then(|entry| entry.operation.name.clone());

    let mut variables = Map::new();
    let mut senders = Vec::with_capacity(chunk.len());

    for (index, entry) in chunk.into_iter().enumerate() {
        let prefix = format!("_{index}_");
        let Entry {
            mut operation,
            variables: entry_variables,
            sender,
        } = entry;

        operation
            .selection_set
            .visit_variables_mut(&mut |name| *name = format!("{prefix}{name}"));
        alias_root_fields(&mut operation.selection_set, &prefix);

        for mut definition in operation.variable_definitions {
            definition.name = format!("{prefix}{}", definition.name);
            combined.variable_definitions.push(definition);
        }
        combined.selection_set.items.extend(operation.selection_set.items);
        variables.extend(
            entry_variables
                .into_iter()
                .map(|(name, value)| (format!("{prefix}{name}"), value)),
        );
        senders.push(sender);
    }

    (combined, variables, senders)
}

fn alias_root_fields(selection_set: &mut SelectionSet, prefix: &str) {
    for selection in &mut selection_set.items {
        match selection {
            Selection::Field(field) => field.alias = Some(format!("{prefix}{}", field.response_key())),
            Selection::InlineFragment(fragment) => alias_root_fields(&mut fragment.selection_set, prefix),
        }
    }
}

/// `_3_user` is `(3, "user")`.
fn parse_alias(key: &str) -> Option<(usize, &str)> {
    let (index, key) = key.strip_prefix('_')?.split_once('_')?;
    Some((index.parse().ok()?, key))
}

/// Splits a combined response back into one response per entry. Errors that cannot be
/// attributed to an entry are given to every entry.
fn split(response: ExecutorResponse, count: usize) -> Vec<ExecutorResponse> {
    let mut data: Vec<Option<Map<String, JsonValue>>> = vec![None; count];
    if let Some(JsonValue::Object(combined)) = response.data {
        data.iter_mut().for_each(|data| *data = Some(Map::new()));
        for (key, value) in combined {
            match parse_alias(&key) {
                Some((index, key)) if index < count => {
                    if let Some(Some(data)) = data.get_mut(index) {
                        data.insert(key.to_string(), value);
                    }
                }
                _ => tracing::debug!(key, "dropping unexpected key of a batched response"),
            }
        }
    }

    let mut errors: Vec<Vec<GraphqlError>> = vec![Vec::new(); count];
    for mut error in response.errors {
        let owner = match error.path.as_mut().and_then(|path| path.first_mut()) {
            Some(PathSegment::Field(key)) => match parse_alias(key) {
                Some((index, original)) if index < count => {
                    *key = original.to_string();
                    Some(index)
                }
                _ => None,
            },
            _ => None,
        };

        match owner {
            Some(index) => errors[index].push(error),
            None => errors.iter_mut().for_each(|errors| errors.push(error.clone())),
        }
    }

    data.into_iter()
        .zip(errors)
        .map(|(data, errors)| ExecutorResponse {
            data: data.map(JsonValue::Object),
            errors,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use stitching_runtime::ErrorPath;

    use super::*;

    fn entry(document: &str, variables: JsonValue) -> (Entry, oneshot::Receiver<ExecutorResult<ExecutorResponse>>) {
        let (sender, receiver) = oneshot::channel();
        let entry = Entry {
            operation: Operation::parse(document, None).unwrap(),
            variables: variables.as_object().cloned().unwrap_or_default(),
            sender,
        };
        (entry, receiver)
    }

    #[test]
    fn combines_entries_with_prefixes() {
        let (first, _first) = entry("query($id: ID!) { userById(id: $id) { id email } }", json!({ "id": "1" }));
        let (second, _second) = entry(
            "query($id: ID!) { user: userById(id: $id) { email } ... on Query { __typename } }",
            json!({ "id": "2" }),
        );

        let (operation, variables, senders) = combine(vec![first, second]);

        insta::assert_snapshot!(
            operation.to_string(),
            @"query($_0_id: ID!, $_1_id: ID!) { _0_userById: userById(id: $_0_id) { id email } _1_user: userById(id: $_1_id) { email } ... on Query { _1___typename: __typename } }"
        );
        assert_eq!(JsonValue::Object(variables), json!({ "_0_id": "1", "_1_id": "2" }));
        assert_eq!(senders.len(), 2);
    }

    #[test]
    fn parses_aliases() {
        assert_eq!(parse_alias("_0_user"), Some((0, "user")));
        assert_eq!(parse_alias("_12___typename"), Some((12, "__typename")));
        assert_eq!(parse_alias("_x_user"), None);
        assert_eq!(parse_alias("user"), None);
    }

    #[test]
    fn splits_data_and_errors() {
        let response = ExecutorResponse {
            data: Some(json!({
                "_0_userById": { "email": "a@example.com" },
                "_1_user": null
            })),
            errors: vec![
                GraphqlError::new("not found").with_path(ErrorPath::new(vec!["_1_user".into()])),
                GraphqlError::new("rate limited"),
            ],
        };

        let responses = split(response, 2);

        assert_eq!(
            responses[0],
            ExecutorResponse {
                data: Some(json!({ "userById": { "email": "a@example.com" } })),
                errors: vec![GraphqlError::new("rate limited")],
            }
        );
        assert_eq!(
            responses[1],
            ExecutorResponse {
                data: Some(json!({ "user": null })),
                errors: vec![
                    GraphqlError::new("not found").with_path(ErrorPath::new(vec!["user".into()])),
                    GraphqlError::new("rate limited"),
                ],
            }
        );
    }

    #[test]
    fn null_data_is_null_for_everyone() {
        let responses = split(ExecutorResponse::from_errors(vec![GraphqlError::new("down")]), 3);
        assert_eq!(responses.len(), 3);
        assert!(responses.iter().all(|response| response.data.is_none() && response.errors.len() == 1));
    }
}
