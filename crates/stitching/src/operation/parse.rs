use std::collections::HashMap;

use cynic_parser::{ConstValue, common::WrappingType, executable as ast};
use graphql_stitching_schema::{OperationType, TypeRef, Wrapper};

use super::{Argument, Directive, Field, InlineFragment, Operation, Selection, SelectionSet, Value, VariableDefinition};
use crate::OperationError;

impl Operation {
    /// Reads the operation named `operation_name` from `document`, or its only operation.
    /// Fragment spreads are replaced by inline fragments.
    pub fn parse(document: &str, operation_name: Option<&str>) -> Result<Operation, OperationError> {
        let document =
            cynic_parser::parse_executable_document(document).map_err(|err| OperationError::Parse(err.to_string()))?;

        let operation = match operation_name {
            Some(name) => document
                .operations()
                .find(|operation| operation.name() == Some(name))
                .ok_or_else(|| OperationError::UnknownOperation(name.to_string()))?,
            None => {
                let mut operations = document.operations();
                let operation = operations.next().ok_or(OperationError::NoOperation)?;
                if operations.next().is_some() {
                    return Err(OperationError::MissingOperationName);
                }
                operation
            }
        };

        let mut builder = Builder {
            fragments: document.fragments().map(|fragment| (fragment.name(), fragment)).collect(),
            spread_stack: Vec::new(),
        };

        let operation_type = match operation.operation_type() {
            cynic_parser::common::OperationType::Query => OperationType::Query,
            cynic_parser::common::OperationType::Mutation => OperationType::Mutation,
            cynic_parser::common::OperationType::Subscription => OperationType::Subscription,
        };

        Ok(Operation {
            operation_type,
            name: operation.name().map(str::to_string),
            variable_definitions: operation
                .variable_definitions()
                .map(|definition| VariableDefinition {
                    name: definition.name().to_string(),
                    ty: TypeRef::from_parts(
                        definition.ty().name(),
                        definition
                            .ty()
                            .wrappers()
                            .map(|wrapper| match wrapper {
                                WrappingType::NonNull => Wrapper::NonNull,
                                WrappingType::List => Wrapper::List,
                            })
                            .collect(),
                    ),
                    default_value: definition.default_value().map(const_value),
                })
                .collect(),
            directives: directives(operation.directives()),
            selection_set: builder.selection_set(operation.selection_set())?,
        })
    }
}

struct Builder<'a> {
    fragments: HashMap<&'a str, ast::FragmentDefinition<'a>>,
    spread_stack: Vec<&'a str>,
}

impl<'a> Builder<'a> {
    fn selection_set(&mut self, selections: ast::Iter<'a, ast::Selection<'a>>) -> Result<SelectionSet, OperationError> {
        let mut items = Vec::new();

        for selection in selections {
            let selection = match selection {
                ast::Selection::Field(field) => Selection::Field(Field {
                    alias: field.alias().map(str::to_string),
                    name: field.name().to_string(),
                    arguments: arguments(field.arguments()),
                    directives: directives(field.directives()),
                    selection_set: self.selection_set(field.selection_set())?,
                }),
                ast::Selection::InlineFragment(fragment) => Selection::InlineFragment(InlineFragment {
                    type_condition: fragment.type_condition().map(str::to_string),
                    directives: directives(fragment.directives()),
                    selection_set: self.selection_set(fragment.selection_set())?,
                }),
                ast::Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name();
                    let Some(fragment) = self.fragments.get(name).copied() else {
                        return Err(OperationError::UnknownFragment(name.to_string()));
                    };
                    if self.spread_stack.contains(&name) {
                        return Err(OperationError::FragmentCycle(name.to_string()));
                    }

                    self.spread_stack.push(name);
                    let selection_set = self.selection_set(fragment.selection_set())?;
                    self.spread_stack.pop();

                    Selection::InlineFragment(InlineFragment {
                        type_condition: Some(fragment.type_condition().to_string()),
                        directives: directives(spread.directives()),
                        selection_set,
                    })
                }
            };
            items.push(selection);
        }

        Ok(SelectionSet { items })
    }
}

fn arguments<'a>(arguments: impl Iterator<Item = ast::Argument<'a>>) -> Vec<Argument> {
    arguments
        .map(|argument| Argument {
            name: argument.name().to_string(),
            value: value(argument.value()),
        })
        .collect()
}

fn directives<'a>(directives: impl Iterator<Item = ast::Directive<'a>>) -> Vec<Directive> {
    directives
        .map(|directive| Directive {
            name: directive.name().to_string(),
            arguments: arguments(directive.arguments()),
        })
        .collect()
}

fn value(input: cynic_parser::Value<'_>) -> Value {
    match input {
        cynic_parser::Value::Variable(variable) => Value::Variable(variable.name().to_string()),
        cynic_parser::Value::Int(n) => Value::Int(n.as_i64()),
        cynic_parser::Value::Float(n) => Value::Float(n.as_f64()),
        cynic_parser::Value::String(s) => Value::String(s.as_str().to_string()),
        cynic_parser::Value::Boolean(b) => Value::Boolean(b.value()),
        cynic_parser::Value::Null(_) => Value::Null,
        cynic_parser::Value::Enum(e) => Value::Enum(e.name().to_string()),
        cynic_parser::Value::List(list) => Value::List(list.items().map(value).collect()),
        cynic_parser::Value::Object(object) => Value::Object(
            object
                .fields()
                .map(|field| (field.name().to_string(), value(field.value())))
                .collect(),
        ),
    }
}

fn const_value(input: ConstValue<'_>) -> Value {
    match input {
        ConstValue::Int(n) => Value::Int(n.as_i64()),
        ConstValue::Float(n) => Value::Float(n.as_f64()),
        ConstValue::String(s) => Value::String(s.as_str().to_string()),
        ConstValue::Boolean(b) => Value::Boolean(b.value()),
        ConstValue::Null(_) => Value::Null,
        ConstValue::Enum(e) => Value::Enum(e.name().to_string()),
        ConstValue::List(list) => Value::List(list.items().map(const_value).collect()),
        ConstValue::Object(object) => Value::Object(
            object
                .fields()
                .map(|field| (field.name().to_string(), const_value(field.value())))
                .collect(),
        ),
    }
}
