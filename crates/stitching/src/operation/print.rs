use std::fmt::{self, Write};

use super::{Argument, Directive, Field, InlineFragment, Operation, Selection, SelectionSet, Value, VariableDefinition};

/// Compact single-line rendering, e.g. `query($id: ID!) { user(id: $id) { name } }`.
impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation_type.as_ref())?;

        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }

        if !self.variable_definitions.is_empty() {
            f.write_char('(')?;
            for (i, definition) in self.variable_definitions.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{definition}")?;
            }
            f.write_char(')')?;
        }

        write_directives(f, &self.directives)?;
        write!(f, " {}", self.selection_set)
    }
}

impl fmt::Display for VariableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}: {}", self.name, self.ty)?;
        if let Some(default_value) = &self.default_value {
            write!(f, " = {default_value}")?;
        }
        Ok(())
    }
}

impl fmt::Display for SelectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('{')?;
        for selection in &self.items {
            match selection {
                Selection::Field(field) => write!(f, " {field}")?,
                Selection::InlineFragment(fragment) => write!(f, " {fragment}")?,
            }
        }
        f.write_str(" }")
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(alias) = &self.alias {
            write!(f, "{alias}: ")?;
        }
        f.write_str(&self.name)?;
        write_arguments(f, &self.arguments)?;
        write_directives(f, &self.directives)?;
        if !self.selection_set.is_empty() {
            write!(f, " {}", self.selection_set)?;
        }
        Ok(())
    }
}

impl fmt::Display for InlineFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("...")?;
        if let Some(type_condition) = &self.type_condition {
            write!(f, " on {type_condition}")?;
        }
        write_directives(f, &self.directives)?;
        write!(f, " {}", self.selection_set)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) if value.fract() == 0.0 && value.is_finite() => write!(f, "{value:.1}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::String(value) => {
                let quoted = serde_json::to_string(value).map_err(|_| fmt::Error)?;
                f.write_str(&quoted)
            }
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Enum(value) => f.write_str(value),
            Value::List(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_char(']')
            }
            Value::Object(fields) => {
                f.write_char('{')?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_char('}')
            }
            Value::Variable(name) => write!(f, "${name}"),
        }
    }
}

fn write_arguments(f: &mut fmt::Formatter<'_>, arguments: &[Argument]) -> fmt::Result {
    if arguments.is_empty() {
        return Ok(());
    }

    f.write_char('(')?;
    for (i, argument) in arguments.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}: {}", argument.name, argument.value)?;
    }
    f.write_char(')')
}

fn write_directives(f: &mut fmt::Formatter<'_>, directives: &[Directive]) -> fmt::Result {
    for directive in directives {
        write!(f, " @{}", directive.name)?;
        write_arguments(f, &directive.arguments)?;
    }
    Ok(())
}
