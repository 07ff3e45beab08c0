// SPDX-License-Identifier: MIT

//! Variable substitution over query text
//!
//! `@name` tokens followed by whitespace are replaced per variable, in list
//! order. Resource variables are left untouched: resource injection happens
//! out-of-band in the skill layer.

use crate::canvas::types::{VariableType, VariableValueType, WorkflowVariable};

/// Apply variable substitution to free-text query
pub fn substitute_variables(query: &str, variables: &[WorkflowVariable]) -> String {
    let mut processed = query.to_string();
    for variable in variables {
        if variable.variable_type == VariableType::Resource {
            continue;
        }
        let joined = variable
            .values
            .iter()
            .filter(|v| v.value_type == VariableValueType::Text)
            .filter_map(|v| v.text.as_deref())
            .collect::<Vec<_>>()
            .join(", ");
        processed = replace_token(&processed, &variable.name, &joined);
    }
    processed
}

/// Replace every `@name` token followed by one whitespace character with the
/// value and a single trailing space. A missing value collapses the token,
/// retaining one space.
fn replace_token(query: &str, name: &str, value: &str) -> String {
    let token = format!("@{}", name);
    let mut out = String::with_capacity(query.len());
    let mut rest = query;

    while let Some(pos) = rest.find(&token) {
        let after = &rest[pos + token.len()..];
        match after.chars().next() {
            Some(c) if c.is_whitespace() => {
                out.push_str(&rest[..pos]);
                if !value.is_empty() {
                    out.push_str(value);
                }
                out.push(' ');
                rest = &after[c.len_utf8()..];
            }
            _ => {
                // Not a token boundary (e.g. @names for variable name)
                out.push_str(&rest[..pos + token.len()]);
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::types::{ResourceRef, VariableValue};

    fn string_var(name: &str, texts: &[&str]) -> WorkflowVariable {
        WorkflowVariable {
            name: name.to_string(),
            variable_type: VariableType::String,
            values: texts.iter().map(|t| VariableValue::text(*t)).collect(),
        }
    }

    #[test]
    fn test_basic_substitution() {
        let vars = vec![string_var("name", &["Alice"])];
        assert_eq!(
            substitute_variables("hello @name world", &vars),
            "hello Alice world"
        );
    }

    #[test]
    fn test_missing_value_leaves_single_space() {
        let vars = vec![string_var("name", &[])];
        assert_eq!(
            substitute_variables("hello @name world", &vars),
            "hello  world"
        );
    }

    #[test]
    fn test_multiple_values_join_with_comma() {
        let vars = vec![string_var("topics", &["rust", "graphs"])];
        assert_eq!(
            substitute_variables("research @topics today", &vars),
            "research rust, graphs today"
        );
    }

    #[test]
    fn test_token_at_end_of_string_is_untouched() {
        let vars = vec![string_var("name", &["Alice"])];
        // Token must be followed by whitespace
        assert_eq!(substitute_variables("hello @name", &vars), "hello @name");
    }

    #[test]
    fn test_longer_names_are_not_clipped() {
        let vars = vec![string_var("name", &["Alice"])];
        assert_eq!(
            substitute_variables("hello @names here", &vars),
            "hello @names here"
        );
    }

    #[test]
    fn test_every_occurrence_is_replaced() {
        let vars = vec![string_var("x", &["1"])];
        assert_eq!(substitute_variables("@x plus @x is", &vars), "1 plus 1 is");
    }

    #[test]
    fn test_tab_counts_as_whitespace_but_is_normalized() {
        let vars = vec![string_var("name", &["Alice"])];
        assert_eq!(
            substitute_variables("hello @name\tworld", &vars),
            "hello Alice world"
        );
    }

    #[test]
    fn test_resource_variables_are_untouched() {
        let vars = vec![WorkflowVariable {
            name: "file".to_string(),
            variable_type: VariableType::Resource,
            values: vec![VariableValue {
                value_type: VariableValueType::Resource,
                text: None,
                resource: Some(ResourceRef {
                    entity_id: "res-1".to_string(),
                    name: Some("report.pdf".to_string()),
                }),
            }],
        }];
        assert_eq!(
            substitute_variables("read @file now", &vars),
            "read @file now"
        );
    }

    #[test]
    fn test_option_variables_substitute_like_strings() {
        let vars = vec![WorkflowVariable {
            name: "mode".to_string(),
            variable_type: VariableType::Option,
            values: vec![VariableValue::text("fast")],
        }];
        assert_eq!(substitute_variables("run @mode mode", &vars), "run fast mode");
    }

    #[test]
    fn test_variables_apply_in_list_order() {
        let vars = vec![string_var("a", &["@b"]), string_var("b", &["two"])];
        // "@b" introduced by the first substitution is matched incidentally
        // by the second; no re-scan guarantee is made beyond list order.
        assert_eq!(substitute_variables("@a end", &vars), "two end");
    }
}
