// Copyright 2026 The Coachstream Project
// SPDX-License-Identifier: Apache-2.0

use super::error::ConfigError;

/// Expand `${VAR_NAME}` references from the environment.
///
/// An unterminated or empty reference is kept literally; an unset variable
/// is an error.
pub fn resolve_variables(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next();
        let mut name = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            name.push(c);
        }
        if !closed || name.is_empty() {
            result.push_str("${");
            result.push_str(&name);
            if closed {
                result.push('}');
            }
            continue;
        }
        let value = std::env::var(&name)
            .map_err(|_| ConfigError::UndefinedVariable { name: name.clone() })?;
        result.push_str(&value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_strings_pass_through() {
        assert_eq!(resolve_variables("https://api.openai.com").unwrap(), "https://api.openai.com");
    }

    #[test]
    fn expands_set_variables() {
        std::env::set_var("COACHSTREAM_TEST_SEARCH_HOST", "search.internal");
        assert_eq!(
            resolve_variables("http://${COACHSTREAM_TEST_SEARCH_HOST}:8080").unwrap(),
            "http://search.internal:8080"
        );
    }

    #[test]
    fn unset_variable_is_an_error() {
        let err = resolve_variables("${COACHSTREAM_TEST_DEFINITELY_UNSET}").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UndefinedVariable { ref name } if name == "COACHSTREAM_TEST_DEFINITELY_UNSET"
        ));
    }

    #[test]
    fn malformed_references_stay_literal() {
        assert_eq!(resolve_variables("cost: ${}").unwrap(), "cost: ${}");
        assert_eq!(resolve_variables("open ${NAME").unwrap(), "open ${NAME");
        assert_eq!(resolve_variables("$5 $ {x}").unwrap(), "$5 $ {x}");
    }
}
