//! `${NAME}` placeholder substitution.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::SyncError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Replace every `${NAME}` in every string of `value`, recursively through
/// objects and arrays, with `lookup(NAME)`.
///
/// Object keys are left alone. Fails on the first placeholder `lookup` can't
/// resolve; `value` may be partially substituted at that point.
pub fn resolve_placeholders(
    value: &mut Value,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<(), SyncError> {
    match value {
        Value::String(s) => {
            if let Some(resolved) = resolve_str(s, lookup)? {
                *s = resolved;
            }
            Ok(())
        }
        Value::Array(items) => items
            .iter_mut()
            .try_for_each(|item| resolve_placeholders(item, lookup)),
        Value::Object(map) => map
            .values_mut()
            .try_for_each(|item| resolve_placeholders(item, lookup)),
        _ => Ok(()),
    }
}

fn resolve_str(
    s: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Option<String>, SyncError> {
    if !PLACEHOLDER.is_match(s) {
        return Ok(None);
    }

    let mut missing = None;
    let resolved = PLACEHOLDER.replace_all(s, |caps: &Captures| {
        let name = &caps[1];
        match lookup(name) {
            Some(v) => v,
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(SyncError::MissingSecret(name)),
        None => Ok(Some(resolved.into_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(name: &str) -> Option<String> {
        match name {
            "TG_TOKEN" => Some("123:abc".to_string()),
            "CHAT" => Some("42".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_nested_substitution() {
        let mut doc = json!({
            "jobs": [{
                "notificationAdapter": [{
                    "id": "telegram",
                    "fields": {"token": "${TG_TOKEN}", "chatId": "chat-${CHAT}-${CHAT}"}
                }],
                "enabled": true,
                "count": 3
            }]
        });

        resolve_placeholders(&mut doc, &env).unwrap();

        let fields = &doc["jobs"][0]["notificationAdapter"][0]["fields"];
        assert_eq!(fields["token"], "123:abc");
        assert_eq!(fields["chatId"], "chat-42-42");
        assert_eq!(doc["jobs"][0]["count"], 3);
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        let mut doc = json!({"token": "${NOPE}"});
        let err = resolve_placeholders(&mut doc, &env).unwrap_err();
        assert!(matches!(err, SyncError::MissingSecret(name) if name == "NOPE"));
    }

    #[test]
    fn test_plain_dollars_untouched() {
        let mut doc = json!({"price": "$500", "shell": "${not valid}"});
        resolve_placeholders(&mut doc, &env).unwrap();
        assert_eq!(doc, json!({"price": "$500", "shell": "${not valid}"}));
    }
}
