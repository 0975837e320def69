//! Notification adapter normalization.
//!
//! Jobs files in the wild carry adapters in three shapes:
//!
//! ```json
//! {"id": "telegram", "fields": {"token": "..", "chatId": ".."}}   // canonical
//! {"id": "telegram", "args": {"token": "..", "chatId": ".."}}     // legacy args
//! {"type": "telegram", "botToken": "..", "chatId": ".."}          // legacy flat
//! ```
//!
//! All of them normalize to [`NotificationAdapter`]. Anything else is
//! dropped with a warning.

use serde_json::{Map, Value};
use tracing::warn;
use trawl_store::NotificationAdapter;

/// Field names from the flat legacy shape and their canonical names.
const LEGACY_FIELD_RENAMES: &[(&str, &str)] = &[("botToken", "token")];

/// The shape a raw adapter entry was written in.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterShape {
    /// `{"type": .., ...fields}` or `{"id": .., ...fields}` with flat fields.
    LegacyType { id: String, fields: Map<String, Value> },
    /// `{"id": .., "args": {..}}`
    LegacyArgs { id: String, args: Map<String, Value> },
    /// `{"id": .., "fields": {..}}`
    Canonical { id: String, fields: Map<String, Value> },
    /// Not an object, or no usable identifier.
    Invalid,
}

impl AdapterShape {
    /// Classify a raw adapter entry.
    ///
    /// An explicit `fields` object wins over `args`, which wins over flat
    /// fields.
    pub fn classify(raw: &Value) -> Self {
        let Some(obj) = raw.as_object() else {
            return Self::Invalid;
        };

        let id = non_empty_str(obj.get("id"));

        if let Some(id) = id {
            if let Some(Value::Object(fields)) = obj.get("fields") {
                return Self::Canonical {
                    id: id.to_string(),
                    fields: fields.clone(),
                };
            }
            if let Some(Value::Object(args)) = obj.get("args") {
                return Self::LegacyArgs {
                    id: id.to_string(),
                    args: args.clone(),
                };
            }
        }

        let Some(id) = non_empty_str(obj.get("type")).or(id) else {
            return Self::Invalid;
        };

        let fields = obj
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "id" | "type"))
            .map(|(key, value)| (canonical_field_name(key).to_string(), value.clone()))
            .collect();

        Self::LegacyType {
            id: id.to_string(),
            fields,
        }
    }

    /// The canonical adapter, or `None` for [`AdapterShape::Invalid`].
    pub fn into_canonical(self) -> Option<NotificationAdapter> {
        match self {
            Self::LegacyType { id, fields } | Self::Canonical { id, fields } => {
                Some(NotificationAdapter { id, fields })
            }
            Self::LegacyArgs { id, args } => Some(NotificationAdapter { id, fields: args }),
            Self::Invalid => None,
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn canonical_field_name(key: &str) -> &str {
    LEGACY_FIELD_RENAMES
        .iter()
        .find(|(legacy, _)| *legacy == key)
        .map_or(key, |(_, canonical)| *canonical)
}

/// Normalize one raw adapter entry.
pub fn normalize_adapter(raw: &Value) -> Option<NotificationAdapter> {
    AdapterShape::classify(raw).into_canonical()
}

/// Normalize a job's adapter list.
///
/// Invalid entries are dropped. When nothing valid remains, the
/// file-level `global` adapters are used instead.
pub fn normalize_job_adapters(
    job_id: &str,
    raw: &[Value],
    global: &[NotificationAdapter],
) -> Vec<NotificationAdapter> {
    let mut adapters = Vec::with_capacity(raw.len());
    for entry in raw {
        match normalize_adapter(entry) {
            Some(adapter) => adapters.push(adapter),
            None => warn!(job_id = %job_id, entry = %entry, "dropping unrecognized notification adapter"),
        }
    }

    if adapters.is_empty() {
        global.to_vec()
    } else {
        adapters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_legacy_type_shape() {
        let adapter = normalize_adapter(&json!({
            "type": "telegram",
            "botToken": "T",
            "chatId": "C"
        }))
        .unwrap();

        assert_eq!(
            adapter,
            NotificationAdapter {
                id: "telegram".to_string(),
                fields: fields(json!({"token": "T", "chatId": "C"})),
            }
        );
    }

    #[test]
    fn test_legacy_args_shape() {
        let raw = json!({"id": "slack", "args": {"webhook": "https://hooks.example.test/x"}});
        assert!(matches!(AdapterShape::classify(&raw), AdapterShape::LegacyArgs { .. }));

        let adapter = normalize_adapter(&raw).unwrap();
        assert_eq!(adapter.id, "slack");
        assert_eq!(adapter.fields, fields(json!({"webhook": "https://hooks.example.test/x"})));
    }

    #[test]
    fn test_canonical_passes_through() {
        let raw = json!({"id": "console", "fields": {"verbose": true}});
        assert!(matches!(AdapterShape::classify(&raw), AdapterShape::Canonical { .. }));
        assert_eq!(normalize_adapter(&raw).unwrap().fields, fields(json!({"verbose": true})));
    }

    #[test]
    fn test_bare_id_has_no_fields() {
        let adapter = normalize_adapter(&json!({"id": "console"})).unwrap();
        assert_eq!(adapter.id, "console");
        assert!(adapter.fields.is_empty());
    }

    #[test]
    fn test_invalid_shapes() {
        assert_eq!(AdapterShape::classify(&json!({})), AdapterShape::Invalid);
        assert_eq!(AdapterShape::classify(&json!("telegram")), AdapterShape::Invalid);
        assert_eq!(AdapterShape::classify(&json!({"id": "  "})), AdapterShape::Invalid);
        assert_eq!(AdapterShape::classify(&json!({"botToken": "T"})), AdapterShape::Invalid);
    }

    #[test]
    fn test_global_fallback_only_when_nothing_valid() {
        let global = vec![NotificationAdapter {
            id: "console".to_string(),
            fields: Map::new(),
        }];

        let from_global = normalize_job_adapters("a", &[json!({}), json!(3)], &global);
        assert_eq!(from_global, global);

        let own = normalize_job_adapters("a", &[json!({}), json!({"type": "ntfy"})], &global);
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].id, "ntfy");

        assert!(normalize_job_adapters("a", &[], &[]).is_empty());
    }
}
