//! Whole-document change detection.
//!
//! Two documents are compared on their *content view*: the serialized
//! document minus identity, harvest bookkeeping and the verbatim raw source.
//! The view is rendered canonically (object keys sorted at every depth) so
//! that map ordering never shows up as a change. Unordered collections are
//! modelled as `BTreeSet`s and therefore serialize in a stable order.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::model::ContentDocument;

/// Top-level fields that never count as content.
const NON_CONTENT_FIELDS: [&str; 3] = ["id", "harvest", "rawSource"];

/// Returns `true` when `candidate` differs in content from `previous`.
///
/// A first harvest (`previous` is `None`) is a baseline, not a change.
pub fn has_changed(previous: Option<&ContentDocument>, candidate: &ContentDocument) -> bool {
    let Some(previous) = previous else {
        return false;
    };

    match (canonical_content(previous), canonical_content(candidate)) {
        (Ok(before), Ok(after)) => before != after,
        (Err(e), _) | (_, Err(e)) => {
            // Unreachable for the document types in this crate; report a change
            // so the document is rewritten rather than silently kept stale.
            warn!(id = %candidate.id, error = %e, "Content view serialization failed");
            true
        }
    }
}

/// Serializes the content view of `document` canonically.
pub fn canonical_content(document: &ContentDocument) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(document)?;
    if let Value::Object(map) = &mut value {
        for field in NON_CONTENT_FIELDS {
            map.remove(field);
        }
    }
    Ok(canonicalize(value).to_string())
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
