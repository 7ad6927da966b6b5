//! Sequential schema migrations and the terminal hotfix pass.
//!
//! Migrations operate on raw `serde_json::Value` documents so fields this
//! client does not know about are never discarded. Each step is keyed by
//! the document's current `schemaMajor` and bumps it by exactly one; the
//! terminal hotfix repairs known field corruption without bumping.

use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use seedvault_common::{Error, Result};

use crate::schema::COLLECTION_KEYS;

/// Latest schema major this client reads and writes.
pub const CURRENT_SCHEMA_MAJOR: u32 = 7;

/// Minor version written alongside [`CURRENT_SCHEMA_MAJOR`].
pub const CURRENT_SCHEMA_MINOR: u32 = 0;

/// Legacy collection keys consulted by early migration steps.
const LEGACY_MATCHED_LOGINS: &str = "vaultItems";
const LEGACY_MANUAL_LOGINS: &str = "manuallyAddedItems";
const LEGACY_NOTES: &str = "secretNotes";

fn schema_major(doc: &Value) -> u32 {
    doc.get("schemaMajor")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32
}

fn as_object_mut(doc: &mut Value) -> Result<&mut Map<String, Value>> {
    doc.as_object_mut()
        .ok_or_else(|| Error::Fatal("Vault document is not a JSON object".to_string()))
}

fn set_version(doc: &mut Map<String, Value>, major: u32, minor: u32) {
    doc.insert("schemaMajor".to_string(), json!(major));
    doc.insert("schemaMinor".to_string(), json!(minor));
}

/// Every key that may hold items, current and legacy.
fn item_collection_keys() -> Vec<&'static str> {
    let mut keys = COLLECTION_KEYS.to_vec();
    keys.push(LEGACY_MATCHED_LOGINS);
    keys.push(LEGACY_MANUAL_LOGINS);
    keys.push(LEGACY_NOTES);
    keys
}

fn for_each_item<F: FnMut(&mut Map<String, Value>)>(doc: &mut Map<String, Value>, mut f: F) {
    for key in item_collection_keys() {
        if let Some(Value::Array(items)) = doc.get_mut(key) {
            for item in items {
                if let Some(obj) = item.as_object_mut() {
                    f(obj);
                }
            }
        }
    }
}

/// 0 → 1: backfill missing item `id`s.
///
/// Items without an id predate ID assignment; they get a fresh UUID,
/// assigned once and never reassigned afterwards.
fn migrate_v0_to_v1(doc: &mut Map<String, Value>) {
    for_each_item(doc, |item| {
        let missing = !matches!(item.get("id"), Some(Value::String(s)) if !s.is_empty());
        if missing {
            item.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
        }
    });
    set_version(doc, 1, 0);
}

/// 1 → 2: introduce the refresh-token collection.
fn migrate_v1_to_v2(doc: &mut Map<String, Value>) {
    doc.entry("refreshTokens".to_string()).or_insert(json!([]));
    set_version(doc, 2, 0);
}

/// 2 → 3: rename the legacy `secretNotes` collection to `notes`.
fn migrate_v2_to_v3(doc: &mut Map<String, Value>) {
    if let Some(notes) = doc.remove(LEGACY_NOTES) {
        doc.entry("notes".to_string()).or_insert(notes);
    }
    set_version(doc, 3, 0);
}

/// 3 → 4: normalize `ssoProvider` to a list on every item (single objects
/// wrapped, null dropped).
fn migrate_v3_to_v4(doc: &mut Map<String, Value>) {
    for_each_item(doc, |item| {
        let replacement = match item.get("ssoProvider") {
            Some(Value::Array(_)) | None => None,
            Some(Value::Null) => Some(json!([])),
            Some(single) => Some(json!([single.clone()])),
        };
        if let Some(list) = replacement {
            item.insert("ssoProvider".to_string(), list);
        }
    });
    set_version(doc, 4, 0);
}

/// 4 → 5: move the legacy top-level `emailAddress` field to `email`.
fn migrate_v4_to_v5(doc: &mut Map<String, Value>) {
    if let Some(email) = doc.remove("emailAddress") {
        doc.entry("email".to_string()).or_insert(email);
    }
    set_version(doc, 5, 0);
}

/// 5 → 6: merge the two legacy login collections into one `origin`-tagged
/// `logins` list (catalog-matched first, then manual).
fn migrate_v5_to_v6(doc: &mut Map<String, Value>) {
    let mut merged = match doc.remove("logins") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    if let Some(Value::Array(items)) = doc.remove(LEGACY_MATCHED_LOGINS) {
        for mut item in items {
            if let Some(obj) = item.as_object_mut() {
                obj.entry("origin".to_string()).or_insert(json!("matched"));
            }
            merged.push(item);
        }
    }
    if let Some(Value::Array(items)) = doc.remove(LEGACY_MANUAL_LOGINS) {
        for mut item in items {
            if let Some(obj) = item.as_object_mut() {
                obj.entry("origin".to_string()).or_insert(json!("manual"));
            }
            merged.push(item);
        }
    }
    doc.insert("logins".to_string(), Value::Array(merged));
    set_version(doc, 6, 0);
}

/// 6 → 7: enter the schema-validated era; every current collection must
/// exist as an array.
fn migrate_v6_to_v7(doc: &mut Map<String, Value>) {
    for key in COLLECTION_KEYS {
        let entry = doc.entry(key.to_string()).or_insert(json!([]));
        if !entry.is_array() {
            *entry = json!([]);
        }
    }
    set_version(doc, 7, CURRENT_SCHEMA_MINOR);
}

/// Normalize one `ssoProvider` entry to exactly
/// `{default, provider, username}`. Returns `None` for entries that must
/// be dropped (legacy nested-`base` wrappers and non-objects).
fn normalize_sso_entry(entry: &Value) -> Option<Value> {
    let obj = entry.as_object()?;
    if obj.contains_key("base") {
        return None;
    }

    let default = obj
        .get("default")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let provider = obj
        .get("provider")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let username = obj
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    Some(json!({
        "default": default,
        "provider": provider,
        "username": username,
    }))
}

/// Terminal hotfix: self-heal `ssoProvider` corruption observed in the
/// field. Idempotent; returns whether anything changed.
fn hotfix_sso_providers(doc: &mut Map<String, Value>) -> bool {
    let mut changed = false;
    for_each_item(doc, |item| {
        let normalized = match item.get("ssoProvider") {
            Some(Value::Array(entries)) => {
                let fixed: Vec<Value> = entries.iter().filter_map(normalize_sso_entry).collect();
                (fixed != *entries).then_some(fixed)
            }
            _ => None,
        };
        if let Some(fixed) = normalized {
            item.insert("ssoProvider".to_string(), Value::Array(fixed));
            changed = true;
        }
    });
    changed
}

/// Apply exactly one migration step based on the document's current
/// `schemaMajor`.
///
/// Returns the stepped document and whether more work may remain. At the
/// terminal version the hotfix pass runs unconditionally; `needs_more` is
/// false only when it changed nothing. Documents ahead of
/// [`CURRENT_SCHEMA_MAJOR`] are returned untouched.
///
/// # Errors
/// - `Fatal` if the document is not a JSON object
pub fn migrate_next(mut doc: Value) -> Result<(Value, bool)> {
    let major = schema_major(&doc);
    let obj = as_object_mut(&mut doc)?;

    let needs_more = match major {
        0 => {
            migrate_v0_to_v1(obj);
            true
        }
        1 => {
            migrate_v1_to_v2(obj);
            true
        }
        2 => {
            migrate_v2_to_v3(obj);
            true
        }
        3 => {
            migrate_v3_to_v4(obj);
            true
        }
        4 => {
            migrate_v4_to_v5(obj);
            true
        }
        5 => {
            migrate_v5_to_v6(obj);
            true
        }
        6 => {
            migrate_v6_to_v7(obj);
            true
        }
        CURRENT_SCHEMA_MAJOR => hotfix_sso_providers(obj),
        ahead => {
            // Written by a newer client; shape unknown, leave it alone.
            debug!(major = ahead, "Vault schema ahead of this client, skipping migration");
            false
        }
    };

    Ok((doc, needs_more))
}

/// Run [`migrate_next`] to fixpoint.
///
/// `needs_write` is true if any step (including the terminal hotfix)
/// mutated the document. Running this twice in a row on its own output is
/// a no-op the second time.
pub fn maybe_migrate(mut doc: Value) -> Result<(Value, bool)> {
    let mut needs_write = false;
    loop {
        let (next, needs_more) = migrate_next(doc)?;
        doc = next;
        if !needs_more {
            break;
        }
        needs_write = true;
    }
    Ok((doc, needs_write))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_migration_monotonicity() {
        for start in 0..CURRENT_SCHEMA_MAJOR {
            let doc = json!({"schemaMajor": start, "schemaMinor": 3});
            let (stepped, needs_more) = migrate_next(doc).unwrap();
            assert!(needs_more);
            assert_eq!(schema_major(&stepped), start + 1);
        }
    }

    #[test]
    fn test_v0_backfills_ids() {
        let doc = json!({
            "logins": [{"username": "u"}, {"id": "keep-me", "username": "v"}]
        });
        let (doc, _) = migrate_next(doc).unwrap();

        let logins = doc["logins"].as_array().unwrap();
        assert!(logins[0]["id"].as_str().is_some_and(|s| !s.is_empty()));
        assert_eq!(logins[1]["id"], "keep-me");
    }

    #[test]
    fn test_v5_merges_split_login_collections() {
        let doc = json!({
            "schemaMajor": 5,
            "vaultItems": [{"id": "m1", "url": "https://a.example"}],
            "manuallyAddedItems": [{"id": "h1", "name": "router"}]
        });
        let (doc, _) = migrate_next(doc).unwrap();

        assert!(doc.get("vaultItems").is_none());
        assert!(doc.get("manuallyAddedItems").is_none());
        let logins = doc["logins"].as_array().unwrap();
        assert_eq!(logins.len(), 2);
        assert_eq!(logins[0]["origin"], "matched");
        assert_eq!(logins[1]["origin"], "manual");
    }

    #[test]
    fn test_hotfix_normalization_exact() {
        let doc = json!({
            "schemaMajor": 7,
            "schemaMinor": 0,
            "logins": [{
                "id": "a",
                "ssoProvider": [
                    {"default": null, "provider": null, "username": null, "extra": "x"},
                    {"base": {"provider": "legacy"}}
                ]
            }]
        });
        let (doc, needs_more) = migrate_next(doc).unwrap();
        assert!(needs_more);

        let providers = doc["logins"][0]["ssoProvider"].as_array().unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(
            providers[0],
            json!({"default": false, "provider": "", "username": ""})
        );

        // Clean document reports no more work.
        let (_, needs_more) = migrate_next(doc).unwrap();
        assert!(!needs_more);
    }

    #[test]
    fn test_maybe_migrate_from_scratch() {
        let doc = json!({
            "secretNotes": [{"title": "n"}],
            "emailAddress": "a@b.c",
            "vaultItems": [{"url": "https://a.example"}]
        });
        let (doc, needs_write) = maybe_migrate(doc).unwrap();
        assert!(needs_write);
        assert_eq!(schema_major(&doc), CURRENT_SCHEMA_MAJOR);
        assert_eq!(doc["email"], "a@b.c");
        assert_eq!(doc["notes"].as_array().unwrap().len(), 1);
        assert_eq!(doc["logins"][0]["origin"], "matched");

        // Idempotence: a second run is a no-op.
        let (_, needs_write) = maybe_migrate(doc).unwrap();
        assert!(!needs_write);
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let doc = json!({
            "schemaMajor": 3,
            "futureTopLevel": {"a": 1},
            "logins": [{"id": "x", "futureItemField": true}]
        });
        let (doc, _) = maybe_migrate(doc).unwrap();
        assert_eq!(doc["futureTopLevel"], json!({"a": 1}));
        assert_eq!(doc["logins"][0]["futureItemField"], true);
    }

    #[test]
    fn test_future_schema_left_alone() {
        let doc = json!({"schemaMajor": 9, "mystery": []});
        let (migrated, needs_write) = maybe_migrate(doc.clone()).unwrap();
        assert!(!needs_write);
        assert_eq!(migrated, doc);
    }

    #[test]
    fn test_non_object_document_is_fatal() {
        assert!(migrate_next(json!([1, 2, 3])).is_err());
    }

    fn sso_entry_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(json!({"default": true, "provider": "g", "username": "u"})),
            Just(json!({"default": null, "provider": null, "username": null})),
            Just(json!({"provider": "g", "stray": 1})),
            Just(json!({"base": {"provider": "old"}})),
            Just(json!("corrupt")),
        ]
    }

    fn doc_strategy() -> impl Strategy<Value = Value> {
        (
            0u32..=CURRENT_SCHEMA_MAJOR,
            prop::collection::vec(sso_entry_strategy(), 0..4),
            prop::bool::ANY,
        )
            .prop_map(|(major, sso, with_id)| {
                let mut item = serde_json::Map::new();
                if with_id {
                    item.insert("id".to_string(), json!("fixed"));
                }
                item.insert("ssoProvider".to_string(), Value::Array(sso));
                json!({
                    "schemaMajor": major,
                    "logins": [Value::Object(item)],
                    "secretNotes": [{"title": "t"}],
                })
            })
    }

    proptest! {
        #[test]
        fn prop_maybe_migrate_idempotent(doc in doc_strategy()) {
            let (once, _) = maybe_migrate(doc).unwrap();
            let (twice, needs_write) = maybe_migrate(once.clone()).unwrap();
            prop_assert!(!needs_write);
            prop_assert_eq!(once, twice);
        }
    }
}
