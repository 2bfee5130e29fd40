//! Report payload migrations
//!
//! Stored payloads keep the schema version they were written with. On read, each
//! migration upgrades version N to N+1 until the current version is reached. The
//! stored row is never touched.
//!
//! Versions:
//! - 1: narrative under `overview`
//! - 2: narrative under `summary`, every section present

use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::CURRENT_SCHEMA_VERSION;

#[derive(Debug, Error, PartialEq)]
pub enum MigrationError {
    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("No migration registered from schema version {0}")]
    MissingMigration(u32),

    #[error("Schema version {0} is newer than this service supports")]
    FromTheFuture(u32),
}

type Migration = fn(Map<String, Value>) -> Result<Map<String, Value>, MigrationError>;

/// (from version, upgrade to from + 1)
const MIGRATIONS: &[(u32, Migration)] = &[(1, overview_to_summary)];

/// Report sections every current payload carries
const SECTIONS: &[&str] = &[
    "serpTimeline",
    "keywordOpportunities",
    "sentiment",
    "backlinks",
    "coreWebVitals",
    "techStack",
];

/// Effective version of a stored payload
///
/// A non-zero column value is authoritative; the payload shape is never consulted.
/// 0 marks rows written before versioning, which are all version 1 whether they carry
/// the legacy `overview` or already a `summary`.
pub fn detect_version(stored_version: u32) -> u32 {
    stored_version.max(1)
}

/// Upgrade `payload` to the current schema version, returning a new value
pub fn migrate_to_current(stored_version: u32, payload: &Value) -> Result<Value, MigrationError> {
    let mut version = detect_version(stored_version);
    if version > CURRENT_SCHEMA_VERSION {
        return Err(MigrationError::FromTheFuture(version));
    }

    let mut object = payload.as_object().cloned().ok_or(MigrationError::NotAnObject)?;

    while version < CURRENT_SCHEMA_VERSION {
        let migration = MIGRATIONS
            .iter()
            .find(|(from, _)| *from == version)
            .map(|(_, migration)| *migration)
            .ok_or(MigrationError::MissingMigration(version))?;

        object = migration(object)?;
        tracing::debug!(from = version, to = version + 1, "Report payload migrated");
        version += 1;
    }

    Ok(Value::Object(object))
}

/// v1 → v2: `overview` becomes `summary`; missing sections become empty lists
fn overview_to_summary(mut object: Map<String, Value>) -> Result<Map<String, Value>, MigrationError> {
    if !object.contains_key("overview") && object.contains_key("summary") {
        fill_sections(&mut object);
        return Ok(object);
    }

    let overview = object.remove("overview").unwrap_or(Value::Object(Map::new()));
    let Value::Object(mut overview) = overview else {
        return Err(MigrationError::NotAnObject);
    };

    // v1 allowed the narrative under either key
    if !overview.contains_key("executive_summary") {
        let narrative = overview.remove("summary").unwrap_or(Value::String(String::new()));
        overview.insert("executive_summary".to_string(), narrative);
    }

    let recommendations = match overview.remove("recommendations") {
        Some(Value::Array(items)) => items.into_iter().map(clamp_recommendation).collect(),
        _ => Vec::new(),
    };
    overview.insert("recommendations".to_string(), Value::Array(recommendations));

    object.insert("summary".to_string(), Value::Object(overview));
    fill_sections(&mut object);

    Ok(object)
}

fn fill_sections(object: &mut Map<String, Value>) {
    for section in SECTIONS {
        object
            .entry(section.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
    }
}

fn clamp_recommendation(mut item: Value) -> Value {
    if let Some(obj) = item.as_object_mut() {
        let confidence = obj
            .get("confidence")
            .and_then(Value::as_f64)
            .filter(|c| c.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        obj.insert("confidence".to_string(), Value::from(confidence));
    }
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IntelligenceReportPayload;
    use serde_json::json;

    fn legacy() -> Value {
        json!({
            "overview": {
                "id": "7f1c6a9e-2b1d-4c59-9a0e-3d2f1b8c4e5a",
                "captured_at": "2024-03-01T12:00:00Z",
                "summary": "Legacy narrative",
                "recommendations": [{ "title": "Old", "description": "Legacy rec", "confidence": 3 }]
            },
            "serpTimeline": [{ "captured_at": "2024-03-01T12:00:00Z", "share_of_voice": 0.2 }]
        })
    }

    #[test]
    fn test_legacy_overview_becomes_summary() {
        let stored = legacy();
        let migrated = migrate_to_current(1, &stored).unwrap();

        assert!(migrated.get("overview").is_none());
        assert_eq!(migrated["summary"]["executive_summary"], "Legacy narrative");
        assert_eq!(migrated["summary"]["recommendations"][0]["confidence"], 1.0);
        assert_eq!(migrated["serpTimeline"][0]["share_of_voice"], 0.2);
        assert_eq!(migrated["techStack"], json!([]));

        // Input untouched
        assert_eq!(stored, legacy());

        // The result is a valid current payload
        let payload: IntelligenceReportPayload = serde_json::from_value(migrated).unwrap();
        assert_eq!(payload.summary.recommendations[0].title, "Old");
    }

    #[test]
    fn test_stored_version_is_authoritative() {
        assert_eq!(detect_version(2), 2);
        assert_eq!(detect_version(1), 1);
        assert_eq!(detect_version(0), 1);
    }

    #[test]
    fn test_current_payload_with_overview_key_is_not_reshaped() {
        let tagged = json!({ "overview": { "summary": "current-schema field" }, "backlinks": [] });
        let migrated = migrate_to_current(CURRENT_SCHEMA_VERSION, &tagged).unwrap();
        assert_eq!(migrated, tagged);
        assert!(migrated.get("summary").is_none());
    }

    #[test]
    fn test_unversioned_legacy_shape_is_migrated() {
        let migrated = migrate_to_current(0, &legacy()).unwrap();
        assert!(migrated.get("overview").is_none());
        assert!(migrated.get("summary").is_some());
    }

    #[test]
    fn test_unversioned_current_shape_keeps_summary() {
        let stored = json!({ "summary": { "executive_summary": "kept" } });
        let migrated = migrate_to_current(0, &stored).unwrap();
        assert_eq!(migrated["summary"]["executive_summary"], "kept");
        assert_eq!(migrated["backlinks"], json!([]));
    }

    #[test]
    fn test_current_payload_passes_through() {
        let current = serde_json::to_value(IntelligenceReportPayload::default()).unwrap();
        assert_eq!(migrate_to_current(CURRENT_SCHEMA_VERSION, &current).unwrap(), current);
    }

    #[test]
    fn test_future_and_malformed_payloads_rejected() {
        assert_eq!(
            migrate_to_current(CURRENT_SCHEMA_VERSION + 1, &json!({ "summary": {} })),
            Err(MigrationError::FromTheFuture(CURRENT_SCHEMA_VERSION + 1))
        );
        assert_eq!(migrate_to_current(1, &json!([1, 2])), Err(MigrationError::NotAnObject));
    }
}
