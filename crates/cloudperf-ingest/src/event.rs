//! Object-store notification envelopes.
//!
//! The store delivers writes as `{"Records": [...]}` with the bucket and
//! object nested under `s3`. Object keys arrive form-encoded (`+` for a
//! space, `%XX` escapes).

use serde::Deserialize;

use cloudperf_core::ObjectWriteEvent;

use crate::error::{IngestError, IngestResult};

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationEnvelope {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRecord {
    #[serde(rename = "eventName")]
    pub event_name: String,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectEntity {
    pub key: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "eTag", default)]
    pub e_tag: Option<String>,
    #[serde(rename = "versionId", default)]
    pub version_id: Option<String>,
}

impl NotificationEnvelope {
    pub fn parse(body: &[u8]) -> IngestResult<Self> {
        serde_json::from_slice(body).map_err(|e| IngestError::MalformedNotification(e.to_string()))
    }

    /// One event per record, keys decoded. Version prefers `versionId` over `eTag`.
    pub fn into_events(self) -> IngestResult<Vec<ObjectWriteEvent>> {
        self.records
            .into_iter()
            .map(|r| {
                let key = decode_key(&r.s3.object.key)?;
                Ok(ObjectWriteEvent {
                    bucket: r.s3.bucket.name,
                    key,
                    size: r.s3.object.size,
                    event_type: r.event_name.trim_start_matches("s3:").to_string(),
                    version: r.s3.object.version_id.or(r.s3.object.e_tag),
                })
            })
            .collect()
    }
}

/// Form-decode an object key.
pub fn decode_key(raw: &str) -> IngestResult<String> {
    if raw.contains('&') {
        return Err(IngestError::MalformedNotification(format!(
            "object key {raw:?} is not form-encoded"
        )));
    }
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(&format!("k={raw}"))
        .map_err(|e| IngestError::MalformedNotification(e.to_string()))?;
    pairs
        .into_iter()
        .next()
        .map(|(_, v)| v)
        .ok_or_else(|| IngestError::MalformedNotification("empty object key".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Records": [
            {
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": "cloudperf-data"},
                    "object": {"key": "import-sql/2024+01+01%281%29.sql", "size": 2048, "eTag": "abc123"}
                }
            },
            {
                "eventName": "s3:ObjectRemoved:Delete",
                "s3": {
                    "bucket": {"name": "cloudperf-data"},
                    "object": {"key": "import-sql/old.sql"}
                }
            }
        ]
    }"#;

    #[test]
    fn parses_records_and_decodes_keys() {
        let events = NotificationEnvelope::parse(SAMPLE.as_bytes())
            .unwrap()
            .into_events()
            .unwrap();
        assert_eq!(events.len(), 2);

        assert_eq!(events[0].bucket, "cloudperf-data");
        assert_eq!(events[0].key, "import-sql/2024 01 01(1).sql");
        assert_eq!(events[0].size, 2048);
        assert_eq!(events[0].version.as_deref(), Some("abc123"));
        assert!(events[0].is_object_created());

        assert_eq!(events[1].event_type, "ObjectRemoved:Delete");
        assert!(!events[1].is_object_created());
    }

    #[test]
    fn version_id_wins_over_etag() {
        let body = r#"{"Records":[{"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"b"},
            "object":{"key":"k","eTag":"e","versionId":"v1"}}}]}"#;
        let events = NotificationEnvelope::parse(body.as_bytes())
            .unwrap()
            .into_events()
            .unwrap();
        assert_eq!(events[0].version.as_deref(), Some("v1"));
    }

    #[test]
    fn malformed_body_rejected() {
        assert!(matches!(
            NotificationEnvelope::parse(b"not json"),
            Err(IngestError::MalformedNotification(_))
        ));
    }

    #[test]
    fn empty_envelope_yields_no_events() {
        let events = NotificationEnvelope::parse(b"{}").unwrap().into_events().unwrap();
        assert!(events.is_empty());
    }
}
