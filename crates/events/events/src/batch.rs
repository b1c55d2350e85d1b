//! Batch consumer contract shared by the pipeline steps.
//!
//! The invoking stream framework hands a step a [`StreamBatch`] and expects a
//! [`BatchResponse`] back. Only the identifiers listed in
//! `batchItemFailures` are redelivered; every other record counts as consumed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier used when a record carries nothing better.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// Records of one partition, in delivery order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub key: String,
    pub records: Vec<StreamRecord>,
}

/// A batch of stream records grouped by partition.
///
/// Partitions keep the order in which the framework listed them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamBatch {
    /// Partitions as they appeared on the wire.
    #[serde(default, with = "partitions")]
    pub records: Vec<Partition>,
}

impl StreamBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record to a partition, opening the partition if needed.
    pub fn push(&mut self, partition: impl Into<String>, record: StreamRecord) {
        let key = partition.into();
        match self.records.iter_mut().find(|p| p.key == key) {
            Some(existing) => existing.records.push(record),
            None => self.records.push(Partition {
                key,
                records: vec![record],
            }),
        }
    }

    /// Adds a record to a partition.
    pub fn with_record(mut self, partition: impl Into<String>, record: StreamRecord) -> Self {
        self.push(partition, record);
        self
    }

    /// Iterates over every record, partitions in wire order.
    pub fn iter(&self) -> impl Iterator<Item = &StreamRecord> {
        self.records.iter().flat_map(|p| p.records.iter())
    }

    /// Records of one partition.
    pub fn partition(&self, key: &str) -> Option<&[StreamRecord]> {
        self.records
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.records.as_slice())
    }

    /// Partition keys in wire order.
    pub fn partition_keys(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|p| p.key.as_str())
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.records.iter().map(|p| p.records.len()).sum()
    }

    /// Checks if the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serializes partitions as the framework's `{"key": [records]}` object
/// without reordering keys.
mod partitions {
    use super::{Partition, StreamRecord};
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(partitions: &[Partition], s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(partitions.len()))?;
        for partition in partitions {
            map.serialize_entry(&partition.key, &partition.records)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Partition>, D::Error> {
        d.deserialize_map(PartitionsVisitor)
    }

    struct PartitionsVisitor;

    impl<'de> Visitor<'de> for PartitionsVisitor {
        type Value = Vec<Partition>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of partition keys to record lists")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut partitions: Vec<Partition> = Vec::new();
            while let Some((key, records)) = access.next_entry::<String, Vec<StreamRecord>>()? {
                match partitions.iter_mut().find(|p| p.key == key) {
                    Some(existing) => existing.records.extend(records),
                    None => partitions.push(Partition { key, records }),
                }
            }
            Ok(partitions)
        }
    }
}

/// A single stream record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Base64-encoded JSON envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Framework-assigned record id.
    #[serde(
        rename = "recordId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub record_id: Option<String>,

    /// Sequence number or offset, string or numeric depending on the stream.
    #[serde(
        rename = "sequenceNumber",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sequence_number: Option<Value>,
}

impl StreamRecord {
    /// Creates a record with an id and an encoded value.
    pub fn new(record_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            record_id: Some(record_id.into()),
            sequence_number: None,
        }
    }

    /// Identifier reported back on failure.
    ///
    /// Prefers `recordId`, then `sequenceNumber`, then `fallback` (usually
    /// the envelope's event id), then `"unknown"`.
    pub fn identifier(&self, fallback: Option<&str>) -> String {
        if let Some(id) = self.record_id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_string();
        }

        match &self.sequence_number {
            Some(Value::String(seq)) if !seq.is_empty() => return seq.clone(),
            Some(Value::Number(seq)) => return seq.to_string(),
            _ => {}
        }

        fallback
            .filter(|id| !id.is_empty())
            .unwrap_or(UNKNOWN_IDENTIFIER)
            .to_string()
    }
}

/// One record the framework should redeliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemFailure {
    /// Identifier of the failed record.
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
}

/// Per-batch counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMetrics {
    /// Records handled successfully.
    pub processed: usize,
    /// Records listed in `batchItemFailures`.
    pub failed: usize,
    /// Records skipped because their event was already delivered or settled.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub duplicates: usize,
    /// Malformed records dropped without redelivery.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rejected: usize,
    /// Records whose event reached the terminal `FAILED` status.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub dead_lettered: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Response returned to the stream framework.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    /// Records to redeliver.
    pub batch_item_failures: Vec<BatchItemFailure>,
    /// Counters for this batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<BatchMetrics>,
}

impl BatchResponse {
    /// Creates an empty response with zeroed metrics.
    pub fn new() -> Self {
        Self {
            batch_item_failures: Vec::new(),
            metrics: Some(BatchMetrics::default()),
        }
    }

    /// Lists a record for redelivery and counts it as failed.
    pub fn fail(&mut self, identifier: impl Into<String>) {
        self.batch_item_failures.push(BatchItemFailure {
            item_identifier: identifier.into(),
        });
        self.metrics_mut().failed += 1;
    }

    /// Mutable access to the counters, creating them if needed.
    pub fn metrics_mut(&mut self) -> &mut BatchMetrics {
        self.metrics.get_or_insert_with(BatchMetrics::default)
    }

    /// Identifiers of the failed records.
    pub fn failed_identifiers(&self) -> Vec<&str> {
        self.batch_item_failures
            .iter()
            .map(|f| f.item_identifier.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_parses_framework_shape() {
        let batch: StreamBatch = serde_json::from_value(serde_json::json!({
            "eventSource": "aws:kafka",
            "records": {
                "orders-0": [
                    {"value": "e30=", "recordId": "r1", "offset": 4},
                    {"value": "e30=", "sequenceNumber": "49590338271490256608559692538361571095921575989136588898"}
                ],
                "orders-1": [
                    {"value": "e30=", "sequenceNumber": 17}
                ]
            }
        }))
        .unwrap();

        assert_eq!(batch.len(), 3);
        let ids: Vec<String> = batch.iter().map(|r| r.identifier(None)).collect();
        assert_eq!(
            ids,
            vec![
                "r1".to_string(),
                "49590338271490256608559692538361571095921575989136588898".to_string(),
                "17".to_string(),
            ]
        );
    }

    #[test]
    fn test_identifier_fallbacks() {
        let record = StreamRecord::default();
        assert_eq!(record.identifier(None), "unknown");
        assert_eq!(record.identifier(Some("e1")), "e1");
        assert_eq!(record.identifier(Some("")), "unknown");

        let record = StreamRecord {
            record_id: Some(String::new()),
            sequence_number: Some(Value::String("42".into())),
            ..Default::default()
        };
        assert_eq!(record.identifier(Some("e1")), "42");
    }

    #[test]
    fn test_response_wire_shape() {
        let mut response = BatchResponse::new();
        response.fail("r2");
        response.metrics_mut().processed = 3;

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({
                "batchItemFailures": [{"itemIdentifier": "r2"}],
                "metrics": {"processed": 3, "failed": 1}
            })
        );
    }

    #[test]
    fn test_partitions_keep_wire_order() {
        let batch: StreamBatch = serde_json::from_str(
            r#"{"records": {"zeta-0": [{"recordId": "z1"}], "alpha-0": [{"recordId": "a1"}], "mid-3": [{"recordId": "m1"}]}}"#,
        )
        .unwrap();

        assert_eq!(
            batch.partition_keys().collect::<Vec<_>>(),
            vec!["zeta-0", "alpha-0", "mid-3"]
        );
        let ids: Vec<String> = batch.iter().map(|r| r.identifier(None)).collect();
        assert_eq!(ids, vec!["z1", "a1", "m1"]);

        let json = serde_json::to_string(&batch).unwrap();
        assert!(json.find("zeta-0").unwrap() < json.find("alpha-0").unwrap());
        assert_eq!(batch.partition("alpha-0").map(<[_]>::len), Some(1));
    }

    #[test]
    fn test_empty_batch() {
        let batch: StreamBatch = serde_json::from_str("{}").unwrap();
        assert!(batch.is_empty());
    }
}
