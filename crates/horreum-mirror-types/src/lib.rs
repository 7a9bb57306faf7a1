use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type JsonMap = BTreeMap<String, serde_json::Value>;

/// Label name to label value, as attached to a single dataset.
pub type LabelValueMap = JsonMap;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("dataset {dataset_id} has out-of-range start timestamp {start_ms}ms")]
    InvalidStart { dataset_id: i32, start_ms: i64 },
}

/// One entry of a dataset listing page. Fields the mirror does not need are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub id: i32,
    pub test_id: i32,
    pub run_id: i32,
    /// Epoch milliseconds.
    pub start: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetPage {
    #[serde(default)]
    pub datasets: Vec<DatasetSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelValue {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Folds label values into a map keyed by name. A repeated name keeps the last value.
pub fn collect_label_values<I>(values: I) -> LabelValueMap
where
    I: IntoIterator<Item = LabelValue>,
{
    values
        .into_iter()
        .map(|label| (label.name, label.value))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub test_id: i32,
    pub run_id: i32,
    pub dataset_id: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorRecord {
    pub test_id: i32,
    pub run_id: i32,
    pub dataset_id: i32,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub label_values: LabelValueMap,
}

impl MirrorRecord {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            test_id: self.test_id,
            run_id: self.run_id,
            dataset_id: self.dataset_id,
        }
    }
}

/// Builds the persisted shape of a dataset.
///
/// `start` is floor-divided to whole seconds before conversion, so any
/// sub-second part of the upstream timestamp is dropped on purpose.
pub fn to_record(
    summary: &DatasetSummary,
    label_values: LabelValueMap,
) -> Result<MirrorRecord, RecordError> {
    let start = start_from_millis(summary.start).ok_or(RecordError::InvalidStart {
        dataset_id: summary.id,
        start_ms: summary.start,
    })?;
    Ok(MirrorRecord {
        test_id: summary.test_id,
        run_id: summary.run_id,
        dataset_id: summary.id,
        start,
        label_values,
    })
}

pub fn start_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(millis.div_euclid(1000), 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary(start: i64) -> DatasetSummary {
        DatasetSummary {
            id: 301,
            test_id: 7,
            run_id: 42,
            start,
        }
    }

    #[test]
    fn converts_epoch_millis_to_utc() {
        let record = to_record(&summary(1_700_000_000_000), LabelValueMap::new()).unwrap();
        assert_eq!(record.start.to_rfc3339(), "2023-11-14T22:13:20+00:00");
        assert_eq!(record.test_id, 7);
        assert_eq!(record.run_id, 42);
        assert_eq!(record.dataset_id, 301);
    }

    #[test]
    fn truncates_sub_second_precision() {
        let exact = to_record(&summary(1_700_000_000_000), LabelValueMap::new()).unwrap();
        let late = to_record(&summary(1_700_000_000_999), LabelValueMap::new()).unwrap();
        assert_eq!(exact.start, late.start);
        assert_eq!(late.start.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn rejects_out_of_range_start() {
        let err = to_record(&summary(i64::MAX), LabelValueMap::new()).unwrap_err();
        assert!(matches!(err, RecordError::InvalidStart { dataset_id: 301, .. }));
    }

    #[test]
    fn later_label_wins_on_duplicate_name() {
        let labels = collect_label_values(vec![
            LabelValue {
                name: "throughput".to_string(),
                value: json!(10),
            },
            LabelValue {
                name: "latency".to_string(),
                value: json!({"p99": 1.5}),
            },
            LabelValue {
                name: "throughput".to_string(),
                value: json!(12),
            },
        ]);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["throughput"], json!(12));
        assert_eq!(labels["latency"], json!({"p99": 1.5}));
    }

    #[test]
    fn decodes_listing_page() {
        let page: DatasetPage = serde_json::from_value(json!({
            "total": 2,
            "datasets": [
                {"id": 1, "testId": 7, "runId": 11, "start": 1700000000000i64, "owner": "perf"},
                {"id": 2, "testId": 7, "runId": 12, "start": 1700000100000i64}
            ]
        }))
        .unwrap();
        assert_eq!(page.datasets.len(), 2);
        assert_eq!(page.datasets[0].run_id, 11);
        assert_eq!(page.datasets[1].id, 2);
    }

    #[test]
    fn missing_datasets_key_is_an_empty_page() {
        let page: DatasetPage = serde_json::from_value(json!({"total": 0})).unwrap();
        assert!(page.datasets.is_empty());
    }

    #[test]
    fn natural_key_ignores_payload() {
        let a = to_record(&summary(1_700_000_000_000), LabelValueMap::new()).unwrap();
        let mut labels = LabelValueMap::new();
        labels.insert("x".to_string(), json!(1));
        let b = to_record(&summary(1_600_000_000_000), labels).unwrap();
        assert_eq!(a.natural_key(), b.natural_key());
    }
}
