//! Analysis history management
//!
//! Bounded, most-recent-first log of saved analyses, persisted as one JSON
//! array in a single [`Storage`] slot. Every operation reads and rewrites the
//! whole collection; the 50-item bound keeps that cheap.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{AnalysisHistoryItem, Prediction};
use crate::storage::Storage;

/// Maximum number of analyses kept in history
pub const MAX_HISTORY_ITEMS: usize = 50;

/// Persisted history of saved analyses
#[derive(Debug)]
pub struct HistoryStore<S: Storage> {
    storage: S,
}

impl<S: Storage> HistoryStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Insert at the front, dropping anything beyond the 50 most recent
    pub fn append(&self, item: AnalysisHistoryItem) -> AppResult<AnalysisHistoryItem> {
        let mut items = self.list();
        items.insert(0, item.clone());

        let evicted = items.len().saturating_sub(MAX_HISTORY_ITEMS);
        items.truncate(MAX_HISTORY_ITEMS);

        self.persist(&items)?;

        debug!(
            analysis_id = %item.id,
            items = items.len(),
            evicted = evicted,
            "Analysis saved to history"
        );

        Ok(item)
    }

    /// All stored items, most recent first.
    ///
    /// Unreadable or foreign slot contents, including results whose derived
    /// fields disagree, read as an empty history.
    pub fn list(&self) -> Vec<AnalysisHistoryItem> {
        let contents = match self.storage.read() {
            Ok(Some(contents)) => contents,
            Ok(None) => return Vec::new(),
            Err(e) => {
                let error = AppError::HistoryReadCorrupted(e.to_string());
                warn!(error = %error, "History slot unreadable, treating as empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<AnalysisHistoryItem>>(&contents) {
            Ok(items) => match items.iter().find(|item| !item.results.is_consistent()) {
                Some(bad) => {
                    let error = AppError::HistoryReadCorrupted(format!(
                        "analysis {} has inconsistent results",
                        bad.id
                    ));
                    warn!(error = %error, "History slot corrupted, treating as empty");
                    Vec::new()
                }
                None => items,
            },
            Err(e) => {
                let error = AppError::HistoryReadCorrupted(e.to_string());
                warn!(error = %error, "History slot corrupted, treating as empty");
                Vec::new()
            }
        }
    }

    /// Look up one item by analysis ID
    pub fn get(&self, id: &str) -> Option<AnalysisHistoryItem> {
        self.list().into_iter().find(|item| item.id == id)
    }

    /// The `count` most recent items
    pub fn recent(&self, count: usize) -> Vec<AnalysisHistoryItem> {
        let mut items = self.list();
        items.truncate(count);
        items
    }

    /// Remove the item with `id`; absent IDs are a no-op
    pub fn remove(&self, id: &str) -> AppResult<()> {
        let mut items = self.list();
        let before = items.len();
        items.retain(|item| item.id != id);

        if items.len() == before {
            debug!(analysis_id = %id, "Nothing to remove from history");
            return Ok(());
        }

        self.persist(&items)?;
        info!(analysis_id = %id, "Analysis removed from history");
        Ok(())
    }

    /// Empty the history
    pub fn clear(&self) -> AppResult<()> {
        self.storage.remove()?;
        info!("History cleared");
        Ok(())
    }

    /// Items matching `query`, in the requested order
    pub fn query(&self, query: &HistoryQuery) -> Vec<AnalysisHistoryItem> {
        let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let mut items: Vec<AnalysisHistoryItem> = self
            .list()
            .into_iter()
            .filter(|item| search.map_or(true, |term| item.matches_search(term)))
            .filter(|item| {
                query
                    .prediction
                    .map_or(true, |prediction| item.results.prediction() == prediction)
            })
            .collect();

        items.sort_by(|a, b| query.sort.compare(a, b));
        items
    }

    /// Summary over the stored items
    pub fn statistics(&self) -> HistoryStatistics {
        let items = self.list();
        if items.is_empty() {
            return HistoryStatistics::empty();
        }

        let count_of = |prediction: Prediction| {
            items
                .iter()
                .filter(|item| item.results.prediction() == prediction)
                .count()
        };

        let confidence_sum: f64 = items.iter().map(|item| item.results.confidence()).sum();

        HistoryStatistics {
            count: items.len(),
            positive: count_of(Prediction::Positive),
            negative: count_of(Prediction::Negative),
            uncertain: count_of(Prediction::Uncertain),
            average_confidence: (confidence_sum / items.len() as f64 * 10.0).round() / 10.0,
            last_analysis: items.first().map(|item| item.timestamp),
        }
    }

    fn persist(&self, items: &[AnalysisHistoryItem]) -> AppResult<()> {
        let contents = serde_json::to_string(items)
            .map_err(|e| AppError::Storage(format!("History serialization error: {}", e)))?;
        self.storage.write(&contents)?;
        Ok(())
    }
}

/// History listing order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    /// Highest confidence first
    Confidence,
}

impl SortOrder {
    fn compare(&self, a: &AnalysisHistoryItem, b: &AnalysisHistoryItem) -> Ordering {
        match self {
            SortOrder::Newest => b.timestamp.cmp(&a.timestamp),
            SortOrder::Oldest => a.timestamp.cmp(&b.timestamp),
            SortOrder::Confidence => b.results.confidence().total_cmp(&a.results.confidence()),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Newest => write!(f, "newest"),
            SortOrder::Oldest => write!(f, "oldest"),
            SortOrder::Confidence => write!(f, "confidence"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(SortOrder::Newest),
            "oldest" => Ok(SortOrder::Oldest),
            "confidence" => Ok(SortOrder::Confidence),
            other => Err(format!("Unknown sort order: {}", other)),
        }
    }
}

/// Filter and ordering for browsing history
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// Case-insensitive match on patient ID or analysis ID
    pub search: Option<String>,
    pub prediction: Option<Prediction>,
    pub sort: SortOrder,
}

/// Statistical summary of stored analyses
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct HistoryStatistics {
    pub count: usize,
    pub positive: usize,
    pub negative: usize,
    pub uncertain: usize,
    pub average_confidence: f64,
    pub last_analysis: Option<chrono::DateTime<chrono::Utc>>,
}

impl HistoryStatistics {
    pub fn empty() -> Self {
        Self {
            count: 0,
            positive: 0,
            negative: 0,
            uncertain: 0,
            average_confidence: 0.0,
            last_analysis: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisResult, Detection, PatientInfo};
    use crate::storage::{FileStorage, MemoryStorage, StorageError, HISTORY_STORAGE_KEY};
    use chrono::{Duration, TimeZone, Utc};

    fn result(prediction: Prediction, confidence: f64) -> AnalysisResult {
        AnalysisResult::from_detection(Detection {
            prediction,
            confidence,
            parasites_detected: 4,
            cells_analyzed: 2500,
            processing_time_secs: 1.5,
            bounding_boxes: Vec::new(),
        })
    }

    fn item_at(seconds: i64, prediction: Prediction, confidence: f64) -> AnalysisHistoryItem {
        let mut item = AnalysisHistoryItem::new(
            "data:image/png;base64,AAAA".to_string(),
            result(prediction, confidence),
            None,
        );
        item.timestamp = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap() + Duration::seconds(seconds);
        item
    }

    fn store() -> HistoryStore<MemoryStorage> {
        HistoryStore::new(MemoryStorage::new())
    }

    #[test]
    fn test_empty_history() {
        let history = store();
        assert!(history.list().is_empty());
        assert_eq!(history.statistics(), HistoryStatistics::empty());
    }

    #[test]
    fn test_append_is_most_recent_first() {
        let history = store();
        let a = item_at(1, Prediction::Positive, 90.0);
        let b = item_at(2, Prediction::Negative, 95.0);

        history.append(a.clone()).unwrap();
        history.append(b.clone()).unwrap();

        assert_eq!(history.list(), vec![b, a]);
    }

    #[test]
    fn test_append_round_trip_is_exact() {
        let history = store();
        let mut item = item_at(0, Prediction::Uncertain, 61.3);
        item.patient_info = Some(PatientInfo {
            patient_id: Some("PT-77".to_string()),
            age: Some(8),
            notes: Some("febrile, 3 days".to_string()),
            ..Default::default()
        });

        let stored = history.append(item.clone()).unwrap();

        assert_eq!(stored, item);
        assert_eq!(history.list(), vec![item]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let history = store();
        let items: Vec<_> = (0..51).map(|i| item_at(i, Prediction::Negative, 90.0)).collect();

        for item in &items {
            history.append(item.clone()).unwrap();
        }

        let stored = history.list();
        assert_eq!(stored.len(), MAX_HISTORY_ITEMS);
        assert_eq!(stored[0], items[50]);
        assert_eq!(stored[49], items[1]);
        assert!(stored.iter().all(|item| item.id != items[0].id));
    }

    #[test]
    fn test_remove() {
        let history = store();
        let a = item_at(1, Prediction::Positive, 90.0);
        let b = item_at(2, Prediction::Negative, 95.0);
        history.append(a.clone()).unwrap();
        history.append(b.clone()).unwrap();

        history.remove(&a.id).unwrap();
        assert_eq!(history.list(), vec![b]);
    }

    #[test]
    fn test_remove_missing_id_is_noop() {
        let history = store();
        let a = item_at(1, Prediction::Positive, 90.0);
        history.append(a.clone()).unwrap();

        assert!(history.remove("analysis-does-not-exist").is_ok());
        assert_eq!(history.list(), vec![a]);
    }

    #[test]
    fn test_clear() {
        let history = store();
        history.append(item_at(1, Prediction::Positive, 90.0)).unwrap();
        history.append(item_at(2, Prediction::Positive, 91.0)).unwrap();

        history.clear().unwrap();
        assert!(history.list().is_empty());
    }

    #[test]
    fn test_corrupt_slot_reads_as_empty() {
        let history = HistoryStore::new(MemoryStorage::with_contents("{not json"));
        assert!(history.list().is_empty());

        let foreign = HistoryStore::new(MemoryStorage::with_contents(r#"{"theme":"dark"}"#));
        assert!(foreign.list().is_empty());
    }

    #[test]
    fn test_inconsistent_results_read_as_empty() {
        let item = item_at(1, Prediction::Positive, 90.0);
        let mut value = serde_json::to_value(vec![item]).unwrap();
        value[0]["results"]["parasitesDetected"] = serde_json::json!(40);

        let history = HistoryStore::new(MemoryStorage::with_contents(value.to_string()));
        assert!(history.list().is_empty());
    }

    /// Backend whose every operation fails
    struct BrokenStorage;

    impl Storage for BrokenStorage {
        fn read(&self) -> Result<Option<String>, StorageError> {
            Err(StorageError::Poisoned)
        }

        fn write(&self, _contents: &str) -> Result<(), StorageError> {
            Err(StorageError::Poisoned)
        }

        fn remove(&self) -> Result<(), StorageError> {
            Err(StorageError::Poisoned)
        }
    }

    #[test]
    fn test_unreadable_storage() {
        let history = HistoryStore::new(BrokenStorage);

        assert!(history.list().is_empty());
        assert_eq!(history.statistics(), HistoryStatistics::empty());
        assert!(matches!(
            history.append(item_at(1, Prediction::Negative, 97.0)),
            Err(AppError::Storage(_))
        ));
        assert!(matches!(history.clear(), Err(AppError::Storage(_))));
    }

    #[test]
    fn test_file_backed_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let a = item_at(1, Prediction::Positive, 90.0);
        let b = item_at(2, Prediction::Uncertain, 64.0);

        let history = HistoryStore::new(FileStorage::new(dir.path(), HISTORY_STORAGE_KEY));
        history.append(a.clone()).unwrap();
        history.append(b.clone()).unwrap();

        // A fresh store over the same directory sees what was written
        let reopened = HistoryStore::new(FileStorage::new(dir.path(), HISTORY_STORAGE_KEY));
        assert_eq!(reopened.list(), vec![b.clone(), a.clone()]);

        reopened.remove(&a.id).unwrap();
        assert_eq!(history.list(), vec![b]);

        reopened.clear().unwrap();
        assert!(history.list().is_empty());
        assert!(!dir.path().join("malaria_analysis_history.json").exists());
    }

    #[test]
    fn test_append_over_corrupt_slot_recovers() {
        let history = HistoryStore::new(MemoryStorage::with_contents("garbage"));
        let item = item_at(1, Prediction::Negative, 97.0);

        history.append(item.clone()).unwrap();
        assert_eq!(history.list(), vec![item]);
    }

    #[test]
    fn test_slot_is_plain_json_array() {
        let storage = MemoryStorage::new();
        let history = HistoryStore::new(storage);
        history.append(item_at(1, Prediction::Positive, 90.0)).unwrap();

        let raw = history.storage.read().unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.is_array());
        assert!(value[0]["results"]["parasiteStages"].is_object());
        assert!(value[0]["imageData"].as_str().unwrap().starts_with("data:image/png"));
        assert_eq!(HISTORY_STORAGE_KEY, "malaria_analysis_history");
    }

    #[test]
    fn test_get_and_recent() {
        let history = store();
        let items: Vec<_> = (0..5).map(|i| item_at(i, Prediction::Negative, 90.0)).collect();
        for item in &items {
            history.append(item.clone()).unwrap();
        }

        assert_eq!(history.get(&items[2].id), Some(items[2].clone()));
        assert_eq!(history.get("missing"), None);

        let recent = history.recent(3);
        assert_eq!(recent, vec![items[4].clone(), items[3].clone(), items[2].clone()]);
    }

    #[test]
    fn test_query_filters_and_sorts() {
        let history = store();
        let mut tagged = item_at(1, Prediction::Positive, 80.0);
        tagged.patient_info = Some(PatientInfo {
            patient_id: Some("Ward3-014".to_string()),
            ..Default::default()
        });
        let negative = item_at(2, Prediction::Negative, 99.0);
        let positive = item_at(3, Prediction::Positive, 95.0);

        history.append(tagged.clone()).unwrap();
        history.append(negative.clone()).unwrap();
        history.append(positive.clone()).unwrap();

        let positives = history.query(&HistoryQuery {
            prediction: Some(Prediction::Positive),
            ..Default::default()
        });
        assert_eq!(positives, vec![positive.clone(), tagged.clone()]);

        let searched = history.query(&HistoryQuery {
            search: Some("ward3".to_string()),
            ..Default::default()
        });
        assert_eq!(searched, vec![tagged.clone()]);

        let oldest = history.query(&HistoryQuery {
            sort: SortOrder::Oldest,
            ..Default::default()
        });
        assert_eq!(oldest, vec![tagged.clone(), negative.clone(), positive.clone()]);

        let by_confidence = history.query(&HistoryQuery {
            sort: SortOrder::Confidence,
            ..Default::default()
        });
        assert_eq!(by_confidence, vec![negative, positive, tagged]);
    }

    #[test]
    fn test_blank_search_matches_everything() {
        let history = store();
        history.append(item_at(1, Prediction::Positive, 90.0)).unwrap();

        let all = history.query(&HistoryQuery {
            search: Some("   ".to_string()),
            ..Default::default()
        });
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_statistics() {
        let history = store();
        history.append(item_at(1, Prediction::Positive, 90.0)).unwrap();
        history.append(item_at(2, Prediction::Negative, 96.0)).unwrap();
        history.append(item_at(3, Prediction::Uncertain, 60.0)).unwrap();

        let stats = history.statistics();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.positive, 1);
        assert_eq!(stats.negative, 1);
        assert_eq!(stats.uncertain, 1);
        assert_eq!(stats.average_confidence, 82.0);
        assert_eq!(stats.last_analysis, Some(item_at(3, Prediction::Uncertain, 60.0).timestamp));
    }

    #[test]
    fn test_sort_order_parsing() {
        assert_eq!("newest".parse::<SortOrder>().unwrap(), SortOrder::Newest);
        assert_eq!("Confidence".parse::<SortOrder>().unwrap(), SortOrder::Confidence);
        assert!("random".parse::<SortOrder>().is_err());
    }
}
