//! Choosing which ledger records a rollback touches

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{SmartMigrationError, SmartResult};
use crate::ledger::MigrationRecord;

/// Operator options for a rollback
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackOptions {
    /// Only the newest matching record
    pub latest: bool,
    /// Only the oldest matching record
    pub oldest: bool,
    /// Only records in this batch
    pub batch: Option<i64>,
    /// Every matching record
    pub all: bool,
    /// Allow a selection spanning several batches
    pub force: bool,
}

impl RollbackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest() -> Self {
        Self {
            latest: true,
            ..Self::default()
        }
    }

    pub fn oldest() -> Self {
        Self {
            oldest: true,
            ..Self::default()
        }
    }

    pub fn batch(batch: i64) -> Self {
        Self {
            batch: Some(batch),
            ..Self::default()
        }
    }

    pub fn all() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    /// Collapse flags to one intent: latest, oldest, batch, all, then current batch
    pub fn intent(&self) -> SelectionIntent {
        if self.latest {
            SelectionIntent::Latest
        } else if self.oldest {
            SelectionIntent::Oldest
        } else if let Some(batch) = self.batch {
            SelectionIntent::Batch(batch)
        } else if self.all {
            SelectionIntent::All
        } else {
            SelectionIntent::CurrentBatch
        }
    }

    pub fn allow_multi_batch(&self) -> bool {
        self.force
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionIntent {
    Latest,
    Oldest,
    Batch(i64),
    All,
    /// Highest batch present among the candidates
    CurrentBatch,
}

/// Applies [`RollbackOptions`] to a candidate set and checks the result
#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackSelector;

impl RollbackSelector {
    pub fn new() -> Self {
        Self
    }

    /// Selected records in execution order, newest first
    pub fn select(
        &self,
        candidates: &[MigrationRecord],
        options: &RollbackOptions,
    ) -> Vec<MigrationRecord> {
        let intent = options.intent();
        let mut selected: Vec<MigrationRecord> = match intent {
            SelectionIntent::Latest => candidates.iter().max().cloned().into_iter().collect(),
            SelectionIntent::Oldest => candidates.iter().min().cloned().into_iter().collect(),
            SelectionIntent::Batch(batch) => {
                candidates.iter().filter(|r| r.batch == batch).cloned().collect()
            }
            SelectionIntent::All => candidates.to_vec(),
            SelectionIntent::CurrentBatch => match candidates.iter().map(|r| r.batch).max() {
                Some(current) => {
                    candidates.iter().filter(|r| r.batch == current).cloned().collect()
                }
                None => Vec::new(),
            },
        };

        selected.sort_by(|a, b| b.cmp(a));
        tracing::debug!(
            ?intent,
            candidates = candidates.len(),
            selected = selected.len(),
            "rollback selection"
        );
        selected
    }

    /// Whether a selection may run
    pub fn validate(&self, selection: &[MigrationRecord], allow_multi_batch: bool) -> bool {
        self.check(selection, allow_multi_batch).is_ok()
    }

    /// [`validate`](Self::validate) with the reason on failure
    pub fn check(&self, selection: &[MigrationRecord], allow_multi_batch: bool) -> SmartResult<()> {
        if selection.is_empty() {
            return Err(SmartMigrationError::selection_invalid("no migrations selected"));
        }

        let batches = distinct_batches(selection);
        if batches.len() > 1 && !allow_multi_batch {
            let listed: Vec<String> = batches.iter().map(i64::to_string).collect();
            return Err(SmartMigrationError::selection_invalid(format!(
                "selection spans batches {}; use force to roll back across batches",
                listed.join(", ")
            )));
        }

        Ok(())
    }

    /// Select, then check against the options' multi-batch override
    pub fn select_and_check(
        &self,
        candidates: &[MigrationRecord],
        options: &RollbackOptions,
    ) -> SmartResult<Vec<MigrationRecord>> {
        let selected = self.select(candidates, options);
        self.check(&selected, options.allow_multi_batch())?;
        Ok(selected)
    }
}

/// Sorted distinct batch numbers of a record set
pub fn distinct_batches(records: &[MigrationRecord]) -> Vec<i64> {
    records
        .iter()
        .map(|r| r.batch)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<MigrationRecord> {
        vec![
            MigrationRecord::new("2024_01_01_000001_create_users_table", 1),
            MigrationRecord::new("2024_02_01_000001_add_avatar_to_users_table", 2),
            MigrationRecord::new("2024_02_01_000002_add_bio_to_users_table", 2),
        ]
    }

    fn ids(records: &[MigrationRecord]) -> Vec<&str> {
        records.iter().map(|r| r.identifier.as_str()).collect()
    }

    #[test]
    fn test_default_selects_current_batch_newest_first() {
        let selected = RollbackSelector::new().select(&candidates(), &RollbackOptions::new());
        assert_eq!(
            ids(&selected),
            vec![
                "2024_02_01_000002_add_bio_to_users_table",
                "2024_02_01_000001_add_avatar_to_users_table",
            ]
        );
    }

    #[test]
    fn test_latest_and_oldest() {
        let selector = RollbackSelector::new();
        let latest = selector.select(&candidates(), &RollbackOptions::latest());
        assert_eq!(ids(&latest), vec!["2024_02_01_000002_add_bio_to_users_table"]);

        let oldest = selector.select(&candidates(), &RollbackOptions::oldest());
        assert_eq!(ids(&oldest), vec!["2024_01_01_000001_create_users_table"]);
    }

    #[test]
    fn test_intent_priority() {
        let options = RollbackOptions {
            latest: true,
            oldest: true,
            batch: Some(1),
            all: true,
            force: false,
        };
        assert_eq!(options.intent(), SelectionIntent::Latest);

        let options = RollbackOptions {
            batch: Some(1),
            all: true,
            ..RollbackOptions::default()
        };
        assert_eq!(options.intent(), SelectionIntent::Batch(1));
        assert_eq!(RollbackOptions::all().intent(), SelectionIntent::All);
        assert_eq!(RollbackOptions::new().intent(), SelectionIntent::CurrentBatch);
    }

    #[test]
    fn test_batch_selection() {
        let selector = RollbackSelector::new();
        assert_eq!(selector.select(&candidates(), &RollbackOptions::batch(1)).len(), 1);
        assert!(selector.select(&candidates(), &RollbackOptions::batch(7)).is_empty());
    }

    #[test]
    fn test_all_requires_force_across_batches() {
        let selector = RollbackSelector::new();
        let all = selector.select(&candidates(), &RollbackOptions::all());
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].batch, 1);

        assert!(!selector.validate(&all, false));
        assert!(selector.validate(&all, true));

        match selector.select_and_check(&candidates(), &RollbackOptions::all()) {
            Err(SmartMigrationError::SelectionInvalid { reason }) => {
                assert!(reason.contains("1, 2"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(selector
            .select_and_check(&candidates(), &RollbackOptions::all().forced())
            .is_ok());
    }

    #[test]
    fn test_empty_selection_is_invalid() {
        let selector = RollbackSelector::new();
        assert!(!selector.validate(&[], true));
        assert!(selector.select(&[], &RollbackOptions::new()).is_empty());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: RollbackOptions =
            serde_json::from_str(r#"{"batch": 3, "force": true}"#).unwrap();
        assert_eq!(options.batch, Some(3));
        assert!(options.force);
        assert!(!options.latest);
    }

    #[test]
    fn test_distinct_batches() {
        assert_eq!(distinct_batches(&candidates()), vec![1, 2]);
    }
}
