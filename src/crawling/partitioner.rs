//! Work partitioning
//!
//! Turns the raw identifier list into ordered, non-overlapping batches of
//! work that has not been checkpointed yet. Pure and deterministic.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::errors::AuditError;
use crate::domain::identifier::normalize_identifier;

/// Header token some input files carry on their first line
pub const HEADER_TOKEN: &str = "UPC";

/// One contiguous slice of work, numbered from 1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub number: usize,
    pub identifiers: Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

/// Result of partitioning, with the counts the run summary reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkPlan {
    pub batches: Vec<Batch>,
    /// Non-blank, non-header lines read
    pub input_size: usize,
    /// Identifiers dropped because they were already checkpointed
    pub already_processed: usize,
}

impl WorkPlan {
    pub fn scheduled(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }
}

/// Reads the identifier file as raw lines.
pub async fn load_identifiers(path: &Path) -> Result<Vec<String>, AuditError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AuditError::io(path, e))?;
    Ok(content.lines().map(str::to_string).collect())
}

/// Splits `raw` into batches of `batch_size`.
///
/// Blank lines and a literal `UPC` header are dropped, duplicates are removed
/// (first occurrence wins) when `deduplicate` is set, and identifiers found in
/// `processed` are skipped. An empty result is a configuration error.
pub fn partition<I, S>(
    raw: I,
    deduplicate: bool,
    batch_size: usize,
    processed: &HashSet<String>,
) -> Result<WorkPlan, AuditError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if batch_size == 0 {
        return Err(AuditError::Configuration("batch size must be positive".into()));
    }

    let mut seen = HashSet::new();
    let mut input_size = 0;
    let mut already_processed = 0;
    let mut work = Vec::new();

    for line in raw {
        let id = normalize_identifier(line.as_ref());
        if id.is_empty() || id.eq_ignore_ascii_case(HEADER_TOKEN) {
            continue;
        }
        input_size += 1;
        if deduplicate && !seen.insert(id.to_string()) {
            continue;
        }
        if processed.contains(id) {
            already_processed += 1;
            continue;
        }
        work.push(id.to_string());
    }

    if work.is_empty() {
        return Err(AuditError::Configuration(format!(
            "no identifiers left to process ({input_size} read, {already_processed} already checkpointed)"
        )));
    }

    let batches: Vec<Batch> = work
        .chunks(batch_size)
        .enumerate()
        .map(|(i, chunk)| Batch {
            number: i + 1,
            identifiers: chunk.to_vec(),
        })
        .collect();

    info!(
        "📦 Partitioned {} identifiers into {} batches of up to {} ({} already checkpointed)",
        work.len(),
        batches.len(),
        batch_size,
        already_processed
    );

    Ok(WorkPlan {
        batches,
        input_size,
        already_processed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn none() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn strips_blanks_and_header_and_dedups_in_order() {
        let raw = ["UPC", "", "  22222222 ", "11111111", "22222222", "   ", "33333333"];
        let plan = partition(raw, true, 2, &none()).unwrap();
        assert_eq!(plan.input_size, 4);
        assert_eq!(plan.batches.len(), 2);
        assert_eq!(plan.batches[0].identifiers, vec!["22222222", "11111111"]);
        assert_eq!(plan.batches[1].identifiers, vec!["33333333"]);
        assert_eq!(plan.batches[1].number, 2);
    }

    #[test]
    fn keeps_duplicates_when_dedup_is_off() {
        let plan = partition(["11111111", "11111111"], false, 10, &none()).unwrap();
        assert_eq!(plan.scheduled(), 2);
    }

    #[test]
    fn skips_checkpointed_identifiers() {
        let processed: HashSet<String> = ["11111111".to_string()].into();
        let plan = partition(["11111111", "22222222"], true, 10, &processed).unwrap();
        assert_eq!(plan.already_processed, 1);
        assert_eq!(plan.batches[0].identifiers, vec!["22222222"]);
    }

    #[test]
    fn empty_work_is_a_configuration_error() {
        let processed: HashSet<String> = ["11111111".to_string()].into();
        assert!(matches!(
            partition(["upc", "11111111"], true, 10, &processed),
            Err(AuditError::Configuration(_))
        ));
        assert!(matches!(partition(["11111111"], true, 0, &none()), Err(AuditError::Configuration(_))));
    }

    #[test]
    fn malformed_identifiers_are_still_scheduled() {
        let plan = partition(["12345", "ABCDEFGH"], true, 10, &none()).unwrap();
        assert_eq!(plan.scheduled(), 2);
    }

    proptest! {
        #[test]
        fn batches_cover_work_exactly_once(
            ids in proptest::collection::vec("[0-9]{8,14}", 1..200),
            batch_size in 1usize..40,
        ) {
            let plan = partition(&ids, true, batch_size, &HashSet::new()).unwrap();
            let flattened: Vec<String> = plan.batches.iter().flat_map(|b| b.identifiers.clone()).collect();

            let mut expected = Vec::new();
            let mut seen = HashSet::new();
            for id in &ids {
                if seen.insert(id.clone()) {
                    expected.push(id.clone());
                }
            }
            prop_assert_eq!(flattened, expected);
            prop_assert!(plan.batches.iter().all(|b| !b.is_empty() && b.len() <= batch_size));
            prop_assert!(plan.batches.iter().rev().skip(1).all(|b| b.len() == batch_size));
        }

        #[test]
        fn partition_is_deterministic(ids in proptest::collection::vec("[0-9]{8,10}", 1..100)) {
            let a = partition(&ids, true, 7, &HashSet::new()).unwrap();
            let b = partition(&ids, true, 7, &HashSet::new()).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
