//! Deduplication and reinforcement of extracted memories.
//!
//! `MergeEngine` folds freshly extracted candidates into a caller's
//! existing records for one owner scope. A candidate whose text is
//! sufficiently similar to an existing record of the SAME category
//! reinforces that record instead of creating a duplicate; categories
//! never merge across each other. When a candidate clears the threshold
//! against several records it merges into the single best match only,
//! so reinforcement does not fragment across near-duplicates.
//!
//! Similarity is a normalized token-set Jaccard score in [0, 1] over
//! lowercased alphanumeric words. The threshold is configuration, not a
//! literal (default 0.85, see `MemoryConfig`).

use std::collections::HashSet;

use chrono::Utc;

use memvox_types::memory::{MemoryCandidate, MemoryRecord, OwnerScope};

/// Result of one merge pass.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Records created by this pass (reinforcement_count starts at 1).
    pub created: Vec<MemoryRecord>,
    /// Pre-existing records reinforced by this pass, in final state.
    pub reinforced: Vec<MemoryRecord>,
}

/// Merges candidate memories into an owner scope's existing records.
pub struct MergeEngine {
    similarity_threshold: f32,
}

impl MergeEngine {
    pub fn new(similarity_threshold: f32) -> Self {
        Self {
            similarity_threshold,
        }
    }

    /// Merge candidates against the scope's existing records.
    ///
    /// `existing` is the scope's current record set (ordered by recency,
    /// though ordering does not affect the outcome -- the best match
    /// wins regardless of position). Candidates also dedupe against
    /// records created earlier in the same pass, so feeding the same
    /// transcript through twice can never yield duplicates.
    pub fn merge(
        &self,
        candidates: &[MemoryCandidate],
        existing: &[MemoryRecord],
        scope: &OwnerScope,
        conversation_id: &str,
    ) -> MergeOutcome {
        let now = Utc::now();
        let mut pool: Vec<MemoryRecord> = existing.to_vec();
        let existing_count = pool.len();
        let mut touched_existing: Vec<usize> = Vec::new();
        let mut created_indices: Vec<usize> = Vec::new();

        for candidate in candidates {
            match self.best_match(candidate, &pool) {
                Some(index) => {
                    let record = &mut pool[index];
                    record.reinforcement_count += 1;
                    record.last_reinforced_at = now;
                    // Reinforcement never lowers importance.
                    record.importance = record.importance.max(candidate.importance);
                    record.source_conversation_id = conversation_id.to_string();
                    if index < existing_count && !touched_existing.contains(&index) {
                        touched_existing.push(index);
                    }
                    tracing::debug!(
                        record_id = %record.id,
                        count = record.reinforcement_count,
                        "reinforced existing memory"
                    );
                }
                None => {
                    let record =
                        MemoryRecord::from_candidate(candidate, scope.clone(), conversation_id, now);
                    tracing::debug!(record_id = %record.id, category = %record.category, "created new memory");
                    created_indices.push(pool.len());
                    pool.push(record);
                }
            }
        }

        let reinforced = touched_existing
            .into_iter()
            .map(|i| pool[i].clone())
            .collect();
        let created = created_indices.into_iter().map(|i| pool[i].clone()).collect();
        MergeOutcome {
            created,
            reinforced,
        }
    }

    /// Index of the highest-similarity same-category record at or above
    /// the threshold, if any.
    fn best_match(&self, candidate: &MemoryCandidate, pool: &[MemoryRecord]) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (index, record) in pool.iter().enumerate() {
            if record.category != candidate.category {
                continue;
            }
            let score = text_similarity(&candidate.text, &record.text);
            if score < self.similarity_threshold {
                continue;
            }
            if best.is_none_or(|(_, b)| score > b) {
                best = Some((index, score));
            }
        }
        best.map(|(index, _)| index)
    }
}

/// Normalized token-set Jaccard similarity in [0, 1].
///
/// Tokens are lowercased maximal runs of alphanumeric characters, so
/// punctuation and casing differences do not count against a match.
pub fn text_similarity(a: &str, b: &str) -> f32 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f32 / union as f32
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use memvox_types::memory::MemoryCategory;

    fn scope() -> OwnerScope {
        OwnerScope::new("+15551234567", "agent_01")
    }

    fn candidate(category: MemoryCategory, text: &str, importance: u8) -> MemoryCandidate {
        MemoryCandidate {
            category,
            text: text.to_string(),
            importance,
        }
    }

    fn record(category: MemoryCategory, text: &str, importance: u8) -> MemoryRecord {
        MemoryRecord::from_candidate(
            &candidate(category, text, importance),
            scope(),
            "conv_prior",
            Utc::now(),
        )
    }

    #[test]
    fn test_similarity_identical_and_disjoint() {
        assert!((text_similarity("prefers express shipping", "prefers express shipping") - 1.0).abs() < f32::EPSILON);
        assert_eq!(text_similarity("alpha beta", "gamma delta"), 0.0);
        assert_eq!(text_similarity("", "anything"), 0.0);
    }

    #[test]
    fn test_similarity_ignores_case_and_punctuation() {
        let score = text_similarity(
            "Caller prefers EXPRESS shipping!",
            "caller prefers express shipping",
        );
        assert!((score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_merge_into_empty_creates_all() {
        let engine = MergeEngine::new(0.85);
        let candidates = vec![
            candidate(MemoryCategory::Factual, "Caller ordered product XYZ-789", 7),
            candidate(MemoryCategory::Preference, "Caller prefers express shipping", 6),
        ];

        let outcome = engine.merge(&candidates, &[], &scope(), "conv_1");
        assert_eq!(outcome.created.len(), 2);
        assert!(outcome.reinforced.is_empty());
        assert!(outcome.created.iter().all(|r| r.reinforcement_count == 1));
    }

    #[test]
    fn test_duplicate_reinforces_instead_of_creating() {
        let engine = MergeEngine::new(0.85);
        let existing = vec![record(
            MemoryCategory::Preference,
            "Caller prefers express shipping",
            6,
        )];
        let candidates = vec![candidate(
            MemoryCategory::Preference,
            "caller prefers express shipping",
            4,
        )];

        let outcome = engine.merge(&candidates, &existing, &scope(), "conv_2");
        assert!(outcome.created.is_empty());
        assert_eq!(outcome.reinforced.len(), 1);
        let reinforced = &outcome.reinforced[0];
        assert_eq!(reinforced.id, existing[0].id);
        assert_eq!(reinforced.reinforcement_count, 2);
        assert_eq!(reinforced.source_conversation_id, "conv_2");
        // Importance never lowered by a weaker candidate.
        assert_eq!(reinforced.importance, 6);
    }

    #[test]
    fn test_reinforcement_raises_importance() {
        let engine = MergeEngine::new(0.85);
        let existing = vec![record(MemoryCategory::Factual, "Caller's account is 4417", 5)];
        let candidates = vec![candidate(MemoryCategory::Factual, "caller's account is 4417", 9)];

        let outcome = engine.merge(&candidates, &existing, &scope(), "conv_2");
        assert_eq!(outcome.reinforced[0].importance, 9);
    }

    #[test]
    fn test_cross_category_never_merges() {
        let engine = MergeEngine::new(0.5);
        let existing = vec![record(MemoryCategory::Factual, "shipped via express", 5)];
        // Textually similar, different category: must create, not merge.
        let candidates = vec![candidate(MemoryCategory::Preference, "prefers via express", 5)];

        let outcome = engine.merge(&candidates, &existing, &scope(), "conv_2");
        assert_eq!(outcome.created.len(), 1);
        assert!(outcome.reinforced.is_empty());
    }

    #[test]
    fn test_multi_match_merges_into_single_best() {
        // Threshold low enough that both existing records match.
        let engine = MergeEngine::new(0.5);
        let existing = vec![
            record(MemoryCategory::Preference, "caller prefers express delivery", 5),
            record(MemoryCategory::Preference, "caller prefers express shipping", 5),
        ];
        let candidates = vec![candidate(
            MemoryCategory::Preference,
            "caller prefers express shipping",
            5,
        )];

        let outcome = engine.merge(&candidates, &existing, &scope(), "conv_2");
        assert!(outcome.created.is_empty());
        assert_eq!(outcome.reinforced.len(), 1);
        // The exact-text record is the better match.
        assert_eq!(outcome.reinforced[0].id, existing[1].id);
        assert_eq!(outcome.reinforced[0].reinforcement_count, 2);
        // The near-duplicate sibling was not touched.
        assert_eq!(existing[0].reinforcement_count, 1);
    }

    #[test]
    fn test_below_threshold_creates() {
        let engine = MergeEngine::new(0.85);
        let existing = vec![record(
            MemoryCategory::Preference,
            "Caller prefers express shipping",
            5,
        )];
        let candidates = vec![candidate(
            MemoryCategory::Preference,
            "Caller prefers morning calls",
            5,
        )];

        let outcome = engine.merge(&candidates, &existing, &scope(), "conv_2");
        assert_eq!(outcome.created.len(), 1);
        assert!(outcome.reinforced.is_empty());
    }

    #[test]
    fn test_idempotent_replay() {
        // Feeding the same candidates through twice yields the same
        // record count, with reinforcement instead of duplication.
        let engine = MergeEngine::new(0.85);
        let candidates = vec![
            candidate(MemoryCategory::Factual, "Caller ordered product XYZ-789", 7),
            candidate(MemoryCategory::Preference, "Caller prefers express shipping", 6),
        ];

        let first = engine.merge(&candidates, &[], &scope(), "conv_1");
        assert_eq!(first.created.len(), 2);

        let second = engine.merge(&candidates, &first.created, &scope(), "conv_1");
        assert!(second.created.is_empty());
        assert_eq!(second.reinforced.len(), 2);
        assert!(second.reinforced.iter().all(|r| r.reinforcement_count == 2));
    }

    #[test]
    fn test_in_batch_duplicates_collapse() {
        let engine = MergeEngine::new(0.85);
        let candidates = vec![
            candidate(MemoryCategory::Preference, "Caller prefers express shipping", 6),
            candidate(MemoryCategory::Preference, "caller prefers express shipping!", 6),
        ];

        let outcome = engine.merge(&candidates, &[], &scope(), "conv_1");
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.created[0].reinforcement_count, 2);
    }
}
