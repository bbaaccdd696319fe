use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use quiz_core::Clock;
use quiz_core::model::{OptionId, QuestionId, QuizContent};
use storage::drafts::{DraftKey, DraftStore, LocalDraft};

/// Local mirror of one attempt's answers and flags.
///
/// Every method is synchronous and swallows store failures after logging
/// them; the server record stays authoritative.
#[derive(Clone)]
pub struct DraftCache {
    store: Arc<dyn DraftStore>,
    key: DraftKey,
    clock: Clock,
}

impl DraftCache {
    #[must_use]
    pub fn new(store: Arc<dyn DraftStore>, key: DraftKey, clock: Clock) -> Self {
        Self { store, key, clock }
    }

    #[must_use]
    pub fn key(&self) -> DraftKey {
        self.key
    }

    /// Overwrites the stored draft with the given state.
    pub fn snapshot(&self, answers: &HashMap<QuestionId, OptionId>, flags: &HashSet<QuestionId>) {
        let draft = LocalDraft {
            answers: answers.iter().map(|(q, o)| (*q, *o)).collect(),
            flagged: flags.iter().map(|q| (*q, true)).collect(),
            updated_at: self.clock.now().timestamp_millis(),
        };
        if let Err(err) = self.store.save(&self.key, &draft) {
            tracing::warn!(key = %self.key, error = %err, "failed to write local draft");
        }
    }

    /// Reads the stored draft. A corrupt draft counts as missing.
    #[must_use]
    pub fn restore(&self) -> Option<LocalDraft> {
        match self.store.load(&self.key) {
            Ok(draft) => draft,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "ignoring unreadable local draft");
                None
            }
        }
    }

    pub fn purge(&self) {
        if let Err(err) = self.store.remove(&self.key) {
            tracing::warn!(key = %self.key, error = %err, "failed to remove local draft");
        }
    }

    /// Copies draft answers into `answers` for questions the server has no
    /// answer for. Entries that do not match the set's content are dropped.
    ///
    /// Returns the questions that were filled, in question order.
    pub fn merge_gaps(
        draft: &LocalDraft,
        content: &QuizContent,
        answers: &mut HashMap<QuestionId, OptionId>,
    ) -> Vec<QuestionId> {
        let mut filled = Vec::new();
        for question in content.questions() {
            if answers.contains_key(&question.id) {
                continue;
            }
            let Some(option) = draft.answers.get(&question.id) else {
                continue;
            };
            if content.option(question.id, *option).is_none() {
                tracing::debug!(question_id = %question.id, option_id = %option, "dropping stale draft answer");
                continue;
            }
            answers.insert(question.id, *option);
            filled.push(question.id);
        }
        filled
    }

    /// Flags from the draft that still name a question of the set.
    #[must_use]
    pub fn restore_flags(draft: &LocalDraft, content: &QuizContent) -> HashSet<QuestionId> {
        draft
            .flagged_questions()
            .filter(|q| content.contains_question(*q))
            .collect()
    }
}
