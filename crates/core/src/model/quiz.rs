use std::collections::HashMap;

use thiserror::Error;

use crate::model::ids::{OptionId, QuestionId, SetId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz set title cannot be empty")]
    EmptyTitle,

    #[error("time limit must be at least one minute")]
    InvalidTimeLimit,

    #[error("question {question:?} belongs to set {found:?}, expected {expected:?}")]
    ForeignQuestion {
        question: QuestionId,
        expected: SetId,
        found: SetId,
    },

    #[error("option {option:?} references unknown question {question:?}")]
    OrphanOption {
        option: OptionId,
        question: QuestionId,
    },
}

//
// ─── QUIZ SET ──────────────────────────────────────────────────────────────────
//

/// Metadata for a practice set. Read-only for the attempt engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSet {
    id: SetId,
    title: String,
    description: Option<String>,
    course_code: Option<String>,
    level: Option<String>,
    time_limit_minutes: Option<u32>,
}

impl QuizSet {
    /// Creates a quiz set.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyTitle` for a blank title and
    /// `QuizError::InvalidTimeLimit` for a zero-minute limit.
    pub fn new(
        id: SetId,
        title: impl Into<String>,
        description: Option<String>,
        course_code: Option<String>,
        level: Option<String>,
        time_limit_minutes: Option<u32>,
    ) -> Result<Self, QuizError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(QuizError::EmptyTitle);
        }
        if time_limit_minutes == Some(0) {
            return Err(QuizError::InvalidTimeLimit);
        }
        Ok(Self {
            id,
            title,
            description,
            course_code,
            level,
            time_limit_minutes,
        })
    }

    #[must_use]
    pub fn id(&self) -> SetId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn course_code(&self) -> Option<&str> {
        self.course_code.as_deref()
    }

    #[must_use]
    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }

    /// `None` means the set is untimed.
    #[must_use]
    pub fn time_limit_minutes(&self) -> Option<u32> {
        self.time_limit_minutes
    }
}

//
// ─── QUESTIONS & OPTIONS ───────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: QuestionId,
    pub set_id: SetId,
    pub prompt: String,
    pub explanation: Option<String>,
    pub position: u32,
}

/// One selectable choice of a multiple-choice question.
///
/// `is_correct` must not reach the student before the attempt is submitted;
/// see `OptionView`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    pub id: OptionId,
    pub question_id: QuestionId,
    pub text: String,
    pub is_correct: bool,
    pub position: u32,
}

/// Student-facing projection of an option. `is_correct` stays `None` until
/// the attempt is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionView {
    pub id: OptionId,
    pub text: String,
    pub position: u32,
    pub is_correct: Option<bool>,
}

impl OptionView {
    #[must_use]
    pub fn from_option(option: &AnswerOption, reveal: bool) -> Self {
        Self {
            id: option.id,
            text: option.text.clone(),
            position: option.position,
            is_correct: reveal.then_some(option.is_correct),
        }
    }
}

//
// ─── QUIZ CONTENT ──────────────────────────────────────────────────────────────
//

/// A set together with its ordered questions and per-question ordered options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizContent {
    set: QuizSet,
    questions: Vec<Question>,
    options: HashMap<QuestionId, Vec<AnswerOption>>,
}

impl QuizContent {
    /// Groups raw rows into content. Questions are ordered by `position`,
    /// options by `position` within their question (ties broken by id).
    ///
    /// # Errors
    ///
    /// Returns `QuizError::ForeignQuestion` if a question belongs to another set,
    /// or `QuizError::OrphanOption` if an option points at an unknown question.
    pub fn assemble(
        set: QuizSet,
        mut questions: Vec<Question>,
        options: Vec<AnswerOption>,
    ) -> Result<Self, QuizError> {
        if let Some(q) = questions.iter().find(|q| q.set_id != set.id()) {
            return Err(QuizError::ForeignQuestion {
                question: q.id,
                expected: set.id(),
                found: q.set_id,
            });
        }
        questions.sort_by_key(|q| (q.position, q.id));

        let mut grouped: HashMap<QuestionId, Vec<AnswerOption>> = questions
            .iter()
            .map(|q| (q.id, Vec::new()))
            .collect();
        for option in options {
            match grouped.get_mut(&option.question_id) {
                Some(group) => group.push(option),
                None => {
                    return Err(QuizError::OrphanOption {
                        option: option.id,
                        question: option.question_id,
                    });
                }
            }
        }
        for group in grouped.values_mut() {
            group.sort_by_key(|o| (o.position, o.id));
        }

        Ok(Self {
            set,
            questions,
            options: grouped,
        })
    }

    #[must_use]
    pub fn set(&self) -> &QuizSet {
        &self.set
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    #[must_use]
    pub fn contains_question(&self, id: QuestionId) -> bool {
        self.options.contains_key(&id)
    }

    #[must_use]
    pub fn options_for(&self, question: QuestionId) -> &[AnswerOption] {
        self.options.get(&question).map_or(&[], Vec::as_slice)
    }

    /// Looks up `option` only among the options of `question`.
    #[must_use]
    pub fn option(&self, question: QuestionId, option: OptionId) -> Option<&AnswerOption> {
        self.options_for(question).iter().find(|o| o.id == option)
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        u32::try_from(self.questions.len()).unwrap_or(u32::MAX)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> QuizSet {
        QuizSet::new(SetId::new(1), "CSC 201", None, None, None, Some(20)).unwrap()
    }

    fn question(id: u64, position: u32) -> Question {
        Question {
            id: QuestionId::new(id),
            set_id: SetId::new(1),
            prompt: format!("Q{id}"),
            explanation: None,
            position,
        }
    }

    fn option(id: u64, question: u64, position: u32, is_correct: bool) -> AnswerOption {
        AnswerOption {
            id: OptionId::new(id),
            question_id: QuestionId::new(question),
            text: format!("O{id}"),
            is_correct,
            position,
        }
    }

    #[test]
    fn rejects_blank_title_and_zero_limit() {
        assert_eq!(
            QuizSet::new(SetId::new(1), "  ", None, None, None, None).unwrap_err(),
            QuizError::EmptyTitle
        );
        assert_eq!(
            QuizSet::new(SetId::new(1), "T", None, None, None, Some(0)).unwrap_err(),
            QuizError::InvalidTimeLimit
        );
    }

    #[test]
    fn assemble_orders_questions_and_options_by_position() {
        let content = QuizContent::assemble(
            set(),
            vec![question(2, 1), question(1, 0)],
            vec![option(12, 1, 1, false), option(11, 1, 0, true), option(21, 2, 0, true)],
        )
        .unwrap();

        let ids: Vec<_> = content.questions().iter().map(|q| q.id.value()).collect();
        assert_eq!(ids, vec![1, 2]);
        let opts: Vec<_> = content
            .options_for(QuestionId::new(1))
            .iter()
            .map(|o| o.id.value())
            .collect();
        assert_eq!(opts, vec![11, 12]);
        assert_eq!(content.total_questions(), 2);
    }

    #[test]
    fn assemble_rejects_orphan_options() {
        let err = QuizContent::assemble(set(), vec![question(1, 0)], vec![option(9, 7, 0, true)])
            .unwrap_err();
        assert!(matches!(err, QuizError::OrphanOption { .. }));
    }

    #[test]
    fn option_lookup_is_scoped_to_its_question() {
        let content = QuizContent::assemble(
            set(),
            vec![question(1, 0), question(2, 1)],
            vec![option(11, 1, 0, true), option(21, 2, 0, true)],
        )
        .unwrap();
        assert!(content.option(QuestionId::new(1), OptionId::new(11)).is_some());
        assert!(content.option(QuestionId::new(1), OptionId::new(21)).is_none());
    }

    #[test]
    fn option_view_hides_correctness_until_revealed() {
        let o = option(1, 1, 0, true);
        assert_eq!(OptionView::from_option(&o, false).is_correct, None);
        assert_eq!(OptionView::from_option(&o, true).is_correct, Some(true));
    }
}
