use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::deadline::Deadline;
use crate::model::{OptionId, QuestionId, QuizContent, Submission, SubmitReason};

/// Raw score over a full question set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreCard {
    pub score: u32,
    pub total_questions: u32,
    pub answered: u32,
}

/// Scores `answers` against every question in `content`.
///
/// Unanswered questions count toward `total_questions` but never toward
/// `score`. A selection that is not one of the question's options scores as
/// wrong.
#[must_use]
pub fn score_answers(content: &QuizContent, answers: &HashMap<QuestionId, OptionId>) -> ScoreCard {
    let mut score = 0_u32;
    let mut answered = 0_u32;

    for question in content.questions() {
        let Some(selected) = answers.get(&question.id) else {
            continue;
        };
        answered = answered.saturating_add(1);
        if content
            .option(question.id, *selected)
            .is_some_and(|o| o.is_correct)
        {
            score = score.saturating_add(1);
        }
    }

    ScoreCard {
        score,
        total_questions: content.total_questions(),
        answered,
    }
}

/// Seconds spent on a timed attempt, clamped to `[0, limit]`.
///
/// Untimed attempts (no deadline) report `None`.
#[must_use]
pub fn time_spent_seconds(
    started_at: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    deadline: Option<&Deadline>,
) -> Option<u32> {
    let deadline = deadline?;
    let elapsed = submitted_at
        .signed_duration_since(started_at)
        .num_seconds()
        .clamp(0, i64::from(deadline.limit_seconds()));
    Some(u32::try_from(elapsed).unwrap_or(0))
}

/// Builds the frozen submission for an attempt.
#[must_use]
pub fn build_submission(
    content: &QuizContent,
    answers: &HashMap<QuestionId, OptionId>,
    started_at: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    reason: SubmitReason,
) -> Submission {
    let card = score_answers(content, answers);
    let deadline = Deadline::for_attempt(started_at, content.set().time_limit_minutes());
    Submission {
        // Clock skew must not produce a submission that predates the attempt.
        submitted_at: submitted_at.max(started_at),
        score: card.score,
        total_questions: card.total_questions,
        time_spent_seconds: time_spent_seconds(started_at, submitted_at, deadline.as_ref()),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerOption, Question, QuizSet, SetId};
    use crate::time::fixed_now;
    use chrono::Duration;

    fn content(limit: Option<u32>) -> QuizContent {
        let set = QuizSet::new(SetId::new(1), "Set", None, None, None, limit).unwrap();
        let mut questions = Vec::new();
        let mut options = Vec::new();
        for q in 1..=5_u64 {
            questions.push(Question {
                id: QuestionId::new(q),
                set_id: SetId::new(1),
                prompt: format!("Q{q}"),
                explanation: None,
                position: u32::try_from(q).unwrap(),
            });
            for (pos, correct) in [(0_u32, true), (1, false)] {
                options.push(AnswerOption {
                    id: OptionId::new(q * 10 + u64::from(pos)),
                    question_id: QuestionId::new(q),
                    text: String::new(),
                    is_correct: correct,
                    position: pos,
                });
            }
        }
        QuizContent::assemble(set, questions, options).unwrap()
    }

    #[test]
    fn three_correct_one_wrong_one_blank() {
        let answers: HashMap<_, _> = [(1, 10), (2, 20), (3, 30), (4, 41)]
            .into_iter()
            .map(|(q, o)| (QuestionId::new(q), OptionId::new(o)))
            .collect();

        let card = score_answers(&content(Some(20)), &answers);
        assert_eq!(card.score, 3);
        assert_eq!(card.total_questions, 5);
        assert_eq!(card.answered, 4);
    }

    #[test]
    fn foreign_option_is_not_correct() {
        // option 20 belongs to question 2, not question 1
        let answers: HashMap<_, _> = [(QuestionId::new(1), OptionId::new(20))].into();
        assert_eq!(score_answers(&content(None), &answers).score, 0);
    }

    #[test]
    fn time_spent_is_clamped_to_limit() {
        let start = fixed_now();
        let d = Deadline::for_attempt(start, Some(1)).unwrap();
        assert_eq!(time_spent_seconds(start, start + Duration::seconds(42), Some(&d)), Some(42));
        assert_eq!(time_spent_seconds(start, start + Duration::minutes(5), Some(&d)), Some(60));
        assert_eq!(time_spent_seconds(start, start - Duration::seconds(5), Some(&d)), Some(0));
        assert_eq!(time_spent_seconds(start, start + Duration::minutes(5), None), None);
    }

    #[test]
    fn untimed_submission_has_no_time_spent() {
        let s = build_submission(
            &content(None),
            &HashMap::new(),
            fixed_now(),
            fixed_now() + Duration::minutes(3),
            SubmitReason::Manual,
        );
        assert_eq!(s.time_spent_seconds, None);
        assert_eq!(s.score, 0);
        assert_eq!(s.total_questions, 5);
    }
}
