//! Post-submission review projection.
//!
//! Pure functions over quiz content, the final answers and the flag set.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::model::{OptionId, QuestionId, QuizContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionOutcome {
    Correct,
    Wrong,
    Unanswered,
}

/// Classification of a single question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewItem {
    pub question_id: QuestionId,
    pub position: u32,
    pub selected: Option<OptionId>,
    /// First option marked correct, if the question has one.
    pub correct_option: Option<OptionId>,
    pub outcome: QuestionOutcome,
    pub flagged: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewCounts {
    pub correct: u32,
    pub wrong: u32,
    pub unanswered: u32,
    pub flagged: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReviewFilter {
    #[default]
    All,
    Wrong,
    Flagged,
    Unanswered,
}

impl ReviewFilter {
    #[must_use]
    pub fn matches(self, item: &ReviewItem) -> bool {
        match self {
            ReviewFilter::All => true,
            ReviewFilter::Wrong => item.outcome == QuestionOutcome::Wrong,
            ReviewFilter::Flagged => item.flagged,
            ReviewFilter::Unanswered => item.outcome == QuestionOutcome::Unanswered,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewFilter::All => "all",
            ReviewFilter::Wrong => "wrong",
            ReviewFilter::Flagged => "flagged",
            ReviewFilter::Unanswered => "unanswered",
        }
    }
}

impl fmt::Display for ReviewFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFilter(pub String);

impl fmt::Display for UnknownFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown review filter: {}", self.0)
    }
}

impl std::error::Error for UnknownFilter {}

impl FromStr for ReviewFilter {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "wrong" => Ok(Self::Wrong),
            "flagged" => Ok(Self::Flagged),
            "unanswered" => Ok(Self::Unanswered),
            other => Err(UnknownFilter(other.to_owned())),
        }
    }
}

/// Classifies every question of `content`, in question order.
#[must_use]
pub fn project(
    content: &QuizContent,
    answers: &HashMap<QuestionId, OptionId>,
    flags: &HashSet<QuestionId>,
) -> Vec<ReviewItem> {
    content
        .questions()
        .iter()
        .map(|question| {
            let selected = answers.get(&question.id).copied();
            let correct_option = content
                .options_for(question.id)
                .iter()
                .find(|o| o.is_correct)
                .map(|o| o.id);
            let outcome = match selected {
                None => QuestionOutcome::Unanswered,
                Some(option) => {
                    if content
                        .option(question.id, option)
                        .is_some_and(|o| o.is_correct)
                    {
                        QuestionOutcome::Correct
                    } else {
                        QuestionOutcome::Wrong
                    }
                }
            };
            ReviewItem {
                question_id: question.id,
                position: question.position,
                selected,
                correct_option,
                outcome,
                flagged: flags.contains(&question.id),
            }
        })
        .collect()
}

#[must_use]
pub fn filter_items(items: &[ReviewItem], filter: ReviewFilter) -> Vec<&ReviewItem> {
    items.iter().filter(|item| filter.matches(item)).collect()
}

#[must_use]
pub fn counts(items: &[ReviewItem]) -> ReviewCounts {
    items.iter().fold(ReviewCounts::default(), |mut acc, item| {
        match item.outcome {
            QuestionOutcome::Correct => acc.correct += 1,
            QuestionOutcome::Wrong => acc.wrong += 1,
            QuestionOutcome::Unanswered => acc.unanswered += 1,
        }
        if item.flagged {
            acc.flagged += 1;
        }
        acc
    })
}
