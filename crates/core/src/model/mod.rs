mod attempt;
mod ids;
mod quiz;

pub use ids::{AttemptId, OptionId, ParseIdError, QuestionId, SetId, UserId};

pub use attempt::{AnswerRecord, Attempt, AttemptError, AttemptStatus, Submission, SubmitReason};
pub use quiz::{AnswerOption, OptionView, Question, QuizContent, QuizError, QuizSet};
