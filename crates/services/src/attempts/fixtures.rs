//! Five-question set shared by unit tests. Option `slot` 0 is always correct.

use quiz_core::model::{AnswerOption, OptionId, Question, QuestionId, QuizContent, QuizSet, SetId};
use storage::repository::{InMemoryRepository, QuizRepository};

pub(crate) fn qid(n: u64) -> QuestionId {
    QuestionId::new(n)
}

pub(crate) fn oid(question: u64, slot: u64) -> OptionId {
    OptionId::new(question * 10 + slot)
}

fn rows(limit: Option<u32>) -> (QuizSet, Vec<Question>, Vec<AnswerOption>) {
    let set = QuizSet::new(SetId::new(1), "Cells", None, None, None, limit).unwrap();
    let mut questions = Vec::new();
    let mut options = Vec::new();
    for q in 1..=5_u64 {
        questions.push(Question {
            id: qid(q),
            set_id: set.id(),
            prompt: format!("Q{q}"),
            explanation: Some(format!("because {q}")),
            position: u32::try_from(q).unwrap(),
        });
        for slot in 0..4_u64 {
            options.push(AnswerOption {
                id: oid(q, slot),
                question_id: qid(q),
                text: format!("Q{q} option {slot}"),
                is_correct: slot == 0,
                position: u32::try_from(slot).unwrap(),
            });
        }
    }
    (set, questions, options)
}

pub(crate) fn content(limit: Option<u32>) -> QuizContent {
    let (set, questions, options) = rows(limit);
    QuizContent::assemble(set, questions, options).unwrap()
}

pub(crate) async fn seed(repo: &InMemoryRepository, limit: Option<u32>) -> SetId {
    let (set, questions, options) = rows(limit);
    repo.upsert_set(&set).await.unwrap();
    for question in &questions {
        repo.upsert_question(question).await.unwrap();
    }
    for option in &options {
        repo.upsert_option(option).await.unwrap();
    }
    set.id()
}
