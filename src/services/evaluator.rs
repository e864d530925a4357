use crate::dao::models::{QuestionEntity, QuestionKind};

/// Outcome of checking one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub is_correct: bool,
    /// Points awarded: the question's value when correct, zero otherwise.
    pub points: u32,
}

/// Grade a raw submission against the question's canonical answer. Never fails.
pub fn evaluate(question: &QuestionEntity, submitted: &str) -> Evaluation {
    let is_correct = match question.kind {
        QuestionKind::Text | QuestionKind::TrueFalse => {
            same_answer(submitted, &question.correct_answer)
        }
        QuestionKind::MultipleChoice => submitted
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|index| question.options.as_ref()?.get(index))
            .is_some_and(|option| same_answer(option, &question.correct_answer)),
    };

    Evaluation {
        is_correct,
        points: if is_correct { question.points } else { 0 },
    }
}

fn same_answer(left: &str, right: &str) -> bool {
    left.trim().to_lowercase() == right.trim().to_lowercase()
}
