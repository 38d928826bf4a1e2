use rand::Rng;

use crate::quiz::sequence::{RandomSequence, Sequence, SequenceError};

/// Decides which question is shown next during a round.
pub trait QuestionsController {
    /// Prepares the controller for `count` questions, indexed from 0.
    fn set_questions(&mut self, count: usize);

    /// Moves to the next question; `false` once the round has no more questions.
    fn next_question(&mut self) -> Result<bool, SequenceError>;

    /// Index of the current question among all questions.
    fn current_question(&self) -> Option<usize>;

    /// Position of the current question within the round.
    fn current_question_view(&self) -> Option<usize>;

    /// Whether the following `next_question` call will show a question.
    fn has_next(&self) -> bool;

    /// Number of questions shown per round.
    fn round_length(&self) -> usize;

    /// Prepares for the next round.
    fn reset(&mut self);
}

/// Shows every question once, in the original order.
#[derive(Debug, Default)]
pub struct SequentialQuestions {
    count: usize,
    shown: usize,
    current: Option<usize>,
}

impl SequentialQuestions {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QuestionsController for SequentialQuestions {
    fn set_questions(&mut self, count: usize) {
        self.count = count;
        self.reset();
    }

    fn next_question(&mut self) -> Result<bool, SequenceError> {
        if self.shown < self.count {
            self.current = Some(self.shown);
            self.shown += 1;
            Ok(true)
        } else {
            log::debug!("No more questions.");
            self.current = None;
            Ok(false)
        }
    }

    fn current_question(&self) -> Option<usize> {
        self.current
    }

    fn current_question_view(&self) -> Option<usize> {
        self.current
    }

    fn has_next(&self) -> bool {
        self.shown < self.count
    }

    fn round_length(&self) -> usize {
        self.count
    }

    fn reset(&mut self) {
        self.shown = 0;
        self.current = None;
    }
}

/// Shows a few random questions per round.
///
/// The question order carries over between rounds, so replaying the quiz brings up
/// the questions that weren't shown yet, and never the same question twice in a row.
/// With fewer questions than `per_round`, a round will show some of them again.
pub struct RandomSliceQuestions<R> {
    per_round: usize,
    sequence: RandomSequence<usize, R>,
    current: Option<usize>,
    view: Option<usize>,
}

impl<R: Rng> RandomSliceQuestions<R> {
    pub fn new(per_round: usize, rng: R) -> Self {
        Self {
            per_round,
            sequence: RandomSequence::new(Vec::new(), rng),
            current: None,
            view: None,
        }
    }

    fn next_view(&self) -> usize {
        self.view.map_or(0, |view| view + 1)
    }
}

impl<R: Rng> QuestionsController for RandomSliceQuestions<R> {
    fn set_questions(&mut self, count: usize) {
        self.sequence.reload((0..count).collect());
        self.reset();
    }

    fn next_question(&mut self) -> Result<bool, SequenceError> {
        let view = self.next_view();
        if view >= self.per_round {
            log::debug!("No more questions.");
            self.current = None;
            self.view = Some(self.per_round);
            return Ok(false);
        }

        self.current = Some(self.sequence.next_item()?);
        self.view = Some(view);
        Ok(true)
    }

    fn current_question(&self) -> Option<usize> {
        self.current
    }

    fn current_question_view(&self) -> Option<usize> {
        self.view.filter(|view| *view < self.per_round)
    }

    fn has_next(&self) -> bool {
        self.next_view() < self.per_round
    }

    fn round_length(&self) -> usize {
        self.per_round
    }

    fn reset(&mut self) {
        self.current = None;
        self.view = None;
    }
}

/// Prepends the position within the round, e.g. `2/5\n`.
pub fn numerate(text: &str, view: usize, round_length: usize) -> String {
    format!("{}/{}\n{}", view + 1, round_length, text)
}
