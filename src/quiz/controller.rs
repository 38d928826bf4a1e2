use std::sync::Arc;

use rand::Rng;

use crate::quiz::questions::{numerate, QuestionsController};
use crate::quiz::results::{ResultOutcome, ResultScorer, ScorerError, Tiebreak};
use crate::quiz::sequence::SequenceError;
use crate::quiz::{AnswerLabel, QuestionDescription, QuizData};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum QuizError {
    #[error(transparent)]
    Scorer(#[from] ScorerError),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error("the quiz is not asking questions right now")]
    NotAskingQuestions,
    #[error("no question is shown")]
    NoQuestionShown,
    #[error("question {question} has no answer {answer}")]
    AnswerOutOfRange { question: usize, answer: usize },
    #[error("question {question} is already answered")]
    AlreadyAnswered { question: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Intro,
    Questions,
    Results,
}

/// A question ready to be shown.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionView {
    pub question_idx: usize,
    pub view_idx: usize,
    pub text: String,
    pub answers: Option<Vec<AnswerLabel>>,
    pub has_next: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Question(QuestionView),
    Result(ResultOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub question: usize,
    pub answer: usize,
    /// `None` for questions without a correct answer.
    pub correct: Option<bool>,
}

/// Runs the quiz: an intro, then questions until the questions controller runs out,
/// then the result picked from the answers. The user may restart at any moment.
pub struct QuizController<R> {
    data: Arc<QuizData>,
    questions: Box<dyn QuestionsController + Send>,
    scorer: ResultScorer,
    autonumerate: bool,
    rng: R,
    stage: Stage,
    /// Set once the shown question got its answer.
    answered: bool,
}

impl<R: Rng> QuizController<R> {
    pub fn new(
        data: Arc<QuizData>,
        mut questions: Box<dyn QuestionsController + Send>,
        tiebreak: Tiebreak,
        rng: R,
    ) -> Result<Self, QuizError> {
        log::info!(
            "Question data ready: {} questions and {} results.",
            data.questions.len(),
            data.results.len()
        );
        questions.set_questions(data.questions.len());
        let mut scorer = ResultScorer::new(tiebreak);
        scorer.set_results(data.results.clone())?;

        Ok(Self {
            data,
            questions,
            scorer,
            autonumerate: false,
            rng,
            stage: Stage::Intro,
            answered: false,
        })
    }

    /// Prefix questions with `n/total`.
    pub fn autonumerate(mut self, autonumerate: bool) -> Self {
        self.autonumerate = autonumerate;
        self
    }

    #[cfg(test)]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[cfg(test)]
    pub fn data(&self) -> &QuizData {
        &self.data
    }

    /// The question waiting for an answer, if any.
    pub fn current_question(&self) -> Option<&QuestionDescription> {
        if self.stage != Stage::Questions {
            return None;
        }
        self.questions
            .current_question()
            .map(|idx| &self.data.questions[idx])
    }

    pub fn ask_questions(&mut self) -> Result<Step, QuizError> {
        self.transition_to(Stage::Questions);
        self.next_question()
    }

    /// Shows the next question, or the result once there are no more questions.
    pub fn next_question(&mut self) -> Result<Step, QuizError> {
        if self.stage != Stage::Questions {
            return Err(QuizError::NotAskingQuestions);
        }

        self.answered = false;
        if !self.questions.next_question()? {
            return self.show_results().map(Step::Result);
        }

        let question_idx = self.questions.current_question().ok_or(QuizError::NoQuestionShown)?;
        let view_idx = self
            .questions
            .current_question_view()
            .ok_or(QuizError::NoQuestionShown)?;
        let question = &self.data.questions[question_idx];
        let text = if self.autonumerate {
            numerate(&question.question, view_idx, self.questions.round_length())
        } else {
            question.question.clone()
        };

        Ok(Step::Question(QuestionView {
            question_idx,
            view_idx,
            text,
            answers: question.answers.clone(),
            has_next: self.questions.has_next(),
        }))
    }

    /// Records the answer to the question currently shown.
    pub fn record_answer(&mut self, answer: usize) -> Result<AnswerFeedback, QuizError> {
        if self.stage != Stage::Questions {
            return Err(QuizError::NotAskingQuestions);
        }
        let question_idx = self.questions.current_question().ok_or(QuizError::NoQuestionShown)?;
        if self.answered {
            return Err(QuizError::AlreadyAnswered {
                question: question_idx,
            });
        }
        let question = &self.data.questions[question_idx];
        if let Some(answers) = &question.answers {
            if answer >= answers.len() {
                return Err(QuizError::AnswerOutOfRange {
                    question: question_idx,
                    answer,
                });
            }
        }

        log::debug!("Recorded answer {} for question {}.", answer, question_idx);
        self.scorer.record_answer(question_idx, answer)?;
        self.answered = true;
        Ok(AnswerFeedback {
            question: question_idx,
            answer,
            correct: question.is_correct(answer),
        })
    }

    pub fn show_results(&mut self) -> Result<ResultOutcome, QuizError> {
        self.transition_to(Stage::Results);
        Ok(self.scorer.show_results(&mut self.rng)?)
    }

    /// Drops the answers given so far and starts over from the first question.
    pub fn reset(&mut self) -> Result<Step, QuizError> {
        self.questions.reset();
        self.scorer.reset();
        self.ask_questions()
    }

    fn transition_to(&mut self, stage: Stage) {
        log::info!("Quiz state transition: {:?} -> {:?}", self.stage, stage);
        match self.stage {
            Stage::Intro => {}
            Stage::Questions => self.questions.reset(),
            Stage::Results => self.scorer.reset(),
        }
        self.answered = false;
        self.stage = stage;
    }
}
