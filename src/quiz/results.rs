use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::quiz::ResultDescription;

const QUESTIONS_ASKED_PLACEHOLDER: &str = "{questionsAsked}";
const ANSWERS_MATCHED_PLACEHOLDER: &str = "{answersMatched}";

/// How to choose among equally scored results when they carry no `ceil`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tiebreak {
    #[default]
    First,
    Random,
}

impl FromStr for Tiebreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" => Ok(Tiebreak::First),
            "random" => Ok(Tiebreak::Random),
            other => Err(format!("unknown tiebreak '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerPhase {
    Idle,
    Accumulating,
    Resolved,
}

impl fmt::Display for ScorerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScorerPhase::Idle => "idle",
            ScorerPhase::Accumulating => "accumulating",
            ScorerPhase::Resolved => "resolved",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ScorerError {
    #[error("no result matches the score {score}")]
    NoResultMatches { score: u32 },
    #[error("result {index} disagrees with the first result on having a `ceil`")]
    MixedBuckets { index: usize },
    #[error("`{operation}` is not allowed while the scorer is {phase}")]
    UnexpectedPhase {
        operation: &'static str,
        phase: ScorerPhase,
    },
}

/// The result picked at the end of a round.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultOutcome {
    pub result_idx: usize,
    /// Answers matching the picked result.
    pub result_score: u32,
    pub questions_asked: u32,
    /// Result text with the placeholders substituted.
    pub text: String,
    pub scene: usize,
}

/// Picks the final result from the answers given during a round.
///
/// Every recorded answer awards a point to each result whose pattern expects it. The results
/// with the highest score win; a tie is resolved by the smallest `ceil` that still covers the
/// score when the results are bucketed, or by the configured [`Tiebreak`] otherwise.
#[derive(Debug, Clone)]
pub struct ResultScorer {
    tiebreak: Tiebreak,
    results: Vec<ResultDescription>,
    scores: Vec<u32>,
    questions_asked: u32,
    use_buckets: bool,
    phase: ScorerPhase,
}

impl ResultScorer {
    pub fn new(tiebreak: Tiebreak) -> Self {
        Self {
            tiebreak,
            results: Vec::new(),
            scores: Vec::new(),
            questions_asked: 0,
            use_buckets: false,
            phase: ScorerPhase::Idle,
        }
    }

    /// Loads a new result set and starts accumulating answers for it.
    ///
    /// Either every result has a `ceil` or none does, mixed sets are rejected.
    pub fn set_results(&mut self, results: Vec<ResultDescription>) -> Result<(), ScorerError> {
        if self.phase == ScorerPhase::Accumulating {
            return Err(ScorerError::UnexpectedPhase {
                operation: "set_results",
                phase: self.phase,
            });
        }

        let use_buckets = results.first().map_or(false, |r| r.ceil.is_some());
        if let Some(index) = results
            .iter()
            .position(|r| r.ceil.is_some() != use_buckets)
        {
            return Err(ScorerError::MixedBuckets { index });
        }

        self.scores = vec![0; results.len()];
        self.results = results;
        self.questions_asked = 0;
        self.use_buckets = use_buckets;
        self.phase = ScorerPhase::Accumulating;
        Ok(())
    }

    pub fn record_answer(&mut self, question: usize, answer: usize) -> Result<(), ScorerError> {
        if self.phase != ScorerPhase::Accumulating {
            return Err(ScorerError::UnexpectedPhase {
                operation: "record_answer",
                phase: self.phase,
            });
        }

        self.questions_asked += 1;
        for (score, result) in self.scores.iter_mut().zip(&self.results) {
            if result.matches(question, answer) {
                *score += 1;
            }
        }
        Ok(())
    }

    /// Resolves the winner of the round. `rng` is only consulted by [`Tiebreak::Random`].
    pub fn show_results<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<ResultOutcome, ScorerError> {
        if self.phase != ScorerPhase::Accumulating {
            return Err(ScorerError::UnexpectedPhase {
                operation: "show_results",
                phase: self.phase,
            });
        }

        let (best_score, best) = best_results(&self.scores);
        log::debug!("Best results are {:?}, scores: {:?}", best, self.scores);

        let result_idx = match best.as_slice() {
            [] => return Err(ScorerError::NoResultMatches { score: best_score }),
            [only] => *only,
            _ if self.use_buckets => self
                .matching_bucket(&best, best_score)
                .ok_or(ScorerError::NoResultMatches { score: best_score })?,
            _ => self.tiebreak(&best, rng),
        };

        self.phase = ScorerPhase::Resolved;
        let result = &self.results[result_idx];
        let result_score = self.scores[result_idx];
        let text = substitute_template(&result.text, self.questions_asked, result_score);
        log::info!(
            "Final result is {}: '{}' with scene {}",
            result_idx,
            text,
            result.scene
        );

        Ok(ResultOutcome {
            result_idx,
            result_score,
            questions_asked: self.questions_asked,
            text,
            scene: result.scene,
        })
    }

    /// Clears the answers, keeps the loaded results.
    pub fn reset(&mut self) {
        self.scores.iter_mut().for_each(|score| *score = 0);
        self.questions_asked = 0;
        self.phase = ScorerPhase::Accumulating;
    }

    #[cfg(test)]
    pub fn scores(&self) -> &[u32] {
        &self.scores
    }

    #[cfg(test)]
    pub fn questions_asked(&self) -> u32 {
        self.questions_asked
    }

    #[cfg(test)]
    pub fn phase(&self) -> ScorerPhase {
        self.phase
    }

    #[cfg(test)]
    pub fn uses_buckets(&self) -> bool {
        self.use_buckets
    }

    /// The first candidate with the lowest `ceil` that is not below the score.
    fn matching_bucket(&self, candidates: &[usize], score: u32) -> Option<usize> {
        let score = f64::from(score);
        let mut bucket: Option<(usize, f64)> = None;
        for &idx in candidates {
            let Some(ceil) = self.results[idx].ceil else {
                continue;
            };
            if ceil < score {
                continue;
            }
            // strict comparison keeps the earliest result on equal ceils
            if bucket.map_or(true, |(_, lowest)| ceil < lowest) {
                bucket = Some((idx, ceil));
            }
        }
        bucket.map(|(idx, _)| idx)
    }

    fn tiebreak<R: Rng + ?Sized>(&self, candidates: &[usize], rng: &mut R) -> usize {
        log::debug!(
            "Multiple results match, will use '{:?}' tiebreaker",
            self.tiebreak
        );
        match self.tiebreak {
            Tiebreak::First => candidates[0],
            Tiebreak::Random => candidates[rng.gen_range(0..candidates.len())],
        }
    }
}

/// Indices holding the maximum score, in their original order.
fn best_results(scores: &[u32]) -> (u32, Vec<usize>) {
    let Some(&best) = scores.iter().max() else {
        return (0, Vec::new());
    };
    let indices = scores
        .iter()
        .enumerate()
        .filter(|(_, &score)| score == best)
        .map(|(idx, _)| idx)
        .collect();
    (best, indices)
}

pub fn substitute_template(template: &str, questions_asked: u32, answers_matched: u32) -> String {
    template
        .replace(QUESTIONS_ASKED_PLACEHOLDER, &questions_asked.to_string())
        .replace(ANSWERS_MATCHED_PLACEHOLDER, &answers_matched.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::AnswerPattern::{Any, Single};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn scorer_with(tiebreak: Tiebreak, results: Vec<ResultDescription>) -> ResultScorer {
        let mut scorer = ResultScorer::new(tiebreak);
        scorer.set_results(results).unwrap();
        scorer
    }

    fn two_way_results() -> Vec<ResultDescription> {
        vec![
            ResultDescription::new("first", 0)
                .with_pattern(0, Single(1))
                .with_pattern(1, Single(0)),
            ResultDescription::new("second", 1)
                .with_pattern(0, Single(0))
                .with_pattern(1, Single(1)),
        ]
    }

    /// Every result expects answer 0 to question 0, so they always tie.
    fn graded_results(ceils: &[f64]) -> Vec<ResultDescription> {
        ceils
            .iter()
            .enumerate()
            .map(|(idx, &ceil)| {
                ResultDescription::new(format!("grade {}", idx), idx)
                    .with_ceil(ceil)
                    .with_pattern(0, Single(0))
            })
            .collect()
    }

    #[test]
    fn tallies_matching_answers() {
        let mut scorer = scorer_with(Tiebreak::First, two_way_results());
        scorer.record_answer(0, 1).unwrap();
        scorer.record_answer(1, 1).unwrap();

        assert_eq!(scorer.scores(), &[1, 1]);
        assert_eq!(scorer.questions_asked(), 2);

        let outcome = scorer.show_results(&mut rng()).unwrap();
        assert_eq!(outcome.result_idx, 0);
        assert_eq!(outcome.result_score, 1);
        assert_eq!(outcome.questions_asked, 2);
        assert_eq!(outcome.text, "first");
    }

    #[test]
    fn single_best_result_wins() {
        let mut scorer = scorer_with(Tiebreak::First, two_way_results());
        scorer.record_answer(0, 0).unwrap();
        scorer.record_answer(1, 1).unwrap();

        let outcome = scorer.show_results(&mut rng()).unwrap();
        assert_eq!(outcome.result_idx, 1);
        assert_eq!(outcome.result_score, 2);
        assert_eq!(outcome.scene, 1);
    }

    #[test]
    fn any_pattern_matches_each_listed_answer() {
        let results = vec![
            ResultDescription::new("any", 0).with_pattern(0, Any(vec![0, 2])),
            ResultDescription::new("single", 0).with_pattern(0, Single(1)),
        ];
        let mut scorer = scorer_with(Tiebreak::First, results);
        scorer.record_answer(0, 2).unwrap();
        scorer.record_answer(0, 0).unwrap();
        scorer.record_answer(0, 1).unwrap();
        assert_eq!(scorer.scores(), &[2, 1]);
    }

    #[test]
    fn results_without_a_pattern_are_not_scored() {
        let results = vec![
            ResultDescription::new("opinionated", 0).with_pattern(3, Single(0)),
            ResultDescription::new("indifferent", 0),
        ];
        let mut scorer = scorer_with(Tiebreak::First, results);
        scorer.record_answer(3, 0).unwrap();
        scorer.record_answer(4, 0).unwrap();
        assert_eq!(scorer.scores(), &[1, 0]);
        assert_eq!(scorer.questions_asked(), 2);
    }

    #[test]
    fn random_tiebreak_picks_among_tied_results() {
        let results = vec![
            ResultDescription::new("a", 0).with_pattern(0, Single(0)),
            ResultDescription::new("b", 0).with_pattern(0, Single(0)),
            ResultDescription::new("never", 0).with_pattern(0, Single(1)),
        ];
        let mut rng = rng();
        let mut winners = HashSet::new();
        let mut scorer = scorer_with(Tiebreak::Random, results);
        for _ in 0..100 {
            scorer.reset();
            scorer.record_answer(0, 0).unwrap();
            winners.insert(scorer.show_results(&mut rng).unwrap().result_idx);
        }
        assert_eq!(winners, HashSet::from([0, 1]));
    }

    #[test]
    fn random_tiebreak_is_reproducible_with_a_seed() {
        let results = vec![
            ResultDescription::new("a", 0).with_pattern(0, Single(0)),
            ResultDescription::new("b", 0).with_pattern(0, Single(0)),
            ResultDescription::new("c", 0).with_pattern(0, Single(0)),
        ];
        let play = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut scorer = scorer_with(Tiebreak::Random, results.clone());
            (0..20)
                .map(|_| {
                    scorer.reset();
                    scorer.record_answer(0, 0).unwrap();
                    scorer.show_results(&mut rng).unwrap().result_idx
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(play(9), play(9));
    }

    #[test]
    fn bucket_picks_smallest_covering_ceil() {
        let mut scorer = scorer_with(Tiebreak::Random, graded_results(&[3.0, 1.0]));
        assert!(scorer.uses_buckets());
        scorer.record_answer(0, 0).unwrap();

        let outcome = scorer.show_results(&mut rng()).unwrap();
        assert_eq!(outcome.result_idx, 1);
        assert_eq!(outcome.result_score, 1);
    }

    #[test]
    fn bucket_skips_ceils_below_the_score() {
        let mut scorer = scorer_with(Tiebreak::First, graded_results(&[0.0, 5.0, 2.0]));
        scorer.record_answer(0, 0).unwrap();
        scorer.record_answer(0, 0).unwrap();

        assert_eq!(scorer.show_results(&mut rng()).unwrap().result_idx, 2);
    }

    #[test]
    fn bucket_prefers_earliest_result_on_equal_ceils() {
        let mut scorer = scorer_with(Tiebreak::Random, graded_results(&[4.0, 2.0, 2.0]));
        scorer.record_answer(0, 0).unwrap();
        for _ in 0..10 {
            let mut round = scorer.clone();
            assert_eq!(round.show_results(&mut rng()).unwrap().result_idx, 1);
        }
    }

    #[test]
    fn bucket_mode_lets_a_clear_winner_through() {
        let results = vec![
            ResultDescription::new("low grade", 0)
                .with_ceil(1.0)
                .with_pattern(0, Single(0))
                .with_pattern(1, Single(0)),
            ResultDescription::new("high grade", 1)
                .with_ceil(10.0)
                .with_pattern(0, Single(1)),
        ];
        let mut scorer = scorer_with(Tiebreak::First, results);
        scorer.record_answer(0, 0).unwrap();
        scorer.record_answer(1, 0).unwrap();

        // score 2 is above the winner's ceil, but there is nothing to break
        let outcome = scorer.show_results(&mut rng()).unwrap();
        assert_eq!(outcome.result_idx, 0);
        assert_eq!(outcome.result_score, 2);
    }

    #[test]
    fn bucket_without_cover_fails() {
        let mut scorer = scorer_with(Tiebreak::First, graded_results(&[0.0, 1.0]));
        scorer.record_answer(0, 0).unwrap();
        scorer.record_answer(0, 0).unwrap();

        assert_eq!(
            scorer.show_results(&mut rng()),
            Err(ScorerError::NoResultMatches { score: 2 })
        );
    }

    #[test]
    fn empty_result_set_has_no_winner() {
        let mut scorer = scorer_with(Tiebreak::First, Vec::new());
        assert!(!scorer.uses_buckets());
        assert_eq!(
            scorer.show_results(&mut rng()),
            Err(ScorerError::NoResultMatches { score: 0 })
        );
    }

    #[test]
    fn mixed_buckets_are_rejected() {
        let mut results = graded_results(&[1.0, 2.0]);
        results.push(ResultDescription::new("no ceil", 0));
        let mut scorer = ResultScorer::new(Tiebreak::First);
        assert_eq!(
            scorer.set_results(results),
            Err(ScorerError::MixedBuckets { index: 2 })
        );
        assert_eq!(scorer.phase(), ScorerPhase::Idle);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut scorer = scorer_with(Tiebreak::First, two_way_results());
        scorer.reset();
        assert_eq!(scorer.questions_asked(), 0);
        assert_eq!(scorer.scores(), &[0, 0]);

        scorer.record_answer(0, 1).unwrap();
        scorer.reset();
        scorer.reset();
        assert_eq!(scorer.questions_asked(), 0);
        assert_eq!(scorer.scores(), &[0, 0]);
        assert_eq!(scorer.phase(), ScorerPhase::Accumulating);
    }

    #[test]
    fn phases_guard_operations() {
        let mut scorer = ResultScorer::new(Tiebreak::First);
        assert!(matches!(
            scorer.record_answer(0, 0),
            Err(ScorerError::UnexpectedPhase { phase: ScorerPhase::Idle, .. })
        ));

        scorer.set_results(two_way_results()).unwrap();
        assert!(matches!(
            scorer.set_results(two_way_results()),
            Err(ScorerError::UnexpectedPhase { operation: "set_results", .. })
        ));

        scorer.record_answer(0, 1).unwrap();
        scorer.show_results(&mut rng()).unwrap();
        assert_eq!(scorer.phase(), ScorerPhase::Resolved);
        assert!(scorer.record_answer(0, 1).is_err());
        assert!(scorer.show_results(&mut rng()).is_err());

        // results may be replaced once resolved
        scorer.set_results(two_way_results()).unwrap();
        assert_eq!(scorer.scores(), &[0, 0]);
        assert_eq!(scorer.phase(), ScorerPhase::Accumulating);
    }

    #[test]
    fn substitutes_every_placeholder() {
        assert_eq!(
            substitute_template("Score: {answersMatched}/{questionsAsked}", 3, 2),
            "Score: 2/3"
        );
        assert_eq!(
            substitute_template("{answersMatched} {answersMatched} of {questionsAsked}", 10, 7),
            "7 7 of 10"
        );
        assert_eq!(substitute_template("no placeholders", 1, 1), "no placeholders");
    }

    #[test]
    fn outcome_text_is_substituted() {
        let results = vec![ResultDescription::new("{answersMatched} of {questionsAsked}", 0)
            .with_pattern(0, Single(0))
            .with_pattern(1, Single(0))];
        let mut scorer = scorer_with(Tiebreak::First, results);
        scorer.record_answer(0, 0).unwrap();
        scorer.record_answer(1, 1).unwrap();
        scorer.record_answer(2, 0).unwrap();
        assert_eq!(scorer.show_results(&mut rng()).unwrap().text, "1 of 3");
    }

    #[test]
    fn tiebreak_parses_from_config_values() {
        assert_eq!("first".parse::<Tiebreak>(), Ok(Tiebreak::First));
        assert_eq!(" Random ".parse::<Tiebreak>(), Ok(Tiebreak::Random));
        assert!("coin".parse::<Tiebreak>().is_err());
    }
}
