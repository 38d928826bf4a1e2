use rand::Rng;

use crate::quiz::sequence::{Chunked, NonRepeating, RandomSequence, Sequence, SequenceError};

/// Rolls groups of distinct prompts, like "wink" or "raise your eyebrows", to show together.
pub struct PromptRoller<R> {
    prompts: Vec<String>,
    groups: NonRepeating<Chunked<RandomSequence<usize, R>>>,
}

impl<R: Rng> PromptRoller<R> {
    pub fn new(prompts: Vec<String>, per_roll: usize, rng: R) -> Result<Self, SequenceError> {
        let indices = RandomSequence::new((0..prompts.len()).collect(), rng);
        let groups = NonRepeating::new(Chunked::new(indices, per_roll)?);
        Ok(Self { prompts, groups })
    }

    pub fn roll(&mut self) -> Result<Vec<&str>, SequenceError> {
        let group = self.groups.next_item()?;
        Ok(group
            .into_iter()
            .map(|idx| self.prompts[idx].as_str())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn prompts(count: usize) -> Vec<String> {
        (0..count).map(|idx| format!("prompt {}", idx)).collect()
    }

    #[test]
    fn rolls_distinct_prompts() {
        let mut roller = PromptRoller::new(prompts(6), 3, StdRng::seed_from_u64(8)).unwrap();
        for _ in 0..100 {
            let roll = roller.roll().unwrap();
            assert_eq!(roll.len(), 3);
            assert_eq!(roll.iter().collect::<HashSet<_>>().len(), 3, "{:?}", roll);
        }
    }

    #[test]
    fn rolls_even_when_prompts_must_repeat() {
        let mut roller = PromptRoller::new(prompts(1), 2, StdRng::seed_from_u64(8)).unwrap();
        assert_eq!(roller.roll().unwrap(), vec!["prompt 0", "prompt 0"]);
    }

    #[test]
    fn no_prompts_to_roll() {
        let mut roller = PromptRoller::new(Vec::new(), 2, StdRng::seed_from_u64(8)).unwrap();
        assert_eq!(roller.roll(), Err(SequenceError::ExhaustedPool));
    }

    #[test]
    fn empty_rolls_are_rejected() {
        assert!(PromptRoller::new(prompts(3), 0, StdRng::seed_from_u64(8)).is_err());
    }
}
