pub mod controller;
pub mod prompts;
pub mod questions;
pub mod results;
pub mod sequence;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;

/// Full quiz configuration: questions with answers, and results with the answer patterns leading to them.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct QuizData {
    /// Shown before the first round.
    #[serde(default)]
    pub intro: Option<String>,
    pub questions: Vec<QuestionDescription>,
    pub results: Vec<ResultDescription>,
    /// Pool for the prompt roller, may be absent.
    #[serde(default)]
    pub prompts: Vec<String>,
}

impl QuizData {
    pub fn from_file(file: File) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(BufReader::new(file))
    }

    #[cfg(test)]
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDescription {
    pub question: String,
    #[serde(default)]
    pub answers: Option<Vec<AnswerLabel>>,
    /// Only set for quizzes with correct answers.
    #[serde(default)]
    pub correct_idx: Option<usize>,
}

impl QuestionDescription {
    #[cfg(test)]
    pub fn new(question: String, answers: Vec<AnswerLabel>) -> Self {
        Self {
            question,
            answers: Some(answers),
            correct_idx: None,
        }
    }

    /// `None` when the question has no correct answer at all.
    pub fn is_correct(&self, answer: usize) -> Option<bool> {
        self.correct_idx.map(|correct| correct == answer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum AnswerLabel {
    Text(String),
    Image { image: String },
}

/// A single answer index, or any of several, that a result expects for a question.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum AnswerPattern {
    Single(usize),
    Any(Vec<usize>),
}

impl AnswerPattern {
    pub fn matches(&self, answer: usize) -> bool {
        match self {
            AnswerPattern::Single(expected) => *expected == answer,
            AnswerPattern::Any(expected) => expected.contains(&answer),
        }
    }
}

/// On the wire, patterns are the numeric keys of the result object:
/// `{ "text": "...", "scene": 0, "0": 1, "1": [0, 3] }`
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(try_from = "RawResultDescription")]
pub struct ResultDescription {
    /// May contain `{questionsAsked}` and `{answersMatched}` placeholders.
    pub text: String,
    pub scene: usize,
    /// Grading threshold; when the results carry it, ties go to the lowest `ceil` covering the score.
    pub ceil: Option<f64>,
    /// Questions without an entry don't affect this result.
    pub patterns: BTreeMap<usize, AnswerPattern>,
}

impl ResultDescription {
    #[cfg(test)]
    pub fn new(text: impl Into<String>, scene: usize) -> Self {
        Self {
            text: text.into(),
            scene,
            ceil: None,
            patterns: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with_ceil(mut self, ceil: f64) -> Self {
        self.ceil = Some(ceil);
        self
    }

    #[cfg(test)]
    pub fn with_pattern(mut self, question: usize, pattern: AnswerPattern) -> Self {
        self.patterns.insert(question, pattern);
        self
    }

    pub fn matches(&self, question: usize, answer: usize) -> bool {
        self.patterns
            .get(&question)
            .map_or(false, |pattern| pattern.matches(answer))
    }
}

#[derive(serde::Deserialize)]
struct RawResultDescription {
    text: String,
    scene: usize,
    #[serde(default)]
    ceil: Option<f64>,
    #[serde(flatten)]
    patterns: BTreeMap<String, AnswerPattern>,
}

impl TryFrom<RawResultDescription> for ResultDescription {
    type Error = String;

    fn try_from(raw: RawResultDescription) -> Result<Self, Self::Error> {
        let patterns = raw
            .patterns
            .into_iter()
            .map(|(key, pattern)| {
                key.parse::<usize>()
                    .map(|question| (question, pattern))
                    .map_err(|_| format!("unexpected key '{}' in result '{}'", key, raw.text))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            text: raw.text,
            scene: raw.scene,
            ceil: raw.ceil,
            patterns,
        })
    }
}

impl serde::Serialize for ResultDescription {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("text", &self.text)?;
        map.serialize_entry("scene", &self.scene)?;
        if let Some(ceil) = self.ceil {
            map.serialize_entry("ceil", &ceil)?;
        }
        for (question, pattern) in &self.patterns {
            map.serialize_entry(&question.to_string(), pattern)?;
        }
        map.end()
    }
}
