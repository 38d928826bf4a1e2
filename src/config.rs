use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::quiz::results::Tiebreak;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

const DEFAULT_MAX_SESSIONS: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(max) => max,
    None => panic!("session limit must be positive"),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionOrder {
    /// All questions, as listed in the quiz file.
    Sequential,
    /// A few random questions per round.
    Random,
}

impl FromStr for QuestionOrder {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(QuestionOrder::Sequential),
            "random" => Ok(QuestionOrder::Random),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub quiz_data_path: PathBuf,
    pub database_path: String,
    pub tiebreak: Tiebreak,
    pub question_order: QuestionOrder,
    pub questions_per_round: usize,
    pub autonumerate: bool,
    pub prompts_per_roll: usize,
    pub next_question_delay: Duration,
    /// Chats whose quiz is kept in memory; the least recently active one is dropped first.
    pub max_sessions: NonZeroUsize,
}

impl Config {
    /// Reads the configuration from the environment (and `.env`, if `dotenv` loaded it).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let delay_ms: u64 = parse_or(&lookup, "QUIZ_NEXT_QUESTION_DELAY_MS", 0)?;
        Ok(Self {
            quiz_data_path: lookup("QUIZ_DATA")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("quiz.json")),
            database_path: lookup("QUIZ_DATABASE").unwrap_or_else(|| "db.sqlite".to_string()),
            tiebreak: parse_or(&lookup, "QUIZ_TIEBREAK", Tiebreak::First)?,
            question_order: parse_or(&lookup, "QUIZ_QUESTION_ORDER", QuestionOrder::Sequential)?,
            questions_per_round: parse_or(&lookup, "QUIZ_QUESTIONS_PER_ROUND", 5)?,
            autonumerate: parse_or(&lookup, "QUIZ_AUTONUMERATE", false)?,
            prompts_per_roll: parse_or(&lookup, "QUIZ_PROMPTS_PER_ROLL", 3)?,
            next_question_delay: Duration::from_millis(delay_ms),
            max_sessions: parse_or(&lookup, "QUIZ_MAX_SESSIONS", DEFAULT_MAX_SESSIONS)?,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
