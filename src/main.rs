mod config;
mod quiz;

use std::{fs::File, sync::Arc};

use config::{Config, QuestionOrder};
use dotenv::dotenv;
use lru::LruCache;
use quiz::{
    controller::{QuestionView, QuizController, QuizError, Step},
    prompts::PromptRoller,
    questions::{QuestionsController, RandomSliceQuestions, SequentialQuestions},
    sequence::SequenceError,
    AnswerLabel, QuizData,
};
use rand::{rngs::StdRng, SeedableRng};
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup},
};
use tokio::sync::Mutex;

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type DialogueStorage = std::sync::Arc<ErasedStorage<State>>;
type Sessions = Arc<Mutex<LruCache<ChatId, QuizController<StdRng>>>>;
type Prompts = Arc<Mutex<PromptRoller<StdRng>>>;

/// Only tells which handler should get the next message, the quiz itself lives in [`Sessions`].
#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    Intro,
    Questions,
    Results,
}

#[tokio::main]
async fn main() {
    let dotenv_loaded = dotenv().is_ok();

    pretty_env_logger::init();
    if !dotenv_loaded {
        log::warn!("No .env file found, using the environment as is");
    }
    log::info!("Starting quiz bot...");

    let config = Config::from_env().expect("Invalid configuration");
    let bot = Bot::from_env();

    log::info!("Establishing connection to the database...");
    let storage: DialogueStorage = SqliteStorage::open(&config.database_path, Json)
        .await
        .expect("Failed to open the dialogue database")
        .erase();
    log::info!("Connection established");

    log::info!("Loading the quiz from {}", config.quiz_data_path.display());
    let quiz_data = Arc::new(
        QuizData::from_file(
            File::open(&config.quiz_data_path).expect("Failed to open the quiz file"),
        )
        .expect("Failed to parse the quiz file"),
    );
    // A broken result set should stop the bot here, not in the middle of someone's round
    new_session(&config, quiz_data.clone()).expect("The quiz file can't be played");
    log::info!("Quiz loaded");

    let prompts: Prompts = Arc::new(Mutex::new(
        PromptRoller::new(
            quiz_data.prompts.clone(),
            config.prompts_per_roll,
            StdRng::from_entropy(),
        )
        .expect("QUIZ_PROMPTS_PER_ROLL must be at least 1"),
    ));
    let sessions: Sessions = Arc::new(Mutex::new(LruCache::new(config.max_sessions)));
    let config = Arc::new(config);

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(
                dptree::filter(|msg: Message| msg.text() == Some(PROMPTS_COMMAND))
                    .endpoint(roll_prompts),
            )
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::Intro].endpoint(receive_intro_choice))
            .branch(dptree::case![State::Questions].endpoint(receive_answer))
            .branch(dptree::case![State::Results].endpoint(receive_restart)),
    )
    .dependencies(dptree::deps![storage, config, quiz_data, sessions, prompts])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

const DEFAULT_INTRO: &str = "Привіт! Я -- квіз-бот. Відповідай на питання, а я скажу, що про тебе думаю!";
const START_QUIZ: &str = "Почати квіз";
const RESTART_QUIZ: &str = "Пройти ще раз";
const RESTART_COMMAND: &str = "/restart";
const PROMPTS_COMMAND: &str = "/prompts";
const NO_PROMPTS: &str = "У цьому квізі немає завдань";
// Questions without answer labels are yes/no questions
const DEFAULT_ANSWERS: [&str; 2] = ["Ні", "Так"];

async fn start(
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
    quiz_data: Arc<QuizData>,
) -> HandlerResult {
    let intro = quiz_data.intro.as_deref().unwrap_or(DEFAULT_INTRO);
    bot.send_message(msg.chat.id, intro)
        .reply_markup(single_button(START_QUIZ))
        .await?;

    dialogue.update(State::Intro).await?;
    Ok(())
}

async fn receive_intro_choice(
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
    config: Arc<Config>,
    quiz_data: Arc<QuizData>,
    sessions: Sessions,
) -> HandlerResult {
    if msg.text() != Some(START_QUIZ) {
        bot.send_message(msg.chat.id, "Натисни «Почати квіз», коли будеш готовий")
            .reply_markup(single_button(START_QUIZ))
            .await?;
        return Ok(());
    }

    let step = with_session(&sessions, msg.chat.id, &config, &quiz_data, |session| {
        session.ask_questions()
    })
    .await?;
    present_step(&bot, &dialogue, msg.chat.id, step).await
}

enum AnswerAttempt {
    Recorded { correct: Option<bool> },
    Unrecognized { buttons: Vec<String> },
    // a second tap while the next question is on its way
    Repeated,
    // e.g. the bot was restarted in the middle of the round
    NoRound,
}

async fn receive_answer(
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
    config: Arc<Config>,
    quiz_data: Arc<QuizData>,
    sessions: Sessions,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let Some(reply) = msg.text() else {
        bot.send_message(chat_id, "Будь ласка, обери одну з відповідей (текстом)")
            .await?;
        return Ok(());
    };
    if reply == RESTART_COMMAND {
        return restart(&bot, &dialogue, chat_id, &config, &quiz_data, &sessions).await;
    }

    let attempt = with_session(&sessions, chat_id, &config, &quiz_data, |session| {
        let Some(question) = session.current_question() else {
            return Ok(AnswerAttempt::NoRound);
        };
        let buttons = answer_buttons(question.answers.as_deref());
        match buttons.iter().position(|button| button == reply.trim()) {
            Some(answer) => match session.record_answer(answer) {
                Ok(feedback) => Ok(AnswerAttempt::Recorded {
                    correct: feedback.correct,
                }),
                Err(QuizError::AlreadyAnswered { .. }) => Ok(AnswerAttempt::Repeated),
                Err(err) => Err(err),
            },
            None => Ok(AnswerAttempt::Unrecognized { buttons }),
        }
    })
    .await?;

    match attempt {
        AnswerAttempt::NoRound => {
            log::warn!("Chat {} has no round in progress, starting over", chat_id.0);
            bot.send_message(chat_id, "Щось пішло не так, почнімо спочатку!")
                .await?;
            return restart(&bot, &dialogue, chat_id, &config, &quiz_data, &sessions).await;
        }
        AnswerAttempt::Repeated => {
            log::debug!("Chat {} answered the same question again", chat_id.0);
            return Ok(());
        }
        AnswerAttempt::Unrecognized { buttons } => {
            bot.send_message(chat_id, "Будь ласка, обери одну з відповідей")
                .reply_markup(answers_keyboard(&buttons))
                .await?;
            return Ok(());
        }
        AnswerAttempt::Recorded { correct } => match correct {
            Some(true) => {
                bot.send_message(chat_id, "Правильно!").await?;
            }
            Some(false) => {
                bot.send_message(chat_id, "Неправильно!").await?;
            }
            None => {}
        },
    }

    if !config.next_question_delay.is_zero() {
        tokio::time::sleep(config.next_question_delay).await;
    }

    let step = with_session(&sessions, chat_id, &config, &quiz_data, |session| {
        session.next_question()
    })
    .await?;
    present_step(&bot, &dialogue, chat_id, step).await
}

async fn receive_restart(
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
    config: Arc<Config>,
    quiz_data: Arc<QuizData>,
    sessions: Sessions,
) -> HandlerResult {
    match msg.text() {
        Some(RESTART_QUIZ) | Some(RESTART_COMMAND) => {
            restart(&bot, &dialogue, msg.chat.id, &config, &quiz_data, &sessions).await
        }
        _ => {
            bot.send_message(msg.chat.id, "Натисни «Пройти ще раз», щоб почати спочатку")
                .reply_markup(single_button(RESTART_QUIZ))
                .await?;
            Ok(())
        }
    }
}

async fn roll_prompts(bot: Bot, msg: Message, prompts: Prompts) -> HandlerResult {
    let text = {
        let mut prompts = prompts.lock().await;
        match prompts.roll() {
            Ok(roll) => roll.join("\n"),
            Err(SequenceError::ExhaustedPool) => NO_PROMPTS.to_string(),
            Err(err) => return Err(err.into()),
        }
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn restart(
    bot: &Bot,
    dialogue: &QuizDialogue,
    chat_id: ChatId,
    config: &Config,
    quiz_data: &Arc<QuizData>,
    sessions: &Sessions,
) -> HandlerResult {
    let step = with_session(sessions, chat_id, config, quiz_data, |session| session.reset()).await?;
    present_step(bot, dialogue, chat_id, step).await
}

async fn present_step(
    bot: &Bot,
    dialogue: &QuizDialogue,
    chat_id: ChatId,
    step: Step,
) -> HandlerResult {
    match step {
        Step::Question(view) => {
            let buttons = answer_buttons(view.answers.as_deref());
            bot.send_message(chat_id, question_text(&view))
                .reply_markup(answers_keyboard(&buttons))
                .await?;
            dialogue.update(State::Questions).await?;
        }
        Step::Result(outcome) => {
            log::info!(
                "Chat {} got result {} ({} of {} answers matched)",
                chat_id.0,
                outcome.result_idx,
                outcome.result_score,
                outcome.questions_asked
            );
            bot.send_message(chat_id, outcome.text)
                .reply_markup(single_button(RESTART_QUIZ))
                .await?;
            dialogue.update(State::Results).await?;
        }
    }
    Ok(())
}

/// Runs `action` on the chat's quiz, creating the quiz on first use.
///
/// Only `max_sessions` quizzes are kept; a chat whose quiz was dropped gets a fresh one
/// and its dialogue starts over from the next message.
async fn with_session<T>(
    sessions: &Sessions,
    chat_id: ChatId,
    config: &Config,
    quiz_data: &Arc<QuizData>,
    action: impl FnOnce(&mut QuizController<StdRng>) -> Result<T, QuizError>,
) -> Result<T, QuizError> {
    let mut sessions = sessions.lock().await;
    let mut session = match sessions.pop(&chat_id) {
        Some(session) => session,
        None => {
            log::info!("New quiz session for chat {}", chat_id.0);
            new_session(config, quiz_data.clone())?
        }
    };
    let result = action(&mut session);
    if let Some((dropped, _)) = sessions.push(chat_id, session) {
        log::info!("Dropped the quiz session of idle chat {}", dropped.0);
    }
    result
}

fn new_session(config: &Config, quiz_data: Arc<QuizData>) -> Result<QuizController<StdRng>, QuizError> {
    let questions: Box<dyn QuestionsController + Send> = match config.question_order {
        QuestionOrder::Sequential => Box::new(SequentialQuestions::new()),
        QuestionOrder::Random => Box::new(RandomSliceQuestions::new(
            config.questions_per_round,
            StdRng::from_entropy(),
        )),
    };
    Ok(
        QuizController::new(quiz_data, questions, config.tiebreak, StdRng::from_entropy())?
            .autonumerate(config.autonumerate),
    )
}

fn answer_buttons(answers: Option<&[AnswerLabel]>) -> Vec<String> {
    match answers {
        None => DEFAULT_ANSWERS.iter().map(|a| a.to_string()).collect(),
        Some(answers) => answers
            .iter()
            .enumerate()
            .map(|(idx, label)| match label {
                AnswerLabel::Text(text) => text.clone(),
                AnswerLabel::Image { .. } => format!("🖼 {}", idx + 1),
            })
            .collect(),
    }
}

/// Question text, followed by the links of image answers.
fn question_text(view: &QuestionView) -> String {
    let images = view
        .answers
        .iter()
        .flatten()
        .enumerate()
        .filter_map(|(idx, label)| match label {
            AnswerLabel::Image { image } => Some(format!("🖼 {}: {}", idx + 1, image)),
            AnswerLabel::Text(_) => None,
        })
        .collect::<Vec<_>>();
    if images.is_empty() {
        view.text.clone()
    } else {
        format!("{}\n\n{}", view.text, images.join("\n"))
    }
}

fn answers_keyboard(buttons: &[String]) -> KeyboardMarkup {
    KeyboardMarkup::new(
        buttons
            .iter()
            .map(|button| vec![KeyboardButton::new(button.clone())])
            .collect::<Vec<_>>(),
    )
}

fn single_button(text: &str) -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![KeyboardButton::new(text)]])
}
