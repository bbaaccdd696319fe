mod config;

use std::sync::Arc;
use std::time::Duration;

use quiz_core::model::{AttemptStatus, OptionId, QuestionId, Submission};
use quiz_core::review::{QuestionOutcome, ReviewFilter};
use services::{AppServices, AttemptError, AttemptSession, Clock, EngineSettings, Selection};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppConfig, ConfigError};

const HISTORY_LIMIT: u32 = 5;

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  cargo run -p app -- [--db <sqlite_url>] [--drafts <dir>] [--user <id>] [--set <id>]"
    );
    eprintln!("                     [--attempt <attempt_id>] [--tick-ms <ms>]");
    eprintln!();
    eprintln!("Commands (stdin):");
    eprintln!("  choose <question> <option>   record an answer");
    eprintln!("  flag <question> | unflag <question>");
    eprintln!("  status                       progress and remaining time");
    eprintln!("  submit                       finish the attempt");
    eprintln!("  review [all|wrong|flagged|unanswered]");
    eprintln!("  quit");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_DRAFT_DIR, QUIZ_USER_ID, QUIZ_SET_ID, QUIZ_ATTEMPT_ID,");
    eprintln!("  QUIZ_TICK_MS, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Choose(QuestionId, OptionId),
    Flag(QuestionId),
    Unflag(QuestionId),
    Status,
    Submit,
    Review(ReviewFilter),
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default();
        let command = match verb {
            "choose" => Self::Choose(
                parse_word(words.next(), "question")?,
                parse_word(words.next(), "option")?,
            ),
            "flag" => Self::Flag(parse_word(words.next(), "question")?),
            "unflag" => Self::Unflag(parse_word(words.next(), "question")?),
            "status" => Self::Status,
            "submit" => Self::Submit,
            "review" => Self::Review(
                words
                    .next()
                    .map(str::parse::<ReviewFilter>)
                    .transpose()
                    .map_err(|err| format!("{err}"))?
                    .unwrap_or_default(),
            ),
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command: {other}")),
        };
        Ok(command)
    }
}

fn parse_word<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T, String> {
    let raw = word.ok_or_else(|| format!("missing {what} id"))?;
    raw.parse().map_err(|_| format!("invalid {what} id: {raw}"))
}

fn normalize_sqlite_url(raw: &str) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw.to_string();
    }

    let trimmed = raw.trim();
    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_dir(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn format_remaining(remaining: Option<Duration>) -> String {
    remaining.map_or_else(
        || "untimed".to_string(),
        |left| {
            let secs = left.as_secs();
            format!("{:02}:{:02}", secs / 60, secs % 60)
        },
    )
}

fn print_questions(session: &AttemptSession) {
    for view in session.question_views() {
        let flag = if view.flagged { " [flagged]" } else { "" };
        println!("Q{} (id {}){flag}: {}", view.position, view.id, view.prompt);
        for option in &view.options {
            let marker = if view.selected == Some(option.id) { '*' } else { ' ' };
            println!("   {marker} {} {}", option.id, option.text);
        }
    }
}

fn print_submission(submission: &Submission) {
    println!(
        "submitted ({}): {}/{} correct",
        submission.reason.as_str(),
        submission.score,
        submission.total_questions
    );
    if let Some(secs) = submission.time_spent_seconds {
        println!("time spent: {}", format_remaining(Some(Duration::from_secs(u64::from(secs)))));
    }
}

fn print_review(session: &AttemptSession, filter: ReviewFilter) -> Result<(), AttemptError> {
    let review = session.review(filter)?;
    let counts = review.counts;
    println!(
        "review [{filter}]: {} correct, {} wrong, {} unanswered, {} flagged",
        counts.correct, counts.wrong, counts.unanswered, counts.flagged
    );
    for item in &review.items {
        let outcome = match item.outcome {
            QuestionOutcome::Correct => "correct",
            QuestionOutcome::Wrong => "wrong",
            QuestionOutcome::Unanswered => "unanswered",
        };
        let selected = item.selected.map_or_else(|| "-".to_string(), |o| o.to_string());
        let correct = item
            .correct_option
            .map_or_else(|| "-".to_string(), |o| o.to_string());
        println!(
            "  Q{} {outcome}: chose {selected}, answer {correct}{}",
            item.position,
            if item.flagged { " [flagged]" } else { "" }
        );
    }
    Ok(())
}

/// Applies one command. Returns `false` when the loop should stop.
async fn dispatch(session: &AttemptSession, command: Command) -> Result<bool, AttemptError> {
    match command {
        Command::Choose(question, option) => match session.choose(question, option)? {
            Selection::Recorded(_) => println!("ok"),
            Selection::Ignored => println!("attempt is closed; answer ignored"),
        },
        Command::Flag(question) => {
            session.flag(question)?;
        }
        Command::Unflag(question) => {
            session.unflag(question)?;
        }
        Command::Status => {
            let progress = session.progress();
            println!(
                "{}: {}/{} answered, {} flagged, remaining {}",
                progress.status.as_str(),
                progress.answered,
                progress.total,
                progress.flagged,
                format_remaining(progress.remaining)
            );
        }
        Command::Submit => {
            let submission = session.submit().await?;
            print_submission(&submission);
            print_review(session, ReviewFilter::All)?;
        }
        Command::Review(filter) => print_review(session, filter)?,
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

async fn drive(session: Arc<AttemptSession>) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut poll = tokio::time::interval(Duration::from_secs(1));
    let mut announced = session.status() == AttemptStatus::Submitted;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match Command::parse(&line) {
                    Ok(command) => command,
                    Err(message) => {
                        println!("{message}");
                        continue;
                    }
                };
                let was_submitted = session.status() == AttemptStatus::Submitted;
                match dispatch(&session, command).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => println!("error: {err}"),
                }
                announced |= !was_submitted && session.status() == AttemptStatus::Submitted;
            }
            _ = poll.tick(), if !announced => {
                if session.status() == AttemptStatus::Submitted {
                    announced = true;
                    println!("time is up");
                    if let Some(submission) = session.attempt().submission() {
                        print_submission(submission);
                    }
                    print_review(&session, ReviewFilter::All)?;
                }
            }
        }
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = match AppConfig::from_env_and_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(ConfigError::HelpRequested) => {
            print_usage();
            return Ok(());
        }
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            return Err(err.into());
        }
    };
    init_tracing();

    // Open + migrate SQLite in the binary glue so services stay storage-agnostic.
    let db_url = normalize_sqlite_url(&config.db_url);
    prepare_sqlite_dir(&db_url)?;
    let settings = EngineSettings::default().with_tick_interval(config.tick_interval);
    let services =
        AppServices::new_sqlite(&db_url, &config.draft_dir, Clock::system(), settings).await?;
    let attempts = services.attempts();

    let history = attempts
        .history(config.user_id, config.set_id, HISTORY_LIMIT)
        .await?;
    for attempt in &history {
        let Some(submission) = attempt.submission() else {
            continue;
        };
        println!(
            "previous attempt {}: {}/{} on {}",
            attempt.id(),
            submission.score,
            submission.total_questions,
            submission.submitted_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("streak: {} day(s)", attempts.streak(config.user_id).await?);

    let session = attempts
        .open(config.user_id, config.set_id, config.attempt_hint.as_deref())
        .await?;
    let content = session.content();
    println!("{} ({} questions)", content.set().title(), content.total_questions());
    println!(
        "attempt {} ({}); resume with --attempt {}",
        session.attempt_id(),
        if session.resumed() { "resumed" } else { "new" },
        session.attempt_id()
    );
    if !session.draft_filled().is_empty() {
        println!("restored {} answer(s) from the local draft", session.draft_filled().len());
    }
    println!("remaining: {}", format_remaining(session.remaining()));
    print_questions(&session);

    drive(Arc::clone(&session)).await?;
    for task in session.take_resync_tasks() {
        task.wait().await;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
