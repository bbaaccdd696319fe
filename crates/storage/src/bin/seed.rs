use std::fmt;

use quiz_core::model::{AnswerOption, OptionId, Question, QuestionId, QuizSet, SetId};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    set_id: SetId,
    title: String,
    course_code: Option<String>,
    time_limit_minutes: Option<u32>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidSetId { raw: String },
    InvalidDbUrl { raw: String },
    InvalidTimeLimit { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidSetId { raw } => write!(f, "invalid --set-id value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidTimeLimit { raw } => {
                write!(f, "invalid --minutes value (expected a positive number or 0 for untimed): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_minutes(raw: &str) -> Result<Option<u32>, ArgsError> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Ok(None),
        Ok(minutes) => Ok(Some(minutes)),
        Err(_) => Err(ArgsError::InvalidTimeLimit {
            raw: raw.to_owned(),
        }),
    }
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite://quiz.sqlite3".into());
        let mut set_id = std::env::var("QUIZ_SET_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| SetId::new(1), SetId::new);
        let mut title = std::env::var("QUIZ_SET_TITLE").unwrap_or_else(|_| "Cell Biology".into());
        let mut course_code = std::env::var("QUIZ_COURSE_CODE").ok();
        let mut time_limit_minutes = Some(20);

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--set-id" => {
                    let value = require_value(&mut args, "--set-id")?;
                    let parsed: u64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidSetId { raw: value.clone() })?;
                    set_id = SetId::new(parsed);
                }
                "--title" => {
                    title = require_value(&mut args, "--title")?;
                }
                "--course" => {
                    course_code = Some(require_value(&mut args, "--course")?);
                }
                "--minutes" => {
                    let value = require_value(&mut args, "--minutes")?;
                    time_limit_minutes = parse_minutes(&value)?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            set_id,
            title,
            course_code,
            time_limit_minutes,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://quiz.sqlite3)");
    eprintln!("  --set-id <id>             Quiz set id to upsert (default: 1)");
    eprintln!("  --title <text>            Set title (default: Cell Biology)");
    eprintln!("  --course <code>           Optional course code");
    eprintln!("  --minutes <n>             Time limit in minutes, 0 for untimed (default: 20)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  QUIZ_DB_URL, QUIZ_SET_ID, QUIZ_SET_TITLE, QUIZ_COURSE_CODE");
}

/// Prompt, options, index of the correct option, explanation.
const SAMPLES: [(&str, [&str; 4], usize, &str); 5] = [
    (
        "Which organelle produces most of the cell's ATP?",
        ["Ribosome", "Mitochondrion", "Golgi apparatus", "Lysosome"],
        1,
        "Oxidative phosphorylation happens in the inner mitochondrial membrane.",
    ),
    (
        "Where are ribosomal subunits assembled?",
        ["Nucleolus", "Cytosol", "Smooth ER", "Peroxisome"],
        0,
        "rRNA is transcribed and packaged with proteins in the nucleolus.",
    ),
    (
        "Which structure controls what enters and leaves the cell?",
        ["Cell wall", "Nuclear envelope", "Plasma membrane", "Cytoskeleton"],
        2,
        "The phospholipid bilayer is selectively permeable.",
    ),
    (
        "Which organelle modifies and sorts proteins for secretion?",
        ["Lysosome", "Vacuole", "Centrosome", "Golgi apparatus"],
        3,
        "Proteins leave the rough ER and are processed in the Golgi.",
    ),
    (
        "What does the rough ER carry on its surface?",
        ["Ribosomes", "Chloroplasts", "Cilia", "Vesicles only"],
        0,
        "Bound ribosomes give the rough ER its appearance.",
    ),
];

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;

    let set = QuizSet::new(
        args.set_id,
        args.title.clone(),
        Some("Organelles and their jobs".into()),
        args.course_code.clone(),
        Some("intro".into()),
        args.time_limit_minutes,
    )?;
    storage.quizzes.upsert_set(&set).await?;

    let base = args.set_id.value() * 100;
    for (q_idx, (prompt, options, correct, explanation)) in SAMPLES.iter().enumerate() {
        let q_idx = u64::try_from(q_idx)?;
        let question = Question {
            id: QuestionId::new(base + q_idx + 1),
            set_id: args.set_id,
            prompt: (*prompt).to_owned(),
            explanation: Some((*explanation).to_owned()),
            position: u32::try_from(q_idx)?,
        };
        storage.quizzes.upsert_question(&question).await?;

        for (o_idx, text) in options.iter().enumerate() {
            let option = AnswerOption {
                id: OptionId::new(question.id.value() * 10 + u64::try_from(o_idx)?),
                question_id: question.id,
                text: (*text).to_owned(),
                is_correct: o_idx == *correct,
                position: u32::try_from(o_idx)?,
            };
            storage.quizzes.upsert_option(&option).await?;
        }
    }

    println!(
        "Seeded set {} ({}) with {} questions into {}",
        set.id(),
        set.title(),
        SAMPLES.len(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
