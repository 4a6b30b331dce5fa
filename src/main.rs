use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use faculty_feedback::config::Config;
use faculty_feedback::db;
use faculty_feedback::models::{FacultyAccount, Scope, SubjectAllocation};
use faculty_feedback::report;
use faculty_feedback::stats;
use faculty_feedback::validate::{self, FieldError, ImportError, RecordSchema};

#[derive(Parser)]
#[command(name = "faculty-feedback")]
#[command(about = "Feedback statistics and bulk imports for college faculty", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaKind {
    Faculty,
    Allocation,
}

impl SchemaKind {
    fn schema(self) -> RecordSchema {
        match self {
            SchemaKind::Faculty => RecordSchema::faculty_account(),
            SchemaKind::Allocation => RecordSchema::subject_allocation(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Check a bulk JSON or CSV file without touching the database
    Validate {
        #[arg(long, value_enum)]
        schema: SchemaKind,
        #[arg(long)]
        file: PathBuf,
    },
    /// Import faculty accounts into a department
    ImportFaculty {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        college: Uuid,
        #[arg(long)]
        department: Uuid,
    },
    /// Import subject allocations for a college
    ImportAllocations {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        college: Uuid,
    },
    /// Print feedback statistics as JSON
    #[command(group(
        ArgGroup::new("scope")
            .args(["faculty", "department", "college"])
            .required(true)
            .multiple(false)
    ))]
    Stats {
        #[arg(long)]
        faculty: Option<Uuid>,
        #[arg(long)]
        department: Option<Uuid>,
        #[arg(long)]
        college: Option<Uuid>,
    },
    /// Generate a markdown report
    #[command(group(
        ArgGroup::new("scope")
            .args(["faculty", "department", "college"])
            .required(true)
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        faculty: Option<Uuid>,
        #[arg(long)]
        department: Option<Uuid>,
        #[arg(long)]
        college: Option<Uuid>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect() -> anyhow::Result<PgPool> {
    let config = Config::from_env()?;
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")
}

fn resolve_scope(
    faculty: Option<Uuid>,
    department: Option<Uuid>,
    college: Option<Uuid>,
) -> anyhow::Result<Scope> {
    match (faculty, department, college) {
        (Some(id), None, None) => Ok(Scope::Faculty(id)),
        (None, Some(id), None) => Ok(Scope::Department(id)),
        (None, None, Some(id)) => Ok(Scope::College(id)),
        _ => bail!("pass exactly one of --faculty, --department or --college"),
    }
}

fn load_payload(path: &Path) -> anyhow::Result<Value> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    if is_csv {
        validate::records_from_csv(file)
            .with_context(|| format!("failed to read CSV {}", path.display()))
    } else {
        serde_json::from_reader(file)
            .with_context(|| format!("failed to parse JSON {}", path.display()))
    }
}

fn print_field_errors(errors: &[FieldError]) {
    println!("Batch rejected, nothing was saved. Fix these and resubmit the whole file:");
    for error in errors {
        println!("- item {} / {}: {}", error.index, error.field, error.message);
    }
}

fn parse_or_report<T: serde::de::DeserializeOwned>(
    payload: &Value,
    schema: &RecordSchema,
) -> anyhow::Result<Option<Vec<T>>> {
    match validate::parse_batch(payload, schema) {
        Ok(batch) => Ok(Some(batch)),
        Err(ImportError::Invalid(errors)) => {
            print_field_errors(&errors);
            Ok(None)
        }
        Err(err) => Err(err).context("malformed bulk payload"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Validate { schema, file } => {
            let payload = load_payload(&file)?;
            let result = validate::validate(&payload, &schema.schema())
                .context("malformed bulk payload")?;
            if result.is_accepted() {
                println!("{} records are valid.", result.valid_records.len());
            } else {
                print_field_errors(&result.errors);
            }
        }
        Commands::ImportFaculty {
            file,
            college,
            department,
        } => {
            let payload = load_payload(&file)?;
            let Some(accounts) =
                parse_or_report::<FacultyAccount>(&payload, &RecordSchema::faculty_account())?
            else {
                return Ok(());
            };

            let pool = connect().await?;
            let emails: Vec<String> = accounts.iter().map(|a| a.email.clone()).collect();
            let taken = db::existing_emails(&pool, &emails).await?;
            if !taken.is_empty() {
                warn!(count = taken.len(), "faculty import blocked by registered emails");
                println!("Batch rejected, these emails are already registered:");
                for email in &taken {
                    println!("- {email}");
                }
                return Ok(());
            }

            let inserted = db::insert_faculty_batch(&pool, college, department, &accounts).await?;
            println!("Imported {inserted} faculty accounts from {}.", file.display());
        }
        Commands::ImportAllocations { file, college } => {
            let payload = load_payload(&file)?;
            let Some(allocations) =
                parse_or_report::<SubjectAllocation>(&payload, &RecordSchema::subject_allocation())?
            else {
                return Ok(());
            };

            let pool = connect().await?;
            let inserted = db::insert_allocation_batch(&pool, college, &allocations).await?;
            println!("Imported {inserted} subject allocations from {}.", file.display());
        }
        Commands::Stats {
            faculty,
            department,
            college,
        } => {
            let scope = resolve_scope(faculty, department, college)?;
            let pool = connect().await?;
            let submissions = db::fetch_submissions(&pool, scope).await?;
            let stats = stats::compute_scope_stats(scope, &submissions, Utc::now());
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Report {
            faculty,
            department,
            college,
            out,
        } => {
            let scope = resolve_scope(faculty, department, college)?;
            let pool = connect().await?;
            let submissions = db::fetch_submissions(&pool, scope).await?;
            let now = Utc::now();
            let stats = stats::compute_scope_stats(scope, &submissions, now);
            let breakdown = match scope {
                Scope::Faculty(_) => Vec::new(),
                _ => stats::compute_faculty_breakdown(&submissions, now),
            };

            let label = format!("{} {}", scope.label(), scope.id());
            let report = report::build_report(&label, &stats, &breakdown);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(path = %out.display(), submissions = stats.total_submissions, "report written");
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
