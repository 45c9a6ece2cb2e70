//! tack CLI: a minimal content board on the file system
//!
//! Commands: init, post, reply, list, show, reindex, install, stats,
//! completions

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, ValueEnum};
use serde_json::json;
use tracing::{error, warn, Level};

use tack_board::{ArticleDraft, Board};
use tack_core::article::Dir;
use tack_core::error::BoardError;
use tack_core::MediaUpload;

#[derive(Parser)]
#[command(name = "tack")]
#[command(version)]
#[command(about = "Minimal content board: articles, replies, and a recency listing")]
struct Cli {
    /// Board root directory
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// More log output on stderr (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Initialize a new board
    Init {
        /// Directory to initialize (defaults to --root)
        path: Option<PathBuf>,
    },
    /// Post a new article
    Post {
        #[arg(long)]
        subject: String,
        /// Article text
        #[arg(long, conflicts_with = "body_file", required_unless_present = "body_file")]
        body: Option<String>,
        /// Read the article text from a file ("-" for stdin)
        #[arg(long)]
        body_file: Option<PathBuf>,
        /// Image or video to attach
        #[arg(long)]
        media: Option<PathBuf>,
        /// MIME type to assume when the file content is not recognised
        #[arg(long, requires = "media")]
        media_type: Option<String>,
    },
    /// Append a reply to an article
    Reply {
        /// Article number
        dir: Dir,
        #[arg(long, conflicts_with = "text_file", required_unless_present = "text_file")]
        text: Option<String>,
        /// Read the reply from a file ("-" for stdin)
        #[arg(long)]
        text_file: Option<PathBuf>,
    },
    /// List articles, most recently updated first
    #[command(alias = "ls")]
    List {
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Show one article's index row, reply count, and document path
    Show {
        dir: Dir,
    },
    /// Re-import every sidecar into the index
    Reindex,
    /// Reset the index and rebuild it from sidecars
    Install,
    /// Board statistics
    Stats,
    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Table,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, 2) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Print a failure and pick the exit status: 2 for requests the user can
/// fix, 1 for everything else. Internal detail only goes to the log.
fn report(err: &anyhow::Error) -> ExitCode {
    let Some(board_err) = err.downcast_ref::<BoardError>() else {
        eprintln!("error: {err:#}");
        return ExitCode::from(1);
    };

    if board_err.is_user_error() {
        warn!(error = %format!("{err:#}"), "request rejected");
        eprintln!("error: {}", board_err.public_message());
        return ExitCode::from(2);
    }

    error!(error = %format!("{err:#}"), "command failed");
    match board_err {
        // Setup problems are the operator's to fix; say what they are.
        BoardError::Store(_) | BoardError::Config(_) => eprintln!("error: {board_err}"),
        _ => eprintln!("error: {}", board_err.public_message()),
    }
    ExitCode::from(1)
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { path } => cmd_init(path.as_deref().unwrap_or(&cli.root)),
        Commands::Post {
            subject,
            body,
            body_file,
            media,
            media_type,
        } => {
            let body = text_arg(body, body_file.as_deref())?;
            let mut draft = ArticleDraft::new(subject, body);
            if let Some(path) = media {
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("reading media file {}", path.display()))?;
                draft = draft.with_media(MediaUpload {
                    bytes,
                    declared_type: media_type,
                });
            }
            let mut board = Board::open(&cli.root)?;
            let dir = board.create_article(&draft)?;
            print_json(&json!({
                "dir": dir,
                "path": board.store().document_path(dir),
            }))
        }
        Commands::Reply {
            dir,
            text,
            text_file,
        } => {
            let text = text_arg(text, text_file.as_deref())?;
            let board = Board::open(&cli.root)?;
            let updated_at = board.append_reply(dir, &text)?;
            print_json(&json!({ "dir": dir, "updated_at": updated_at }))
        }
        Commands::List { format } => {
            let board = Board::open(&cli.root)?;
            let articles = board.list()?;
            match format {
                Format::Json => print_json(&articles),
                Format::Table => {
                    let width = articles
                        .iter()
                        .map(|a| a.dir.to_string().len())
                        .max()
                        .unwrap_or(0)
                        .max(3);
                    println!("{:>width$}  subject", "dir");
                    println!("{}  {}", "-".repeat(width), "-".repeat(20));
                    for a in &articles {
                        println!("{:>width$}  {}", a.dir, a.subject);
                    }
                    Ok(())
                }
            }
        }
        Commands::Show { dir } => {
            let board = Board::open(&cli.root)?;
            let article = board.article(dir)?;
            print_json(&json!({
                "dir": article.dir,
                "subject": article.subject,
                "created_at": article.created_at,
                "updated_at": article.updated_at,
                "replies": board.reply_count(dir)?,
                "path": board.store().document_path(dir),
            }))
        }
        Commands::Reindex => {
            let mut board = Board::open(&cli.root)?;
            print_json(&board.rebuild_index()?)
        }
        Commands::Install => {
            let mut board = Board::init(&cli.root)?;
            print_json(&board.reset_and_rebuild()?)
        }
        Commands::Stats => {
            let board = Board::open(&cli.root)?;
            print_json(&json!({
                "articles": board.index().count()?,
                "containers": board.store().list_dirs()?.len(),
                "max_dir": board.index().max_dir()?,
            }))
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "tack", &mut io::stdout());
            Ok(())
        }
    }
}

fn cmd_init(path: &Path) -> Result<()> {
    Board::init(path)?;
    println!("Initialized tack board at {}", path.display());
    Ok(())
}

/// Inline text, or the contents of a file (`-` reads stdin).
fn text_arg(inline: Option<String>, file: Option<&Path>) -> Result<String> {
    match (inline, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) if path == Path::new("-") => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("reading text from stdin")?;
            Ok(text)
        }
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading text from {}", path.display())),
        (None, None) => anyhow::bail!("no text given"),
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
