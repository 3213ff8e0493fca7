//! # RFP Harness CLI (`rfp`)
//!
//! ```bash
//! rfp --config ./config/rfp.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rfp init` | Create the SQLite database and run schema migrations |
//! | `rfp ingest` | Index text files into a project |
//! | `rfp add-website` | Index a crawled page |
//! | `rfp files` | List a project's files |
//! | `rfp answer` | Answer an RFP sheet |
//! | `rfp job` | Run a JSON job request |
//! | `rfp delete-file` | Delete one file and its vectors |
//! | `rfp delete-project` | Delete every file and RFP in a project |
//! | `rfp completions` | Print shell completions |

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use rfp_harness::app::App;
use rfp_harness::config;
use rfp_harness::jobs::{dispatch, parse_request};
use rfp_harness::rfp::{process_rfp, RfpJob};
use rfp_harness_core::models::Scope;
use rfp_harness_core::store::Store;
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// RFP Harness: answer RFP spreadsheets from a project's own documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rfp.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "rfp", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rfp.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Index UTF-8 text files into a project.
    Ingest {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        project: i64,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Index a crawled web page whose text was fetched separately.
    AddWebsite {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        project: i64,
        #[arg(long)]
        url: String,
        /// File holding the page text.
        #[arg(long)]
        text_file: PathBuf,
    },

    /// List the files registered in a project.
    Files {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        project: i64,
    },

    /// Answer every row of an RFP sheet (CSV or XLSX).
    ///
    /// Writes `<name>_processed.csv` with an `AI Response` column into the
    /// configured output directory.
    Answer {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        project: i64,
        #[arg(long)]
        input: PathBuf,
        /// RFP name; defaults to the input file name.
        #[arg(long)]
        name: Option<String>,
        /// Project name used in the session id.
        #[arg(long)]
        project_name: Option<String>,
    },

    /// Run a JSON job request from a file, or `-` for stdin.
    Job {
        #[arg(default_value = "-")]
        source: String,
    },

    /// Delete a file and its chunks.
    DeleteFile {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        file: i64,
    },

    /// Delete every file, chunk, and RFP record in a project.
    DeleteProject {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        project: i64,
    },

    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "rfp", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    let app = App::open(cfg).await?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            user,
            project,
            paths,
        } => {
            let scope = Scope::new(user, project);
            let mut failures = 0;
            for path in &paths {
                match app.ingestor.ingest_file(scope, path).await {
                    Ok(report) => println!(
                        "indexed {} (file {}, {} chunks)",
                        path.display(),
                        report.file_id,
                        report.chunks
                    ),
                    Err(e) => {
                        failures += 1;
                        eprintln!("failed {}: {:#}", path.display(), e);
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{} of {} files failed to index", failures, paths.len());
            }
        }
        Commands::AddWebsite {
            user,
            project,
            url,
            text_file,
        } => {
            let text = std::fs::read_to_string(&text_file)
                .with_context(|| format!("Failed to read {}", text_file.display()))?;
            let report = app
                .ingestor
                .add_website(Scope::new(user, project), &url, &text)
                .await?;
            println!(
                "indexed {} (file {}, {} chunks)",
                url, report.file_id, report.chunks
            );
        }
        Commands::Files { user, project } => {
            let files = app.store.project_files(Scope::new(user, project)).await?;
            if files.is_empty() {
                println!("No files.");
            }
            for f in files {
                println!(
                    "{}\t{}\t{}\t{}",
                    f.id,
                    f.kind.as_str(),
                    if f.is_indexed { "indexed" } else { "pending" },
                    f.display_name()
                );
            }
        }
        Commands::Answer {
            user,
            project,
            input,
            name,
            project_name,
        } => {
            let job = RfpJob {
                scope: Scope::new(user, project),
                input,
                rfp_name: name,
                project_name,
            };
            let outcome = process_rfp(&app, &job).await?;
            println!(
                "answered {} rows ({} failed) -> {}",
                outcome.rows,
                outcome.failed_rows,
                outcome.output_path.display()
            );
        }
        Commands::Job { source } => {
            let json = if source == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                std::fs::read_to_string(&source)
                    .with_context(|| format!("Failed to read job file {}", source))?
            };
            let request = parse_request(&json)?;
            let outcome = dispatch(&app, request).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::DeleteFile { user, file } => {
            if app.store.delete_file(file, user).await? {
                println!("Deleted file {}.", file);
            } else {
                println!("File {} not found.", file);
            }
        }
        Commands::DeleteProject { user, project } => {
            let files = app.store.delete_project(Scope::new(user, project)).await?;
            println!("Deleted project {} ({} files).", project, files);
        }
        Commands::Completions { .. } => {}
    }

    app.close().await;
    Ok(())
}
