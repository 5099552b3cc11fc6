//! pcbprobe CLI - record probed PCB connections and derive nets.

mod session;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pcbprobe::export::export;
use pcbprobe::{ExportKind, Project, ProjectFiles, Settings};

use session::{nets_json, write_nets_human, write_stats, Session};

#[derive(Parser)]
#[command(name = "pcbprobe")]
#[command(about = "Record probed PCB connections and derive nets", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding the project files
    #[arg(short, long, value_name = "DIR", default_value = ".", global = true)]
    dir: PathBuf,

    /// Project name (files are NAME_components.json and so on)
    #[arg(short, long, value_name = "NAME", default_value = "pcb_project", global = true)]
    project: String,

    /// Reject connections to components that were never added
    #[arg(long, global = true)]
    strict_components: bool,

    /// Zero-pad single-digit reference numbers (D4 -> D04)
    #[arg(long, global = true)]
    pad_refs: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session (default)
    Shell,

    /// Execute one session command, then save
    Run {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },

    /// Print every net
    Nets {
        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Print project statistics
    Stats,

    /// Audit derived nets against a plain graph traversal
    Check,

    /// Write export files into the project directory
    Export {
        /// bom, csv, parts, kicad, named or all
        #[arg(value_name = "KIND")]
        kind: String,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    process::exit(exit_code);
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(&cli.dir)
        .with_context(|| format!("reading settings in {}", cli.dir.display()))?;
    if cli.strict_components {
        settings.implicit_components = false;
    }
    if cli.pad_refs {
        settings.pad_references = true;
    }
    Ok(settings)
}

fn run(cli: Cli) -> Result<i32> {
    let files = ProjectFiles::new(&cli.dir, &cli.project);
    let project = files
        .load(settings(&cli)?)
        .with_context(|| format!("loading project '{}'", cli.project))?;

    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => handle_shell(project, files),
        Commands::Run { words } => handle_run(project, files, &words),
        Commands::Nets { format } => handle_nets(&project, format),
        Commands::Stats => {
            write_stats(&mut io::stdout(), &project)?;
            Ok(0)
        }
        Commands::Check => handle_check(&project),
        Commands::Export { kind } => handle_export(&project, &files, &kind),
    }
}

fn handle_shell(project: Project, files: ProjectFiles) -> Result<i32> {
    println!("pcbprobe {} - project '{}'", env!("CARGO_PKG_VERSION"), project.name());
    println!(
        "{} components, {} connections. Type 'help' for commands.",
        project.components().len(),
        project.connections().len()
    );
    let mut session = Session::new(project, files, io::stdout());
    session.run(io::stdin().lock())?;
    Ok(0)
}

fn handle_run(project: Project, files: ProjectFiles, words: &[String]) -> Result<i32> {
    let mut session = Session::new(project, files, io::stdout());
    session.execute(&words.join(" "))?;
    session.save()?;
    Ok(0)
}

fn handle_nets(project: &Project, format: OutputFormat) -> Result<i32> {
    let netlist = project.netlist();
    match format {
        OutputFormat::Human => write_nets_human(&mut io::stdout(), &netlist)?,
        OutputFormat::Json => {
            let mut out = io::stdout();
            serde_json::to_writer_pretty(&mut out, &nets_json(&netlist))?;
            writeln!(out)?;
        }
    }
    Ok(0)
}

fn handle_check(project: &Project) -> Result<i32> {
    match project.verify() {
        Ok(()) => {
            println!(
                "Nets consistent: {} nets over {} connections",
                project.nets().len(),
                project.connections().len()
            );
            Ok(0)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            Ok(1)
        }
    }
}

fn handle_export(project: &Project, files: &ProjectFiles, kind: &str) -> Result<i32> {
    let kinds: Vec<ExportKind> = if kind.eq_ignore_ascii_case("all") {
        ExportKind::ALL.to_vec()
    } else {
        vec![kind.parse()?]
    };
    for kind in kinds {
        let path = export(project, kind, files.dir())?;
        println!("Exported {} to {}", kind.describe(), path.display());
    }
    Ok(0)
}
