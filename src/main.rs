use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use colored::control::set_override as set_color_override;
use regex::Regex;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use testset::error::SuiteError;
use testset::i18n;
use testset::junit::write_junit;
use testset::registry::Registry;
use testset::report::{OutputKind, ReportOptions, print_human, render_order, render_totals};
use testset::session::{EXIT_MALFORMED, RunRequest, aggregate, exit_status, load_sets};
use testset::{t, t_args};
use tracing::{error, info};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Compact,
    Terse,
    Final,
    Normal,
}

impl From<OutputFormat> for OutputKind {
    fn from(v: OutputFormat) -> Self {
        match v {
            OutputFormat::Normal => OutputKind::Normal,
            OutputFormat::Compact => OutputKind::Compact,
            OutputFormat::Terse => OutputKind::Terse,
            OutputFormat::Final => OutputKind::Final,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about = t!("cli-about"))]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    #[arg(short = 'v', long = "verbose", global = true, help = t!("cli-verbose"))]
    verbose: bool,

    #[arg(long = "no-color", global = true, help = t!("cli-no-color"))]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run test sets in dependency order
    Run(RunArgs),
    /// Print the resolved execution order of test sets
    List(ListArgs),
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(value_name = "PATHS", required = true, help = t!("cli-paths"))]
    paths: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(value_name = "PATHS", required = true, help = t!("cli-paths"))]
    paths: Vec<PathBuf>,

    #[arg(short = 't', long = "test", value_name = "NAME", help = t!("cli-test"))]
    tests: Vec<String>,

    #[arg(long = "stop-on-fail", visible_alias = "failfast", conflicts_with = "keep_going", help = t!("cli-stop-on-fail"))]
    stop_on_fail: bool,

    #[arg(long = "keep-going", help = t!("cli-keep-going"))]
    keep_going: bool,

    #[arg(short = 'j', long = "jobs", value_name = "N", default_value_t = 1, help = t!("cli-jobs"))]
    jobs: usize,

    #[arg(long = "log-dir", value_name = "DIR", help = t!("cli-log-dir"))]
    log_dir: Option<PathBuf>,

    #[arg(long = "junit", value_name = "FILE", help = t!("cli-junit"))]
    junit: Option<PathBuf>,

    #[arg(long = "target", value_name = "ADDR", help = t!("cli-target"))]
    target: Option<String>,

    #[arg(long = "inventory", value_name = "FILE", help = t!("cli-inventory"))]
    inventory: Option<PathBuf>,

    #[arg(short = 'o', long = "output", value_enum, default_value = "normal", help = t!("cli-output"))]
    output: OutputFormat,

    #[arg(short = 'p', long = "hide-passes", conflicts_with = "hide_fails", help = t!("cli-hide-passes"))]
    hide_passes: bool,

    #[arg(short = 'f', long = "hide-fails", help = t!("cli-hide-fails"))]
    hide_fails: bool,

    #[arg(short = 'q', long = "silent", help = t!("cli-silent"))]
    silent: bool,
}

impl RunArgs {
    fn stop_on_fail(&self) -> Option<bool> {
        match (self.stop_on_fail, self.keep_going) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    fn request(&self) -> RunRequest {
        RunRequest {
            tests: self.tests.clone(),
            stop_on_fail: self.stop_on_fail(),
            jobs: self.jobs,
            log_dir: self.log_dir.clone(),
            target: self.target.clone(),
            inventory: self.inventory.clone(),
        }
    }
}

/// Bold every flag at the start of a help line.
fn format_flags_bold(text: &str) -> String {
    let flag_regex = Regex::new(r"(?m)^(\s*)(--?\w[\w-]*)").expect("static regex");
    flag_regex
        .replace_all(text, |caps: &regex::Captures| {
            format!("{}{}", &caps[1], caps[2].bold())
        })
        .to_string()
}

fn cmd_list(args: &ListArgs, registry: &Registry) -> Result<ExitCode> {
    let sets = match load_sets(&args.paths, registry) {
        Ok(sets) => sets,
        Err(e) => {
            error!("{e:#}");
            return Ok(ExitCode::from(EXIT_MALFORMED));
        }
    };
    for (_, set) in &sets {
        print!("{}", render_order(set));
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_run(args: &RunArgs, registry: &Registry, verbose: bool) -> Result<ExitCode> {
    let sets = match load_sets(&args.paths, registry) {
        Ok(sets) => sets,
        Err(e) => {
            error!("{e:#}");
            return Ok(ExitCode::from(EXIT_MALFORMED));
        }
    };
    let prepared = match args.request().prepare(sets) {
        Ok(prepared) => prepared,
        Err(e @ SuiteError::Validation { .. }) => {
            error!("{}", t_args!("error-validation-failed", "error" => format!("{e:#}")));
            return Ok(ExitCode::from(EXIT_MALFORMED));
        }
        Err(SuiteError::UnknownTarget(test)) => {
            error!("{}", t_args!("error-test-not-found", "test" => test));
            return Ok(ExitCode::from(EXIT_MALFORMED));
        }
        Err(e) => {
            error!("{e:#}");
            return Ok(ExitCode::from(EXIT_MALFORMED));
        }
    };

    let report = ReportOptions {
        kind: args.output.into(),
        verbose,
        hide_passes: args.hide_passes,
        hide_fails: args.hide_fails,
    };

    let mut summaries = Vec::with_capacity(prepared.len());
    for p in &prepared {
        let summary = p.run().await?;
        if !args.silent {
            print_human(&summary, &report);
        }
        summaries.push(summary);
    }

    if !args.silent && summaries.len() > 1 {
        println!("{}", render_totals(&aggregate(&summaries)));
    }

    if let Some(path) = &args.junit {
        let file = File::create(path)
            .with_context(|| t_args!("error-junit-create", "file" => path.display()))?;
        write_junit(BufWriter::new(file), env!("CARGO_PKG_NAME"), &summaries)
            .with_context(|| t_args!("error-junit-write", "file" => path.display()))?;
        info!("{}", t_args!("info-junit-written", "file" => path.display()));
    }

    Ok(ExitCode::from(exit_status(&summaries)))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    i18n::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => e.exit(),
        Err(e) => {
            println!("{}", format_flags_bold(&e.render().to_string()));
            return Ok(ExitCode::SUCCESS);
        }
    };

    // With -v, show INFO and above; RUST_LOG still wins when set.
    let filter = if cli.verbose {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "testset=info".to_string())
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "testset=warn".to_string())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cli.no_color {
        set_color_override(false);
    }

    let registry = Registry::with_builtins();
    match &cli.command {
        Cmd::List(args) => cmd_list(args, &registry),
        Cmd::Run(args) => cmd_run(args, &registry, cli.verbose).await,
    }
}
