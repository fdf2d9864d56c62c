use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anstyle::Style;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vsixpack_core::{
    project, CommandRef, Pipeline, PipelineReport, PlannedStep, PrimaryCommand, ProcessRunner,
    StepKind, StepStatus, Toolchain, VsixpackConfig,
};
use vsixpack_ext_node::NodeToolchain;
use vsixpack_policy::{resolve_plan, Scope};

mod executor;
mod init;
mod styles;

use serde_json::json;

use styles as s;

/// The command-line interface for vsixpack.
#[derive(Debug, Parser)]
#[command(name = "vsixpack")]
#[command(version)]
#[command(styles = s::get_clap_styles())]
#[command(
    help_template = "{bin} {version}\n\n{about-with-newline}{usage-heading} {usage}\n\n{all-args}{after-help}"
)]
#[command(about = "Rebuild, package and reinstall a VS Code extension")]
#[command(
    long_about = "vsixpack uninstalls the current build of an editor extension, removes stale
.vsix files, compiles, pins the Node runtime, installs tooling and dependencies,
packages a fresh .vsix and installs it, one step at a time.

Common Commands:
  (none)            Run the whole pipeline
  run:<step>        Run the pipeline up to and including <step>
  step:<step>       Run a single step
  plan              Show what would run, without running anything
  init              Write a default vsixpack.toml

Steps:
  uninstall, clean, compile, use-runtime, await-runtime, tool-version,
  install-tools, list-tools, install-deps, list-deps, package, install
"
)]
#[command(
    after_help = "\x1b[1;32mExamples:\x1b[0m\n  \x1b[36mvsixpack\x1b[0m                      \x1b[2m# Package and reinstall the extension\x1b[0m\n  \x1b[36mvsixpack run package\x1b[0m          \x1b[2m# Stop after packaging (shorthand for run:package)\x1b[0m\n  \x1b[36mvsixpack step compile\x1b[0m         \x1b[2m# Only compile\x1b[0m\n  \x1b[36mvsixpack --keep-going\x1b[0m         \x1b[2m# Attempt every step, report failures at the end\x1b[0m\n  \x1b[36mvsixpack plan --json\x1b[0m          \x1b[2m# Machine-readable plan\x1b[0m"
)]
pub(crate) struct Cli {
    /// Command in canonical form, for example: `run`, `run:package`, `step:compile`, `plan`
    command: Option<String>,
    /// Optional step selector (supports `vsixpack step compile` style)
    selector: Option<String>,
    /// Path to the vsixpack config file. Defaults to `vsixpack.toml` in the project directory.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Project directory every step runs in. Defaults to the config file's directory, then the current directory.
    #[arg(long)]
    project_dir: Option<PathBuf>,
    /// Attempt every step even after a failure; the run still fails at the end.
    #[arg(long, default_value_t = false)]
    keep_going: bool,
    /// Print the run report or plan as JSON on stdout.
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Overwrite an existing config file on `init`.
    #[arg(long, default_value_t = false)]
    force: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    debug!("parsed cli arguments: {:?}", cli);

    let command = parse_command(&cli)?;

    let cwd = std::env::current_dir().context("unable to determine the current directory")?;
    let base_path =
        project::resolve_base_path(cli.project_dir.as_deref(), cli.config.as_deref(), &cwd)?;
    let config_path = match &cli.config {
        Some(path) => cwd.join(path),
        None => project::default_config_path(&base_path),
    };
    debug!("project directory: {}", base_path.display());

    if command.primary == PrimaryCommand::Init {
        return init::run(&config_path, &base_path, cli.force);
    }

    let cfg = load_config(&cli, &config_path)?;
    let toolchain = NodeToolchain::new(cfg.tools.clone(), cfg.runtime.nvm_dir.clone());
    let runner = executor::SystemRunner::default().with_stdout_to_stderr(cli.json);

    execute(
        &cli,
        &cfg,
        &base_path,
        &toolchain,
        &runner,
        &command,
        &mut io::stdout().lock(),
    )
}

fn parse_command(cli: &Cli) -> Result<CommandRef> {
    let command_name = match &cli.command {
        Some(cmd) => cmd,
        None => return Ok(CommandRef::full_run()),
    };

    let command_text = match &cli.selector {
        Some(selector) => format!("{}:{}", command_name, selector),
        None => command_name.clone(),
    };

    CommandRef::from_str(&command_text)
        .map_err(|e| anyhow!("failed to parse command '{}': {e}", command_text))
}

fn load_config(cli: &Cli, path: &Path) -> Result<VsixpackConfig> {
    let loaded = if cli.config.is_some() {
        VsixpackConfig::load_from_file(path)
    } else {
        VsixpackConfig::load_or_default(path)
    };
    loaded.with_context(|| format!("unable to load config '{}'", path.display()))
}

/// Executes a parsed vsixpack command, writing the plan or report to `out`.
fn execute(
    cli: &Cli,
    cfg: &VsixpackConfig,
    base_path: &Path,
    toolchain: &dyn Toolchain,
    runner: &dyn ProcessRunner,
    command: &CommandRef,
    out: &mut dyn Write,
) -> Result<()> {
    let plan = resolve_plan(cfg, Scope::from_command(command), cli.keep_going)?;
    let pipeline = Pipeline::new(cfg, base_path, toolchain, runner);

    match command.primary {
        PrimaryCommand::Plan => print_plan(cli, cfg, &pipeline, &plan, out),
        PrimaryCommand::Run | PrimaryCommand::Step => {
            let report = pipeline.run(&plan);
            if cli.json {
                writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            } else {
                print_summary(command, &report, out)?;
            }

            if !report.is_success() {
                bail!("{} failed: {}", command, report.failure_summary());
            }
            Ok(())
        }
        PrimaryCommand::Init => Err(anyhow!("'init' does not run pipeline steps")),
    }
}

fn print_plan(
    cli: &Cli,
    cfg: &VsixpackConfig,
    pipeline: &Pipeline<'_>,
    plan: &[PlannedStep],
    out: &mut dyn Write,
) -> Result<()> {
    let mut entries = Vec::with_capacity(plan.len());
    for planned in plan {
        let actions = pipeline
            .preview(planned.kind)
            .with_context(|| format!("unable to plan step '{}'", planned.kind))?;
        entries.push((planned, actions));
    }

    let runtime = cfg.runtime_spec();
    if cli.json {
        let steps = entries
            .iter()
            .map(|(planned, actions)| {
                json!({
                    "step": planned.kind,
                    "on_failure": planned.on_failure,
                    "actions": actions.iter().map(|a| a.command_line()).collect::<Vec<_>>(),
                })
            })
            .collect::<Vec<_>>();
        let body = json!({
            "base_path": pipeline.base_path(),
            "runtime": { "manager": runtime.manager, "version": runtime.version },
            "artifact": cfg.project.artifact,
            "steps": steps,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&body)?)?;
        return Ok(());
    }

    writeln!(
        out,
        "plan (base={}, runtime={} {})",
        pipeline.base_path().display(),
        runtime.manager.as_str(),
        runtime.version
    )?;
    for (index, (planned, actions)) in entries.iter().enumerate() {
        writeln!(
            out,
            "{:>2}. {} [{}]",
            index + 1,
            s::paint(s::STEP, planned.kind.as_str()),
            planned.on_failure.as_str()
        )?;
        match planned.kind {
            StepKind::Clean => writeln!(out, "      remove {}", cfg.project.artifact)?,
            StepKind::AwaitRuntime => {
                let poll = cfg.runtime.poll;
                writeln!(
                    out,
                    "      settle {}ms, poll every {}ms for up to {}ms",
                    poll.settle_ms, poll.interval_ms, poll.timeout_ms
                )?;
            }
            _ if actions.is_empty() => {
                writeln!(out, "      {}", s::paint(s::DESC, "(nothing to run)"))?
            }
            _ => {}
        }
        for action in actions {
            writeln!(out, "      {}", s::paint(s::DESC, &action.command_line()))?;
        }
    }
    Ok(())
}

/// The padded status column of the run summary, and its colour.
fn status_cell(status: StepStatus) -> (String, Style) {
    let (marker, style) = match status {
        StepStatus::Succeeded => ("ok", s::OK),
        StepStatus::Failed => ("failed", s::ERROR),
        StepStatus::Ignored => ("ignored", s::WARN),
        StepStatus::Skipped => ("skipped", s::DESC),
    };
    (format!("{marker:<8}"), style)
}

fn print_summary(
    command: &CommandRef,
    report: &PipelineReport,
    out: &mut dyn Write,
) -> Result<()> {
    writeln!(out, "{} ({} steps)", command, report.steps.len())?;
    for record in &report.steps {
        let (marker, style) = status_cell(record.status);
        writeln!(
            out,
            " - {:<14} {} {}ms",
            record.step.as_str(),
            s::paint(style, &marker),
            record.elapsed_ms
        )?;
        if let Some(err) = &record.error {
            writeln!(out, "     {}", s::paint(s::DESC, &err.to_string()))?;
        }
    }
    Ok(())
}
