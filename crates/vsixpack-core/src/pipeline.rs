//! The package-and-reinstall orchestration routine.
//!
//! Steps run strictly in plan order, one process at a time, each in the
//! resolved project directory. A failing step's [`OnFailure`] policy decides
//! whether the remaining steps still run.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::artifact;
use crate::config::VsixpackConfig;
use crate::error::StepError;
use crate::runner::ProcessRunner;
use crate::runtime::{self, PollConfig, RuntimeSpec};
use crate::step::{OnFailure, PlannedStep, StepKind};
use crate::toolchain::{ExecutionAction, StepContext, Toolchain};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    /// Failed under a `halt` or `continue` policy.
    Failed,
    /// Failed under an `ignore` policy.
    Ignored,
    /// Not attempted because an earlier step halted the pipeline.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: StepKind,
    pub on_failure: OnFailure,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    /// Command lines that were started, in order.
    pub actions: Vec<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub base_path: PathBuf,
    pub steps: Vec<StepRecord>,
}

impl PipelineReport {
    /// False when any step failed under a `halt` or `continue` policy.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps
            .iter()
            .filter(|record| record.status == StepStatus::Failed)
    }

    pub fn record(&self, step: StepKind) -> Option<&StepRecord> {
        self.steps.iter().find(|record| record.step == step)
    }

    /// Short failure summary, one entry per failed step.
    pub fn failure_summary(&self) -> String {
        self.failures()
            .map(|record| match &record.error {
                Some(err) => format!("{}: {}", record.step, err),
                None => record.step.to_string(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Runs planned steps against one toolchain and one process runner.
pub struct Pipeline<'a> {
    base_path: &'a Path,
    artifact_pattern: &'a str,
    runtime: RuntimeSpec,
    poll: PollConfig,
    toolchain: &'a dyn Toolchain,
    runner: &'a dyn ProcessRunner,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        cfg: &'a VsixpackConfig,
        base_path: &'a Path,
        toolchain: &'a dyn Toolchain,
        runner: &'a dyn ProcessRunner,
    ) -> Self {
        Self {
            base_path,
            artifact_pattern: &cfg.project.artifact,
            runtime: cfg.runtime_spec(),
            poll: cfg.runtime.poll.to_poll_config(),
            toolchain,
            runner,
        }
    }

    pub fn base_path(&self) -> &Path {
        self.base_path
    }

    /// Executes `plan` in order and reports every step's outcome.
    #[instrument(skip_all, fields(base = %self.base_path.display(), steps = plan.len()))]
    pub fn run(&self, plan: &[PlannedStep]) -> PipelineReport {
        let mut report = PipelineReport {
            base_path: self.base_path.to_path_buf(),
            steps: Vec::with_capacity(plan.len()),
        };
        let mut halted = false;

        for planned in plan {
            if halted {
                report.steps.push(StepRecord {
                    step: planned.kind,
                    on_failure: planned.on_failure,
                    status: StepStatus::Skipped,
                    error: None,
                    actions: Vec::new(),
                    elapsed_ms: 0,
                });
                continue;
            }

            info!(target: "vsixpack", "step {}", planned.kind);
            let started = Instant::now();
            let mut actions = Vec::new();
            let result = self.run_step(planned.kind, &mut actions);
            let elapsed_ms = duration_ms(started.elapsed());

            let (status, error) = match result {
                Ok(()) => {
                    debug!("step {} finished in {}ms", planned.kind, elapsed_ms);
                    (StepStatus::Succeeded, None)
                }
                Err(err) => match planned.on_failure {
                    OnFailure::Ignore => {
                        warn!("step {} failed (ignored): {}", planned.kind, err);
                        (StepStatus::Ignored, Some(err))
                    }
                    OnFailure::Continue => {
                        warn!("step {} failed, continuing: {}", planned.kind, err);
                        (StepStatus::Failed, Some(err))
                    }
                    OnFailure::Halt => {
                        warn!("step {} failed, halting: {}", planned.kind, err);
                        halted = true;
                        (StepStatus::Failed, Some(err))
                    }
                },
            };

            report.steps.push(StepRecord {
                step: planned.kind,
                on_failure: planned.on_failure,
                status,
                error,
                actions,
                elapsed_ms,
            });
        }

        report
    }

    /// The actions `step` would run right now, without running them.
    ///
    /// `install` targets the newest existing artifact, or the artifact
    /// pattern itself when nothing has been packaged yet.
    pub fn preview(&self, step: StepKind) -> anyhow::Result<Vec<ExecutionAction>> {
        let artifacts = match step {
            StepKind::Clean => return Ok(Vec::new()),
            StepKind::AwaitRuntime => {
                return Ok(vec![self.toolchain.runtime_query(&self.runtime)])
            }
            StepKind::Uninstall => artifact::find_artifacts(self.base_path, self.artifact_pattern)?,
            StepKind::Install => {
                match artifact::newest_artifact(self.base_path, self.artifact_pattern) {
                    Ok(path) => vec![path],
                    Err(_) => vec![self.base_path.join(self.artifact_pattern)],
                }
            }
            _ => Vec::new(),
        };
        self.toolchain.build_actions(step, &self.context(artifacts))
    }

    fn run_step(&self, step: StepKind, started: &mut Vec<String>) -> Result<(), StepError> {
        match step {
            StepKind::Clean => {
                let removed = artifact::remove_artifacts(self.base_path, self.artifact_pattern)?;
                if removed.is_empty() {
                    debug!("no stale artifacts matching '{}'", self.artifact_pattern);
                }
                Ok(())
            }
            StepKind::AwaitRuntime => {
                let query = self.toolchain.runtime_query(&self.runtime);
                started.push(query.command_line());
                runtime::await_runtime(self.runner, &query, self.base_path, &self.runtime, &self.poll)
                    .map(|_| ())
            }
            StepKind::Uninstall => {
                let stale = artifact::find_artifacts(self.base_path, self.artifact_pattern)?;
                self.run_actions(step, stale, started)
            }
            StepKind::Install => {
                let produced = artifact::newest_artifact(self.base_path, self.artifact_pattern)?;
                info!(target: "vsixpack", "installing {}", produced.display());
                self.run_actions(step, vec![produced], started)
            }
            _ => self.run_actions(step, Vec::new(), started),
        }
    }

    fn run_actions(
        &self,
        step: StepKind,
        artifacts: Vec<PathBuf>,
        started: &mut Vec<String>,
    ) -> Result<(), StepError> {
        let actions = self
            .toolchain
            .build_actions(step, &self.context(artifacts))
            .map_err(|e| match e.downcast::<StepError>() {
                Ok(err) => err,
                Err(e) => StepError::Prepare {
                    step: step.to_string(),
                    message: format!("{e:#}"),
                },
            })?;

        if actions.is_empty() {
            debug!("{} has nothing to run for {}", self.toolchain.name(), step);
        }

        for action in &actions {
            info!(target: "vsixpack", "run {}", action);
            started.push(action.command_line());
            self.runner.run(action, self.base_path)?;
        }
        Ok(())
    }

    fn context(&self, artifacts: Vec<PathBuf>) -> StepContext<'_> {
        StepContext {
            base_path: self.base_path,
            runtime: &self.runtime,
            artifacts,
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ProcessOutput;
    use crate::runtime::RuntimeManager;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs;

    /// A toolchain that emits one `tool <step>` action per step and
    /// `tool <step> <artifact>` for steps that target artifacts.
    #[derive(Debug)]
    struct EchoToolchain;

    impl Toolchain for EchoToolchain {
        fn name(&self) -> &str {
            "echo"
        }

        fn build_actions(
            &self,
            step: StepKind,
            ctx: &StepContext<'_>,
        ) -> anyhow::Result<Vec<ExecutionAction>> {
            match step {
                StepKind::Uninstall | StepKind::Install => Ok(ctx
                    .artifacts
                    .iter()
                    .map(|path| {
                        let name = path.file_name().unwrap().to_string_lossy().to_string();
                        ExecutionAction::new("tool", [step.as_str().to_string(), name])
                    })
                    .collect()),
                StepKind::InstallTools => Ok(vec![
                    ExecutionAction::new("tool", ["install-tools", "typescript"]),
                    ExecutionAction::new("tool", ["install-tools", "vsce"]),
                ]),
                _ => Ok(vec![ExecutionAction::new("tool", [step.as_str()])]),
            }
        }

        fn runtime_query(&self, _runtime: &RuntimeSpec) -> ExecutionAction {
            ExecutionAction::new("tool", ["version"])
        }
    }

    /// Records every invocation with its working directory, and simulates
    /// the packager writing an artifact.
    #[derive(Default)]
    struct RecordingRunner {
        calls: RefCell<Vec<(String, PathBuf)>>,
        failing: HashMap<String, i32>,
        produce: Option<String>,
        /// Artifact count observed when `compile` starts.
        artifacts_at_compile: RefCell<Option<usize>>,
        artifact_pattern: String,
    }

    impl RecordingRunner {
        fn new() -> Self {
            Self {
                produce: Some("extension-1.0.0.vsix".to_string()),
                artifact_pattern: "*.vsix".to_string(),
                ..Self::default()
            }
        }

        fn fail(mut self, command_line: &str) -> Self {
            self.failing.insert(command_line.to_string(), 1);
            self
        }

        fn commands(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|(c, _)| c.clone()).collect()
        }
    }

    impl ProcessRunner for RecordingRunner {
        fn run(&self, action: &ExecutionAction, cwd: &Path) -> Result<ProcessOutput, StepError> {
            let line = action.command_line();
            self.calls.borrow_mut().push((line.clone(), cwd.to_path_buf()));

            if line == "tool compile" {
                let found = artifact::find_artifacts(cwd, &self.artifact_pattern).unwrap();
                *self.artifacts_at_compile.borrow_mut() = Some(found.len());
            }

            if let Some(code) = self.failing.get(&line) {
                return Err(StepError::NonZeroExit {
                    program: action.program.clone(),
                    code: Some(*code),
                    diagnostic: format!("{line} failed"),
                });
            }

            if line == "tool package" {
                if let Some(name) = &self.produce {
                    fs::write(cwd.join(name), b"vsix").unwrap();
                }
            }
            Ok(ProcessOutput { code: Some(0) })
        }

        fn capture(&self, action: &ExecutionAction, cwd: &Path) -> Result<String, StepError> {
            self.calls
                .borrow_mut()
                .push((action.command_line(), cwd.to_path_buf()));
            Ok("v20.11.1".to_string())
        }
    }

    fn fast_config() -> VsixpackConfig {
        let mut cfg = VsixpackConfig::default();
        cfg.runtime.manager = RuntimeManager::None;
        cfg.runtime.poll.settle_ms = 5;
        cfg.runtime.poll.interval_ms = 1;
        cfg.runtime.poll.timeout_ms = 1_000;
        cfg
    }

    fn plan_with(overrides: &[(StepKind, OnFailure)]) -> Vec<PlannedStep> {
        StepKind::ALL
            .into_iter()
            .map(|kind| PlannedStep {
                kind,
                on_failure: overrides
                    .iter()
                    .find(|(k, _)| *k == kind)
                    .map(|(_, p)| *p)
                    .unwrap_or_else(|| kind.default_on_failure()),
            })
            .collect()
    }

    fn expected_sequence(installed: &str) -> Vec<String> {
        vec![
            "tool compile".to_string(),
            "tool use-runtime".to_string(),
            "tool version".to_string(),
            "tool tool-version".to_string(),
            "tool install-tools typescript".to_string(),
            "tool install-tools vsce".to_string(),
            "tool list-tools".to_string(),
            "tool install-deps".to_string(),
            "tool list-deps".to_string(),
            "tool package".to_string(),
            format!("tool install {installed}"),
        ]
    }

    #[test]
    fn fresh_project_runs_every_step_in_order_and_installs_the_produced_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let cfg = fast_config();
        let runner = RecordingRunner::new();
        let pipeline = Pipeline::new(&cfg, &base, &EchoToolchain, &runner);

        let report = pipeline.run(&plan_with(&[]));

        assert!(report.is_success(), "{}", report.failure_summary());
        assert_eq!(runner.commands(), expected_sequence("extension-1.0.0.vsix"));
        assert_eq!(*runner.artifacts_at_compile.borrow(), Some(0));
        let steps: Vec<_> = report.steps.iter().map(|r| r.step).collect();
        assert_eq!(steps, StepKind::ALL.to_vec());
        assert!(report
            .steps
            .iter()
            .all(|r| r.status == StepStatus::Succeeded));
    }

    #[test]
    fn every_action_runs_in_the_base_path() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let cfg = fast_config();
        let runner = RecordingRunner::new();

        Pipeline::new(&cfg, &base, &EchoToolchain, &runner).run(&plan_with(&[]));

        assert!(!runner.calls.borrow().is_empty());
        assert!(runner.calls.borrow().iter().all(|(_, cwd)| cwd == &base));
    }

    #[test]
    fn stale_artifacts_are_uninstalled_then_removed_before_compile() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        fs::write(base.join("old-1.vsix"), b"old").unwrap();
        fs::write(base.join("old-2.vsix"), b"old").unwrap();
        let cfg = fast_config();
        let runner = RecordingRunner::new();

        let report = Pipeline::new(&cfg, &base, &EchoToolchain, &runner).run(&plan_with(&[]));

        assert!(report.is_success());
        let commands = runner.commands();
        assert_eq!(commands[0], "tool uninstall old-1.vsix");
        assert_eq!(commands[1], "tool uninstall old-2.vsix");
        assert_eq!(*runner.artifacts_at_compile.borrow(), Some(0));
        assert!(!base.join("old-1.vsix").exists());
        assert_eq!(
            commands.last().map(String::as_str),
            Some("tool install extension-1.0.0.vsix")
        );
    }

    #[test]
    fn rerun_replaces_the_previously_installed_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let cfg = fast_config();

        let first = RecordingRunner::new();
        let report = Pipeline::new(&cfg, &base, &EchoToolchain, &first).run(&plan_with(&[]));
        assert!(report.is_success());
        assert!(base.join("extension-1.0.0.vsix").exists());

        let mut second = RecordingRunner::new();
        second.produce = Some("extension-1.0.1.vsix".to_string());
        let report = Pipeline::new(&cfg, &base, &EchoToolchain, &second).run(&plan_with(&[]));
        assert!(report.is_success(), "{}", report.failure_summary());

        let commands = second.commands();
        assert_eq!(commands[0], "tool uninstall extension-1.0.0.vsix");
        assert_eq!(&commands[1..], expected_sequence("extension-1.0.1.vsix").as_slice());
        assert_eq!(*second.artifacts_at_compile.borrow(), Some(0));
        let installs: Vec<_> = commands
            .iter()
            .filter(|c| c.starts_with("tool install "))
            .collect();
        assert_eq!(installs, vec!["tool install extension-1.0.1.vsix"]);
        assert_eq!(
            artifact::find_artifacts(&base, "*.vsix").unwrap(),
            vec![base.join("extension-1.0.1.vsix")]
        );
    }

    /// Fails `compile` the way a toolchain reports a missing prerequisite.
    #[derive(Debug)]
    struct MissingToolToolchain;

    impl Toolchain for MissingToolToolchain {
        fn name(&self) -> &str {
            "missing"
        }

        fn build_actions(
            &self,
            step: StepKind,
            _ctx: &StepContext<'_>,
        ) -> anyhow::Result<Vec<ExecutionAction>> {
            match step {
                StepKind::Compile => Err(StepError::ToolNotFound {
                    program: "nvm".to_string(),
                }
                .into()),
                StepKind::Package => Err(anyhow::anyhow!("bad manifest")),
                _ => Ok(Vec::new()),
            }
        }

        fn runtime_query(&self, _runtime: &RuntimeSpec) -> ExecutionAction {
            ExecutionAction::new("tool", ["version"])
        }
    }

    #[test]
    fn toolchain_step_errors_keep_their_kind() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let cfg = fast_config();
        let runner = RecordingRunner::new();
        let plan = [
            PlannedStep {
                kind: StepKind::Compile,
                on_failure: OnFailure::Continue,
            },
            PlannedStep {
                kind: StepKind::Package,
                on_failure: OnFailure::Continue,
            },
        ];

        let report = Pipeline::new(&cfg, &base, &MissingToolToolchain, &runner).run(&plan);

        assert_eq!(
            report.record(StepKind::Compile).unwrap().error,
            Some(StepError::ToolNotFound {
                program: "nvm".to_string()
            })
        );
        assert!(matches!(
            report.record(StepKind::Package).unwrap().error,
            Some(StepError::Prepare { .. })
        ));
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1_500)), 1_500);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }

    #[test]
    fn packaging_failure_halts_and_skips_install_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let cfg = fast_config();
        let mut runner = RecordingRunner::new().fail("tool package");
        runner.produce = None;

        let report = Pipeline::new(&cfg, &base, &EchoToolchain, &runner).run(&plan_with(&[]));

        assert!(!report.is_success());
        assert_eq!(
            report.record(StepKind::Package).unwrap().status,
            StepStatus::Failed
        );
        assert_eq!(
            report.record(StepKind::Install).unwrap().status,
            StepStatus::Skipped
        );
        assert_eq!(runner.commands().last().map(String::as_str), Some("tool package"));
    }

    #[test]
    fn packaging_failure_with_continue_reports_missing_artifact_distinctly() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let cfg = fast_config();
        let mut runner = RecordingRunner::new().fail("tool package");
        runner.produce = None;
        let plan = plan_with(&[
            (StepKind::Package, OnFailure::Continue),
            (StepKind::Install, OnFailure::Continue),
        ]);

        let report = Pipeline::new(&cfg, &base, &EchoToolchain, &runner).run(&plan);

        let package = report.record(StepKind::Package).unwrap();
        assert!(matches!(package.error, Some(StepError::NonZeroExit { .. })));
        let install = report.record(StepKind::Install).unwrap();
        assert_eq!(install.status, StepStatus::Failed);
        assert_eq!(
            install.error,
            Some(StepError::ArtifactNotProduced {
                pattern: "*.vsix".to_string()
            })
        );
        assert!(install.actions.is_empty());
        assert_eq!(report.failures().count(), 2);
        assert!(report.failure_summary().contains("package:"));
        assert!(report.failure_summary().contains("install:"));
    }

    #[test]
    fn ignored_failures_do_not_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let cfg = fast_config();
        let runner = RecordingRunner::new().fail("tool list-deps");

        let report = Pipeline::new(&cfg, &base, &EchoToolchain, &runner).run(&plan_with(&[]));

        assert!(report.is_success());
        assert_eq!(
            report.record(StepKind::ListDeps).unwrap().status,
            StepStatus::Ignored
        );
        assert!(runner.commands().contains(&"tool package".to_string()));
    }

    #[test]
    fn first_failing_action_ends_a_multi_action_step() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let cfg = fast_config();
        let runner = RecordingRunner::new().fail("tool install-tools typescript");

        let report = Pipeline::new(&cfg, &base, &EchoToolchain, &runner).run(&plan_with(&[]));

        let record = report.record(StepKind::InstallTools).unwrap();
        assert_eq!(record.actions, vec!["tool install-tools typescript"]);
        assert!(!runner
            .commands()
            .contains(&"tool install-tools vsce".to_string()));
    }

    #[test]
    fn await_runtime_pauses_at_least_the_settle_duration() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let mut cfg = fast_config();
        cfg.runtime.poll.settle_ms = 40;
        let runner = RecordingRunner::new();
        let plan = [PlannedStep {
            kind: StepKind::AwaitRuntime,
            on_failure: OnFailure::Halt,
        }];

        let report = Pipeline::new(&cfg, &base, &EchoToolchain, &runner).run(&plan);

        assert!(report.is_success());
        assert!(report.steps[0].elapsed_ms >= 40);
    }

    #[test]
    fn preview_does_not_run_anything() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let cfg = fast_config();
        let runner = RecordingRunner::new();
        let pipeline = Pipeline::new(&cfg, &base, &EchoToolchain, &runner);

        let install = pipeline.preview(StepKind::Install).unwrap();
        assert_eq!(install[0].args, vec!["install", "*.vsix"]);
        assert!(pipeline.preview(StepKind::Clean).unwrap().is_empty());
        assert!(runner.commands().is_empty());
    }
}
