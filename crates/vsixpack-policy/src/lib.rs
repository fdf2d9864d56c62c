use anyhow::{bail, Result};
use tracing::debug;

use vsixpack_core::{CommandRef, OnFailure, PlannedStep, PrimaryCommand, StepKind, VsixpackConfig};

/// Which part of the pipeline a command selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    /// From the first step through the given one, inclusive.
    Through(StepKind),
    Only(StepKind),
}

impl Scope {
    pub fn from_command(cmd: &CommandRef) -> Self {
        match (cmd.primary, cmd.selector) {
            (PrimaryCommand::Step, Some(step)) => Self::Only(step),
            (_, Some(step)) => Self::Through(step),
            (_, None) => Self::All,
        }
    }
}

/// Resolves the ordered steps to run and the failure policy of each.
///
/// Disabled steps are dropped. `keep_going` downgrades every `halt` to
/// `continue` so all steps are attempted while failures still fail the run.
pub fn resolve_plan(cfg: &VsixpackConfig, scope: Scope, keep_going: bool) -> Result<Vec<PlannedStep>> {
    let selected: Vec<StepKind> = match scope {
        Scope::All => StepKind::ALL.to_vec(),
        Scope::Through(last) => StepKind::ALL.into_iter().filter(|s| *s <= last).collect(),
        Scope::Only(step) => {
            if !cfg.step(step).enabled {
                bail!("step '{step}' is disabled in the configuration");
            }
            vec![step]
        }
    };

    let plan = selected
        .into_iter()
        .filter(|kind| {
            let enabled = cfg.step(*kind).enabled;
            if !enabled {
                debug!("step {} disabled by configuration", kind);
            }
            enabled
        })
        .map(|kind| {
            let configured = cfg
                .step(kind)
                .on_failure
                .unwrap_or_else(|| kind.default_on_failure());
            let on_failure = match configured {
                OnFailure::Halt if keep_going => OnFailure::Continue,
                other => other,
            };
            PlannedStep { kind, on_failure }
        })
        .collect();

    Ok(plan)
}
