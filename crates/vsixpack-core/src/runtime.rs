//! Runtime version selection and the wait for it to become active.
//!
//! Switching the runtime through a version manager only affects the
//! sub-process that performs the switch. The pinned version is therefore
//! carried in [`RuntimeSpec`] and re-applied to every runtime-dependent
//! action instead of being assumed to persist in the invoking shell.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::StepError;
use crate::pipeline::duration_ms;
use crate::runner::ProcessRunner;
use crate::toolchain::ExecutionAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeManager {
    #[default]
    Nvm,
    /// Use whatever runtime is first on `PATH`.
    None,
}

impl RuntimeManager {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nvm => "nvm",
            Self::None => "none",
        }
    }
}

/// The runtime version pinned for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSpec {
    pub manager: RuntimeManager,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Minimum pause before the first query.
    pub settle: Duration,
    pub interval: Duration,
    /// Upper bound on the whole wait, settle included.
    pub timeout: Duration,
}

const ALIASES: &[&str] = &["node", "stable", "latest", "current", "system", "default"];

fn is_alias(requested: &str) -> bool {
    ALIASES.contains(&requested) || requested.starts_with("lts/")
}

/// Parses `v20.11.1` style output into a semantic version.
pub fn parse_observed(output: &str) -> Option<semver::Version> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    semver::Version::parse(line.trim_start_matches('v')).ok()
}

/// Whether an observed `--version` output satisfies the requested version.
///
/// Aliases accept any well-formed version. Concrete requests compare only
/// the components they spell out, so `20` matches `v20.11.1`.
pub fn version_matches(requested: &str, observed: &str) -> bool {
    let Some(version) = parse_observed(observed) else {
        return false;
    };

    let requested = requested.trim();
    if is_alias(requested) {
        return true;
    }

    let observed_parts = [version.major, version.minor, version.patch];
    let mut requested_parts = requested.trim_start_matches('v').split('.');
    let mut compared = 0;

    for observed_part in observed_parts {
        match requested_parts.next() {
            None | Some("x") | Some("*") => break,
            Some(part) => match part.parse::<u64>() {
                Ok(value) if value == observed_part => compared += 1,
                _ => return false,
            },
        }
    }

    compared > 0 && requested_parts.next().is_none()
}

/// Waits until `query` reports the requested runtime version.
///
/// Sleeps for `poll.settle`, then re-queries every `poll.interval` until the
/// version matches or `poll.timeout` has elapsed. Failed queries count as
/// "not yet active".
#[instrument(skip(runner, query, cwd), fields(version = %spec.version))]
pub fn await_runtime(
    runner: &dyn ProcessRunner,
    query: &ExecutionAction,
    cwd: &Path,
    spec: &RuntimeSpec,
    poll: &PollConfig,
) -> Result<String, StepError> {
    let started = Instant::now();
    thread::sleep(poll.settle);

    let mut last_observed = None;
    loop {
        match runner.capture(query, cwd) {
            Ok(output) => {
                let observed = output.trim().to_string();
                if version_matches(&spec.version, &observed) {
                    info!(target: "vsixpack", "runtime {} active ({})", spec.version, observed);
                    return Ok(observed);
                }
                debug!("runtime query returned '{}', waiting", observed);
                last_observed = Some(observed);
            }
            Err(e) => debug!("runtime query failed: {}", e),
        }

        let elapsed = started.elapsed();
        if elapsed >= poll.timeout {
            return Err(StepError::RuntimeTimeout {
                requested: spec.version.clone(),
                observed: last_observed,
                waited_ms: duration_ms(elapsed),
            });
        }
        thread::sleep(poll.interval.min(poll.timeout - elapsed));
    }
}
