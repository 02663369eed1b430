// src/install/selector.rs

//! The attempt-and-record loop over an ordered strategy list

use super::{
    AttemptOutcome, CommandRecord, InstallStrategy, ProvisionOptions, ProvisionOutcome,
    StrategyAttempt, plan_strategies,
};
use crate::error::{Error, Result};
use crate::exec::{CancellationToken, ExecutionResult, ProcessExecutor};
use crate::platform::PlatformInfo;
use crate::portable::PortableInstallRecord;
use tracing::{debug, info, warn};

/// Something that can perform a portable install of a given version
pub trait PortableInstaller {
    fn install_portable(&self, version: &str) -> Result<PortableInstallRecord>;
}

/// Position of a provisioning run in its strategy list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    /// About to attempt the strategy at this index
    Attempting(usize),
    /// The strategy at this index succeeded
    Succeeded(usize),
    /// Every strategy failed, or the run was cancelled
    Exhausted,
}

/// Walks installation strategies in order until one succeeds
pub struct InstallationSelector<'a> {
    executor: ProcessExecutor,
    portable: Option<&'a dyn PortableInstaller>,
    cancel: Option<CancellationToken>,
}

impl<'a> InstallationSelector<'a> {
    pub fn new(executor: ProcessExecutor) -> Self {
        Self {
            executor,
            portable: None,
            cancel: None,
        }
    }

    /// Handler for the portable strategy; without one it always fails
    pub fn with_portable(mut self, installer: &'a dyn PortableInstaller) -> Self {
        self.portable = Some(installer);
        self
    }

    /// Abort the running step and end the walk when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Plan strategies for `platform` and run them
    pub fn provision(
        &self,
        platform: &PlatformInfo,
        options: &ProvisionOptions,
    ) -> Result<ProvisionOutcome> {
        let strategies = plan_strategies(platform, options);
        info!(
            "Provisioning Node.js {} on {} ({} strategies)",
            options.version,
            platform,
            strategies.len()
        );
        self.run(&strategies)
    }

    /// Attempt `strategies` in order, stopping at the first success
    ///
    /// Returns [`Error::StrategyExhausted`] with the full attempt trail when
    /// none succeed.
    pub fn run(&self, strategies: &[InstallStrategy]) -> Result<ProvisionOutcome> {
        let mut attempts = Vec::with_capacity(strategies.len());
        let mut portable = None;
        let mut state = if strategies.is_empty() {
            SelectorState::Exhausted
        } else {
            SelectorState::Attempting(0)
        };

        loop {
            match state {
                SelectorState::Attempting(index) => {
                    let strategy = &strategies[index];
                    info!(
                        "Trying strategy {}/{}: {}",
                        index + 1,
                        strategies.len(),
                        strategy.label()
                    );

                    let (attempt, record) = self.attempt(strategy);
                    let succeeded = attempt.succeeded();
                    if let Some(reason) = attempt.failure() {
                        warn!("{} failed: {}", strategy.label(), reason);
                    }
                    attempts.push(attempt);

                    state = if succeeded {
                        portable = record;
                        SelectorState::Succeeded(index)
                    } else if self.is_cancelled() {
                        info!("Provisioning cancelled");
                        SelectorState::Exhausted
                    } else if index + 1 < strategies.len() {
                        SelectorState::Attempting(index + 1)
                    } else {
                        SelectorState::Exhausted
                    };
                }
                SelectorState::Succeeded(index) => {
                    let strategy = &strategies[index];
                    info!("Provisioned Node.js via {}", strategy.label());
                    return Ok(ProvisionOutcome {
                        strategy: strategy.kind(),
                        label: strategy.label(),
                        attempts,
                        portable,
                    });
                }
                SelectorState::Exhausted => {
                    return Err(Error::StrategyExhausted { attempts });
                }
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn attempt(&self, strategy: &InstallStrategy) -> (StrategyAttempt, Option<PortableInstallRecord>) {
        let mut commands = Vec::new();
        let mut record = None;

        let outcome = match strategy {
            InstallStrategy::PackageManager { .. } | InstallStrategy::OfficialInstaller { .. } => {
                self.run_steps(strategy, &mut commands)
            }
            InstallStrategy::Portable { version } => match self.portable {
                None => AttemptOutcome::Failed("no portable installer configured".to_string()),
                Some(installer) => match installer.install_portable(version) {
                    Ok(installed) => {
                        record = Some(installed);
                        AttemptOutcome::Succeeded
                    }
                    Err(e) => AttemptOutcome::Failed(e.to_string()),
                },
            },
            InstallStrategy::Manual { instructions } => {
                AttemptOutcome::Failed(format!("manual installation required: {}", instructions))
            }
        };

        let attempt = StrategyAttempt {
            strategy: strategy.kind(),
            label: strategy.label(),
            commands,
            outcome,
        };
        (attempt, record)
    }

    /// Run each step in order; the first step that does not pass fails the attempt
    fn run_steps(&self, strategy: &InstallStrategy, commands: &mut Vec<CommandRecord>) -> AttemptOutcome {
        if strategy.steps().is_empty() {
            return AttemptOutcome::Failed("strategy has no steps to run".to_string());
        }
        for step in strategy.steps() {
            if self.is_cancelled() {
                return AttemptOutcome::Failed("cancelled".to_string());
            }

            debug!("{} step: {}", step.role, step.request.command_line());
            let result: Result<ExecutionResult> = match &self.cancel {
                Some(token) => self.executor.run_cancellable(&step.request, token, None),
                None => self.executor.run(&step.request),
            };

            match result {
                Ok(result) => {
                    commands.push(CommandRecord::from_result(step, &result));
                    if let Some(detail) = step.rejection(&result) {
                        return AttemptOutcome::Failed(format!(
                            "{} step `{}` {}",
                            step.role,
                            step.request.command_line(),
                            detail
                        ));
                    }
                }
                Err(e) => {
                    let detail = e.to_string();
                    commands.push(CommandRecord::not_started(step, detail.clone()));
                    return AttemptOutcome::Failed(format!("{} step could not run: {}", step.role, detail));
                }
            }
        }
        AttemptOutcome::Succeeded
    }
}
