//! Approval-gated process execution.

use rampart_approval::{ApprovalLedger, RiskAssessment};
use rampart_core::{
    CommandResult, ExecutionStatus, FailureAnalyzer, Operation, OperationKind, RiskTier, Timestamp,
};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{ExecOptions, ExecutorConfig};
use crate::error::ExecResult;
use crate::history::{CommandHistory, ExecutionStats};
use crate::output::{OutputCallback, OutputCapture, OutputLine, StreamKind, pump};

/// How long to keep reading output after the child has exited.
///
/// Background grandchildren can hold the pipes open past the exit.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Whether a command may be spawned.
enum Gate {
    Allowed(RiskTier),
    Blocked { risk: RiskTier, reason: String },
}

/// How the wait on the child ended.
enum Ended {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

fn blocked_reason(assessment: &RiskAssessment, detail: &str) -> String {
    match &assessment.matched_rule {
        Some(rule) => format!("{detail}; matched rule '{rule}': {}", assessment.reason),
        None => format!("{detail}; {}", assessment.reason),
    }
}

pub(crate) async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Kill the shell and everything it started, then reap the shell.
///
/// The shell leads its own process group, so one signal reaches
/// grandchildren that a plain kill of the shell would leave running.
async fn terminate(child: &mut Child, pid: Option<u32>, command: &str) {
    #[cfg(unix)]
    if let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()) {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {},
            Err(e) => tracing::warn!(command, pgid, error = %e, "Failed to kill process group"),
        }
    }
    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.kill().await {
        tracing::warn!(command, error = %e, "Failed to kill command");
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Runs shell commands behind the approval ledger.
///
/// Every call produces a [`CommandResult`]; non-zero exits, timeouts,
/// cancellations, blocks and spawn failures are statuses, never errors.
pub struct CommandExecutor {
    ledger: Arc<ApprovalLedger>,
    config: ExecutorConfig,
    history: CommandHistory,
    analyzer: Option<Arc<dyn FailureAnalyzer>>,
}

impl CommandExecutor {
    /// Create an executor.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the persisted
    /// history cannot be read.
    pub fn new(ledger: Arc<ApprovalLedger>, config: ExecutorConfig) -> ExecResult<Self> {
        config.validate()?;
        let history = match &config.history_path {
            Some(path) => CommandHistory::open(config.history_size, path)?,
            None => CommandHistory::in_memory(config.history_size),
        };
        Ok(Self {
            ledger,
            config,
            history,
            analyzer: None,
        })
    }

    /// Annotate failed and timed-out results with a structured analysis.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn FailureAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// The ledger that decides approvals.
    #[must_use]
    pub fn ledger(&self) -> &Arc<ApprovalLedger> {
        &self.ledger
    }

    /// Executor settings.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execution history.
    #[must_use]
    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    /// Statistics over the retained history.
    #[must_use]
    pub fn stats(&self) -> ExecutionStats {
        self.history.stats()
    }

    /// Approve and run `command`.
    ///
    /// DANGEROUS commands are blocked without reaching the approval handler
    /// unless `options.dangerous_override` is set. When `on_output` is
    /// given, lines are delivered as they arrive, stdout and stderr
    /// interleaved by arrival.
    pub async fn execute(
        &self,
        command: &str,
        options: &ExecOptions,
        on_output: Option<OutputCallback<'_>>,
    ) -> CommandResult {
        let mut operation = Operation::command(command);
        if let Some(description) = &options.description {
            operation = operation.with_description(description.clone());
        }
        self.execute_operation(&mut operation, options, on_output)
            .await
    }

    /// Run a command operation, recording the decision on it.
    ///
    /// An operation that was already approved (for example as part of a
    /// batch) runs without asking again; the DANGEROUS override still
    /// applies.
    pub async fn execute_operation(
        &self,
        operation: &mut Operation,
        options: &ExecOptions,
        on_output: Option<OutputCallback<'_>>,
    ) -> CommandResult {
        let command = operation.target.clone();
        let result = match self.authorize(operation, options).await {
            Gate::Allowed(risk) => self.run(&command, risk, options, on_output).await,
            Gate::Blocked { risk, reason } => {
                tracing::warn!(command, %risk, reason = %reason, "Command blocked");
                CommandResult::blocked(command.as_str(), risk, reason)
            },
        };
        let result = self.annotate(result);

        tracing::info!(
            command,
            operation_id = %operation.id,
            status = %result.status,
            exit_code = ?result.exit_code,
            duration_ms = result.duration_ms,
            risk = %result.risk,
            "Command finished"
        );
        self.history.record(&result);
        result
    }

    async fn authorize(&self, operation: &mut Operation, options: &ExecOptions) -> Gate {
        let command = operation.target.as_str();
        let assessment = self.ledger.classifier().assess(command);
        if operation.kind != OperationKind::CommandExecute {
            return Gate::Blocked {
                risk: assessment.tier,
                reason: format!("{} is not a command", operation.kind),
            };
        }
        if command.trim().is_empty() {
            return Gate::Blocked {
                risk: assessment.tier,
                reason: "empty command".to_string(),
            };
        }
        if assessment.tier == RiskTier::Dangerous && !options.dangerous_override {
            return Gate::Blocked {
                risk: RiskTier::Dangerous,
                reason: blocked_reason(
                    &assessment,
                    "dangerous command requires an explicit override",
                ),
            };
        }

        match self.ledger.check_approval(operation, &[]).await {
            Ok(outcome) if outcome.is_approved() => {
                tracing::debug!(
                    command = %operation.target,
                    operation_id = %operation.id,
                    source = %outcome.source,
                    "Command approved"
                );
                Gate::Allowed(outcome.assessment.tier)
            },
            Ok(outcome) => Gate::Blocked {
                risk: outcome.assessment.tier,
                reason: blocked_reason(&outcome.assessment, &outcome.explain()),
            },
            Err(e) => Gate::Blocked {
                risk: assessment.tier,
                reason: format!("approval failed: {e}"),
            },
        }
    }

    fn annotate(&self, result: CommandResult) -> CommandResult {
        let Some(analyzer) = &self.analyzer else {
            return result;
        };
        if !matches!(
            result.status,
            ExecutionStatus::Failure | ExecutionStatus::Timeout
        ) {
            return result;
        }
        let analysis = analyzer.analyze(result.failure_text(), None);
        tracing::debug!(command = %result.command, kind = %analysis.kind, "Failure analyzed");
        result.with_analysis(analysis)
    }

    async fn run(
        &self,
        command: &str,
        risk: RiskTier,
        options: &ExecOptions,
        on_output: Option<OutputCallback<'_>>,
    ) -> CommandResult {
        let started = Instant::now();
        let timeout = options.timeout.unwrap_or(self.config.default_timeout);
        let mut capture = OutputCapture::new(self.config.max_output_bytes);
        let finish = |status: ExecutionStatus, exit_code: Option<i32>, capture: OutputCapture| {
            let (stdout, stderr, truncated) = capture.finish();
            CommandResult {
                command: command.to_string(),
                status,
                exit_code,
                stdout,
                stderr,
                truncated,
                duration_ms: elapsed_ms(started),
                risk,
                blocked_reason: None,
                analysis: None,
                timestamp: Timestamp::now(),
            }
        };

        if options.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return finish(ExecutionStatus::Cancelled, None, capture);
        }

        let mut cmd = Command::new(&self.config.shell);
        cmd.arg("-c")
            .arg(command)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(dir) = options.cwd.as_ref().or(self.config.working_dir.as_ref()) {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    command,
                    shell = %self.config.shell,
                    error = %e,
                    "Failed to spawn command"
                );
                capture.push(&OutputLine {
                    stream: StreamKind::Stderr,
                    text: format!("failed to spawn: {e}"),
                });
                return finish(ExecutionStatus::SpawnFailed, None, capture);
            },
        };

        let pid = child.id();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(stdout, StreamKind::Stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(stderr, StreamKind::Stderr, tx.clone())));
        }
        drop(tx);

        let deliver = |line: OutputLine, capture: &mut OutputCapture| {
            if let Some(callback) = on_output {
                callback(&line);
            }
            capture.push(&line);
        };

        let ended = tokio::select! {
            status = async {
                loop {
                    tokio::select! {
                        biased;
                        Some(line) = rx.recv() => deliver(line, &mut capture),
                        status = child.wait() => break status,
                    }
                }
            } => Ended::Exited(status),
            () = tokio::time::sleep(timeout) => Ended::TimedOut,
            () = cancelled(options.cancel.as_ref()) => Ended::Cancelled,
        };

        let (status, exit_code) = match ended {
            Ended::Exited(Ok(exit)) => {
                while let Ok(Some(line)) = tokio::time::timeout(DRAIN_GRACE, rx.recv()).await {
                    deliver(line, &mut capture);
                }
                let status = if exit.success() {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Failure
                };
                (status, exit.code())
            },
            Ended::Exited(Err(e)) => {
                tracing::warn!(command, error = %e, "Failed to wait for command");
                (ExecutionStatus::Failure, None)
            },
            Ended::TimedOut => {
                tracing::warn!(command, ?timeout, "Command timed out, killing");
                (ExecutionStatus::Timeout, None)
            },
            Ended::Cancelled => {
                tracing::info!(command, "Command cancelled, killing");
                (ExecutionStatus::Cancelled, None)
            },
        };

        if matches!(
            status,
            ExecutionStatus::Timeout | ExecutionStatus::Cancelled
        ) {
            terminate(&mut child, pid, command).await;
            while let Ok(line) = rx.try_recv() {
                deliver(line, &mut capture);
            }
        }

        for task in pumps {
            task.abort();
        }
        finish(status, exit_code, capture)
    }
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("config", &self.config)
            .field("history", &self.history)
            .field("analyzer", &self.analyzer.is_some())
            .finish_non_exhaustive()
    }
}
