//! Start, stop, exit handling and the automatic restart policy

use super::record::{ManagedProcess, ProcessHandle, ProcessRecord};
use super::types::{ExitInfo, HealthStatus, OutputStream, ProcessState, StopOptions};
use super::{ProcessSupervisor, SupervisorEvent};
use crate::error::{TetherError, TetherResult};
use crate::events::KeyedEventBus;
use crate::ipc::{
    Frame, FramedMessage, LineEvent, LineFramer, MessageSink, ProcessChannel, RouteOutcome,
    pump_frames, pump_lines,
};
use chrono::Utc;
use futures::future::BoxFuture;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StartMode {
    /// Caller-initiated: resets the restart counter
    Manual,
    /// Restart policy: keeps counting attempts
    Recovery,
}

impl ProcessSupervisor {
    /// Launch a registered process.
    ///
    /// Returns `Ok(false)` if it is already running (or mid-transition) and
    /// `Err(NotRegistered)` for an unknown name. A launch failure moves the
    /// record to `error` and is returned as `Err(Launch)`.
    pub async fn start(&self, name: &str) -> TetherResult<bool> {
        let process = self.get(name)?;
        let started = self.start_process(&process, StartMode::Manual).await?;
        if started {
            self.start_health_checks();
        }
        Ok(started)
    }

    /// Stop with the configured grace period
    pub async fn stop(&self, name: &str) -> TetherResult<bool> {
        let options = StopOptions::graceful(self.inner.config.stop_grace_period);
        self.stop_with(name, options).await
    }

    /// Stop with explicit escalation timing.
    ///
    /// Returns `Ok(false)` if the process is not running, after cancelling any
    /// pending automatic restart. Resolves only once the OS process has exited;
    /// if it survives SIGKILL the record goes to `error`.
    pub async fn stop_with(&self, name: &str, options: StopOptions) -> TetherResult<bool> {
        self.stop_after(name, None, options).await
    }

    /// Like [`stop_with`](Self::stop_with), sending `farewell` once the record is
    /// `stopping`. An exit prompted by the farewell is never treated as a crash.
    pub async fn stop_with_farewell(
        &self,
        name: &str,
        farewell: FramedMessage,
        options: StopOptions,
    ) -> TetherResult<bool> {
        self.stop_after(name, Some(farewell), options).await
    }

    async fn stop_after(
        &self,
        name: &str,
        farewell: Option<FramedMessage>,
        options: StopOptions,
    ) -> TetherResult<bool> {
        let process = self.get(name)?;

        let handle = {
            let mut record = process.record.lock();
            // A crashed record may have a restart scheduled; stopping withdraws it
            record.restart_token.cancel();
            if !record.state.is_live() {
                tracing::debug!(process = %name, state = %record.state, "Stop ignored, not running");
                return Ok(false);
            }
            self.transition(&process, &mut record, ProcessState::Stopping);
            record.handle.clone()
        };

        tracing::info!(process = %name, "Stopping process");
        if let Some(message) = farewell {
            match tokio::time::timeout(options.signal_delay, process.channel.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(process = %name, error = %e, "Could not deliver farewell message");
                }
                Err(_) => {
                    tracing::warn!(process = %name, "Farewell message not accepted before the signal delay");
                }
            }
        }
        if let Some(handle) = handle {
            let kill_timeout = self.inner.config.kill_timeout;
            if !await_shutdown(name, &handle, options, kill_timeout).await {
                let message = "process did not exit after SIGKILL".to_string();
                {
                    let mut record = process.record.lock();
                    record.last_error = Some(message.clone());
                    self.transition(&process, &mut record, ProcessState::Error);
                }
                tracing::error!(process = %name, "Process did not exit after SIGKILL");
                self.emit(SupervisorEvent::Failed {
                    name: name.to_string(),
                    error: message,
                });
                return Err(TetherError::timeout(
                    format!("stopping '{}'", name),
                    options.kill_after + kill_timeout,
                ));
            }
        }

        {
            let mut record = process.record.lock();
            record.handle = None;
            record.health_status = HealthStatus::Stopped;
            self.transition(&process, &mut record, ProcessState::Stopped);
        }
        process.channel.detach("process stopped");
        tracing::info!(process = %name, "Process stopped");
        self.emit(SupervisorEvent::Stopped {
            name: name.to_string(),
        });
        Ok(true)
    }

    /// Stop (if running), wait `restart_delay`, start again
    pub async fn restart(&self, name: &str) -> TetherResult<bool> {
        let process = self.get(name)?;
        let live = process.record.lock().state.is_live();
        if live {
            self.stop(name).await?;
        }
        tokio::time::sleep(self.inner.config.restart_delay).await;
        self.start(name).await
    }

    pub(super) async fn start_process(
        &self,
        process: &Arc<ManagedProcess>,
        mode: StartMode,
    ) -> TetherResult<bool> {
        let (generation, attempts) = {
            let mut record = process.record.lock();
            match record.state {
                ProcessState::Stopped | ProcessState::Error => {}
                state => {
                    tracing::debug!(process = %process.name, %state, "Start ignored");
                    return Ok(false);
                }
            }
            record.restart_token.cancel();
            record.restart_token = CancellationToken::new();
            if mode == StartMode::Manual {
                record.restart_attempts = 0;
            }
            record.generation += 1;
            self.transition(process, &mut record, ProcessState::Starting);
            (record.generation, record.restart_attempts)
        };

        tracing::info!(process = %process.name, attempts, ?mode, "Starting process");
        let mut child = match self.spawn_child(process) {
            Ok(child) => child,
            Err(e) => {
                self.launch_failed(process, generation, &e);
                return Err(e);
            }
        };

        let pid = child.id();
        if let Some(stdin) = child.stdin.take() {
            process.channel.attach(stdin);
        }
        if let Some(stdout) = child.stdout.take() {
            spawn_stdout_pump(
                process.name.clone(),
                Arc::clone(&process.channel),
                self.inner.events.clone(),
                stdout,
            );
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_pump(process.name.clone(), self.inner.events.clone(), stderr);
        }

        let kill = CancellationToken::new();
        let (exit_tx, exit_rx) = watch::channel(None);
        {
            let mut record = process.record.lock();
            record.handle = Some(ProcessHandle {
                pid,
                exit_rx,
                kill: kill.clone(),
            });
            record.started_at = Some(Utc::now());
            record.started_instant = Some(Instant::now());
            record.last_error = None;
            record.health_status = HealthStatus::Unknown;
            self.transition(process, &mut record, ProcessState::Running);
        }

        tracing::info!(process = %process.name, pid, "Process started");
        self.emit(SupervisorEvent::Started {
            name: process.name.clone(),
            pid,
        });
        self.spawn_monitor(process.name.clone(), generation, child, kill, exit_tx);
        Ok(true)
    }

    /// Boxed restart entry point for the restart timer task
    fn start_boxed(
        &self,
        process: Arc<ManagedProcess>,
        mode: StartMode,
    ) -> BoxFuture<'static, TetherResult<bool>> {
        let supervisor = self.clone();
        Box::pin(async move { supervisor.start_process(&process, mode).await })
    }

    fn spawn_child(&self, process: &ManagedProcess) -> TetherResult<Child> {
        let spec = &process.spec;
        let program = spec.resolved_command()?;

        let mut cmd = Command::new(&program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = spec.resolved_cwd()?.or_else(|| self.inner.working_dir.clone()) {
            cmd.current_dir(cwd);
        }

        cmd.spawn()
            .map_err(|e| TetherError::launch(&process.name, format!("{}: {}", program, e)))
    }

    fn launch_failed(&self, process: &Arc<ManagedProcess>, generation: u64, error: &TetherError) {
        let mut record = process.record.lock();
        if record.generation != generation {
            return;
        }
        record.last_error = Some(error.to_string());
        record.health_status = HealthStatus::Unhealthy;
        self.transition(process, &mut record, ProcessState::Error);
        tracing::error!(process = %process.name, error = %error, "Failed to launch process");
        self.emit(SupervisorEvent::Failed {
            name: process.name.clone(),
            error: error.to_string(),
        });
        self.schedule_restart(process, &mut record, None);
    }

    fn spawn_monitor(
        &self,
        name: String,
        generation: u64,
        mut child: Child,
        kill: CancellationToken,
        exit_tx: watch::Sender<Option<ExitInfo>>,
    ) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => Some(status),
                _ = kill.cancelled() => None,
            };
            let status = match exited {
                Some(status) => status,
                None => {
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(process = %name, error = %e, "Failed to kill process");
                    }
                    child.wait().await
                }
            };
            let info = match status {
                Ok(status) => ExitInfo::from_status(status),
                Err(e) => ExitInfo::from_error(&e),
            };
            let _ = exit_tx.send(Some(info.clone()));
            supervisor.on_process_exit(&name, generation, info);
        });
    }

    fn on_process_exit(&self, name: &str, generation: u64, info: ExitInfo) {
        let Some(process) = self.lookup(name) else {
            tracing::debug!(process = %name, "Exit of unregistered process");
            return;
        };

        let mut record = process.record.lock();
        if record.generation != generation {
            return;
        }
        process.channel.detach(&info.describe());
        self.emit(SupervisorEvent::Exited {
            name: name.to_string(),
            code: info.code,
            signal: info.signal,
        });

        match record.state {
            ProcessState::Stopping => {
                tracing::debug!(process = %name, "Exit observed during stop");
            }
            ProcessState::Running | ProcessState::Unreachable if info.is_clean() => {
                record.handle = None;
                record.health_status = HealthStatus::Stopped;
                self.transition(&process, &mut record, ProcessState::Stopping);
                self.transition(&process, &mut record, ProcessState::Stopped);
                tracing::info!(process = %name, "Process exited cleanly");
                self.emit(SupervisorEvent::Stopped {
                    name: name.to_string(),
                });
            }
            ProcessState::Running | ProcessState::Unreachable => {
                let uptime = record.started_instant.map(|started| started.elapsed());
                let reason = info.describe();
                record.handle = None;
                record.last_error = Some(reason.clone());
                record.health_status = HealthStatus::Unhealthy;
                self.transition(&process, &mut record, ProcessState::Error);
                tracing::warn!(process = %name, code = ?info.code, signal = ?info.signal, "Process exited unexpectedly");
                self.emit(SupervisorEvent::Failed {
                    name: name.to_string(),
                    error: reason,
                });
                self.schedule_restart(&process, &mut record, uptime);
            }
            ProcessState::Stopped | ProcessState::Starting | ProcessState::Error => {}
        }
    }

    /// Apply the restart policy to a record that just entered `error`
    fn schedule_restart(
        &self,
        process: &Arc<ManagedProcess>,
        record: &mut ProcessRecord,
        uptime: Option<Duration>,
    ) {
        let config = &self.inner.config;
        if uptime.is_some_and(|up| up >= config.stable_run_threshold) {
            record.restart_attempts = 0;
        }
        if !config.auto_restart {
            return;
        }
        if record.restart_attempts >= config.max_restart_attempts {
            tracing::error!(
                process = %process.name,
                attempts = record.restart_attempts,
                "Restart attempts exhausted, leaving process in error"
            );
            self.emit(SupervisorEvent::RestartsExhausted {
                name: process.name.clone(),
                attempts: record.restart_attempts,
            });
            return;
        }

        record.restart_attempts += 1;
        let attempt = record.restart_attempts;
        let delay = config.backoff_for(attempt);
        tracing::warn!(
            process = %process.name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling restart"
        );
        self.emit(SupervisorEvent::RestartScheduled {
            name: process.name.clone(),
            attempt,
            delay,
        });

        let token = record.restart_token.clone();
        let generation = record.generation;
        let supervisor = self.clone();
        let process = Arc::clone(process);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let due = {
                let record = process.record.lock();
                record.state == ProcessState::Error && record.generation == generation
            };
            if !due {
                return;
            }
            let name = process.name.clone();
            if let Err(e) = supervisor.start_boxed(process, StartMode::Recovery).await {
                tracing::warn!(process = %name, attempt, error = %e, "Automatic restart failed");
            }
        });
    }
}

/// Escalate until the process exits. Returns false if it survived SIGKILL.
async fn await_shutdown(
    name: &str,
    handle: &ProcessHandle,
    options: StopOptions,
    kill_timeout: Duration,
) -> bool {
    let mut exit_rx = handle.exit_rx.clone();

    if !options.signal_delay.is_zero() && wait_for_exit(&mut exit_rx, options.signal_delay).await {
        return true;
    }

    terminate(name, handle);
    let remaining = options.kill_after.saturating_sub(options.signal_delay);
    if wait_for_exit(&mut exit_rx, remaining).await {
        return true;
    }

    tracing::warn!(process = %name, "Process ignored SIGTERM, killing");
    handle.kill.cancel();
    wait_for_exit(&mut exit_rx, kill_timeout).await
}

async fn wait_for_exit(exit_rx: &mut watch::Receiver<Option<ExitInfo>>, limit: Duration) -> bool {
    matches!(
        tokio::time::timeout(limit, exit_rx.wait_for(Option::is_some)).await,
        Ok(_)
    )
}

#[cfg(unix)]
fn terminate(name: &str, handle: &ProcessHandle) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = handle.pid else {
        handle.kill.cancel();
        return;
    };
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => tracing::debug!(process = %name, pid, "Sent SIGTERM"),
        Err(e) => tracing::debug!(process = %name, pid, error = %e, "SIGTERM failed"),
    }
}

#[cfg(not(unix))]
fn terminate(_name: &str, handle: &ProcessHandle) {
    handle.kill.cancel();
}

fn spawn_stdout_pump(
    name: String,
    channel: Arc<ProcessChannel>,
    events: KeyedEventBus<SupervisorEvent>,
    stdout: ChildStdout,
) {
    tokio::spawn(async move {
        let result = pump_frames(stdout, LineFramer::new(), |frame| {
            handle_frame(&name, &channel, &events, frame)
        })
        .await;
        if let Err(e) = result {
            tracing::debug!(process = %name, error = %e, "stdout pump ended with error");
        }
    });
}

fn handle_frame(
    name: &str,
    channel: &ProcessChannel,
    events: &KeyedEventBus<SupervisorEvent>,
    frame: Frame,
) {
    match frame {
        Frame::Message(message) => {
            let kind = message.kind().to_string();
            if channel.router().route(message) == RouteOutcome::Unhandled {
                tracing::trace!(process = %name, kind = %kind, "No listener for message");
            }
        }
        Frame::Text(line) => {
            tracing::info!(target: "tether::child", process = %name, stream = "stdout", "{}", line);
            events.publish(SupervisorEvent::Output {
                name: name.to_string(),
                stream: OutputStream::Stdout,
                line,
            });
        }
        Frame::Malformed { line, reason } => {
            tracing::warn!(process = %name, reason = %reason, "Dropping malformed message");
            events.publish(SupervisorEvent::ProtocolViolation {
                name: name.to_string(),
                line,
                reason,
            });
        }
        Frame::Overflow(len) => {
            tracing::warn!(process = %name, bytes = len, "Dropping oversized line");
            events.publish(SupervisorEvent::ProtocolViolation {
                name: name.to_string(),
                line: String::new(),
                reason: format!("line of {} bytes exceeds the limit", len),
            });
        }
    }
}

fn spawn_stderr_pump(name: String, events: KeyedEventBus<SupervisorEvent>, stderr: ChildStderr) {
    tokio::spawn(async move {
        let result = pump_lines(stderr, |event| {
            if let LineEvent::Line(line) = event {
                tracing::info!(target: "tether::child", process = %name, stream = "stderr", "{}", line);
                events.publish(SupervisorEvent::Output {
                    name: name.clone(),
                    stream: OutputStream::Stderr,
                    line,
                });
            }
        })
        .await;
        if let Err(e) = result {
            tracing::debug!(process = %name, error = %e, "stderr pump ended with error");
        }
    });
}
