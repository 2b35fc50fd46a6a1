use super::*;
use std::time::Duration;
use tokio::time::timeout;

fn test_config() -> SupervisorConfig {
    SupervisorConfig {
        health_check_interval: Duration::from_secs(3600),
        restart_delay: Duration::from_millis(20),
        stop_grace_period: Duration::from_secs(2),
        kill_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

fn sh(script: &str) -> ProcessSpec {
    ProcessSpec::new("sh").with_args(["-c", script])
}

async fn wait_for(
    events: &mut broadcast::Receiver<SupervisorEvent>,
    mut predicate: impl FnMut(&SupervisorEvent) -> bool,
) -> SupervisorEvent {
    timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.unwrap();
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for supervisor event")
}

fn is_transition_to(event: &SupervisorEvent, target: ProcessState) -> bool {
    matches!(event, SupervisorEvent::StateChanged { to, .. } if *to == target)
}

#[tokio::test]
async fn test_register_and_unregister() {
    let supervisor = ProcessSupervisor::new(test_config());
    assert!(supervisor.register("fs", sh("sleep 30")));
    assert!(!supervisor.register("fs", sh("sleep 30")));
    assert_eq!(supervisor.status("fs").unwrap().state, ProcessState::Stopped);

    assert!(supervisor.unregister("fs").await);
    assert!(!supervisor.unregister("fs").await);
    assert!(supervisor.status("fs").is_none());
}

#[tokio::test]
async fn test_start_unknown_is_an_error() {
    let supervisor = ProcessSupervisor::new(test_config());
    let err = supervisor.start("ghost").await.unwrap_err();
    assert!(matches!(err, TetherError::NotRegistered { .. }));
    assert!(supervisor.check_health("ghost").await.is_err());
}

#[tokio::test]
async fn test_start_stop_walks_every_intermediate_state() {
    let supervisor = ProcessSupervisor::new(test_config());
    supervisor.register("fs", sh("sleep 30"));
    let mut events = supervisor.subscribe_kind(SupervisorEventKind::StateChanged);

    assert!(supervisor.start("fs").await.unwrap());
    let status = supervisor.status("fs").unwrap();
    assert_eq!(status.state, ProcessState::Running);
    assert!(status.pid.is_some());

    // Starting twice is a no-op
    assert!(!supervisor.start("fs").await.unwrap());

    assert!(supervisor.stop("fs").await.unwrap());
    assert_eq!(supervisor.status("fs").unwrap().state, ProcessState::Stopped);
    assert!(!supervisor.stop("fs").await.unwrap());

    let mut edges = Vec::new();
    while let Ok(SupervisorEvent::StateChanged { from, to, .. }) = events.try_recv() {
        assert!(from.can_transition_to(to), "illegal edge {} -> {}", from, to);
        edges.push((from, to));
    }
    assert_eq!(
        edges,
        vec![
            (ProcessState::Stopped, ProcessState::Starting),
            (ProcessState::Starting, ProcessState::Running),
            (ProcessState::Running, ProcessState::Stopping),
            (ProcessState::Stopping, ProcessState::Stopped),
        ]
    );
}

#[tokio::test]
async fn test_clean_exit_is_not_restarted() {
    let supervisor = ProcessSupervisor::new(test_config());
    supervisor.register("once", sh("exit 0"));
    let mut events = supervisor.subscribe();

    supervisor.start("once").await.unwrap();
    wait_for(&mut events, |e| is_transition_to(e, ProcessState::Stopped)).await;

    let status = supervisor.status("once").unwrap();
    assert_eq!(status.state, ProcessState::Stopped);
    assert_eq!(status.restart_attempts, 0);
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn test_crash_storm_is_bounded() {
    let config = SupervisorConfig {
        max_restart_attempts: 2,
        ..test_config()
    };
    let supervisor = ProcessSupervisor::new(config);
    supervisor.register("flaky", sh("exit 3"));
    let mut events = supervisor.subscribe();

    supervisor.start("flaky").await.unwrap();

    let mut delays = Vec::new();
    let exhausted = wait_for(&mut events, |e| {
        if let SupervisorEvent::RestartScheduled { delay, .. } = e {
            delays.push(*delay);
        }
        matches!(e, SupervisorEvent::RestartsExhausted { .. })
    })
    .await;

    assert_eq!(
        exhausted,
        SupervisorEvent::RestartsExhausted {
            name: "flaky".to_string(),
            attempts: 2
        }
    );
    assert_eq!(delays.len(), 2);
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));

    // No further attempts after exhaustion
    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = supervisor.status("flaky").unwrap();
    assert_eq!(status.state, ProcessState::Error);
    assert_eq!(status.restart_attempts, 2);
    assert!(status.last_error.unwrap().contains("code 3"));
}

#[tokio::test]
async fn test_launch_failure_records_error() {
    let config = SupervisorConfig {
        auto_restart: false,
        ..test_config()
    };
    let supervisor = ProcessSupervisor::new(config);
    supervisor.register("missing", ProcessSpec::new("/nonexistent/tether-tool-server"));

    let err = supervisor.start("missing").await.unwrap_err();
    assert!(matches!(err, TetherError::Launch { .. }));

    let status = supervisor.status("missing").unwrap();
    assert_eq!(status.state, ProcessState::Error);
    assert!(status.last_error.is_some());
    assert_eq!(
        supervisor.check_health("missing").await.unwrap(),
        HealthStatus::Unhealthy
    );
}

#[tokio::test]
async fn test_stop_all_counts_only_running() {
    let supervisor = ProcessSupervisor::new(test_config());
    supervisor.register("a", sh("sleep 30"));
    supervisor.register("b", sh("sleep 30"));
    supervisor.register("c", sh("sleep 30"));

    supervisor.start("a").await.unwrap();
    supervisor.start("b").await.unwrap();
    assert_eq!(supervisor.stats().running, 2);

    assert_eq!(supervisor.stop_all().await, 2);
    for status in supervisor.all_status() {
        assert_eq!(status.state, ProcessState::Stopped);
    }
    assert!(!supervisor.health_checks_running());
}

#[tokio::test]
async fn test_start_all_tolerates_individual_failures() {
    let config = SupervisorConfig {
        auto_restart: false,
        ..test_config()
    };
    let supervisor = ProcessSupervisor::new(config);
    supervisor.register("good", sh("sleep 30"));
    supervisor.register("bad", ProcessSpec::new("/nonexistent/server"));

    assert_eq!(supervisor.start_all().await, 1);
    assert!(supervisor.health_checks_running());

    let stats = supervisor.stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.running, 1);
    assert_eq!(stats.error, 1);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_killed_process_is_unhealthy_then_recovered() {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let config = SupervisorConfig {
        restart_delay: Duration::from_millis(300),
        ..test_config()
    };
    let supervisor = ProcessSupervisor::new(config);
    supervisor.register(
        "fs",
        ProcessSpec::new("sh").with_args(["-c", "sleep 30", "--root", "/data"]),
    );
    let mut events = supervisor.subscribe();

    supervisor.start("fs").await.unwrap();
    let pid = supervisor.status("fs").unwrap().pid.unwrap();
    assert_eq!(supervisor.check_health("fs").await.unwrap(), HealthStatus::Healthy);

    kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
    wait_for(&mut events, |e| is_transition_to(e, ProcessState::Error)).await;
    assert_eq!(supervisor.check_health("fs").await.unwrap(), HealthStatus::Unhealthy);

    wait_for(&mut events, |e| is_transition_to(e, ProcessState::Running)).await;
    let status = supervisor.status("fs").unwrap();
    assert_eq!(status.state, ProcessState::Running);
    assert_eq!(status.restart_attempts, 1);
    assert_ne!(status.pid, Some(pid));

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_stop_escalates_to_sigkill() {
    let config = SupervisorConfig {
        stop_grace_period: Duration::from_millis(300),
        ..test_config()
    };
    let supervisor = ProcessSupervisor::new(config);
    supervisor.register("stubborn", sh("trap '' TERM; exec sleep 30"));
    supervisor.start("stubborn").await.unwrap();
    // Let the shell install its trap
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = std::time::Instant::now();
    assert!(supervisor.stop("stubborn").await.unwrap());
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(
        supervisor.status("stubborn").unwrap().state,
        ProcessState::Stopped
    );
}

#[tokio::test]
async fn test_stop_on_crashed_record_cancels_scheduled_restart() {
    let config = SupervisorConfig {
        restart_delay: Duration::from_millis(300),
        ..test_config()
    };
    let supervisor = ProcessSupervisor::new(config);
    supervisor.register("flaky", sh("sleep 0.1; exit 3"));
    supervisor.register("brittle", sh("sleep 0.1; exit 4"));
    let mut events = supervisor.subscribe();

    supervisor.start("flaky").await.unwrap();
    supervisor.start("brittle").await.unwrap();
    let mut scheduled = Vec::new();
    wait_for(&mut events, |e| {
        if let SupervisorEvent::RestartScheduled { name, .. } = e {
            scheduled.push(name.clone());
        }
        scheduled.len() == 2
    })
    .await;

    // Neither is running, so nothing counts as stopped
    assert!(!supervisor.stop("flaky").await.unwrap());
    assert_eq!(supervisor.stop_all().await, 0);

    tokio::time::sleep(Duration::from_millis(600)).await;
    for name in ["flaky", "brittle"] {
        let status = supervisor.status(name).unwrap();
        assert_eq!(status.state, ProcessState::Error);
        assert_eq!(status.restart_attempts, 1);
    }
    while let Ok(event) = events.try_recv() {
        assert!(!is_transition_to(&event, ProcessState::Starting));
    }
}

#[tokio::test]
async fn test_exit_after_farewell_is_not_a_crash() {
    let supervisor = ProcessSupervisor::new(test_config());
    supervisor.register("renderer", sh("read line; exit 3"));
    let mut events = supervisor.subscribe();
    supervisor.start("renderer").await.unwrap();

    let farewell = FramedMessage::command("shutdown", serde_json::json!({ "graceful": true }));
    let options = StopOptions {
        signal_delay: Duration::from_secs(2),
        kill_after: Duration::from_secs(4),
    };
    let started = std::time::Instant::now();
    assert!(
        supervisor
            .stop_with_farewell("renderer", farewell, options)
            .await
            .unwrap()
    );
    // Exited on the farewell, well before SIGTERM was due
    assert!(started.elapsed() < Duration::from_secs(2));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = supervisor.status("renderer").unwrap();
    assert_eq!(status.state, ProcessState::Stopped);
    assert_eq!(status.restart_attempts, 0);
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(
            event,
            SupervisorEvent::Failed { .. } | SupervisorEvent::RestartScheduled { .. }
        ));
    }
}

#[tokio::test]
async fn test_manual_restart_resets_attempts() {
    let supervisor = ProcessSupervisor::new(test_config());
    supervisor.register("fs", sh("sleep 30"));
    supervisor.start("fs").await.unwrap();
    let first_pid = supervisor.status("fs").unwrap().pid;

    assert!(supervisor.restart("fs").await.unwrap());
    let status = supervisor.status("fs").unwrap();
    assert_eq!(status.state, ProcessState::Running);
    assert_eq!(status.restart_attempts, 0);
    assert_ne!(status.pid, first_pid);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_output_and_protocol_violations_are_published() {
    let supervisor = ProcessSupervisor::new(test_config());
    supervisor.register(
        "chatty",
        sh(r#"echo 'booting renderer'; echo '{"data":1}'; echo 'disk warning' >&2; sleep 30"#),
    );
    let mut chatty = supervisor.subscribe_process("chatty");

    supervisor.start("chatty").await.unwrap();

    let mut saw_stdout = false;
    let mut saw_stderr = false;
    let mut saw_violation = false;
    timeout(Duration::from_secs(10), async {
        while !(saw_stdout && saw_stderr && saw_violation) {
            match chatty.recv().await.unwrap() {
                SupervisorEvent::Output {
                    stream: OutputStream::Stdout,
                    line,
                    ..
                } => saw_stdout = line == "booting renderer",
                SupervisorEvent::Output {
                    stream: OutputStream::Stderr,
                    line,
                    ..
                } => saw_stderr = line == "disk warning",
                SupervisorEvent::ProtocolViolation { line, .. } => {
                    saw_violation = line == r#"{"data":1}"#
                }
                _ => {}
            }
        }
    })
    .await
    .expect("missing output events");

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_health_of_idle_records() {
    let supervisor = ProcessSupervisor::new(test_config());
    supervisor.register("idle", sh("sleep 30"));

    assert_eq!(supervisor.check_health("idle").await.unwrap(), HealthStatus::Stopped);
    let results = supervisor.check_all_health().await;
    assert_eq!(results, vec![("idle".to_string(), HealthStatus::Stopped)]);
    assert!(supervisor.status("idle").unwrap().last_health_check_at.is_some());
}

#[tokio::test]
async fn test_call_to_stopped_process_fails_fast() {
    let supervisor = ProcessSupervisor::new(test_config());
    supervisor.register("fs", sh("sleep 30"));
    let err = supervisor
        .call("fs", "toolCall", serde_json::json!({}), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, TetherError::Transport { .. }));
}

#[tokio::test]
async fn test_health_is_liveness_only() {
    // Never reads stdin and never answers; still healthy while the process lives
    let supervisor = ProcessSupervisor::new(test_config());
    supervisor.register("mute", sh("exec sleep 30"));
    assert!(supervisor.start("mute").await.unwrap());

    assert_eq!(supervisor.check_health("mute").await.unwrap(), HealthStatus::Healthy);
    let status = supervisor.status("mute").unwrap();
    assert_eq!(status.health_status, HealthStatus::Healthy);

    supervisor.shutdown().await;
}
