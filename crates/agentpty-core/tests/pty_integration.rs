//! End-to-end tests against real processes on real PTYs.

use std::time::Duration;

use agentpty_core::{
    EnginePolicy, ExitReport, OutputFrame, SessionError, SessionManager, SessionState,
    SpawnRequest, SpawnedSession,
};
use tokio::time::timeout;

fn manager() -> SessionManager {
    let policy = EnginePolicy {
        use_login_path: false,
        ..EnginePolicy::default()
    };
    SessionManager::new(policy)
}

fn sh(script: &str) -> SpawnRequest {
    SpawnRequest::new("sh").with_args(["-c", script])
}

/// Read frames until the exit frame; returns decoded output and the report
async fn run_to_exit(session: &mut SpawnedSession) -> (String, ExitReport) {
    let mut output = Vec::new();
    let deadline = Duration::from_secs(10);
    loop {
        let frame = timeout(deadline, session.frames.recv())
            .await
            .expect("timed out waiting for frames")
            .expect("frame channel closed before exit");
        match frame {
            OutputFrame::Data(_) => output.extend(frame.decode_data().unwrap()),
            OutputFrame::Exit(report) => {
                return (String::from_utf8_lossy(&output).into_owned(), report)
            }
        }
    }
}

#[tokio::test]
async fn test_exit_code_and_last_lines() {
    let manager = manager();
    let mut session = manager
        .spawn(sh(
            "i=1; while [ $i -le 60 ]; do echo line $i; i=$((i+1)); done; exit 1",
        ))
        .unwrap();
    assert!(session.pid.is_some());

    let (output, report) = run_to_exit(&mut session).await;
    assert!(output.contains("line 60"));
    assert_eq!(report.exit_code, Some(1));
    assert_eq!(report.signal, None);
    assert_eq!(report.last_output.len(), 50);
    assert_eq!(report.last_output[0], "line 11");
    assert_eq!(report.last_output[49], "line 60");

    assert!(session.frames.recv().await.is_none());
    assert_eq!(manager.count(), 0);
}

#[tokio::test]
async fn test_child_environment() {
    let manager = manager();
    let mut request = sh(r#"echo "TERM=$TERM COLOR=$COLORTERM PRELOAD=[$LD_PRELOAD] FOO=$FOO""#);
    request
        .env
        .insert("LD_PRELOAD".to_string(), "/nonexistent/evil.so".to_string());
    request.env.insert("FOO".to_string(), "bar".to_string());
    let mut session = manager.spawn(request).unwrap();

    let (output, report) = run_to_exit(&mut session).await;
    assert_eq!(report.exit_code, Some(0));
    assert!(
        output.contains("TERM=xterm-256color COLOR=truecolor PRELOAD=[] FOO=bar"),
        "got {output:?}"
    );
}

#[tokio::test]
async fn test_write_is_echoed() {
    let manager = manager();
    let mut session = manager.spawn(SpawnRequest::new("cat")).unwrap();
    manager.write(&session.session_id, b"hello pty\n").unwrap();

    let mut seen = String::new();
    while !seen.contains("hello pty") {
        let frame = timeout(Duration::from_secs(10), session.frames.recv())
            .await
            .expect("timed out waiting for echo")
            .expect("channel closed");
        seen.push_str(&String::from_utf8_lossy(&frame.decode_data().unwrap()));
    }

    manager.kill(&session.session_id).unwrap();
    assert_eq!(manager.count(), 0);
    // killed sessions never send an exit frame
    while let Ok(Some(frame)) = timeout(Duration::from_secs(10), session.frames.recv()).await {
        assert!(matches!(frame, OutputFrame::Data(_)));
    }
}

#[tokio::test]
async fn test_killed_by_signal() {
    let manager = manager();
    let mut session = manager.spawn(sh("kill -9 $$")).unwrap();

    let (_, report) = run_to_exit(&mut session).await;
    assert_eq!(report.exit_code, None);
    assert!(report.signal.is_some());
}

#[tokio::test]
async fn test_pause_resume_and_resize_live_process() {
    let manager = manager();
    let session = manager
        .spawn(SpawnRequest::new("sleep").with_args(["30"]))
        .unwrap();
    let id = session.session_id.clone();

    manager.resize(&id, 120, 40).unwrap();
    manager.pause(&id).unwrap();
    assert_eq!(manager.info(&id).unwrap().state, SessionState::Paused);
    manager.resume(&id).unwrap();
    assert_ne!(manager.info(&id).unwrap().state, SessionState::Paused);

    manager.kill(&id).unwrap();
    assert_eq!(manager.count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stalled_input_does_not_block_control() {
    let manager = manager();
    let id = manager
        .spawn(sh("stty raw -echo; sleep 30"))
        .unwrap()
        .session_id;
    tokio::time::sleep(Duration::from_millis(300)).await;

    {
        let manager = manager.clone();
        let id = id.clone();
        // nobody reads the input; this fails once the child is gone
        std::thread::spawn(move || manager.write(&id, &vec![b'x'; 4 * 1024 * 1024]));
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    {
        let manager = manager.clone();
        std::thread::spawn(move || {
            let count = manager.count();
            let killed = manager.kill(&id).is_ok();
            let _ = done_tx.send((count, killed));
        });
    }
    let (count, killed) =
        tokio::task::spawn_blocking(move || done_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .expect("control operations blocked by a pending write");
    assert_eq!(count, 1);
    assert!(killed);
    assert_eq!(manager.count(), 0);
}

#[tokio::test]
async fn test_missing_cwd_fails_cleanly() {
    let manager = manager();
    let request = SpawnRequest {
        cwd: "/nonexistent/agentpty/dir".to_string(),
        ..SpawnRequest::new("sh")
    };
    let err = manager.spawn(request).unwrap_err();
    assert!(matches!(err, SessionError::Pty(_)));
    assert_eq!(manager.count(), 0);
}

#[tokio::test]
async fn test_metacharacters_rejected() {
    let manager = manager();
    let err = manager.spawn(SpawnRequest::new("sh;id")).unwrap_err();
    assert!(matches!(err, SessionError::InvalidCommand { .. }));
}
