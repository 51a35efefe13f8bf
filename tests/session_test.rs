use retrace::{
    current_mode, install, is_active, ActivationConfig, CallState, Dispatcher, EngineError,
    LogLevel, Mode, Outcome, RequestRecord, ResponseRecord, Session, Trace,
};

fn success(body: &str) -> Outcome {
    Outcome::Success(ResponseRecord {
        status: 200,
        headers: vec![],
        body: body.as_bytes().to_vec(),
    })
}

struct NoNetwork;

impl Dispatcher for NoNetwork {
    fn perform(&self, request: &RequestRecord) -> Outcome {
        panic!("replay dispatched a real call to {}", request.url);
    }
}

fn echo_dispatcher() -> impl Dispatcher {
    |request: &RequestRecord| success(&request.url)
}

#[test]
fn test_replay_of_missing_trace_fails_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let err = Session::replay(dir.path().join("absent.trace")).unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[test]
fn test_replay_of_corrupt_trace_fails_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.trace");
    std::fs::write(&path, b"not a trace").unwrap();

    let err = Session::replay(&path).unwrap_err();
    assert!(matches!(err, EngineError::Format(_)));
}

#[test]
fn test_dropped_session_still_yields_a_replayable_trace() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.trace");
    let request = RequestRecord::new("GET", "https://api.example.com/users/1");

    {
        let recorder = Session::record(&path).unwrap();
        recorder.intercept(&request, &echo_dispatcher()).unwrap();
        // Dropped without an explicit finalize.
    }

    let replayer = Session::replay(&path).unwrap();
    let outcome = replayer.intercept(&request, &NoNetwork).unwrap();
    assert_eq!(outcome, success("https://api.example.com/users/1"));
}

#[test]
fn test_session_tracks_replay_progress() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.trace");
    let first = RequestRecord::new("GET", "https://api.example.com/users/1");
    let second = RequestRecord::new("GET", "https://api.example.com/posts/1");

    let recorder = Session::record(&path).unwrap();
    recorder.intercept(&first, &echo_dispatcher()).unwrap();
    recorder.intercept(&second, &echo_dispatcher()).unwrap();
    recorder.finalize().unwrap();

    let replayer = Session::replay(&path).unwrap();
    assert_eq!(replayer.mode(), Mode::Replay);
    assert_eq!(replayer.remaining(), Some(2));
    assert_eq!(replayer.call_state(0), Some(CallState::NotStarted));

    replayer.intercept(&first, &NoNetwork).unwrap();
    assert_eq!(replayer.remaining(), Some(1));
    assert_eq!(replayer.call_state(0), Some(CallState::Succeeded));

    replayer.intercept(&second, &NoNetwork).unwrap();
    assert_eq!(replayer.remaining(), Some(0));
}

#[test]
fn test_mismatch_is_surfaced_and_logged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.trace");
    let recorded = RequestRecord::new("GET", "https://api.example.com/users/1");

    let recorder = Session::record(&path).unwrap();
    recorder.intercept(&recorded, &echo_dispatcher()).unwrap();
    recorder.finalize().unwrap();

    let replayer = Session::builder()
        .mode(Mode::Replay)
        .trace_path(&path)
        .diagnostics(true)
        .build()
        .unwrap();

    let divergent = RequestRecord::new("GET", "https://api.example.com/users/999");
    let err = replayer.intercept(&divergent, &NoNetwork).unwrap_err();
    assert!(matches!(err, EngineError::Mismatch(_)));

    let warnings: Vec<_> = replayer
        .diagnostics()
        .into_iter()
        .filter(|e| e.level == LogLevel::Warn)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("diverged"));
}

#[test]
fn test_replay_diagnostics_identify_the_matched_call() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.trace");
    let request = RequestRecord::new("GET", "https://api.example.com/users/1");

    let recorder = Session::record(&path).unwrap();
    recorder.intercept(&request, &echo_dispatcher()).unwrap();
    recorder.finalize().unwrap();

    let replayer = Session::builder()
        .mode(Mode::Replay)
        .trace_path(&path)
        .diagnostics(true)
        .build()
        .unwrap();
    replayer.intercept(&request, &NoNetwork).unwrap();

    let entries = replayer.diagnostics();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].call_id, Some(0));
    assert_eq!(entries[0].attempt_index, Some(0));
}

#[test]
fn test_finalize_is_idempotent_through_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.trace");

    let session = Session::record(&path).unwrap();
    session
        .intercept(
            &RequestRecord::new("GET", "https://api.example.com/users/1"),
            &echo_dispatcher(),
        )
        .unwrap();
    session.finalize().unwrap();
    session.finalize().unwrap();

    // An intercept after finalize is a state error, not silent data loss.
    let err = session
        .intercept(
            &RequestRecord::new("GET", "https://api.example.com/posts/1"),
            &echo_dispatcher(),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::State(_)));

    let trace = Trace::open_for_replay(&path).unwrap();
    assert_eq!(trace.len(), 1);
}

// The activation hook is process-global, so one test covers installation,
// idempotence, and driving a session from the handle.
#[test]
fn test_activation_drives_a_session() {
    assert_eq!(current_mode(), Mode::Off);
    assert!(!is_active());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.trace");
    let request = RequestRecord::new("GET", "https://api.example.com/users/1");

    let recorder = Session::record(&path).unwrap();
    recorder.intercept(&request, &echo_dispatcher()).unwrap();
    recorder.finalize().unwrap();

    let activation = install(ActivationConfig {
        mode: Mode::Replay,
        trace_path: path.clone(),
        diagnostics: true,
    });
    assert!(is_active());
    assert_eq!(current_mode(), Mode::Replay);

    // A second install is a no-op and returns the installed handle.
    let again = install(ActivationConfig {
        mode: Mode::Record,
        trace_path: dir.path().join("other.trace"),
        diagnostics: false,
    });
    assert_eq!(again.mode(), Mode::Replay);

    let session = Session::from_activation(activation).unwrap();
    assert_eq!(session.mode(), Mode::Replay);
    let outcome = session.intercept(&request, &NoNetwork).unwrap();
    assert_eq!(outcome, success("https://api.example.com/users/1"));
    assert!(!session.diagnostics().is_empty());
}
