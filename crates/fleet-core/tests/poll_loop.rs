//! Integration tests for the poll loop.
//!
//! A scripted in-memory session replays queued backend answers and records
//! when each call arrived. Tokio's paused clock makes the 10 s interval and
//! 60 s backoff observable without real waiting.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use fleet_core::config::PollConfig;
use fleet_core::error::{BackendError, ErrorKind};
use fleet_core::runner::{PollRunner, RunEndReason};
use fleet_core::session::{ApiCall, FleetSession};
use fleet_core::stop::StopSignal;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::time::Instant;

/// Which session operation was invoked, and with how many calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Invocation {
    Call,
    MultiCall(usize),
}

/// Replays queued answers. When the listing queue runs dry the session
/// requests a stop and never answers, as if the operator interrupted a
/// fetch in flight.
struct ScriptedSession {
    listings: Mutex<VecDeque<Result<Value, BackendError>>>,
    samples: Mutex<VecDeque<Result<Vec<Value>, BackendError>>>,
    log: Mutex<Vec<(Invocation, Instant)>>,
    stop: StopSignal,
}

impl ScriptedSession {
    fn new(stop: &StopSignal) -> Self {
        Self {
            listings: Mutex::new(VecDeque::new()),
            samples: Mutex::new(VecDeque::new()),
            log: Mutex::new(Vec::new()),
            stop: stop.clone(),
        }
    }

    fn listing(self, answer: Result<Value, BackendError>) -> Self {
        self.listings.lock().unwrap().push_back(answer);
        self
    }

    fn samples(self, answer: Result<Vec<Value>, BackendError>) -> Self {
        self.samples.lock().unwrap().push_back(answer);
        self
    }

    fn log(&self) -> Vec<(Invocation, Instant)> {
        self.log.lock().unwrap().clone()
    }

    fn call_times(&self) -> Vec<Instant> {
        self.log()
            .into_iter()
            .filter(|(inv, _)| *inv == Invocation::Call)
            .map(|(_, at)| at)
            .collect()
    }
}

impl FleetSession for ScriptedSession {
    async fn call(&self, _call: &ApiCall) -> Result<Value, BackendError> {
        self.log
            .lock()
            .unwrap()
            .push((Invocation::Call, Instant::now()));
        let next = self.listings.lock().unwrap().pop_front();
        match next {
            Some(answer) => answer,
            None => {
                let _ = self.stop.request_stop();
                std::future::pending().await
            }
        }
    }

    async fn multi_call(&self, calls: &[ApiCall]) -> Result<Vec<Value>, BackendError> {
        self.log
            .lock()
            .unwrap()
            .push((Invocation::MultiCall(calls.len()), Instant::now()));
        let next = self.samples.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(BackendError::transport("no scripted samples")))
    }
}

fn config(dir: &TempDir) -> PollConfig {
    PollConfig {
        output_dir: dir.path().join("VehiclesBackup"),
        ..PollConfig::default()
    }
}

fn fleet() -> Value {
    json!([
        { "id": "b1", "name": "Truck 1", "vehicleIdentificationNumber": "VIN1" },
        { "id": "b2", "name": "Truck 2" }
    ])
}

#[tokio::test(start_paused = true)]
async fn full_cycle_writes_one_line_per_vehicle() {
    let dir = TempDir::new().unwrap();
    let stop = StopSignal::new();
    let session = ScriptedSession::new(&stop)
        .listing(Ok(fleet()))
        .samples(Ok(vec![
            json!([{ "latitude": 45.0, "longitude": -75.0, "device": { "id": "b1" } }]),
            json!([{ "data": 98765.4, "device": { "id": "b1" } }]),
            json!([]),
            json!([]),
        ]));
    let runner = PollRunner::new(session, &config(&dir)).unwrap();

    let result = runner.run_forever(&stop).await;

    assert_eq!(result.end_reason, RunEndReason::Cancelled);
    assert_eq!(result.cycles_completed, 1);

    let log = runner.session().log();
    assert_eq!(log[0].0, Invocation::Call);
    assert_eq!(log[1].0, Invocation::MultiCall(4));

    let out = dir.path().join("VehiclesBackup");
    let b1 = std::fs::read_to_string(out.join("b1.csv")).unwrap();
    let b2 = std::fs::read_to_string(out.join("b2.csv")).unwrap();
    assert_eq!(b1.lines().count(), 1);
    assert_eq!(b2.lines().count(), 1);
    assert!(b1.starts_with("b1,VIN1,45,-75,98765,"), "{b1}");
    assert!(b2.starts_with("b2,,0,0,0,"), "{b2}");
}

#[tokio::test(start_paused = true)]
async fn rate_limit_waits_backoff_once() {
    let dir = TempDir::new().unwrap();
    let stop = StopSignal::new();
    let session = ScriptedSession::new(&stop)
        .listing(Err(BackendError::new(ErrorKind::RateLimited, "over limit")))
        .listing(Ok(json!([])));
    let runner = PollRunner::new(session, &config(&dir)).unwrap();

    let result = runner.run_forever(&stop).await;

    assert_eq!(result.end_reason, RunEndReason::Cancelled);
    assert_eq!(result.cycles_failed, 1);
    let times = runner.session().call_times();
    assert_eq!(times.len(), 3);
    let backoff = times[1] - times[0];
    assert!(backoff >= Duration::from_secs(60), "{backoff:?}");
    assert!(backoff < Duration::from_secs(61), "{backoff:?}");
    let interval = times[2] - times[1];
    assert!(interval >= Duration::from_secs(10), "{interval:?}");
    assert!(interval < Duration::from_secs(11), "{interval:?}");
}

#[tokio::test(start_paused = true)]
async fn transient_fault_waits_standard_interval() {
    let dir = TempDir::new().unwrap();
    let stop = StopSignal::new();
    let session = ScriptedSession::new(&stop)
        .listing(Err(BackendError::transport("connection reset")))
        .listing(Ok(json!([])));
    let runner = PollRunner::new(session, &config(&dir)).unwrap();

    let result = runner.run_forever(&stop).await;

    assert_eq!(result.end_reason, RunEndReason::Cancelled);
    let times = runner.session().call_times();
    assert_eq!(times.len(), 3);
    let retry = times[1] - times[0];
    assert!(retry >= Duration::from_secs(10), "{retry:?}");
    assert!(retry < Duration::from_secs(11), "{retry:?}");
}

#[tokio::test(start_paused = true)]
async fn invalid_operation_ends_loop_without_more_calls() {
    let dir = TempDir::new().unwrap();
    let stop = StopSignal::new();
    let session = ScriptedSession::new(&stop)
        .listing(Err(BackendError::new(
            ErrorKind::InvalidOperation,
            "unknown method",
        )))
        .listing(Ok(json!([])));
    let runner = PollRunner::new(session, &config(&dir)).unwrap();

    let result = runner.run_forever(&stop).await;

    assert_eq!(
        result.end_reason,
        RunEndReason::Fatal {
            kind: ErrorKind::InvalidOperation,
            message: String::from("unknown method"),
        }
    );
    assert_eq!(runner.session().log().len(), 1);
    assert!(!stop.is_stop_requested());
}

#[tokio::test(start_paused = true)]
async fn unclassified_error_is_fatal() {
    let dir = TempDir::new().unwrap();
    let stop = StopSignal::new();
    let session = ScriptedSession::new(&stop)
        .listing(Ok(fleet()))
        .samples(Err(BackendError::new(ErrorKind::Unclassified, "boom")));
    let runner = PollRunner::new(session, &config(&dir)).unwrap();

    let result = runner.run_forever(&stop).await;

    assert!(matches!(
        result.end_reason,
        RunEndReason::Fatal {
            kind: ErrorKind::Unclassified,
            ..
        }
    ));
    assert!(!dir.path().join("VehiclesBackup").exists());
}

#[tokio::test(start_paused = true)]
async fn stop_during_wait_prevents_next_fetch() {
    let dir = TempDir::new().unwrap();
    let stop = StopSignal::new();
    let session = ScriptedSession::new(&stop).listing(Ok(json!([])));
    let runner = PollRunner::new(session, &config(&dir)).unwrap();
    let operator = stop.clone();
    let start = Instant::now();

    let (result, ()) = tokio::join!(runner.run_forever(&stop), async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let _ = operator.request_stop();
    });

    assert_eq!(result.end_reason, RunEndReason::Cancelled);
    assert_eq!(result.cycles_completed, 1);
    assert_eq!(runner.session().log().len(), 1);
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn short_multi_call_answer_is_retried() {
    let dir = TempDir::new().unwrap();
    let stop = StopSignal::new();
    let session = ScriptedSession::new(&stop)
        .listing(Ok(fleet()))
        .samples(Ok(vec![json!([])]));
    let runner = PollRunner::new(session, &config(&dir)).unwrap();

    let result = runner.run_forever(&stop).await;

    assert_eq!(result.end_reason, RunEndReason::Cancelled);
    assert_eq!(result.cycles_failed, 1);
    assert_eq!(result.cycles_completed, 0);
    assert_eq!(runner.session().call_times().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn consecutive_cycles_append() {
    let dir = TempDir::new().unwrap();
    let stop = StopSignal::new();
    let one_vehicle = json!([{ "id": "b7", "name": "Van" }]);
    let session = ScriptedSession::new(&stop)
        .listing(Ok(one_vehicle.clone()))
        .samples(Ok(vec![json!([]), json!([{ "data": 1.0 }])]))
        .listing(Ok(one_vehicle))
        .samples(Ok(vec![json!([]), json!([{ "data": 2.0 }])]));
    let runner = PollRunner::new(session, &config(&dir)).unwrap();

    let result = runner.run_forever(&stop).await;

    assert_eq!(result.cycles_completed, 2);
    let contents =
        std::fs::read_to_string(dir.path().join("VehiclesBackup").join("b7.csv")).unwrap();
    let odometers: Vec<&str> = contents
        .lines()
        .map(|line| line.split(',').nth(4).unwrap())
        .collect();
    assert_eq!(odometers, ["1", "2"]);
}
