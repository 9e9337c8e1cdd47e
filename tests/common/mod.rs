// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use athlos::error::{ApiError, Result};
use athlos::models::{GeoPoint, Run, Territory};
use athlos::services::location::{LocationFailure, LocationProvider, LocationWatch, Reading};
use athlos::services::RunService;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One call made against [`FakeRunService`].
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum Call {
    Start(u64),
    Point(u64, GeoPoint),
    Pause(u64),
    Resume(u64),
    End(u64),
    Territories,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    fail_start: bool,
    fail_pause: bool,
    fail_resume: bool,
    end_failures_left: usize,
    territories: Vec<Territory>,
}

/// In-memory run service that records every call.
#[derive(Clone)]
pub struct FakeRunService {
    run_id: u64,
    state: Arc<Mutex<FakeState>>,
}

#[allow(dead_code)]
impl FakeRunService {
    pub fn new(run_id: u64) -> Self {
        Self {
            run_id,
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    pub fn failing_start(self) -> Self {
        self.state.lock().unwrap().fail_start = true;
        self
    }

    pub fn failing_pause(self) -> Self {
        self.state.lock().unwrap().fail_pause = true;
        self
    }

    pub fn failing_resume(self) -> Self {
        self.state.lock().unwrap().fail_resume = true;
        self
    }

    /// Fail the first `n` end calls.
    pub fn failing_end(self, n: usize) -> Self {
        self.state.lock().unwrap().end_failures_left = n;
        self
    }

    pub fn with_territories(self, territories: Vec<Territory>) -> Self {
        self.state.lock().unwrap().territories = territories;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls touching the run itself (territory loads left out).
    pub fn run_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| *c != Call::Territories)
            .collect()
    }

    fn record(&self, call: Call) -> std::sync::MutexGuard<'_, FakeState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }

    fn run(&self, user_id: u64) -> Run {
        test_run(self.run_id, user_id)
    }
}

fn server_error() -> ApiError {
    ApiError::Status {
        status: 500,
        message: "Internal Server Error".to_string(),
    }
}

impl RunService for FakeRunService {
    async fn start_run(&self, user_id: u64) -> Result<Run> {
        let state = self.record(Call::Start(user_id));
        if state.fail_start {
            return Err(server_error());
        }
        Ok(self.run(user_id))
    }

    async fn add_point(&self, run_id: u64, point: GeoPoint, _step_count: Option<u32>) -> Result<Run> {
        drop(self.record(Call::Point(run_id, point)));
        Ok(self.run(42))
    }

    async fn pause_run(&self, run_id: u64) -> Result<Run> {
        let state = self.record(Call::Pause(run_id));
        if state.fail_pause {
            return Err(server_error());
        }
        Ok(self.run(42))
    }

    async fn resume_run(&self, run_id: u64) -> Result<Run> {
        let state = self.record(Call::Resume(run_id));
        if state.fail_resume {
            return Err(server_error());
        }
        Ok(self.run(42))
    }

    async fn end_run(&self, run_id: u64) -> Result<Run> {
        let mut state = self.record(Call::End(run_id));
        if state.end_failures_left > 0 {
            state.end_failures_left -= 1;
            return Err(server_error());
        }
        let mut run = self.run(42);
        run.is_active = false;
        run.total_steps = Some(512);
        Ok(run)
    }

    async fn active_territories(&self) -> Result<Vec<Territory>> {
        let state = self.record(Call::Territories);
        Ok(state.territories.clone())
    }
}

/// Location provider the test pushes readings into by hand.
#[derive(Clone)]
pub struct ScriptedLocation {
    fix: Arc<Mutex<Reading>>,
    current: Arc<Mutex<Option<mpsc::UnboundedSender<Reading>>>>,
    watches_opened: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl ScriptedLocation {
    pub fn new(fix: Reading) -> Self {
        Self {
            fix: Arc::new(Mutex::new(fix)),
            current: Arc::new(Mutex::new(None)),
            watches_opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn at(point: GeoPoint) -> Self {
        Self::new(Ok(point))
    }

    pub fn denied() -> Self {
        Self::new(Err(LocationFailure::PermissionDenied))
    }

    /// Deliver a reading to the open watch. `false` if no watch is listening.
    pub fn push(&self, point: GeoPoint) -> bool {
        self.send(Ok(point))
    }

    pub fn fail(&self, failure: LocationFailure) -> bool {
        self.send(Err(failure))
    }

    pub fn watches_opened(&self) -> usize {
        self.watches_opened.load(Ordering::SeqCst)
    }

    fn send(&self, reading: Reading) -> bool {
        match self.current.lock().unwrap().as_ref() {
            Some(tx) => tx.send(reading).is_ok(),
            None => false,
        }
    }
}

impl LocationProvider for ScriptedLocation {
    async fn current_position(&self) -> Reading {
        self.fix.lock().unwrap().clone()
    }

    fn watch(&self) -> LocationWatch {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.current.lock().unwrap() = Some(tx);
        self.watches_opened.fetch_add(1, Ordering::SeqCst);
        LocationWatch::from_channel(rx)
    }
}

#[allow(dead_code)]
pub fn test_run(id: u64, user_id: u64) -> Run {
    Run {
        id,
        user_id,
        start_time: None,
        end_time: None,
        duration_seconds: None,
        total_steps: None,
        distance_meters: None,
        path: None,
        claimed_territory: None,
        is_active: true,
    }
}

/// Let spawned tasks run until `cond` holds, without advancing the clock.
#[allow(dead_code)]
pub async fn settle_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

/// Serve `router` under `/api` on an ephemeral port; returns the API root URL.
#[allow(dead_code)]
pub async fn spawn_api(router: axum::Router) -> String {
    let app = axum::Router::new().nest("/api", router);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });
    format!("http://{}/api", addr)
}
