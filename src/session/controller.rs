// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run session controller.
//!
//! Drives a [`RunMachine`] from a single event loop: the 1 Hz timer, the
//! location watch, user actions, and completions of remote calls all arrive
//! here and are applied one at a time. Remote calls run as spawned tasks and
//! report back as events; they never block the timer or the watch.

use crate::models::{GeoPoint, Run};
use crate::services::geometry::{encode_path, estimated_steps, path_distance_meters, TrackError};
use crate::services::location::{LocationProvider, LocationWatch, Reading};
use crate::services::map::MapView;
use crate::services::runs::RunService;
use crate::session::machine::{Command, Event, RunMachine, RunSnapshot, RunState, SessionMode};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Timer period; each tick adds one second of elapsed time.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Actions a user can take on the run screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    TogglePause,
    End,
    /// Navigate away without ending the run.
    Leave,
}

impl From<UserAction> for Event {
    fn from(action: UserAction) -> Self {
        match action {
            UserAction::TogglePause => Event::TogglePause,
            UserAction::End => Event::End,
            UserAction::Leave => Event::Leave,
        }
    }
}

/// Handle given to the presentation layer: send actions, observe snapshots.
#[derive(Clone)]
pub struct RunHandle {
    actions: mpsc::UnboundedSender<UserAction>,
    snapshots: watch::Receiver<RunSnapshot>,
}

impl RunHandle {
    /// Returns `false` if the controller has already finished.
    pub fn send(&self, action: UserAction) -> bool {
        self.actions.send(action).is_ok()
    }

    pub fn toggle_pause(&self) -> bool {
        self.send(UserAction::TogglePause)
    }

    pub fn end(&self) -> bool {
        self.send(UserAction::End)
    }

    pub fn leave(&self) -> bool {
        self.send(UserAction::Leave)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> RunSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait until a snapshot satisfies `pred`.
    ///
    /// Returns `None` if the controller finished without ever satisfying it.
    pub async fn wait_for(&mut self, pred: impl FnMut(&RunSnapshot) -> bool) -> Option<RunSnapshot> {
        self.snapshots.wait_for(pred).await.ok().map(|s| s.clone())
    }
}

/// What the controller leaves behind when it returns.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: SessionMode,
    pub run_id: Option<u64>,
    /// Ended through the end action (as opposed to leaving the screen)
    pub completed: bool,
    /// Left while an end call was still outstanding. The server may close the
    /// run anyway, so `completed == false` does not mean the run is still open.
    pub end_pending: bool,
    pub elapsed_secs: u64,
    pub path: Vec<GeoPoint>,
    pub territory: Option<Vec<GeoPoint>>,
    /// Server's final view of the run
    pub remote: Option<Run>,
}

impl RunSummary {
    pub fn distance_meters(&self) -> f64 {
        path_distance_meters(&self.path)
    }

    /// Steps from the server when it reported them, else estimated locally.
    pub fn steps(&self) -> u32 {
        self.remote
            .as_ref()
            .and_then(|r| r.total_steps)
            .unwrap_or_else(|| estimated_steps(self.distance_meters()))
    }

    pub fn encoded_path(&self) -> Result<String, TrackError> {
        encode_path(&self.path)
    }
}

/// Owns one run from screen entry to `Ended`.
pub struct RunSessionController<S, L, M> {
    machine: RunMachine,
    service: S,
    location: L,
    map: M,
    timer: Option<Interval>,
    watch: Option<LocationWatch>,
    actions: mpsc::UnboundedReceiver<UserAction>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    snapshots: watch::Sender<RunSnapshot>,
}

impl<S, L, M> RunSessionController<S, L, M>
where
    S: RunService,
    L: LocationProvider,
    M: MapView,
{
    pub fn new(mode: SessionMode, service: S, location: L, map: M) -> (Self, RunHandle) {
        let machine = RunMachine::new(mode);
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());

        let controller = Self {
            machine,
            service,
            location,
            map,
            timer: None,
            watch: None,
            actions: actions_rx,
            events_tx,
            events_rx,
            snapshots: snapshot_tx,
        };
        let handle = RunHandle {
            actions: actions_tx,
            snapshots: snapshot_rx,
        };
        (controller, handle)
    }

    /// Run the event loop until the session ends.
    ///
    /// Dropping every [`RunHandle`] counts as leaving the screen.
    pub async fn run(mut self) -> RunSummary {
        self.apply(Event::Enter);

        while self.machine.state() != RunState::Ended {
            tokio::select! {
                action = self.actions.recv() => {
                    let event = action.map(Event::from).unwrap_or(Event::Leave);
                    self.apply(event);
                }
                Some(event) = self.events_rx.recv() => self.apply(event),
                _ = next_tick(&mut self.timer) => self.apply(Event::Tick),
                reading = next_reading(&mut self.watch) => match reading {
                    Some(Ok(point)) => self.apply(Event::Reading(point)),
                    Some(Err(failure)) => self.apply(Event::WatchFailed(failure)),
                    None => {
                        tracing::debug!("Location watch closed by provider");
                        self.watch = None;
                    }
                },
            }
        }

        // Anything still queued (including late readings) is discarded here.
        self.timer = None;
        self.watch = None;

        let session = self.machine.session();
        let summary = RunSummary {
            mode: session.mode,
            run_id: session.run_id,
            completed: self.machine.completed(),
            end_pending: self.machine.end_in_flight(),
            elapsed_secs: session.elapsed_secs,
            path: session.path.clone(),
            territory: self.machine.territory().map(<[GeoPoint]>::to_vec),
            remote: self.machine.final_run().cloned(),
        };
        tracing::info!(
            run_id = ?summary.run_id,
            completed = summary.completed,
            end_pending = summary.end_pending,
            elapsed_secs = summary.elapsed_secs,
            points = summary.path.len(),
            "Run session finished"
        );
        summary
    }

    fn apply(&mut self, event: Event) {
        for command in self.machine.dispatch(event) {
            self.execute(command);
        }
        self.snapshots.send_replace(self.machine.snapshot());
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::StartTimer => {
                let mut interval = tokio::time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.timer = Some(interval);
            }
            Command::StopTimer => self.timer = None,
            Command::StartWatch => self.watch = Some(self.location.watch()),
            Command::StopWatch => self.watch = None,
            Command::CenterMap(point) => self.map.set_center(point),
            Command::ExtendPath(point) => self.map.extend_path(point),
            Command::DrawTerritory(ring) => self.map.draw_territory(&ring),
            Command::DrawClaimed(ring) => self.map.draw_claimed(&ring),
            Command::RequestFix => {
                let location = self.location.clone();
                self.spawn_event(async move {
                    match location.current_position().await {
                        Ok(point) => Some(Event::FixAcquired(point)),
                        Err(failure) => Some(Event::FixFailed(failure)),
                    }
                });
            }
            Command::StartRemote { user_id } => {
                let service = self.service.clone();
                self.spawn_event(async move {
                    match service.start_run(user_id).await {
                        Ok(run) => Some(Event::StartSucceeded(run)),
                        Err(e) => Some(Event::StartFailed(e.to_string())),
                    }
                });
            }
            Command::MirrorPoint { run_id, point } => {
                let service = self.service.clone();
                self.spawn_event(async move {
                    if let Err(e) = service.add_point(run_id, point, None).await {
                        tracing::warn!(run_id, error = %e, "Failed to mirror run point");
                    }
                    None
                });
            }
            Command::PauseRemote { run_id, seq } => {
                let service = self.service.clone();
                self.spawn_event(async move {
                    match service.pause_run(run_id).await {
                        Ok(_) => None,
                        Err(e) => Some(Event::ToggleFailed {
                            paused: true,
                            seq,
                            reason: e.to_string(),
                        }),
                    }
                });
            }
            Command::ResumeRemote { run_id, seq } => {
                let service = self.service.clone();
                self.spawn_event(async move {
                    match service.resume_run(run_id).await {
                        Ok(_) => None,
                        Err(e) => Some(Event::ToggleFailed {
                            paused: false,
                            seq,
                            reason: e.to_string(),
                        }),
                    }
                });
            }
            Command::EndRemote { run_id } => {
                let service = self.service.clone();
                self.spawn_event(async move {
                    match service.end_run(run_id).await {
                        Ok(run) => Some(Event::EndSucceeded(run)),
                        Err(e) => Some(Event::EndFailed(e.to_string())),
                    }
                });
            }
            Command::LoadTerritories => {
                let service = self.service.clone();
                self.spawn_event(async move {
                    match service.active_territories().await {
                        Ok(territories) => Some(Event::TerritoriesLoaded(
                            territories.iter().filter_map(|t| t.ring()).collect(),
                        )),
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to load territories");
                            None
                        }
                    }
                });
            }
        }
    }

    /// Run `task` in the background and feed its event, if any, back into the loop.
    fn spawn_event<F>(&self, task: F)
    where
        F: std::future::Future<Output = Option<Event>> + Send + 'static,
    {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            if let Some(event) = task.await {
                // The loop may already be gone; late completions are moot then.
                let _ = events.send(event);
            }
        });
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures_util::future::pending().await,
    }
}

async fn next_reading(watch: &mut Option<LocationWatch>) -> Option<Reading> {
    match watch {
        Some(w) => w.next().await,
        None => futures_util::future::pending().await,
    }
}
