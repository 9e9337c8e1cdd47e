// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run lifecycle state machine.
//!
//! Pure and synchronous: [`RunMachine::dispatch`] applies one [`Event`] and
//! returns the [`Command`]s the driver must carry out (timers, watches,
//! remote calls, map updates). Nothing here touches I/O or the clock.

use crate::models::{GeoPoint, Run};
use crate::services::geometry::closing_ring;
use crate::services::location::LocationFailure;
use serde::Serialize;

pub const START_FAILED_MESSAGE: &str = "Failed to start run. Please try again.";
pub const END_FAILED_MESSAGE: &str = "Failed to end run. Please try again.";
pub const LOCATION_DENIED_MESSAGE: &str = "Location access denied. Please enable location \
     permissions in your device settings to start your run.";
pub const LOCATION_UNAVAILABLE_MESSAGE: &str = "Could not determine your location. Please \
     ensure location services are enabled and try again.";

/// Whether the run is mirrored to the server.
///
/// Chosen when the session is built; never inferred from missing user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionMode {
    Guest,
    Authenticated { user_id: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Starting,
    Active,
    Paused,
    Ending,
    Ended,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LocationStatus {
    /// No fix yet
    Pending,
    Acquired,
    PermissionDenied,
    Unavailable,
}

/// The run being recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSession {
    /// Server id; `None` for guest runs and before the start call returns
    pub run_id: Option<u64>,
    /// Readings in arrival order; append-only
    pub path: Vec<GeoPoint>,
    pub elapsed_secs: u64,
    pub paused: bool,
    pub mode: SessionMode,
}

/// Inputs to the machine.
#[derive(Debug, Clone)]
pub enum Event {
    /// The run screen was opened.
    Enter,
    StartSucceeded(Run),
    StartFailed(String),
    FixAcquired(GeoPoint),
    FixFailed(LocationFailure),
    /// One timer period elapsed.
    Tick,
    Reading(GeoPoint),
    WatchFailed(LocationFailure),
    /// User pressed pause/resume.
    TogglePause,
    /// The remote pause (`paused: true`) or resume call for toggle `seq` failed.
    ToggleFailed {
        paused: bool,
        seq: u64,
        reason: String,
    },
    /// User pressed end.
    End,
    EndSucceeded(Run),
    EndFailed(String),
    TerritoriesLoaded(Vec<Vec<GeoPoint>>),
    /// User navigated away without ending.
    Leave,
}

/// Side effects requested by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartRemote { user_id: u64 },
    LoadTerritories,
    RequestFix,
    StartTimer,
    StopTimer,
    StartWatch,
    StopWatch,
    MirrorPoint { run_id: u64, point: GeoPoint },
    PauseRemote { run_id: u64, seq: u64 },
    ResumeRemote { run_id: u64, seq: u64 },
    EndRemote { run_id: u64 },
    CenterMap(GeoPoint),
    ExtendPath(GeoPoint),
    DrawTerritory(Vec<GeoPoint>),
    DrawClaimed(Vec<GeoPoint>),
}

/// Point-in-time view of the machine for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSnapshot {
    pub state: RunState,
    pub run_id: Option<u64>,
    pub elapsed_secs: u64,
    pub paused: bool,
    pub path_len: usize,
    pub last_point: Option<GeoPoint>,
    pub location: LocationStatus,
    /// User-visible failure, shown in place of the map
    pub message: Option<String>,
    pub territory: Option<Vec<GeoPoint>>,
    pub end_in_flight: bool,
}

impl RunSnapshot {
    pub fn elapsed_display(&self) -> String {
        crate::time_utils::format_elapsed(self.elapsed_secs)
    }

    /// Recording cannot continue until the user intervenes.
    pub fn is_blocked(&self) -> bool {
        matches!(
            self.location,
            LocationStatus::PermissionDenied | LocationStatus::Unavailable
        ) || self.state == RunState::Error
    }
}

pub struct RunMachine {
    state: RunState,
    session: RunSession,
    location: LocationStatus,
    message: Option<String>,
    territory: Option<Vec<GeoPoint>>,
    fix_requested: bool,
    timer_running: bool,
    watching: bool,
    end_in_flight: bool,
    /// Bumped on every user toggle; remote failures carry the value they were issued under
    toggle_seq: u64,
    completed: bool,
    final_run: Option<Run>,
}

impl RunMachine {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            state: RunState::Idle,
            session: RunSession {
                run_id: None,
                path: Vec::new(),
                elapsed_secs: 0,
                paused: false,
                mode,
            },
            location: LocationStatus::Pending,
            message: None,
            territory: None,
            fix_requested: false,
            timer_running: false,
            watching: false,
            end_in_flight: false,
            toggle_seq: 0,
            completed: false,
            final_run: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn session(&self) -> &RunSession {
        &self.session
    }

    pub fn location(&self) -> LocationStatus {
        self.location
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn territory(&self) -> Option<&[GeoPoint]> {
        self.territory.as_deref()
    }

    /// True once the run reached `Ended` through the end action.
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Server response to the end call, if one succeeded.
    pub fn final_run(&self) -> Option<&Run> {
        self.final_run.as_ref()
    }

    pub fn timer_running(&self) -> bool {
        self.timer_running
    }

    pub fn watching(&self) -> bool {
        self.watching
    }

    /// An end call was issued and has not answered yet.
    pub fn end_in_flight(&self) -> bool {
        self.end_in_flight
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            state: self.state,
            run_id: self.session.run_id,
            elapsed_secs: self.session.elapsed_secs,
            paused: self.session.paused,
            path_len: self.session.path.len(),
            last_point: self.session.path.last().copied(),
            location: self.location,
            message: self.message.clone(),
            territory: self.territory.clone(),
            end_in_flight: self.end_in_flight,
        }
    }

    /// Apply one event and return the effects to perform, in order.
    pub fn dispatch(&mut self, event: Event) -> Vec<Command> {
        let mut cmds = Vec::new();

        match event {
            Event::Enter => self.on_enter(&mut cmds),
            Event::StartSucceeded(run) => {
                if self.state == RunState::Starting {
                    tracing::info!(run_id = run.id, "Run started");
                    self.session.run_id = Some(run.id);
                    self.activate(&mut cmds);
                }
            }
            Event::StartFailed(reason) => {
                if self.state == RunState::Starting {
                    tracing::warn!(error = %reason, "Failed to start run");
                    self.state = RunState::Error;
                    self.message = Some(START_FAILED_MESSAGE.to_string());
                }
            }
            Event::FixAcquired(point) => self.on_fix(point, &mut cmds),
            Event::FixFailed(failure) => {
                if self.location == LocationStatus::Pending {
                    self.block_location(&failure);
                }
            }
            Event::Tick => {
                if self.state == RunState::Active && self.timer_running {
                    self.session.elapsed_secs += 1;
                }
            }
            Event::Reading(point) => self.on_reading(point, &mut cmds),
            Event::WatchFailed(failure) => self.on_watch_failed(failure, &mut cmds),
            Event::TogglePause => self.on_toggle(&mut cmds),
            Event::ToggleFailed {
                paused,
                seq,
                reason,
            } => {
                // Only the latest toggle may be reverted; older failures are stale.
                if seq != self.toggle_seq {
                    tracing::debug!(seq, latest = self.toggle_seq, "Ignoring stale toggle failure");
                } else if matches!(self.state, RunState::Active | RunState::Paused)
                    && self.session.paused == paused
                {
                    tracing::warn!(paused, error = %reason, "Remote pause/resume failed, reverting");
                    self.set_paused(!paused, &mut cmds);
                }
            }
            Event::End => self.on_end(&mut cmds),
            Event::EndSucceeded(run) => {
                if self.state == RunState::Ending {
                    tracing::info!(run_id = run.id, distance = ?run.distance_meters, "Run ended");
                    self.end_in_flight = false;
                    self.final_run = Some(run);
                    self.finish(&mut cmds);
                }
            }
            Event::EndFailed(reason) => {
                if self.state == RunState::Ending {
                    tracing::warn!(error = %reason, "Failed to end run");
                    self.end_in_flight = false;
                    self.message = Some(END_FAILED_MESSAGE.to_string());
                }
            }
            Event::TerritoriesLoaded(rings) => {
                if self.state != RunState::Ended {
                    cmds.extend(rings.into_iter().map(Command::DrawClaimed));
                }
            }
            Event::Leave => {
                if self.state != RunState::Ended {
                    if self.end_in_flight {
                        tracing::warn!(run_id = ?self.session.run_id, "Leaving while end call is outstanding");
                    }
                    tracing::info!(state = ?self.state, "Leaving run screen");
                    self.halt(&mut cmds);
                    self.state = RunState::Ended;
                }
            }
        }

        cmds
    }

    fn on_enter(&mut self, cmds: &mut Vec<Command>) {
        if self.state != RunState::Idle {
            return;
        }
        cmds.push(Command::LoadTerritories);
        match self.session.mode {
            SessionMode::Guest => self.activate(cmds),
            SessionMode::Authenticated { user_id } => {
                self.state = RunState::Starting;
                cmds.push(Command::StartRemote { user_id });
            }
        }
    }

    /// Enter `Active`: timer on, and either ask for the first fix or resume watching.
    fn activate(&mut self, cmds: &mut Vec<Command>) {
        self.state = RunState::Active;
        self.session.paused = false;
        self.start_timer(cmds);
        match self.location {
            LocationStatus::Pending if !self.fix_requested => {
                self.fix_requested = true;
                cmds.push(Command::RequestFix);
            }
            LocationStatus::Acquired => self.start_watch(cmds),
            _ => {}
        }
    }

    fn on_fix(&mut self, point: GeoPoint, cmds: &mut Vec<Command>) {
        if self.location != LocationStatus::Pending {
            return;
        }
        self.location = LocationStatus::Acquired;
        if self.state == RunState::Ended {
            return;
        }
        cmds.push(Command::CenterMap(point));
        if self.state == RunState::Active {
            self.start_watch(cmds);
        }
    }

    fn on_reading(&mut self, point: GeoPoint, cmds: &mut Vec<Command>) {
        if self.state != RunState::Active || !self.watching {
            tracing::debug!(state = ?self.state, "Dropping reading outside active watch");
            return;
        }
        self.session.path.push(point);
        cmds.push(Command::ExtendPath(point));
        cmds.push(Command::CenterMap(point));
        if let Some(run_id) = self.session.run_id {
            cmds.push(Command::MirrorPoint { run_id, point });
        }
    }

    fn on_watch_failed(&mut self, failure: LocationFailure, cmds: &mut Vec<Command>) {
        match failure {
            LocationFailure::PermissionDenied => {
                if self.watching {
                    self.stop_watch(cmds);
                }
                self.block_location(&failure);
            }
            LocationFailure::Unavailable(reason) => {
                // Transient during a run; keep watching.
                tracing::warn!(error = %reason, "Location watch error");
            }
        }
    }

    fn block_location(&mut self, failure: &LocationFailure) {
        tracing::warn!(error = %failure, "Location unavailable for run");
        let (status, message) = match failure {
            LocationFailure::PermissionDenied => {
                (LocationStatus::PermissionDenied, LOCATION_DENIED_MESSAGE)
            }
            LocationFailure::Unavailable(_) => {
                (LocationStatus::Unavailable, LOCATION_UNAVAILABLE_MESSAGE)
            }
        };
        self.location = status;
        self.message = Some(message.to_string());
    }

    fn on_toggle(&mut self, cmds: &mut Vec<Command>) {
        let next = match self.state {
            RunState::Active => true,
            RunState::Paused => false,
            _ => return,
        };
        self.set_paused(next, cmds);
        self.toggle_seq += 1;

        if let Some(run_id) = self.session.run_id {
            let seq = self.toggle_seq;
            cmds.push(if next {
                Command::PauseRemote { run_id, seq }
            } else {
                Command::ResumeRemote { run_id, seq }
            });
        }
    }

    /// Local pause flip; no remote call.
    fn set_paused(&mut self, paused: bool, cmds: &mut Vec<Command>) {
        if paused {
            self.session.paused = true;
            self.state = RunState::Paused;
            self.halt(cmds);
        } else {
            self.activate(cmds);
        }
    }

    fn on_end(&mut self, cmds: &mut Vec<Command>) {
        match self.state {
            RunState::Active | RunState::Paused => {
                self.halt(cmds);
                match self.session.run_id {
                    Some(run_id) => {
                        self.state = RunState::Ending;
                        self.request_end(run_id, cmds);
                    }
                    None => self.finish(cmds),
                }
            }
            RunState::Ending => {
                if let (false, Some(run_id)) = (self.end_in_flight, self.session.run_id) {
                    self.request_end(run_id, cmds);
                }
            }
            RunState::Idle | RunState::Starting | RunState::Error => {
                // Nothing recorded yet; abandon without touching the server.
                self.halt(cmds);
                self.state = RunState::Ended;
            }
            RunState::Ended => {}
        }
    }

    fn request_end(&mut self, run_id: u64, cmds: &mut Vec<Command>) {
        self.end_in_flight = true;
        self.message = None;
        cmds.push(Command::EndRemote { run_id });
    }

    fn finish(&mut self, cmds: &mut Vec<Command>) {
        if let Some(ring) = closing_ring(&self.session.path) {
            cmds.push(Command::DrawTerritory(ring.clone()));
            self.territory = Some(ring);
        }
        self.completed = true;
        self.state = RunState::Ended;
    }

    fn halt(&mut self, cmds: &mut Vec<Command>) {
        if self.timer_running {
            self.timer_running = false;
            cmds.push(Command::StopTimer);
        }
        self.stop_watch(cmds);
    }

    fn start_timer(&mut self, cmds: &mut Vec<Command>) {
        if !self.timer_running {
            self.timer_running = true;
            cmds.push(Command::StartTimer);
        }
    }

    fn start_watch(&mut self, cmds: &mut Vec<Command>) {
        if !self.watching {
            self.watching = true;
            cmds.push(Command::StartWatch);
        }
    }

    fn stop_watch(&mut self, cmds: &mut Vec<Command>) {
        if self.watching {
            self.watching = false;
            cmds.push(Command::StopWatch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P1: GeoPoint = GeoPoint::new(12.8230, 80.0450);
    const P2: GeoPoint = GeoPoint::new(12.8240, 80.0450);
    const P3: GeoPoint = GeoPoint::new(12.8240, 80.0460);

    fn run(id: u64) -> Run {
        Run {
            id,
            user_id: 42,
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

    /// Authenticated machine that has started run 7 and has a fix.
    fn active_authenticated() -> RunMachine {
        let mut m = RunMachine::new(SessionMode::Authenticated { user_id: 42 });
        m.dispatch(Event::Enter);
        m.dispatch(Event::StartSucceeded(run(7)));
        m.dispatch(Event::FixAcquired(P1));
        assert_eq!(m.state(), RunState::Active);
        assert!(m.watching());
        m
    }

    fn active_guest() -> RunMachine {
        let mut m = RunMachine::new(SessionMode::Guest);
        m.dispatch(Event::Enter);
        m.dispatch(Event::FixAcquired(P1));
        m
    }

    #[test]
    fn test_authenticated_enter_starts_remote() {
        let mut m = RunMachine::new(SessionMode::Authenticated { user_id: 42 });
        let cmds = m.dispatch(Event::Enter);
        assert_eq!(m.state(), RunState::Starting);
        assert_eq!(
            cmds,
            vec![Command::LoadTerritories, Command::StartRemote { user_id: 42 }]
        );
        assert!(!m.timer_running());
    }

    #[test]
    fn test_start_success_activates_and_requests_fix_first() {
        let mut m = RunMachine::new(SessionMode::Authenticated { user_id: 42 });
        m.dispatch(Event::Enter);
        let cmds = m.dispatch(Event::StartSucceeded(run(7)));
        assert_eq!(m.state(), RunState::Active);
        assert_eq!(m.session().run_id, Some(7));
        assert_eq!(cmds, vec![Command::StartTimer, Command::RequestFix]);

        let cmds = m.dispatch(Event::FixAcquired(P1));
        assert_eq!(cmds, vec![Command::CenterMap(P1), Command::StartWatch]);
        // The fix only positions the map; it is not part of the path.
        assert!(m.session().path.is_empty());
    }

    #[test]
    fn test_start_failure_is_terminal_error() {
        let mut m = RunMachine::new(SessionMode::Authenticated { user_id: 42 });
        m.dispatch(Event::Enter);
        let cmds = m.dispatch(Event::StartFailed("HTTP 500".to_string()));
        assert!(cmds.is_empty());
        assert_eq!(m.state(), RunState::Error);
        assert_eq!(m.message(), Some(START_FAILED_MESSAGE));

        // Ticks and readings never count in the error state.
        m.dispatch(Event::Tick);
        m.dispatch(Event::Reading(P1));
        assert_eq!(m.session().elapsed_secs, 0);
        assert!(m.session().path.is_empty());
    }

    #[test]
    fn test_guest_enter_goes_straight_to_active() {
        let mut m = RunMachine::new(SessionMode::Guest);
        let cmds = m.dispatch(Event::Enter);
        assert_eq!(m.state(), RunState::Active);
        assert_eq!(
            cmds,
            vec![
                Command::LoadTerritories,
                Command::StartTimer,
                Command::RequestFix
            ]
        );
        assert_eq!(m.session().run_id, None);
    }

    #[test]
    fn test_ticks_only_count_while_active() {
        let mut m = RunMachine::new(SessionMode::Authenticated { user_id: 42 });
        m.dispatch(Event::Enter);
        m.dispatch(Event::Tick);
        assert_eq!(m.session().elapsed_secs, 0, "no ticks before Active");

        m.dispatch(Event::StartSucceeded(run(7)));
        m.dispatch(Event::Tick);
        m.dispatch(Event::Tick);
        assert_eq!(m.session().elapsed_secs, 2);

        m.dispatch(Event::TogglePause);
        m.dispatch(Event::Tick);
        assert_eq!(m.session().elapsed_secs, 2, "no ticks while paused");
    }

    #[test]
    fn test_readings_append_in_order_and_mirror() {
        let mut m = active_authenticated();
        let mut mirrored = Vec::new();
        for p in [P1, P2, P2, P3] {
            for cmd in m.dispatch(Event::Reading(p)) {
                if let Command::MirrorPoint { run_id, point } = cmd {
                    assert_eq!(run_id, 7);
                    mirrored.push(point);
                }
            }
        }
        // Duplicates are kept; nothing is smoothed.
        assert_eq!(m.session().path, vec![P1, P2, P2, P3]);
        assert_eq!(mirrored, vec![P1, P2, P2, P3]);
    }

    #[test]
    fn test_guest_readings_are_not_mirrored() {
        let mut m = active_guest();
        let cmds = m.dispatch(Event::Reading(P2));
        assert!(!cmds
            .iter()
            .any(|c| matches!(c, Command::MirrorPoint { .. })));
        assert_eq!(m.session().path, vec![P2]);
    }

    #[test]
    fn test_pause_resume_keeps_path_and_reopens_watch() {
        let mut m = active_authenticated();
        m.dispatch(Event::Reading(P1));
        m.dispatch(Event::Reading(P2));

        let cmds = m.dispatch(Event::TogglePause);
        assert_eq!(m.state(), RunState::Paused);
        assert!(m.session().paused);
        assert_eq!(
            cmds,
            vec![
                Command::StopTimer,
                Command::StopWatch,
                Command::PauseRemote { run_id: 7, seq: 1 }
            ]
        );

        // Stale reading after release is ignored.
        m.dispatch(Event::Reading(P3));

        let cmds = m.dispatch(Event::TogglePause);
        assert_eq!(m.state(), RunState::Active);
        assert_eq!(
            cmds,
            vec![
                Command::StartTimer,
                Command::StartWatch,
                Command::ResumeRemote { run_id: 7, seq: 2 }
            ]
        );
        assert_eq!(m.session().path, vec![P1, P2]);
    }

    #[test]
    fn test_failed_pause_reverts_flag_and_timer() {
        let mut m = active_authenticated();
        m.dispatch(Event::TogglePause);
        assert!(!m.timer_running());

        let cmds = m.dispatch(Event::ToggleFailed {
            paused: true,
            seq: 1,
            reason: "HTTP 500".to_string(),
        });
        assert!(!m.session().paused);
        assert_eq!(m.state(), RunState::Active);
        assert!(m.timer_running());
        // Revert is local only.
        assert_eq!(cmds, vec![Command::StartTimer, Command::StartWatch]);
    }

    #[test]
    fn test_failed_resume_reverts_to_paused() {
        let mut m = active_authenticated();
        m.dispatch(Event::TogglePause);
        m.dispatch(Event::TogglePause);

        m.dispatch(Event::ToggleFailed {
            paused: false,
            seq: 2,
            reason: "timeout".to_string(),
        });
        assert!(m.session().paused);
        assert_eq!(m.state(), RunState::Paused);
        assert!(!m.timer_running());
        assert!(!m.watching());
    }

    #[test]
    fn test_stale_toggle_failure_is_ignored() {
        let mut m = active_authenticated();
        m.dispatch(Event::TogglePause);
        m.dispatch(Event::TogglePause);

        // The pause attempt failed after the user already resumed.
        let cmds = m.dispatch(Event::ToggleFailed {
            paused: true,
            seq: 1,
            reason: "late".to_string(),
        });
        assert!(cmds.is_empty());
        assert_eq!(m.state(), RunState::Active);
    }

    #[test]
    fn test_old_pause_failure_does_not_undo_newer_pause() {
        let mut m = active_authenticated();
        m.dispatch(Event::TogglePause); // pause, seq 1
        m.dispatch(Event::TogglePause); // resume, seq 2
        let cmds = m.dispatch(Event::TogglePause); // pause, seq 3
        assert!(cmds.contains(&Command::PauseRemote { run_id: 7, seq: 3 }));

        // The first pause fails after the third one was issued.
        let cmds = m.dispatch(Event::ToggleFailed {
            paused: true,
            seq: 1,
            reason: "HTTP 500".to_string(),
        });
        assert!(cmds.is_empty());
        assert_eq!(m.state(), RunState::Paused);
        assert!(!m.timer_running());

        // A failure of the latest pause still reverts.
        m.dispatch(Event::ToggleFailed {
            paused: true,
            seq: 3,
            reason: "HTTP 500".to_string(),
        });
        assert_eq!(m.state(), RunState::Active);
        assert!(m.timer_running());
    }

    #[test]
    fn test_guest_toggle_has_no_remote_call() {
        let mut m = active_guest();
        let cmds = m.dispatch(Event::TogglePause);
        assert_eq!(cmds, vec![Command::StopTimer, Command::StopWatch]);
    }

    #[test]
    fn test_guest_end_with_three_points_draws_territory() {
        let mut m = active_guest();
        for p in [P1, P2, P3] {
            m.dispatch(Event::Reading(p));
        }
        let cmds = m.dispatch(Event::End);
        let ring = vec![P1, P2, P3, P1];
        assert_eq!(
            cmds,
            vec![
                Command::StopTimer,
                Command::StopWatch,
                Command::DrawTerritory(ring.clone())
            ]
        );
        assert_eq!(m.state(), RunState::Ended);
        assert!(m.completed());
        assert_eq!(m.territory(), Some(ring.as_slice()));
    }

    #[test]
    fn test_end_with_two_points_has_no_territory() {
        let mut m = active_guest();
        m.dispatch(Event::Reading(P1));
        m.dispatch(Event::Reading(P2));
        let cmds = m.dispatch(Event::End);
        assert!(!cmds
            .iter()
            .any(|c| matches!(c, Command::DrawTerritory(_))));
        assert!(m.territory().is_none());
        assert_eq!(m.state(), RunState::Ended);
    }

    #[test]
    fn test_authenticated_end_waits_for_server() {
        let mut m = active_authenticated();
        for p in [P1, P2, P3] {
            m.dispatch(Event::Reading(p));
        }
        let cmds = m.dispatch(Event::End);
        assert_eq!(m.state(), RunState::Ending);
        assert_eq!(
            cmds,
            vec![
                Command::StopTimer,
                Command::StopWatch,
                Command::EndRemote { run_id: 7 }
            ]
        );
        assert!(m.territory().is_none());

        let cmds = m.dispatch(Event::EndSucceeded(run(7)));
        assert_eq!(m.state(), RunState::Ended);
        assert_eq!(cmds, vec![Command::DrawTerritory(vec![P1, P2, P3, P1])]);
        assert_eq!(m.final_run().map(|r| r.id), Some(7));
    }

    #[test]
    fn test_end_failure_stays_ending_and_retry_is_idempotent() {
        let mut m = active_authenticated();
        m.dispatch(Event::End);

        // Second press while the first call is in flight does nothing.
        assert!(m.dispatch(Event::End).is_empty());

        m.dispatch(Event::EndFailed("HTTP 502".to_string()));
        assert_eq!(m.state(), RunState::Ending);
        assert_eq!(m.message(), Some(END_FAILED_MESSAGE));
        assert!(!m.timer_running());

        let cmds = m.dispatch(Event::End);
        assert_eq!(cmds, vec![Command::EndRemote { run_id: 7 }]);
        assert_eq!(m.message(), None);

        m.dispatch(Event::EndSucceeded(run(7)));
        assert_eq!(m.state(), RunState::Ended);
    }

    #[test]
    fn test_fix_denied_blocks_recording() {
        let mut m = RunMachine::new(SessionMode::Guest);
        m.dispatch(Event::Enter);
        let cmds = m.dispatch(Event::FixFailed(LocationFailure::PermissionDenied));
        assert!(cmds.is_empty());
        assert_eq!(m.location(), LocationStatus::PermissionDenied);
        assert_eq!(m.message(), Some(LOCATION_DENIED_MESSAGE));
        assert!(m.snapshot().is_blocked());

        m.dispatch(Event::Reading(P1));
        assert!(m.session().path.is_empty());

        // Resuming never retries the fix.
        m.dispatch(Event::TogglePause);
        let cmds = m.dispatch(Event::TogglePause);
        assert_eq!(cmds, vec![Command::StartTimer]);
    }

    #[test]
    fn test_fix_unavailable_message() {
        let mut m = RunMachine::new(SessionMode::Guest);
        m.dispatch(Event::Enter);
        m.dispatch(Event::FixFailed(LocationFailure::Unavailable(
            "timeout".to_string(),
        )));
        assert_eq!(m.location(), LocationStatus::Unavailable);
        assert_eq!(m.message(), Some(LOCATION_UNAVAILABLE_MESSAGE));
    }

    #[test]
    fn test_watch_permission_loss_stops_watch() {
        let mut m = active_guest();
        let cmds = m.dispatch(Event::WatchFailed(LocationFailure::PermissionDenied));
        assert_eq!(cmds, vec![Command::StopWatch]);
        assert_eq!(m.location(), LocationStatus::PermissionDenied);

        let cmds = m.dispatch(Event::WatchFailed(LocationFailure::Unavailable(
            "weak signal".to_string(),
        )));
        assert!(cmds.is_empty());
    }

    #[test]
    fn test_fix_arriving_while_paused_defers_watch() {
        let mut m = RunMachine::new(SessionMode::Guest);
        m.dispatch(Event::Enter);
        m.dispatch(Event::TogglePause);

        let cmds = m.dispatch(Event::FixAcquired(P1));
        assert_eq!(cmds, vec![Command::CenterMap(P1)]);

        let cmds = m.dispatch(Event::TogglePause);
        assert_eq!(cmds, vec![Command::StartTimer, Command::StartWatch]);
    }

    #[test]
    fn test_end_before_start_abandons() {
        let mut m = RunMachine::new(SessionMode::Authenticated { user_id: 42 });
        m.dispatch(Event::Enter);
        let cmds = m.dispatch(Event::End);
        assert!(cmds.is_empty());
        assert_eq!(m.state(), RunState::Ended);
        assert!(!m.completed());

        // A late start response cannot revive it.
        m.dispatch(Event::StartSucceeded(run(7)));
        assert_eq!(m.state(), RunState::Ended);
    }

    #[test]
    fn test_leave_releases_everything() {
        let mut m = active_authenticated();
        let cmds = m.dispatch(Event::Leave);
        assert_eq!(cmds, vec![Command::StopTimer, Command::StopWatch]);
        assert_eq!(m.state(), RunState::Ended);
        assert!(!m.completed());
    }

    #[test]
    fn test_leave_during_end_call_reports_pending_end() {
        let mut m = active_authenticated();
        m.dispatch(Event::End);
        assert!(m.end_in_flight());

        let cmds = m.dispatch(Event::Leave);
        assert!(cmds.is_empty());
        assert_eq!(m.state(), RunState::Ended);
        assert!(!m.completed());
        assert!(m.end_in_flight(), "outstanding end call stays visible");

        // A late answer no longer changes the outcome.
        m.dispatch(Event::EndSucceeded(run(7)));
        assert!(!m.completed());
        assert!(m.territory().is_none());
    }

    #[test]
    fn test_claimed_territories_are_drawn() {
        let mut m = RunMachine::new(SessionMode::Guest);
        m.dispatch(Event::Enter);
        let rings = vec![vec![P1, P2, P3, P1]];
        let cmds = m.dispatch(Event::TerritoriesLoaded(rings.clone()));
        assert_eq!(cmds, vec![Command::DrawClaimed(rings[0].clone())]);
    }
}
