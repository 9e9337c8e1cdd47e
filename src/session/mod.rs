// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run session: lifecycle state machine and its async driver.

pub mod controller;
pub mod machine;

pub use controller::{RunHandle, RunSessionController, RunSummary, UserAction, TICK_PERIOD};
pub use machine::{
    Command, Event, LocationStatus, RunMachine, RunSession, RunSnapshot, RunState, SessionMode,
};
