// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Athlos: claim territory by running it.
//!
//! This crate is the headless client core: it records a run from device
//! locations, mirrors it to the Athlos API, and feeds a map widget.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod session;
pub mod time_utils;
