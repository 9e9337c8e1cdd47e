// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for elapsed-time and progress display.

/// Format whole seconds as zero-padded `HH:MM:SS`.
///
/// Hours are not wrapped at 24.
pub fn format_elapsed(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Daily goal progress as a whole percentage, capped at 100.
///
/// A zero goal counts as complete.
pub fn progress_percent(current_steps: u32, goal_steps: u32) -> u8 {
    if goal_steps == 0 {
        return 100;
    }
    let ratio = f64::from(current_steps) / f64::from(goal_steps) * 100.0;
    ratio.min(100.0).round() as u8
}
