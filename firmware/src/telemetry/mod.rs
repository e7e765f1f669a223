//! Mirrors the core telemetry ring to the debug log.
//!
//! The scheduler writes into a [`TelemetryRecorder`] owned by the rig task.
//! After every tick the task calls [`TelemetryDrain::drain`], which formats
//! each new record into a fixed-size line and emits it through defmt on the
//! MCU or stdout on host builds.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::fmt::Write;

use heapless::String;
use tfc_core::config::ConfigError;
use tfc_core::telemetry::{EventId, TelemetryRecord, TelemetryRecorder};

use crate::status::StatusSnapshot;

/// Longest rendered record; longer lines are cut short.
pub const LOG_LINE_CAPACITY: usize = 96;

/// Read cursor over a [`TelemetryRecorder`].
#[derive(Copy, Clone, Debug, Default)]
pub struct TelemetryDrain {
    cursor: EventId,
}

impl TelemetryDrain {
    pub const fn new() -> Self {
        Self { cursor: 0 }
    }

    /// Logs every record written since the previous call and returns how many
    /// were logged. Overwritten records are reported as a single gap line.
    pub fn drain<const N: usize>(&mut self, recorder: &TelemetryRecorder<N>) -> usize {
        let dropped = recorder.dropped_since(self.cursor);
        if dropped > 0 {
            emit_dropped(dropped);
        }

        let mut logged = 0;
        for record in recorder.unread_since(self.cursor) {
            emit_line(render(record).as_str());
            logged += 1;
        }
        self.cursor = recorder.next_event_id();
        logged
    }
}

/// Formats a record as `<event> [details] t=<ms>ms`.
pub fn render(record: &TelemetryRecord) -> String<LOG_LINE_CAPACITY> {
    let mut line = String::new();
    // Overflow leaves the prefix that fit.
    let _ = write!(line, "{record}");
    line
}

#[cfg(target_os = "none")]
fn emit_line(line: &str) {
    defmt::info!("telemetry:{=str}", line);
}

#[cfg(not(target_os = "none"))]
fn emit_line(line: &str) {
    println!("telemetry:{line}");
}

#[cfg(target_os = "none")]
fn emit_dropped(count: u32) {
    defmt::warn!("telemetry:dropped {} records", count);
}

#[cfg(not(target_os = "none"))]
fn emit_dropped(count: u32) {
    println!("telemetry:dropped {count} records");
}

#[cfg(target_os = "none")]
pub fn emit_status(status: &StatusSnapshot) {
    defmt::info!(
        "status:{=str} trial={} lines={=u8:#b} licks={} degraded={} late={}",
        status.phase.label(),
        status.trial_index,
        status.active_lines,
        status.lick_count,
        status.degraded_sync,
        status.late_ticks
    );
}

#[cfg(not(target_os = "none"))]
pub fn emit_status(status: &StatusSnapshot) {
    println!(
        "status:{} trial={} lines={:#07b} licks={} degraded={} late={}",
        status.phase.label(),
        status.trial_index,
        status.active_lines,
        status.lick_count,
        status.degraded_sync,
        status.late_ticks
    );
}

/// Reports a configuration the scheduler refused to run.
pub fn emit_config_error(error: ConfigError) {
    let mut line: String<LOG_LINE_CAPACITY> = String::new();
    let _ = write!(line, "{error}");
    emit_config_line(line.as_str());
}

#[cfg(target_os = "none")]
fn emit_config_line(line: &str) {
    defmt::error!("config:{=str}", line);
}

#[cfg(not(target_os = "none"))]
fn emit_config_line(line: &str) {
    println!("config:{line}");
}
