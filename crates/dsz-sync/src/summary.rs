//! Run summary log
//!
//! One line per successful sync, appended to a separate file so run history
//! survives rotation of the operational log:
//!
//! ```text
//! [2024-03-09 07:05:01] SUCCESS | Duration: 23m 5s | Products: 18452
//! ```

use crate::units::format_run_duration;
use chrono::{DateTime, Local};
use dsz_common::sink::{Sink, TIMESTAMP_FORMAT};
use dsz_common::Result;
use std::time::Duration;

/// Render the summary line for a finished run
pub fn summary_line(finished_at: DateTime<Local>, elapsed: Duration, products: u64) -> String {
    format!(
        "[{}] SUCCESS | Duration: {} | Products: {}",
        finished_at.format(TIMESTAMP_FORMAT),
        format_run_duration(elapsed),
        products
    )
}

/// Append a success line for a run that just finished
pub fn record_success(sink: &dyn Sink, elapsed: Duration, products: u64) -> Result<()> {
    sink.append(&summary_line(Local::now(), elapsed, products))
}
