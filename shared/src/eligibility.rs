//! Edit-window arithmetic and the pending/attended split of a citizen's reports.
//!
//! Everything here is pure: callers pass `now` explicitly so results can be
//! recomputed on every timer tick and reproduced in tests.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{RecordedAt, Report, ReportStatus};
use crate::EDIT_WINDOW_MINUTES;

/// Whole minutes between `recorded` (read as wall-clock time in `now`'s zone) and `now`.
///
/// Floors toward negative infinity, so a report stamped in the future yields a
/// negative value. Returns `None` when the date or time does not parse or the
/// local time does not exist (a DST gap).
pub fn elapsed_minutes_at<Tz: TimeZone>(recorded: &RecordedAt, now: &DateTime<Tz>) -> Option<i64> {
    let naive = recorded.to_naive()?;
    let filed = now.timezone().from_local_datetime(&naive).earliest()?;
    let millis = now
        .naive_utc()
        .signed_duration_since(filed.naive_utc())
        .num_milliseconds();
    Some(millis.div_euclid(60_000))
}

pub fn elapsed_minutes(recorded: &RecordedAt, now: &DateTime<Local>) -> Option<i64> {
    elapsed_minutes_at(recorded, now)
}

/// Derived per-report edit affordance. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EditEligibility {
    pub can_edit: bool,
    pub minutes_remaining: u32,
}

impl EditEligibility {
    pub const INELIGIBLE: Self = Self {
        can_edit: false,
        minutes_remaining: 0,
    };
}

#[must_use]
pub fn eligibility_for_elapsed(elapsed: Option<i64>, was_modified: bool) -> EditEligibility {
    match elapsed {
        Some(minutes) if !was_modified && (0..EDIT_WINDOW_MINUTES).contains(&minutes) => {
            EditEligibility {
                can_edit: true,
                minutes_remaining: u32::try_from(EDIT_WINDOW_MINUTES - minutes).unwrap_or(0),
            }
        }
        _ => EditEligibility::INELIGIBLE,
    }
}

/// Edit eligibility of a report at `now`. Anything not pending is ineligible.
pub fn evaluate<Tz: TimeZone>(report: &Report, now: &DateTime<Tz>) -> EditEligibility {
    if !report.status.is_pending() {
        return EditEligibility::INELIGIBLE;
    }
    eligibility_for_elapsed(elapsed_minutes_at(&report.recorded, now), report.was_modified)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedReport {
    pub report: Report,
    pub eligibility: EditEligibility,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partitioned {
    pub attended: Vec<Report>,
    pub pending: Vec<AnnotatedReport>,
}

impl Partitioned {
    #[must_use]
    pub fn len(&self) -> usize {
        self.attended.len() + self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attended.is_empty() && self.pending.is_empty()
    }
}

/// Splits reports by status, preserving input order within each group.
///
/// Pending reports are tagged with their eligibility at `now`. Reports whose
/// status is not recognised are dropped.
pub fn partition<Tz, I>(reports: I, now: &DateTime<Tz>) -> Partitioned
where
    Tz: TimeZone,
    I: IntoIterator<Item = Report>,
{
    let mut out = Partitioned::default();
    for report in reports {
        match &report.status {
            ReportStatus::Attended => out.attended.push(report),
            ReportStatus::Pending => {
                let eligibility = evaluate(&report, now);
                out.pending.push(AnnotatedReport {
                    report,
                    eligibility,
                });
            }
            ReportStatus::Unrecognized(raw) => {
                warn!(report_id = %report.id, status = %raw, "dropping report with unrecognised status");
            }
        }
    }
    out
}

/// Recomputes eligibility in place.
pub fn reevaluate<Tz: TimeZone>(pending: &mut [AnnotatedReport], now: &DateTime<Tz>) {
    for entry in pending {
        entry.eligibility = evaluate(&entry.report, now);
    }
}
