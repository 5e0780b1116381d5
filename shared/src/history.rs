//! State container for the report list screens: a citizen's own history and
//! an officer's case board.
//!
//! The screen moves through `Idle -> Fetching -> Idle`. Each fetch is stamped
//! with a generation; responses for an older generation, or arriving after the
//! screen unmounted, are discarded.

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::eligibility::{self, AnnotatedReport, Partitioned};
use crate::model::{Report, ReportDraft, ReportStatus, Role};
use crate::{AppError, CitizenId, OfficerId, ReportId};

/// Whose reports a list shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListOwner {
    Citizen(CitizenId),
    Officer(OfficerId),
}

impl ListOwner {
    /// Admins have no report list.
    #[must_use]
    pub fn for_role(role: &Role) -> Option<Self> {
        match role {
            Role::Citizen(id) => Some(Self::Citizen(*id)),
            Role::Officer { id, .. } => Some(Self::Officer(*id)),
            Role::Admin(_) => None,
        }
    }

    /// The citizen a listed report belongs to when the record omits it.
    #[must_use]
    pub const fn citizen(self) -> Option<CitizenId> {
        match self {
            Self::Citizen(id) => Some(id),
            Self::Officer(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Mount,
    Timer,
    Manual,
}

/// The two collections fetched for every refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Half {
    Pending,
    Attended,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryAction {
    Mount { owner: ListOwner },
    Unmount,
    Trigger(RefreshTrigger),
    HalfLoaded {
        generation: u64,
        half: Half,
        result: Result<Vec<Report>, AppError>,
    },
    Reevaluate,
    EditConfirmed {
        report_id: ReportId,
        draft: ReportDraft,
    },
    /// An officer's attend was accepted; the case moves to the attended list.
    AttendConfirmed { report_id: ReportId },
    DismissNotice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing observable changed.
    Unchanged,
    /// Issue both collection requests for this generation.
    FetchStarted { generation: u64, owner: ListOwner },
    /// A fetch was already in flight; only eligibility was refreshed.
    Coalesced,
    Updated,
    Completed { failed_halves: usize },
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
struct InFlight {
    generation: u64,
    trigger: RefreshTrigger,
    pending: Option<Vec<Report>>,
    attended: Option<Vec<Report>>,
    failed_halves: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
enum FetchPhase {
    #[default]
    Idle,
    Fetching(InFlight),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryState {
    /// Open screens showing this list. Only the last close unmounts it.
    mounts: u32,
    owner: Option<ListOwner>,
    generation: u64,
    phase: FetchPhase,
    lists: Partitioned,
    loaded_once: bool,
    last_refreshed: Option<DateTime<Utc>>,
    notice: Option<String>,
}

impl HistoryState {
    pub fn apply<Tz: TimeZone>(&mut self, action: HistoryAction, now: &DateTime<Tz>) -> Transition {
        match action {
            HistoryAction::Mount { owner } => {
                if self.mounts > 0 && self.owner != Some(owner) {
                    self.reset();
                }
                self.mounts += 1;
                self.owner = Some(owner);
                self.trigger(RefreshTrigger::Mount, now)
            }
            HistoryAction::Unmount => match self.mounts {
                0 => Transition::Unchanged,
                1 => {
                    self.reset();
                    Transition::Updated
                }
                _ => {
                    self.mounts -= 1;
                    debug!(remaining = self.mounts, "history still open elsewhere");
                    Transition::Unchanged
                }
            },
            HistoryAction::Trigger(trigger) => {
                if self.mounts == 0 {
                    return Transition::Unchanged;
                }
                self.trigger(trigger, now)
            }
            HistoryAction::HalfLoaded {
                generation,
                half,
                result,
            } => self.half_loaded(generation, half, result, now),
            HistoryAction::Reevaluate => {
                eligibility::reevaluate(&mut self.lists.pending, now);
                Transition::Updated
            }
            HistoryAction::EditConfirmed { report_id, draft } => {
                let Some(entry) = self
                    .lists
                    .pending
                    .iter_mut()
                    .find(|a| a.report.id == report_id)
                else {
                    return Transition::Unchanged;
                };
                entry.report.apply_edit(&draft);
                entry.eligibility = eligibility::evaluate(&entry.report, now);
                Transition::Updated
            }
            HistoryAction::AttendConfirmed { report_id } => {
                let Some(index) = self
                    .lists
                    .pending
                    .iter()
                    .position(|a| a.report.id == report_id)
                else {
                    return Transition::Unchanged;
                };
                let mut report = self.lists.pending.remove(index).report;
                report.status = ReportStatus::Attended;
                self.lists.attended.insert(0, report);
                Transition::Updated
            }
            HistoryAction::DismissNotice => {
                if self.notice.take().is_some() {
                    Transition::Updated
                } else {
                    Transition::Unchanged
                }
            }
        }
    }

    /// Unmounts and clears everything except the generation counter.
    pub fn reset(&mut self) {
        // Bumping the generation orphans any in-flight responses.
        self.generation += 1;
        *self = Self {
            generation: self.generation,
            ..Self::default()
        };
    }

    fn trigger<Tz: TimeZone>(&mut self, trigger: RefreshTrigger, now: &DateTime<Tz>) -> Transition {
        eligibility::reevaluate(&mut self.lists.pending, now);

        if let FetchPhase::Fetching(in_flight) = &self.phase {
            debug!(
                generation = in_flight.generation,
                ?trigger,
                "refresh already in flight, coalescing"
            );
            return Transition::Coalesced;
        }

        let Some(owner) = self.owner else {
            return Transition::Unchanged;
        };

        self.generation += 1;
        self.phase = FetchPhase::Fetching(InFlight {
            generation: self.generation,
            trigger,
            pending: None,
            attended: None,
            failed_halves: 0,
        });
        if trigger == RefreshTrigger::Manual {
            self.notice = None;
        }

        Transition::FetchStarted {
            generation: self.generation,
            owner,
        }
    }

    fn half_loaded<Tz: TimeZone>(
        &mut self,
        generation: u64,
        half: Half,
        result: Result<Vec<Report>, AppError>,
        now: &DateTime<Tz>,
    ) -> Transition {
        if self.mounts == 0 {
            debug!(generation, ?half, "history unmounted, discarding response");
            return Transition::Discarded;
        }
        let FetchPhase::Fetching(in_flight) = &mut self.phase else {
            return Transition::Discarded;
        };
        if in_flight.generation != generation {
            debug!(
                generation,
                current = in_flight.generation,
                "stale history response"
            );
            return Transition::Discarded;
        }

        let reports = match result {
            Ok(reports) => reports,
            Err(error) => {
                warn!(?half, code = error.code(), error = %error, "history half failed, showing it empty");
                in_flight.failed_halves += 1;
                Vec::new()
            }
        };
        match half {
            Half::Pending => in_flight.pending = Some(reports),
            Half::Attended => in_flight.attended = Some(reports),
        }

        if in_flight.pending.is_none() || in_flight.attended.is_none() {
            return Transition::Updated;
        }

        let FetchPhase::Fetching(done) = std::mem::take(&mut self.phase) else {
            return Transition::Unchanged;
        };
        let failed_halves = done.failed_halves;
        let records = done
            .attended
            .into_iter()
            .flatten()
            .chain(done.pending.into_iter().flatten());

        self.lists = eligibility::partition(records, now);
        self.loaded_once = true;
        self.last_refreshed = Some(now.with_timezone(&Utc));

        if failed_halves > 0 && done.trigger == RefreshTrigger::Manual {
            self.notice = Some("Some reports could not be refreshed. Pull down to try again.".into());
        }

        info!(
            generation,
            attended = self.lists.attended.len(),
            pending = self.lists.pending.len(),
            failed_halves,
            "history refreshed"
        );
        Transition::Completed { failed_halves }
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounts > 0
    }

    #[must_use]
    pub fn owner(&self) -> Option<ListOwner> {
        self.owner
    }

    #[must_use]
    pub fn is_fetching(&self) -> bool {
        matches!(self.phase, FetchPhase::Fetching(_))
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn has_loaded(&self) -> bool {
        self.loaded_once
    }

    #[must_use]
    pub fn attended(&self) -> &[Report] {
        &self.lists.attended
    }

    #[must_use]
    pub fn pending(&self) -> &[AnnotatedReport] {
        &self.lists.pending
    }

    #[must_use]
    pub fn find_pending(&self, id: ReportId) -> Option<&AnnotatedReport> {
        self.lists.pending.iter().find(|a| a.report.id == id)
    }

    #[must_use]
    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed
    }

    #[must_use]
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }
}
