use serde::{Deserialize, Serialize};

use crate::eligibility::AnnotatedReport;
use crate::model::{
    AppState, EditPhase, EditSession, Model, RecordedAt, Report, ReportDraft, Role, ToastKind,
    ToastMessage,
};
use crate::{AppError, ErrorSeverity, ReportId, EDIT_WINDOW_MINUTES};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserFacingError {
    pub message: String,
    pub is_transient: bool,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            is_transient: e.severity == ErrorSeverity::Transient,
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToastView {
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

impl From<&ToastMessage> for ToastView {
    fn from(t: &ToastMessage) -> Self {
        Self {
            message: t.message.clone(),
            kind: t.kind,
            duration_ms: t.kind.default_duration_ms(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingRow {
    pub id: ReportId,
    pub location: String,
    pub kind_label: String,
    pub date_label: String,
    pub time_label: String,
    pub can_edit: bool,
    pub minutes_remaining: u32,
    pub was_modified: bool,
    pub edit_hint: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttendedRow {
    pub id: ReportId,
    pub location: String,
    pub kind_label: String,
    pub date_label: String,
    pub time_label: String,
    pub police_module: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryView {
    /// True until the first fetch settles.
    pub is_loading: bool,
    pub is_refreshing: bool,
    pub attended: Vec<AttendedRow>,
    pub pending: Vec<PendingRow>,
    pub notice: Option<String>,
    pub last_refreshed: Option<String>,
}

/// A case on the officer's board. Officers see the full description and who
/// filed it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseRow {
    pub id: ReportId,
    pub description: String,
    pub location: String,
    pub kind_label: String,
    pub date_label: String,
    pub time_label: String,
    pub reporter: Option<String>,
    pub evidence_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseBoardView {
    pub is_loading: bool,
    pub is_refreshing: bool,
    pub pending: Vec<CaseRow>,
    pub attended: Vec<CaseRow>,
    pub notice: Option<String>,
    pub last_refreshed: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditView {
    pub report_id: ReportId,
    pub phase: EditPhase,
    /// Prefilled form values, present once the report has loaded.
    pub draft: Option<ReportDraft>,
    pub is_saving: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewState {
    Loading,
    Login {
        is_authenticating: bool,
    },
    CitizenHome {
        history: Option<HistoryView>,
        edit: Option<EditView>,
        is_submitting: bool,
    },
    OfficerHome {
        module: Option<String>,
        attending: Option<ReportId>,
        cases: Option<CaseBoardView>,
    },
    AdminHome,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViewModel {
    pub state: ViewState,
    pub error: Option<UserFacingError>,
    pub toast: Option<ToastView>,
    pub is_authenticated: bool,
    pub display_name: Option<String>,
}

impl ViewModel {
    #[must_use]
    pub fn history(&self) -> Option<&HistoryView> {
        match &self.state {
            ViewState::CitizenHome { history, .. } => history.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn cases(&self) -> Option<&CaseBoardView> {
        match &self.state {
            ViewState::OfficerHome { cases, .. } => cases.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn edit(&self) -> Option<&EditView> {
        match &self.state {
            ViewState::CitizenHome { edit, .. } => edit.as_ref(),
            _ => None,
        }
    }
}

fn date_label(recorded: &RecordedAt) -> String {
    recorded.parse_date().map_or_else(
        || recorded.date.clone(),
        |d| d.format("%B %-d, %Y").to_string(),
    )
}

fn time_label(recorded: &RecordedAt) -> String {
    recorded.parse_time().map_or_else(
        || recorded.time.clone(),
        |t| t.format("%H:%M").to_string(),
    )
}

fn edit_hint(entry: &AnnotatedReport) -> String {
    if entry.report.was_modified {
        "Already edited".into()
    } else if entry.eligibility.can_edit {
        match entry.eligibility.minutes_remaining {
            1 => "Editable for 1 more minute".into(),
            n => format!("Editable for {n} more minutes"),
        }
    } else {
        format!("Edit window of {EDIT_WINDOW_MINUTES} minutes has closed")
    }
}

fn pending_row(entry: &AnnotatedReport) -> PendingRow {
    let report = &entry.report;
    PendingRow {
        id: report.id,
        location: report.location.clone(),
        kind_label: report.kind.label().into(),
        date_label: date_label(&report.recorded),
        time_label: time_label(&report.recorded),
        can_edit: entry.eligibility.can_edit,
        minutes_remaining: entry.eligibility.minutes_remaining,
        was_modified: report.was_modified,
        edit_hint: edit_hint(entry),
    }
}

fn attended_row(report: &Report) -> AttendedRow {
    AttendedRow {
        id: report.id,
        location: report.location.clone(),
        kind_label: report.kind.label().into(),
        date_label: date_label(&report.recorded),
        time_label: time_label(&report.recorded),
        police_module: report.police_module.clone(),
    }
}

fn case_row(report: &Report) -> CaseRow {
    CaseRow {
        id: report.id,
        description: report.description.clone(),
        location: report.location.clone(),
        kind_label: report.kind.label().into(),
        date_label: date_label(&report.recorded),
        time_label: time_label(&report.recorded),
        reporter: report.reporter_name.clone(),
        evidence_url: report.evidence_url.clone(),
    }
}

fn case_board(model: &Model) -> Option<CaseBoardView> {
    let history = &model.history;
    if !history.is_mounted() {
        return None;
    }
    Some(CaseBoardView {
        is_loading: !history.has_loaded(),
        is_refreshing: history.is_fetching() && history.has_loaded(),
        pending: history.pending().iter().map(|a| case_row(&a.report)).collect(),
        attended: history.attended().iter().map(case_row).collect(),
        notice: history.notice().map(str::to_string),
        last_refreshed: history.last_refreshed().map(|t| t.to_rfc3339()),
    })
}

fn history_view(model: &Model) -> Option<HistoryView> {
    let history = &model.history;
    if !history.is_mounted() {
        return None;
    }
    Some(HistoryView {
        is_loading: !history.has_loaded(),
        is_refreshing: history.is_fetching() && history.has_loaded(),
        attended: history.attended().iter().map(attended_row).collect(),
        pending: history.pending().iter().map(pending_row).collect(),
        notice: history.notice().map(str::to_string),
        last_refreshed: history.last_refreshed().map(|t| t.to_rfc3339()),
    })
}

fn edit_view(session: &EditSession) -> EditView {
    EditView {
        report_id: session.report_id,
        phase: session.phase,
        draft: session
            .submitted
            .clone()
            .or_else(|| session.original.as_ref().map(ReportDraft::from_report)),
        is_saving: session.phase == EditPhase::Saving,
    }
}

pub(crate) fn build(model: &Model) -> ViewModel {
    let state = match (model.state, &model.role) {
        (AppState::Loading, _) => ViewState::Loading,
        (AppState::Unauthenticated, _) | (AppState::Ready, None) => ViewState::Login {
            is_authenticating: false,
        },
        (AppState::Authenticating, _) => ViewState::Login {
            is_authenticating: true,
        },
        (AppState::Ready, Some(Role::Citizen(_))) => ViewState::CitizenHome {
            history: history_view(model),
            edit: model.edit.as_ref().map(edit_view),
            is_submitting: model.is_submitting,
        },
        (AppState::Ready, Some(Role::Officer { module, .. })) => ViewState::OfficerHome {
            module: module.clone(),
            attending: model.attending,
            cases: case_board(model),
        },
        (AppState::Ready, Some(Role::Admin(_))) => ViewState::AdminHome,
    };

    ViewModel {
        state,
        error: model.active_error.as_ref().map(UserFacingError::from),
        toast: model.active_toast.as_ref().map(ToastView::from),
        is_authenticated: model.is_authenticated(),
        display_name: model
            .profile
            .as_ref()
            .map(crate::model::UserProfile::display_name)
            .filter(|name| !name.is_empty()),
    }
}
