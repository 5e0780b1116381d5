use secrecy::SecretString;

use crate::api::Endpoint;
use crate::capabilities::{HttpResult, KvResult};
use crate::model::ReportDraft;
use crate::ReportId;

/// Why a key-value operation was issued, so its result can be routed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KvPurpose {
    RestoreProfile,
    StoreProfile,
    ClearProfile,
}

impl KvPurpose {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RestoreProfile => "restore_profile",
            Self::StoreProfile => "store_profile",
            Self::ClearProfile => "clear_profile",
        }
    }
}

#[derive(Debug, Default)]
pub enum Event {
    #[default]
    Noop,

    AppStarted,
    LoginRequested {
        email: String,
        password: SecretString,
        push_token: Option<String>,
    },
    LogoutRequested,

    HistoryOpened,
    HistoryClosed,
    RefreshRequested,
    RefreshTick,

    EditRequested {
        report_id: ReportId,
    },
    EditSubmitted(ReportDraft),
    EditCancelled,

    ReportSubmitted(ReportDraft),
    AttendRequested {
        report_id: ReportId,
    },

    DismissError,
    DismissToast,

    HttpResponse {
        endpoint: Endpoint,
        result: Box<HttpResult>,
    },
    KvResponse {
        purpose: KvPurpose,
        result: Box<KvResult>,
    },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::AppStarted => "app_started",
            Self::LoginRequested { .. } => "login_requested",
            Self::LogoutRequested => "logout_requested",
            Self::HistoryOpened => "history_opened",
            Self::HistoryClosed => "history_closed",
            Self::RefreshRequested => "refresh_requested",
            Self::RefreshTick => "refresh_tick",
            Self::EditRequested { .. } => "edit_requested",
            Self::EditSubmitted(_) => "edit_submitted",
            Self::EditCancelled => "edit_cancelled",
            Self::ReportSubmitted(_) => "report_submitted",
            Self::AttendRequested { .. } => "attend_requested",
            Self::DismissError => "dismiss_error",
            Self::DismissToast => "dismiss_toast",
            Self::HttpResponse { .. } => "http_response",
            Self::KvResponse { .. } => "kv_response",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::LoginRequested { .. }
                | Self::LogoutRequested
                | Self::HistoryOpened
                | Self::HistoryClosed
                | Self::RefreshRequested
                | Self::EditRequested { .. }
                | Self::EditSubmitted(_)
                | Self::EditCancelled
                | Self::ReportSubmitted(_)
                | Self::AttendRequested { .. }
                | Self::DismissError
                | Self::DismissToast
        )
    }
}
