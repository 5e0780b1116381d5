use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::history::HistoryState;
use crate::{
    AdminId, AppError, CitizenId, OfficerId, ReportId, ValidationError, MAX_DESCRIPTION_LENGTH,
    MAX_LOCATION_LENGTH,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportKind {
    #[serde(rename = "ASESINATO")]
    Homicide,
    #[serde(rename = "ASALTO")]
    Assault,
    #[serde(rename = "ACCIDENTE_TRANSITO")]
    TrafficAccident,
    #[serde(rename = "VIOLENCIA_DOMESTICA")]
    DomesticViolence,
    #[serde(rename = "DISTURBIO_PUBLICO")]
    PublicDisturbance,
    #[default]
    #[serde(rename = "OTRO")]
    Other,
}

impl ReportKind {
    pub const ALL: [ReportKind; 6] = [
        Self::Homicide,
        Self::Assault,
        Self::TrafficAccident,
        Self::DomesticViolence,
        Self::PublicDisturbance,
        Self::Other,
    ];

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Homicide => "ASESINATO",
            Self::Assault => "ASALTO",
            Self::TrafficAccident => "ACCIDENTE_TRANSITO",
            Self::DomesticViolence => "VIOLENCIA_DOMESTICA",
            Self::PublicDisturbance => "DISTURBIO_PUBLICO",
            Self::Other => "OTRO",
        }
    }

    /// Unknown codes fall back to `Other`.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.code().eq_ignore_ascii_case(code))
            .unwrap_or(Self::Other)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Homicide => "Homicide",
            Self::Assault => "Assault",
            Self::TrafficAccident => "Traffic accident",
            Self::DomesticViolence => "Domestic violence",
            Self::PublicDisturbance => "Public disturbance",
            Self::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportStatus {
    Pending,
    Attended,
    Unrecognized(String),
}

impl ReportStatus {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDIENTE" | "PENDING" => Self::Pending,
            "ATENDIDO" | "ATENDIDA" | "ATTENDED" => Self::Attended,
            _ => Self::Unrecognized(raw.to_string()),
        }
    }

    #[must_use]
    pub fn wire_code(&self) -> &str {
        match self {
            Self::Pending => "PENDIENTE",
            Self::Attended => "ATENDIDO",
            Self::Unrecognized(raw) => raw,
        }
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// When a report was filed, kept as the raw strings the backend returned.
///
/// Parsing is deferred so that a malformed date only makes the report
/// non-editable instead of dropping it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordedAt {
    pub date: String,
    pub time: String,
}

impl RecordedAt {
    pub fn new(date: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            time: time.into(),
        }
    }

    pub fn from_naive(at: NaiveDateTime) -> Self {
        Self {
            date: at.format("%Y-%m-%d").to_string(),
            time: at.format("%H:%M:%S").to_string(),
        }
    }

    /// Date portion only; an ISO `T...` suffix is ignored.
    #[must_use]
    pub fn parse_date(&self) -> Option<NaiveDate> {
        let date = self.date.split('T').next()?.trim();
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
    }

    #[must_use]
    pub fn parse_time(&self) -> Option<NaiveTime> {
        let time = self.time.trim();
        NaiveTime::parse_from_str(time, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M"))
            .ok()
    }

    #[must_use]
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        Some(self.parse_date()?.and_time(self.parse_time()?))
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub description: String,
    pub kind: ReportKind,
    pub location: String,
    pub police_module: Option<String>,
    pub recorded: RecordedAt,
    pub evidence_url: Option<String>,
    pub status: ReportStatus,
    pub was_modified: bool,
    /// Absent on officer case lists, which name the reporter instead.
    pub citizen_id: Option<CitizenId>,
    pub reporter_name: Option<String>,
}

impl Report {
    /// Applies a confirmed edit. The modified flag never reverts.
    pub fn apply_edit(&mut self, draft: &ReportDraft) {
        self.description.clone_from(&draft.description);
        self.kind = draft.kind;
        self.location.clone_from(&draft.location);
        self.police_module.clone_from(&draft.police_module);
        self.evidence_url.clone_from(&draft.evidence_url);
        self.was_modified = true;
    }
}

// Descriptions and evidence links are user-provided; keep them out of logs.
impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("recorded", &self.recorded)
            .field("was_modified", &self.was_modified)
            .field("citizen_id", &self.citizen_id)
            .field("description_len", &self.description.len())
            .field("evidence_present", &self.evidence_url.is_some())
            .finish_non_exhaustive()
    }
}

/// User-editable fields of a report, shared by the edit and submit forms.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportDraft {
    pub description: String,
    pub kind: ReportKind,
    pub location: String,
    pub police_module: Option<String>,
    pub evidence_url: Option<String>,
}

impl ReportDraft {
    #[must_use]
    pub fn from_report(report: &Report) -> Self {
        Self {
            description: report.description.clone(),
            kind: report.kind,
            location: report.location.clone(),
            police_module: report.police_module.clone(),
            evidence_url: report.evidence_url.clone(),
        }
    }

    /// Trims text fields and turns blank optionals into `None`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.description = self.description.trim().to_string();
        self.location = self.location.trim().to_string();
        self.police_module = self
            .police_module
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        self.evidence_url = self
            .evidence_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.description.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "description",
            });
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(ValidationError::TooLong {
                field: "description",
                max: MAX_DESCRIPTION_LENGTH,
            });
        }
        if self.location.trim().is_empty() {
            return Err(ValidationError::Required { field: "location" });
        }
        if self.location.chars().count() > MAX_LOCATION_LENGTH {
            return Err(ValidationError::TooLong {
                field: "location",
                max: MAX_LOCATION_LENGTH,
            });
        }
        if self
            .police_module
            .as_deref()
            .map_or(true, |m| m.trim().is_empty())
        {
            return Err(ValidationError::Required {
                field: "police_module",
            });
        }
        if let Some(url) = self.evidence_url.as_deref().filter(|u| !u.trim().is_empty()) {
            let parsed = url::Url::parse(url.trim()).ok();
            if !parsed.is_some_and(|u| matches!(u.scheme(), "http" | "https")) {
                return Err(ValidationError::InvalidFormat {
                    field: "evidence_url",
                    value: url.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// The `usuario` object returned by login and cached on the device.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub id_ciudadano: Option<CitizenId>,
    pub id_policia: Option<OfficerId>,
    pub id_admin: Option<AdminId>,
    pub nombres: Option<String>,
    pub apellido_paterno: Option<String>,
    pub apellido_materno: Option<String>,
    pub correo: Option<String>,
    pub modulo_epi: Option<String>,
}

impl UserProfile {
    #[must_use]
    pub fn display_name(&self) -> String {
        [
            self.nombres.as_deref(),
            self.apellido_paterno.as_deref(),
            self.apellido_materno.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

impl fmt::Debug for UserProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserProfile")
            .field("id_ciudadano", &self.id_ciudadano)
            .field("id_policia", &self.id_policia)
            .field("id_admin", &self.id_admin)
            .field("modulo_epi", &self.modulo_epi)
            .field("correo_present", &self.correo.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Citizen(CitizenId),
    Officer {
        id: OfficerId,
        module: Option<String>,
    },
    Admin(AdminId),
}

impl Role {
    /// Citizen id wins over officer id, which wins over admin id.
    #[must_use]
    pub fn from_profile(profile: &UserProfile) -> Option<Self> {
        if let Some(id) = profile.id_ciudadano {
            return Some(Self::Citizen(id));
        }
        if let Some(id) = profile.id_policia {
            return Some(Self::Officer {
                id,
                module: profile.modulo_epi.clone(),
            });
        }
        profile.id_admin.map(Self::Admin)
    }

    #[must_use]
    pub fn citizen_id(&self) -> Option<CitizenId> {
        match self {
            Self::Citizen(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppState {
    #[default]
    Loading,
    Unauthenticated,
    Authenticating,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditPhase {
    Loading,
    Editing,
    Saving,
}

/// An open edit form for one pending report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub report_id: ReportId,
    pub phase: EditPhase,
    pub original: Option<Report>,
    pub submitted: Option<ReportDraft>,
}

impl EditSession {
    #[must_use]
    pub fn new(report_id: ReportId) -> Self {
        Self {
            report_id,
            phase: EditPhase::Loading,
            original: None,
            submitted: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastMessage {
    pub message: String,
    pub kind: ToastKind,
}

impl ToastMessage {
    #[must_use]
    pub fn new(message: impl Into<String>, kind: ToastKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl ToastKind {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info => 3000,
            Self::Success => 2000,
            Self::Warning => 4000,
            Self::Error => 5000,
        }
    }
}

#[derive(Debug, Default)]
pub struct Model {
    pub state: AppState,
    pub profile: Option<UserProfile>,
    pub role: Option<Role>,
    pub history: HistoryState,
    pub edit: Option<EditSession>,
    pub is_submitting: bool,
    pub attending: Option<ReportId>,
    pub active_error: Option<AppError>,
    pub active_toast: Option<ToastMessage>,
}

impl Model {
    pub fn set_error(&mut self, error: AppError) {
        self.active_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.active_error = None;
    }

    pub fn show_toast(&mut self, message: impl Into<String>, kind: ToastKind) {
        self.active_toast = Some(ToastMessage::new(message, kind));
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.role.is_some()
    }

    #[must_use]
    pub fn citizen_id(&self) -> Option<CitizenId> {
        self.role.as_ref().and_then(Role::citizen_id)
    }

    /// Drops everything tied to the signed-in user.
    pub fn reset_session(&mut self) {
        let mut history = std::mem::take(&mut self.history);
        history.reset();
        *self = Self {
            state: AppState::Unauthenticated,
            history,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> Report {
        Report {
            id: ReportId(1),
            description: "Robo de celular".into(),
            kind: ReportKind::Assault,
            location: "Av. Blanco Galindo".into(),
            police_module: Some("EPI_N5_Alalay".into()),
            recorded: RecordedAt::new("2024-05-01", "10:00"),
            evidence_url: None,
            status: ReportStatus::Pending,
            was_modified: false,
            citizen_id: Some(CitizenId(3)),
            reporter_name: None,
        }
    }

    mod kind_tests {
        use super::*;

        #[test]
        fn test_codes_roundtrip_and_unknown_fallback() {
            for kind in ReportKind::ALL {
                assert_eq!(ReportKind::from_code(kind.code()), kind);
            }
            assert_eq!(ReportKind::from_code("asalto"), ReportKind::Assault);
            assert_eq!(ReportKind::from_code("INCENDIO"), ReportKind::Other);
            assert_eq!(ReportKind::from_code(""), ReportKind::Other);
        }

        #[test]
        fn test_serde_uses_wire_codes() {
            let json = serde_json::to_string(&ReportKind::TrafficAccident).unwrap();
            assert_eq!(json, "\"ACCIDENTE_TRANSITO\"");
        }
    }

    mod status_tests {
        use super::*;

        #[test]
        fn test_parse_variants() {
            assert_eq!(ReportStatus::parse("PENDIENTE"), ReportStatus::Pending);
            assert_eq!(ReportStatus::parse(" pendiente "), ReportStatus::Pending);
            assert_eq!(ReportStatus::parse("PENDING"), ReportStatus::Pending);
            assert_eq!(ReportStatus::parse("Atendido"), ReportStatus::Attended);
            assert_eq!(ReportStatus::parse("ATENDIDA"), ReportStatus::Attended);
            assert_eq!(
                ReportStatus::parse("ARCHIVADO"),
                ReportStatus::Unrecognized("ARCHIVADO".into())
            );
        }
    }

    mod recorded_at_tests {
        use super::*;

        #[test]
        fn test_iso_suffix_is_ignored() {
            let at = RecordedAt::new("2024-05-01T00:00:00.000Z", "14:30");
            let naive = at.to_naive().unwrap();
            assert_eq!(naive.format("%Y-%m-%d %H:%M").to_string(), "2024-05-01 14:30");
        }

        #[test]
        fn test_seconds_accepted() {
            let at = RecordedAt::new("2024-05-01", "14:30:15");
            assert_eq!(at.to_naive().unwrap().format("%S").to_string(), "15");
        }

        #[test]
        fn test_garbage_is_none() {
            assert!(RecordedAt::new("yesterday", "14:30").to_naive().is_none());
            assert!(RecordedAt::new("2024-05-01", "25:61").to_naive().is_none());
            assert!(RecordedAt::new("", "").to_naive().is_none());
        }
    }

    mod report_tests {
        use super::*;

        #[test]
        fn test_apply_edit_marks_modified() {
            let mut r = report();
            let draft = ReportDraft {
                description: "Robo de mochila".into(),
                ..ReportDraft::from_report(&r)
            };
            r.apply_edit(&draft);
            assert!(r.was_modified);
            assert_eq!(r.description, "Robo de mochila");
            assert_eq!(r.status, ReportStatus::Pending);
        }

        #[test]
        fn test_debug_redacts_description() {
            let rendered = format!("{:?}", report());
            assert!(!rendered.contains("celular"));
            assert!(rendered.contains("description_len"));
        }
    }

    mod draft_tests {
        use super::*;

        fn draft() -> ReportDraft {
            ReportDraft::from_report(&report())
        }

        #[test]
        fn test_valid_draft() {
            assert!(draft().validate().is_ok());
        }

        #[test]
        fn test_required_fields() {
            let d = ReportDraft {
                description: "   ".into(),
                ..draft()
            };
            assert_eq!(
                d.validate(),
                Err(ValidationError::Required {
                    field: "description"
                })
            );

            let d = ReportDraft {
                location: String::new(),
                ..draft()
            };
            assert_eq!(
                d.validate(),
                Err(ValidationError::Required { field: "location" })
            );

            let d = ReportDraft {
                police_module: None,
                ..draft()
            };
            assert_eq!(
                d.validate(),
                Err(ValidationError::Required {
                    field: "police_module"
                })
            );
        }

        #[test]
        fn test_evidence_must_be_http_url() {
            let d = ReportDraft {
                evidence_url: Some("file:///tmp/x.jpg".into()),
                ..draft()
            };
            assert!(matches!(
                d.validate(),
                Err(ValidationError::InvalidFormat { .. })
            ));

            let d = ReportDraft {
                evidence_url: Some("https://img.example.com/x.jpg".into()),
                ..draft()
            };
            assert!(d.validate().is_ok());
        }

        #[test]
        fn test_normalized_trims_and_blanks() {
            let d = ReportDraft {
                description: "  hola ".into(),
                evidence_url: Some("  ".into()),
                police_module: Some(" EPI_N5_Alalay ".into()),
                ..draft()
            }
            .normalized();
            assert_eq!(d.description, "hola");
            assert_eq!(d.evidence_url, None);
            assert_eq!(d.police_module.as_deref(), Some("EPI_N5_Alalay"));
        }
    }

    mod role_tests {
        use super::*;

        #[test]
        fn test_role_precedence() {
            let profile = UserProfile {
                id_ciudadano: Some(CitizenId(1)),
                id_policia: Some(OfficerId(2)),
                id_admin: Some(AdminId(3)),
                ..UserProfile::default()
            };
            assert_eq!(Role::from_profile(&profile), Some(Role::Citizen(CitizenId(1))));

            let profile = UserProfile {
                id_policia: Some(OfficerId(2)),
                id_admin: Some(AdminId(3)),
                modulo_epi: Some("EPI_N5_Alalay".into()),
                ..UserProfile::default()
            };
            assert_eq!(
                Role::from_profile(&profile),
                Some(Role::Officer {
                    id: OfficerId(2),
                    module: Some("EPI_N5_Alalay".into())
                })
            );

            let profile = UserProfile {
                id_admin: Some(AdminId(3)),
                ..UserProfile::default()
            };
            assert_eq!(Role::from_profile(&profile), Some(Role::Admin(AdminId(3))));
            assert_eq!(Role::from_profile(&UserProfile::default()), None);
        }

        #[test]
        fn test_profile_wire_names() {
            let json = r#"{"id_ciudadano":5,"nombres":"Ana","apellido_paterno":"Rojas","correo":"ana@example.com"}"#;
            let profile: UserProfile = serde_json::from_str(json).unwrap();
            assert_eq!(profile.id_ciudadano, Some(CitizenId(5)));
            assert_eq!(profile.display_name(), "Ana Rojas");
            assert!(!format!("{profile:?}").contains("ana@example.com"));
        }
    }
}
