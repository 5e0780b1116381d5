//! The backend's HTTP surface: routes, request bodies, and tolerant decoding
//! of report payloads into domain types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::capabilities::{HttpMethod, HttpResult};
use crate::history::{Half, ListOwner};
use crate::model::{RecordedAt, Report, ReportDraft, ReportKind, ReportStatus, UserProfile};
use crate::{AppError, CitizenId, ErrorKind, ReportId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Login,
    Reports {
        half: Half,
        owner: ListOwner,
        generation: u64,
    },
    ReportDetail(ReportId),
    UpdateReport(ReportId),
    SubmitReport,
    AttendReport(ReportId),
}

impl Endpoint {
    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        match self {
            Self::Reports { .. } | Self::ReportDetail(_) => HttpMethod::Get,
            Self::UpdateReport(_) => HttpMethod::Put,
            Self::Login | Self::SubmitReport | Self::AttendReport(_) => HttpMethod::Post,
        }
    }

    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Login => "/login".into(),
            Self::Reports { half, owner, .. } => match (owner, half) {
                (ListOwner::Citizen(id), Half::Pending) => {
                    format!("/denunciasUsuario/pendientes/{id}")
                }
                (ListOwner::Citizen(id), Half::Attended) => {
                    format!("/denunciasUsuario/atendidas/{id}")
                }
                (ListOwner::Officer(id), Half::Pending) => {
                    format!("/casosPendientes?idPolicia={id}")
                }
                (ListOwner::Officer(id), Half::Attended) => {
                    format!("/denunciasAtendidas?idPolicia={id}")
                }
            },
            Self::ReportDetail(id) | Self::UpdateReport(id) => format!("/denuncia/{id}"),
            Self::SubmitReport => "/denuncias".into(),
            Self::AttendReport(_) => "/atenderDenuncia".into(),
        }
    }

    /// Whether the request changes server state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::UpdateReport(_) | Self::SubmitReport | Self::AttendReport(_)
        )
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Reports {
                half: Half::Pending,
                ..
            } => "pending_reports",
            Self::Reports {
                half: Half::Attended,
                ..
            } => "attended_reports",
            Self::ReportDetail(_) => "report_detail",
            Self::UpdateReport(_) => "update_report",
            Self::SubmitReport => "submit_report",
            Self::AttendReport(_) => "attend_report",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("expected a JSON array of reports")]
    NotAnArray,
    #[error("missing or invalid field `{0}`")]
    MissingField(&'static str),
}

impl From<DecodeError> for AppError {
    fn from(e: DecodeError) -> Self {
        AppError::new(ErrorKind::Deserialization, "Invalid server response")
            .with_internal(e.to_string())
    }
}

/// A report as the backend sends it. Every field is optional so one bad
/// record never fails a whole list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireReport {
    pub id_denuncia: Option<Value>,
    pub descripcion: Option<String>,
    pub tipo: Option<String>,
    pub calle_avenida: Option<String>,
    pub modulo_epi: Option<String>,
    pub fecha: Option<String>,
    pub hora: Option<String>,
    pub evidencia: Option<String>,
    pub estado: Option<String>,
    pub fue_modificada: Option<Value>,
    pub id_ciudadano: Option<Value>,
    pub nombre_denunciante: Option<String>,
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "TRUE" | "True"),
        _ => false,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl WireReport {
    /// `fallback_status` applies when `estado` is absent; `owner` when `id_ciudadano` is.
    pub fn into_report(
        self,
        fallback_status: &ReportStatus,
        owner: Option<CitizenId>,
    ) -> Result<Report, DecodeError> {
        let id = self
            .id_denuncia
            .as_ref()
            .and_then(value_as_i64)
            .ok_or(DecodeError::MissingField("id_denuncia"))?;

        let status = match non_blank(self.estado) {
            Some(raw) => ReportStatus::parse(&raw),
            None => fallback_status.clone(),
        };

        Ok(Report {
            id: ReportId(id),
            description: self.descripcion.unwrap_or_default(),
            kind: self
                .tipo
                .as_deref()
                .map_or(ReportKind::Other, ReportKind::from_code),
            location: self.calle_avenida.unwrap_or_default(),
            police_module: non_blank(self.modulo_epi),
            recorded: RecordedAt::new(
                self.fecha.unwrap_or_default(),
                self.hora.unwrap_or_default(),
            ),
            evidence_url: non_blank(self.evidencia),
            status,
            was_modified: self.fue_modificada.as_ref().is_some_and(value_as_flag),
            citizen_id: self
                .id_ciudadano
                .as_ref()
                .and_then(value_as_i64)
                .map(CitizenId)
                .or(owner),
            reporter_name: non_blank(self.nombre_denunciante),
        })
    }
}

impl Half {
    #[must_use]
    pub fn implied_status(self) -> ReportStatus {
        match self {
            Half::Pending => ReportStatus::Pending,
            Half::Attended => ReportStatus::Attended,
        }
    }
}

/// Decodes one collection response. Records that cannot be read are skipped.
pub fn decode_report_list(
    body: &[u8],
    half: Half,
    owner: ListOwner,
) -> Result<Vec<Report>, DecodeError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(DecodeError::NotAnArray);
    };

    let fallback = half.implied_status();
    let mut reports = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let decoded = serde_json::from_value::<WireReport>(item)
            .map_err(|e| DecodeError::Malformed(e.to_string()))
            .and_then(|wire| wire.into_report(&fallback, owner.citizen()));
        match decoded {
            Ok(report) => reports.push(report),
            Err(error) => warn!(?half, index, %error, "skipping unreadable report"),
        }
    }
    Ok(reports)
}

/// Turns a collection response into reports, or the error that made the half empty.
pub fn reports_from_result(
    result: &HttpResult,
    half: Half,
    owner: ListOwner,
) -> Result<Vec<Report>, AppError> {
    match result {
        Ok(response) if response.is_success() => {
            Ok(decode_report_list(response.body(), half, owner)?)
        }
        Ok(response) => Err(AppError::from_http_status(
            response.status(),
            Some(response.body()),
        )),
        Err(error) => Err(AppError::from(error.clone())),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MutationAck {
    pub success: Option<bool>,
    pub message: Option<String>,
}

/// Mutations succeed on any 2xx unless the body explicitly says `success: false`.
pub fn decode_ack(result: &HttpResult) -> Result<(), AppError> {
    let response = match result {
        Ok(response) => response,
        Err(error) => return Err(AppError::from(error.clone())),
    };
    if !response.is_success() {
        return Err(AppError::from_http_status(
            response.status(),
            Some(response.body()),
        ));
    }

    let ack: MutationAck = serde_json::from_slice(response.body()).unwrap_or_default();
    if ack.success == Some(false) {
        let message = non_blank(ack.message)
            .unwrap_or_else(|| "The server rejected the request.".to_string());
        return Err(AppError::new(ErrorKind::Rejected, message));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginResponse {
    pub success: bool,
    pub usuario: Option<UserProfile>,
    pub message: Option<String>,
}

pub fn decode_login(result: &HttpResult) -> Result<UserProfile, AppError> {
    let response = match result {
        Ok(response) => response,
        Err(error) => return Err(AppError::from(error.clone())),
    };

    let parsed: Option<LoginResponse> = serde_json::from_slice(response.body()).ok();
    match parsed {
        Some(LoginResponse {
            success: true,
            usuario: Some(profile),
            ..
        }) if response.is_success() => Ok(profile),
        Some(LoginResponse { message, .. }) if response.status() == 401 || response.is_success() => {
            Err(AppError::new(
                ErrorKind::Authentication,
                non_blank(message).unwrap_or_else(|| "Invalid credentials".into()),
            ))
        }
        _ if response.is_success() => Err(DecodeError::Malformed("login response".into()).into()),
        _ => Err(AppError::from_http_status(
            response.status(),
            Some(response.body()),
        )),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportDetailResponse {
    pub success: bool,
    pub denuncia: Option<WireReport>,
    pub message: Option<String>,
}

pub fn decode_report_detail(result: &HttpResult, owner: CitizenId) -> Result<Report, AppError> {
    let response = match result {
        Ok(response) if response.is_success() => response,
        Ok(response) => {
            return Err(AppError::from_http_status(
                response.status(),
                Some(response.body()),
            ))
        }
        Err(error) => return Err(AppError::from(error.clone())),
    };

    let parsed: ReportDetailResponse = serde_json::from_slice(response.body())
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;
    match parsed {
        ReportDetailResponse {
            success: true,
            denuncia: Some(wire),
            ..
        } => Ok(wire.into_report(&ReportStatus::Pending, Some(owner))?),
        ReportDetailResponse { message, .. } => Err(AppError::new(
            ErrorKind::NotFound,
            non_blank(message).unwrap_or_else(|| "Report not found".into()),
        )),
    }
}

#[derive(Serialize)]
struct LoginBody<'a> {
    correo: &'a str,
    #[serde(rename = "contraseña")]
    contrasena: &'a str,
    #[serde(rename = "pushToken")]
    push_token: Option<&'a str>,
}

#[derive(Serialize)]
struct ReportBody<'a> {
    descripcion: &'a str,
    modulo_epi: Option<&'a str>,
    hora: &'a str,
    fecha: &'a str,
    tipo: &'static str,
    calle_avenida: &'a str,
    evidencia: Option<&'a str>,
}

impl<'a> ReportBody<'a> {
    fn new(draft: &'a ReportDraft, recorded: &'a RecordedAt) -> Self {
        Self {
            descripcion: &draft.description,
            modulo_epi: draft.police_module.as_deref(),
            hora: &recorded.time,
            // The backend stores plain dates; drop any ISO suffix it echoed back.
            fecha: recorded.date.split('T').next().unwrap_or(&recorded.date),
            tipo: draft.kind.code(),
            calle_avenida: &draft.location,
            evidencia: draft.evidence_url.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct NewReportBody<'a> {
    #[serde(flatten)]
    report: ReportBody<'a>,
    estado: &'a str,
    id_ciudadano: CitizenId,
}

#[derive(Serialize)]
struct AttendBody {
    #[serde(rename = "idDenuncia")]
    id_denuncia: ReportId,
}

fn to_json<T: Serialize>(body: &T) -> Result<Vec<u8>, AppError> {
    serde_json::to_vec(body).map_err(|e| {
        AppError::new(ErrorKind::Serialization, "Request could not be encoded")
            .with_internal(e.to_string())
    })
}

pub fn login_body(email: &str, password: &str, push_token: Option<&str>) -> Result<Vec<u8>, AppError> {
    to_json(&LoginBody {
        correo: email,
        contrasena: password,
        push_token,
    })
}

pub fn update_body(draft: &ReportDraft, recorded: &RecordedAt) -> Result<Vec<u8>, AppError> {
    to_json(&ReportBody::new(draft, recorded))
}

pub fn submit_body(
    draft: &ReportDraft,
    recorded: &RecordedAt,
    citizen: CitizenId,
) -> Result<Vec<u8>, AppError> {
    to_json(&NewReportBody {
        report: ReportBody::new(draft, recorded),
        estado: ReportStatus::Pending.wire_code(),
        id_ciudadano: citizen,
    })
}

pub fn attend_body(report_id: ReportId) -> Result<Vec<u8>, AppError> {
    to_json(&AttendBody {
        id_denuncia: report_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{HttpError, HttpResponse};
    use serde_json::json;

    const CITIZEN: CitizenId = CitizenId(12);
    const OWNER: ListOwner = ListOwner::Citizen(CITIZEN);

    fn ok(body: &str) -> HttpResult {
        Ok(HttpResponse::with_body(200, body))
    }

    mod endpoint_tests {
        use super::*;

        #[test]
        fn test_paths_and_methods() {
            let pending = Endpoint::Reports {
                half: Half::Pending,
                owner: OWNER,
                generation: 1,
            };
            assert_eq!(pending.path(), "/denunciasUsuario/pendientes/12");
            assert_eq!(pending.method(), HttpMethod::Get);

            let attended = Endpoint::Reports {
                half: Half::Attended,
                owner: OWNER,
                generation: 1,
            };
            assert_eq!(attended.path(), "/denunciasUsuario/atendidas/12");

            let officer = ListOwner::Officer(crate::OfficerId(7));
            let cases = Endpoint::Reports {
                half: Half::Pending,
                owner: officer,
                generation: 1,
            };
            assert_eq!(cases.path(), "/casosPendientes?idPolicia=7");
            assert_eq!(cases.name(), "pending_reports");
            let closed = Endpoint::Reports {
                half: Half::Attended,
                owner: officer,
                generation: 1,
            };
            assert_eq!(closed.path(), "/denunciasAtendidas?idPolicia=7");

            assert_eq!(Endpoint::UpdateReport(ReportId(5)).path(), "/denuncia/5");
            assert_eq!(Endpoint::UpdateReport(ReportId(5)).method(), HttpMethod::Put);
            assert_eq!(Endpoint::ReportDetail(ReportId(5)).method(), HttpMethod::Get);
            assert_eq!(Endpoint::SubmitReport.path(), "/denuncias");
            assert_eq!(Endpoint::AttendReport(ReportId(5)).path(), "/atenderDenuncia");
            assert_eq!(Endpoint::Login.method(), HttpMethod::Post);
            assert!(Endpoint::SubmitReport.is_mutation());
            assert!(!Endpoint::Login.is_mutation());
        }
    }

    mod list_decode_tests {
        use super::*;

        #[test]
        fn test_decodes_full_record() {
            let body = json!([{
                "id_denuncia": 31,
                "descripcion": "Pelea en la plaza",
                "tipo": "DISTURBIO_PUBLICO",
                "calle_avenida": "Plaza 14 de Septiembre",
                "modulo_epi": "EPI_N5_Alalay",
                "fecha": "2024-05-01T00:00:00.000Z",
                "hora": "10:15:00",
                "evidencia": "",
                "estado": "PENDIENTE",
                "fue_modificada": 0,
                "id_ciudadano": 12
            }])
            .to_string();
            let reports = decode_report_list(body.as_bytes(), Half::Pending, OWNER).unwrap();
            assert_eq!(reports.len(), 1);
            let r = &reports[0];
            assert_eq!(r.id, ReportId(31));
            assert_eq!(r.kind, ReportKind::PublicDisturbance);
            assert_eq!(r.status, ReportStatus::Pending);
            assert_eq!(r.evidence_url, None);
            assert!(!r.was_modified);
            assert!(r.recorded.to_naive().is_some());
        }

        #[test]
        fn test_missing_fields_use_defaults() {
            let body = br#"[{"id_denuncia":"4","fue_modificada":"1","tipo":"INCENDIO"}]"#;
            let reports = decode_report_list(body, Half::Attended, OWNER).unwrap();
            let r = &reports[0];
            assert_eq!(r.id, ReportId(4));
            assert_eq!(r.status, ReportStatus::Attended);
            assert_eq!(r.citizen_id, OWNER.citizen());
            assert_eq!(r.kind, ReportKind::Other);
            assert!(r.was_modified);
            assert!(r.recorded.to_naive().is_none());
        }

        #[test]
        fn test_officer_case_names_reporter() {
            let body = json!([{
                "id_denuncia": 8,
                "descripcion": "Robo de moto",
                "tipo": "ROBO",
                "calle_avenida": "Av. Petrolera",
                "modulo_epi": "EPI_N5_Alalay",
                "fecha": "2024-05-01",
                "hora": "08:00:00",
                "estado": "PENDIENTE",
                "nombre_denunciante": "Luis Mamani"
            }])
            .to_string();
            let officer = ListOwner::Officer(crate::OfficerId(7));
            let reports = decode_report_list(body.as_bytes(), Half::Pending, officer).unwrap();
            assert_eq!(reports[0].citizen_id, None);
            assert_eq!(reports[0].reporter_name.as_deref(), Some("Luis Mamani"));
        }

        #[test]
        fn test_bad_records_are_skipped() {
            let body = br#"[{"descripcion":"no id"},{"id_denuncia":2},{"id_denuncia":3,"descripcion":42}, 7]"#;
            let reports = decode_report_list(body, Half::Pending, OWNER).unwrap();
            let ids: Vec<_> = reports.iter().map(|r| r.id.0).collect();
            assert_eq!(ids, vec![2]);
        }

        #[test]
        fn test_non_array_is_error() {
            assert_eq!(
                decode_report_list(br#"{"message":"error"}"#, Half::Pending, OWNER),
                Err(DecodeError::NotAnArray)
            );
            assert!(matches!(
                decode_report_list(b"<html>", Half::Pending, OWNER),
                Err(DecodeError::Malformed(_))
            ));
        }

        #[test]
        fn test_result_mapping() {
            assert_eq!(
                reports_from_result(&ok("[]"), Half::Pending, OWNER).unwrap(),
                Vec::new()
            );

            let not_found = Ok(HttpResponse::with_body(404, ""));
            assert_eq!(
                reports_from_result(&not_found, Half::Pending, OWNER)
                    .unwrap_err()
                    .kind,
                ErrorKind::NotFound
            );

            let offline = Err(HttpError::ConnectionError {
                host: "h".into(),
                message: "down".into(),
            });
            assert_eq!(
                reports_from_result(&offline, Half::Pending, OWNER)
                    .unwrap_err()
                    .kind,
                ErrorKind::Network
            );
        }
    }

    mod ack_tests {
        use super::*;

        #[test]
        fn test_ack_variants() {
            assert!(decode_ack(&ok(r#"{"success":true}"#)).is_ok());
            assert!(decode_ack(&ok("")).is_ok());
            assert!(decode_ack(&ok("OK")).is_ok());

            let rejected = decode_ack(&ok(r#"{"success":false,"message":"Tiempo expirado"}"#))
                .unwrap_err();
            assert_eq!(rejected.kind, ErrorKind::Rejected);
            assert_eq!(rejected.user_facing_message(), "Tiempo expirado");

            let server = decode_ack(&Ok(HttpResponse::with_body(500, "boom"))).unwrap_err();
            assert_eq!(server.kind, ErrorKind::Internal);
        }
    }

    mod login_tests {
        use super::*;

        #[test]
        fn test_login_success() {
            let body = r#"{"success":true,"usuario":{"id_ciudadano":12,"nombres":"Ana"}}"#;
            let profile = decode_login(&ok(body)).unwrap();
            assert_eq!(profile.id_ciudadano, OWNER.citizen());
        }

        #[test]
        fn test_login_rejected() {
            let body = r#"{"success":false,"message":"Contraseña incorrecta"}"#;
            let err = decode_login(&ok(body)).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Authentication);
            assert_eq!(err.message, "Contraseña incorrecta");

            let err = decode_login(&Ok(HttpResponse::with_body(401, body))).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Authentication);

            let err = decode_login(&Ok(HttpResponse::with_body(502, "bad gateway"))).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Internal);
        }

        #[test]
        fn test_login_body_wire_names() {
            let body = login_body("ana@example.com", "s3cret", Some("ExponentPushToken[x]")).unwrap();
            let value: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(value["correo"], "ana@example.com");
            assert_eq!(value["contraseña"], "s3cret");
            assert_eq!(value["pushToken"], "ExponentPushToken[x]");
        }
    }

    mod body_tests {
        use super::*;

        fn draft() -> ReportDraft {
            ReportDraft {
                description: "Choque".into(),
                kind: ReportKind::TrafficAccident,
                location: "Av. America".into(),
                police_module: Some("EPI_N5_Alalay".into()),
                evidence_url: None,
            }
        }

        #[test]
        fn test_update_body() {
            let recorded = RecordedAt::new("2024-05-01T00:00:00.000Z", "10:15");
            let value: Value = serde_json::from_slice(&update_body(&draft(), &recorded).unwrap()).unwrap();
            assert_eq!(value["tipo"], "ACCIDENTE_TRANSITO");
            assert_eq!(value["fecha"], "2024-05-01");
            assert_eq!(value["hora"], "10:15");
            assert_eq!(value["calle_avenida"], "Av. America");
            assert!(value["evidencia"].is_null());
            assert!(value.get("estado").is_none());
        }

        #[test]
        fn test_submit_body_is_pending() {
            let recorded = RecordedAt::new("2024-05-01", "10:15:00");
            let value: Value =
                serde_json::from_slice(&submit_body(&draft(), &recorded, CITIZEN).unwrap()).unwrap();
            assert_eq!(value["estado"], "PENDIENTE");
            assert_eq!(value["id_ciudadano"], 12);
            assert_eq!(value["descripcion"], "Choque");
        }

        #[test]
        fn test_attend_body() {
            let value: Value = serde_json::from_slice(&attend_body(ReportId(9)).unwrap()).unwrap();
            assert_eq!(value, json!({"idDenuncia": 9}));
        }
    }

    mod detail_tests {
        use super::*;

        #[test]
        fn test_detail_found_and_missing() {
            let body = r#"{"success":true,"denuncia":{"id_denuncia":5,"estado":"PENDIENTE","fecha":"2024-05-01","hora":"10:00"}}"#;
            let report = decode_report_detail(&ok(body), CITIZEN).unwrap();
            assert_eq!(report.id, ReportId(5));

            let body = r#"{"success":false,"message":"Denuncia no encontrada"}"#;
            let err = decode_report_detail(&ok(body), CITIZEN).unwrap_err();
            assert_eq!(err.kind, ErrorKind::NotFound);
        }
    }
}
