use chrono::{DateTime, TimeZone};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::api::{self, Endpoint};
use crate::capabilities::{KeyNamespace, KvOperation, KvOutput, KvResult, TypedKvStore};
use crate::config::Config;
use crate::eligibility;
use crate::event::{Event, KvPurpose};
use crate::history::{Half, HistoryAction, ListOwner, RefreshTrigger, Transition};
use crate::model::{
    AppState, EditPhase, EditSession, Model, RecordedAt, ReportDraft, Role, ToastKind, UserProfile,
};
use crate::view::{self, ViewModel};
use crate::{AppError, CitizenId, ErrorKind, ReportId, PROFILE_CACHE_KEY};

/// Side-effecting work requested by [`App::update`] and carried out by the shell.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Render,
    Http {
        endpoint: Endpoint,
        body: Option<Vec<u8>>,
    },
    Kv {
        purpose: KvPurpose,
        operation: KvOperation,
    },
}

pub struct App {
    profiles: TypedKvStore<UserProfile>,
    profile_key: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            profiles: TypedKvStore::new(KeyNamespace::Session),
            profile_key: PROFILE_CACHE_KEY.to_string(),
        }
    }
}

impl App {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            profile_key: config.profile_cache_key.clone(),
            ..Self::default()
        }
    }

    pub fn update<Tz: TimeZone>(
        &self,
        event: Event,
        model: &mut Model,
        now: &DateTime<Tz>,
    ) -> Vec<Effect> {
        debug!(
            event = event.name(),
            user_initiated = event.is_user_initiated(),
            "update"
        );

        let mut effects = Vec::new();
        match event {
            Event::Noop => {}

            Event::AppStarted => {
                model.state = AppState::Loading;
                match self.profiles.get_op(self.profile_key.as_str()) {
                    Ok(operation) => effects.push(Effect::Kv {
                        purpose: KvPurpose::RestoreProfile,
                        operation,
                    }),
                    Err(e) => {
                        model.state = AppState::Unauthenticated;
                        model.set_error(e.into());
                    }
                }
                effects.push(Effect::Render);
            }

            Event::LoginRequested {
                email,
                password,
                push_token,
            } => {
                if model.state == AppState::Authenticating {
                    return effects;
                }
                let email = email.trim();
                if email.is_empty() || password.expose_secret().is_empty() {
                    model.set_error(AppError::new(
                        ErrorKind::Validation,
                        "Please enter your email and password.",
                    ));
                    effects.push(Effect::Render);
                    return effects;
                }

                match api::login_body(email, password.expose_secret(), push_token.as_deref()) {
                    Ok(body) => {
                        model.clear_error();
                        model.state = AppState::Authenticating;
                        effects.push(Effect::Http {
                            endpoint: Endpoint::Login,
                            body: Some(body),
                        });
                    }
                    Err(e) => model.set_error(e),
                }
                effects.push(Effect::Render);
            }

            Event::LogoutRequested => {
                model.reset_session();
                if let Ok(operation) = self.profiles.delete_op(self.profile_key.as_str()) {
                    effects.push(Effect::Kv {
                        purpose: KvPurpose::ClearProfile,
                        operation,
                    });
                }
                info!("signed out");
                effects.push(Effect::Render);
            }

            Event::HistoryOpened => {
                let Some(owner) = model.role.as_ref().and_then(ListOwner::for_role) else {
                    model.set_error(AppError::new(
                        ErrorKind::InvalidState,
                        "This account has no report list",
                    ));
                    effects.push(Effect::Render);
                    return effects;
                };
                let transition = model.history.apply(HistoryAction::Mount { owner }, now);
                Self::history_effects(transition, &mut effects);
            }

            Event::HistoryClosed => {
                let transition = model.history.apply(HistoryAction::Unmount, now);
                // The form belongs to the list; it closes with the last screen.
                if !model.history.is_mounted()
                    && model.edit.as_ref().is_some_and(|s| s.phase != EditPhase::Saving)
                {
                    model.edit = None;
                }
                Self::history_effects(transition, &mut effects);
            }

            Event::RefreshRequested => {
                let transition = model
                    .history
                    .apply(HistoryAction::Trigger(RefreshTrigger::Manual), now);
                Self::history_effects(transition, &mut effects);
            }

            Event::RefreshTick => {
                let transition = model
                    .history
                    .apply(HistoryAction::Trigger(RefreshTrigger::Timer), now);
                Self::history_effects(transition, &mut effects);
            }

            Event::EditRequested { report_id } => {
                Self::begin_edit(report_id, model, now, &mut effects);
                effects.push(Effect::Render);
            }

            Event::EditSubmitted(draft) => {
                Self::submit_edit(draft, model, now, &mut effects);
                effects.push(Effect::Render);
            }

            Event::EditCancelled => {
                if model.edit.as_ref().is_some_and(|s| s.phase != EditPhase::Saving) {
                    model.edit = None;
                    let transition = model.history.apply(HistoryAction::Reevaluate, now);
                    Self::history_effects(transition, &mut effects);
                    effects.push(Effect::Render);
                }
            }

            Event::ReportSubmitted(draft) => {
                Self::submit_report(draft, model, now, &mut effects);
                effects.push(Effect::Render);
            }

            Event::AttendRequested { report_id } => {
                Self::attend(report_id, model, &mut effects);
                effects.push(Effect::Render);
            }

            Event::DismissError => {
                model.clear_error();
                effects.push(Effect::Render);
            }

            Event::DismissToast => {
                model.active_toast = None;
                model.history.apply(HistoryAction::DismissNotice, now);
                effects.push(Effect::Render);
            }

            Event::HttpResponse { endpoint, result } => {
                self.handle_http(endpoint, &result, model, now, &mut effects);
            }

            Event::KvResponse { purpose, result } => {
                self.handle_kv(purpose, *result, model, &mut effects);
            }
        }
        effects
    }

    #[must_use]
    pub fn view(&self, model: &Model) -> ViewModel {
        view::build(model)
    }

    fn history_effects(transition: Transition, effects: &mut Vec<Effect>) {
        match transition {
            Transition::FetchStarted { generation, owner } => {
                for half in [Half::Pending, Half::Attended] {
                    effects.push(Effect::Http {
                        endpoint: Endpoint::Reports {
                            half,
                            owner,
                            generation,
                        },
                        body: None,
                    });
                }
                effects.push(Effect::Render);
            }
            Transition::Coalesced | Transition::Updated | Transition::Completed { .. } => {
                effects.push(Effect::Render);
            }
            Transition::Unchanged | Transition::Discarded => {}
        }
    }

    fn begin_edit<Tz: TimeZone>(
        report_id: ReportId,
        model: &mut Model,
        now: &DateTime<Tz>,
        effects: &mut Vec<Effect>,
    ) {
        if model.citizen_id().is_none() {
            model.set_error(AppError::new(
                ErrorKind::Authorization,
                "Only citizens can edit reports",
            ));
            return;
        }
        if model.edit.as_ref().is_some_and(|s| s.phase == EditPhase::Saving) {
            return;
        }
        let editable = model
            .history
            .find_pending(report_id)
            .is_some_and(|entry| eligibility::evaluate(&entry.report, now).can_edit);
        if !editable {
            model.set_error(
                AppError::new(ErrorKind::EditWindowClosed, "edit window closed")
                    .with_context("report_id", report_id.to_string()),
            );
            return;
        }

        model.clear_error();
        model.edit = Some(EditSession::new(report_id));
        effects.push(Effect::Http {
            endpoint: Endpoint::ReportDetail(report_id),
            body: None,
        });
    }

    fn submit_edit<Tz: TimeZone>(
        draft: ReportDraft,
        model: &mut Model,
        now: &DateTime<Tz>,
        effects: &mut Vec<Effect>,
    ) {
        let Some(session) = model.edit.as_mut() else {
            return;
        };
        if session.phase != EditPhase::Editing {
            return;
        }
        let Some(original) = session.original.as_ref() else {
            return;
        };

        let draft = draft.normalized();
        if let Err(e) = draft.validate() {
            model.set_error(e.into());
            return;
        }

        // The window may have closed while the form was open.
        if !eligibility::evaluate(original, now).can_edit {
            model.edit = None;
            model.set_error(AppError::new(ErrorKind::EditWindowClosed, "edit window closed"));
            return;
        }

        match api::update_body(&draft, &original.recorded) {
            Ok(body) => {
                effects.push(Effect::Http {
                    endpoint: Endpoint::UpdateReport(session.report_id),
                    body: Some(body),
                });
                session.phase = EditPhase::Saving;
                session.submitted = Some(draft);
                model.clear_error();
            }
            Err(e) => model.set_error(e),
        }
    }

    fn submit_report<Tz: TimeZone>(
        draft: ReportDraft,
        model: &mut Model,
        now: &DateTime<Tz>,
        effects: &mut Vec<Effect>,
    ) {
        let Some(citizen) = model.citizen_id() else {
            model.set_error(AppError::new(
                ErrorKind::InvalidState,
                "Only citizens can file reports",
            ));
            return;
        };
        if model.is_submitting {
            return;
        }

        let draft = draft.normalized();
        if let Err(e) = draft.validate() {
            model.set_error(e.into());
            return;
        }

        let recorded = RecordedAt::from_naive(now.naive_local());
        match api::submit_body(&draft, &recorded, citizen) {
            Ok(body) => {
                model.is_submitting = true;
                model.clear_error();
                effects.push(Effect::Http {
                    endpoint: Endpoint::SubmitReport,
                    body: Some(body),
                });
            }
            Err(e) => model.set_error(e),
        }
    }

    fn attend(report_id: ReportId, model: &mut Model, effects: &mut Vec<Effect>) {
        if !matches!(model.role, Some(Role::Officer { .. })) {
            model.set_error(AppError::new(
                ErrorKind::Authorization,
                "Only officers can attend reports",
            ));
            return;
        }
        if model.attending.is_some() {
            return;
        }
        match api::attend_body(report_id) {
            Ok(body) => {
                model.attending = Some(report_id);
                effects.push(Effect::Http {
                    endpoint: Endpoint::AttendReport(report_id),
                    body: Some(body),
                });
            }
            Err(e) => model.set_error(e),
        }
    }

    fn handle_http<Tz: TimeZone>(
        &self,
        endpoint: Endpoint,
        result: &crate::capabilities::HttpResult,
        model: &mut Model,
        now: &DateTime<Tz>,
        effects: &mut Vec<Effect>,
    ) {
        match endpoint {
            Endpoint::Login => {
                if model.state != AppState::Authenticating {
                    debug!("login response after state changed, ignoring");
                    return;
                }
                match api::decode_login(result).and_then(Self::role_for) {
                    Ok((profile, role)) => {
                        info!(role = ?role, "signed in");
                        match self.profiles.set_op(self.profile_key.as_str(), &profile) {
                            Ok(operation) => effects.push(Effect::Kv {
                                purpose: KvPurpose::StoreProfile,
                                operation,
                            }),
                            Err(e) => warn!(error = %e, "profile not cached"),
                        }
                        let name = profile.display_name();
                        model.profile = Some(profile);
                        model.role = Some(role);
                        model.state = AppState::Ready;
                        if !name.is_empty() {
                            model.show_toast(format!("Welcome, {name}"), ToastKind::Success);
                        }
                    }
                    Err(e) => {
                        warn!(code = e.code(), "login failed");
                        model.state = AppState::Unauthenticated;
                        model.set_error(e);
                    }
                }
                effects.push(Effect::Render);
            }

            Endpoint::Reports {
                half,
                owner,
                generation,
            } => {
                if model.history.owner() != Some(owner) {
                    debug!(?owner, "reports for a different list, ignoring");
                    return;
                }
                let reports = api::reports_from_result(result, half, owner);
                let transition = model.history.apply(
                    HistoryAction::HalfLoaded {
                        generation,
                        half,
                        result: reports,
                    },
                    now,
                );
                Self::history_effects(transition, effects);
            }

            Endpoint::ReportDetail(report_id) => {
                Self::handle_detail(report_id, result, model, now);
                effects.push(Effect::Render);
            }

            Endpoint::UpdateReport(report_id) => {
                let Some(session) = model
                    .edit
                    .as_mut()
                    .filter(|s| s.report_id == report_id && s.phase == EditPhase::Saving)
                else {
                    return;
                };
                match api::decode_ack(result) {
                    Ok(()) => {
                        if let Some(draft) = session.submitted.take() {
                            model
                                .history
                                .apply(HistoryAction::EditConfirmed { report_id, draft }, now);
                        }
                        model.edit = None;
                        info!(%report_id, "report edited");
                        model.show_toast("Report updated", ToastKind::Success);
                    }
                    Err(e) => {
                        warn!(%report_id, code = e.code(), "edit rejected");
                        // The form reopens with what the user typed.
                        session.phase = EditPhase::Editing;
                        model.set_error(e);
                    }
                }
                effects.push(Effect::Render);
            }

            Endpoint::SubmitReport => {
                if !model.is_submitting {
                    return;
                }
                model.is_submitting = false;
                match api::decode_ack(result) {
                    Ok(()) => {
                        model.show_toast("Report submitted", ToastKind::Success);
                        let transition = model
                            .history
                            .apply(HistoryAction::Trigger(RefreshTrigger::Timer), now);
                        Self::history_effects(transition, effects);
                    }
                    Err(e) => model.set_error(e),
                }
                effects.push(Effect::Render);
            }

            Endpoint::AttendReport(report_id) => {
                if model.attending != Some(report_id) {
                    return;
                }
                model.attending = None;
                match api::decode_ack(result) {
                    Ok(()) => {
                        info!(%report_id, "report attended");
                        model.show_toast("Report marked as attended", ToastKind::Success);
                        model
                            .history
                            .apply(HistoryAction::AttendConfirmed { report_id }, now);
                        // Pick up the server's copy of both lists.
                        let transition = model
                            .history
                            .apply(HistoryAction::Trigger(RefreshTrigger::Timer), now);
                        Self::history_effects(transition, effects);
                    }
                    Err(e) => model.set_error(e),
                }
                effects.push(Effect::Render);
            }
        }
    }

    fn handle_detail<Tz: TimeZone>(
        report_id: ReportId,
        result: &crate::capabilities::HttpResult,
        model: &mut Model,
        now: &DateTime<Tz>,
    ) {
        let loading = model
            .edit
            .as_ref()
            .is_some_and(|s| s.report_id == report_id && s.phase == EditPhase::Loading);
        if !loading {
            return;
        }
        let owner = model.citizen_id().unwrap_or(CitizenId(0));

        let report = match api::decode_report_detail(result, owner) {
            Ok(report) => report,
            Err(e) => match model.history.find_pending(report_id) {
                Some(entry) => {
                    warn!(%report_id, code = e.code(), "prefill failed, using listed copy");
                    entry.report.clone()
                }
                None => {
                    model.edit = None;
                    model.set_error(e);
                    return;
                }
            },
        };

        if !eligibility::evaluate(&report, now).can_edit {
            model.edit = None;
            model.set_error(AppError::new(ErrorKind::EditWindowClosed, "edit window closed"));
            return;
        }

        if let Some(session) = model.edit.as_mut() {
            session.original = Some(report);
            session.phase = EditPhase::Editing;
        }
    }

    fn role_for(profile: UserProfile) -> Result<(UserProfile, Role), AppError> {
        match Role::from_profile(&profile) {
            Some(role) => Ok((profile, role)),
            None => Err(AppError::new(
                ErrorKind::Authorization,
                "This account has no role assigned.",
            )),
        }
    }

    fn handle_kv(
        &self,
        purpose: KvPurpose,
        result: KvResult,
        model: &mut Model,
        effects: &mut Vec<Effect>,
    ) {
        match purpose {
            KvPurpose::RestoreProfile => {
                if model.state != AppState::Loading {
                    return;
                }
                let restored = result
                    .and_then(|output| self.profiles.parse_value(output))
                    .map_err(AppError::from)
                    .and_then(|profile| profile.map(Self::role_for).transpose());

                match restored {
                    Ok(Some((profile, role))) => {
                        info!(role = ?role, "session restored");
                        model.profile = Some(profile);
                        model.role = Some(role);
                        model.state = AppState::Ready;
                    }
                    Ok(None) => model.state = AppState::Unauthenticated,
                    Err(e) => {
                        warn!(code = e.code(), error = %e, "cached profile unusable");
                        model.state = AppState::Unauthenticated;
                    }
                }
                effects.push(Effect::Render);
            }
            KvPurpose::StoreProfile | KvPurpose::ClearProfile => match result {
                Ok(KvOutput::Written { version }) => debug!(version, "profile cached"),
                Ok(_) => {}
                Err(e) => warn!(purpose = purpose.name(), error = %e, "profile cache write failed"),
            },
        }
    }
}
