//! Tokio shell around the pure core.
//!
//! Events go through one queue and are applied in order by a single task, so
//! `App::update` never runs concurrently with itself. HTTP effects run on
//! spawned tasks that report back through the same queue. Storage operations
//! go to a single worker and complete in the order they were issued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::api::Endpoint;
use crate::app::{App, Effect};
use crate::capabilities::{
    Capabilities, HttpError, HttpRequest, KvOperation, KvStore, ValidatedUrl,
};
use crate::config::{Config, ConfigError};
use crate::event::{Event, KvPurpose};
use crate::model::Model;
use crate::refresh::{RefreshDriver, RefreshHandle};
use crate::view::ViewModel;

/// Cloneable handle for feeding events into a running [`Core`].
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Returns `false` once the core has stopped.
    pub fn send(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl From<mpsc::UnboundedSender<Event>> for EventSender {
    fn from(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx }
    }
}

pub struct Core {
    events: EventSender,
    view: watch::Receiver<ViewModel>,
    refresh_interval: Duration,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Core {
    /// Validates `config` and starts the event loop on the current tokio runtime.
    pub fn start(config: Config, caps: Capabilities) -> Result<Self, ConfigError> {
        config.validate()?;
        let base_url = config.base_url()?;

        let app = App::new(&config);
        let model = Model::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(app.view(&model));
        let (stop_tx, stop_rx) = oneshot::channel();
        let events = EventSender { tx };
        let kv = spawn_kv_worker(Arc::clone(&caps.kv), events.clone());

        let shell = Shell {
            app,
            model,
            caps,
            base_url,
            config: config.clone(),
            events: events.clone(),
            kv,
            view: view_tx,
        };
        let task = tokio::spawn(shell.run(rx, stop_rx));
        info!(api = %config.api_base_url, "core started");

        Ok(Self {
            events,
            view: view_rx,
            refresh_interval: config.refresh_interval(),
            stop: Some(stop_tx),
            task,
        })
    }

    pub fn dispatch(&self, event: Event) {
        let name = event.name();
        if !self.events.send(event) {
            warn!(event = name, "core stopped, event dropped");
        }
    }

    #[must_use]
    pub fn sender(&self) -> EventSender {
        self.events.clone()
    }

    /// Latest rendered view.
    #[must_use]
    pub fn view(&self) -> ViewModel {
        self.view.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ViewModel> {
        self.view.clone()
    }

    /// Shows the report list for the signed-in role and starts the periodic refresh.
    #[must_use]
    pub fn open_history(&self) -> HistorySession {
        self.open_history_every(self.refresh_interval)
    }

    #[must_use]
    pub fn open_history_every(&self, period: Duration) -> HistorySession {
        HistorySession::open(self.events.clone(), period)
    }

    /// Stops the event loop. Responses still in flight are dropped.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "core task ended abnormally");
        }
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("refresh_interval", &self.refresh_interval)
            .finish_non_exhaustive()
    }
}

/// One open list screen. Dropping it stops its timer; the last one dropped
/// unmounts the list, so late responses are discarded.
#[derive(Debug)]
pub struct HistorySession {
    events: EventSender,
    driver: Option<RefreshHandle>,
}

impl HistorySession {
    fn open(events: EventSender, period: Duration) -> Self {
        events.send(Event::HistoryOpened);
        let driver = RefreshDriver::start(events.clone(), period);
        Self {
            events,
            driver: Some(driver),
        }
    }

    /// Pull-to-refresh.
    pub fn refresh(&self) {
        self.events.send(Event::RefreshRequested);
    }

    pub fn close(self) {}
}

impl Drop for HistorySession {
    fn drop(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            driver.stop();
            self.events.send(Event::HistoryClosed);
        }
    }
}

struct Shell {
    app: App,
    model: Model,
    caps: Capabilities,
    base_url: ValidatedUrl,
    config: Config,
    events: EventSender,
    kv: mpsc::UnboundedSender<KvJob>,
    view: watch::Sender<ViewModel>,
}

type KvJob = (KvPurpose, KvOperation);

/// Runs storage operations one at a time. A logout's delete can never overtake
/// the login's write that preceded it. Jobs queued before shutdown still run.
fn spawn_kv_worker(kv: Arc<dyn KvStore>, events: EventSender) -> mpsc::UnboundedSender<KvJob> {
    let (tx, mut rx) = mpsc::unbounded_channel::<KvJob>();
    tokio::spawn(async move {
        while let Some((purpose, operation)) = rx.recv().await {
            let result = kv.execute(operation).await;
            events.send(Event::KvResponse {
                purpose,
                result: Box::new(result),
            });
        }
        debug!("kv worker finished");
    });
    tx
}

impl Shell {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Event>,
        mut stop: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                event = rx.recv() => match event {
                    Some(event) => self.process(event),
                    None => break,
                },
            }
        }
        debug!("core event loop finished");
    }

    fn process(&mut self, event: Event) {
        let now = self.caps.clock.now();
        let effects = self.app.update(event, &mut self.model, &now);

        let mut render = false;
        for effect in effects {
            match effect {
                Effect::Render => render = true,
                Effect::Http { endpoint, body } => self.send_http(endpoint, body),
                Effect::Kv { purpose, operation } => self.run_kv(purpose, operation),
            }
        }
        if render {
            self.view.send_replace(self.app.view(&self.model));
        }
    }

    fn timeout_for(&self, endpoint: Endpoint) -> Duration {
        match endpoint {
            Endpoint::Login => self.config.login_timeout(),
            e if e.is_mutation() => self.config.mutation_timeout(),
            _ => self.config.request_timeout(),
        }
    }

    fn build_request(
        &self,
        endpoint: Endpoint,
        body: Option<Vec<u8>>,
    ) -> Result<HttpRequest, HttpError> {
        let url = self.base_url.join_path(&endpoint.path())?;
        let mut request = HttpRequest::new(endpoint.method(), url)
            .with_header("Accept", "application/json")?
            .with_timeout(self.timeout_for(endpoint))?;
        if let Some(body) = body {
            request = request.with_json_body(body)?;
        }
        Ok(request)
    }

    #[instrument(skip(self, endpoint, body), fields(endpoint = endpoint.name()))]
    fn send_http(&self, endpoint: Endpoint, body: Option<Vec<u8>>) {
        let events = self.events.clone();
        let request = match self.build_request(endpoint, body) {
            Ok(request) => request,
            Err(error) => {
                warn!(%error, "request could not be built");
                events.send(Event::HttpResponse {
                    endpoint,
                    result: Box::new(Err(error)),
                });
                return;
            }
        };

        let http = Arc::clone(&self.caps.http);
        tokio::spawn(async move {
            let result = http.send(request).await;
            events.send(Event::HttpResponse {
                endpoint,
                result: Box::new(result),
            });
        });
    }

    fn run_kv(&self, purpose: KvPurpose, operation: KvOperation) {
        if self.kv.send((purpose, operation)).is_err() {
            warn!(?purpose, "kv worker stopped, operation dropped");
        }
    }
}
