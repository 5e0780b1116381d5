#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use safecity_shared::capabilities::{
    Capabilities, Clock, HttpClient, HttpError, HttpRequest, HttpResponse, HttpResult,
    KvOperation, KvResult, KvStore, MemoryKv,
};
use safecity_shared::view::{ViewModel, ViewState};
use safecity_shared::{Config, Core, Event};
use secrecy::SecretString;
use serde_json::json;
use tokio::sync::{watch, Semaphore};

pub const BASE_URL: &str = "http://api.test";
pub const CITIZEN: i64 = 12;

#[derive(Clone)]
enum Reply {
    Status(u16, Vec<u8>),
    Fail(HttpError),
}

/// Scripted backend keyed by `"METHOD /path"`.
pub struct FakeHttp {
    routes: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
    gate: Semaphore,
}

impl FakeHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate: Semaphore::new(Semaphore::MAX_PERMITS),
        })
    }

    /// Responses are held until [`FakeHttp::release`] is called.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
        })
    }

    pub fn release(&self, responses: usize) {
        self.gate.add_permits(responses);
    }

    pub fn reply(&self, route: &str, status: u16, body: serde_json::Value) {
        self.routes.lock().unwrap().insert(
            route.to_string(),
            Reply::Status(status, body.to_string().into_bytes()),
        );
    }

    pub fn fail(&self, route: &str, error: HttpError) {
        self.routes
            .lock()
            .unwrap()
            .insert(route.to_string(), Reply::Fail(error));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, route: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == route).count()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn send(&self, request: HttpRequest) -> HttpResult {
        let path = request.url().as_str().trim_start_matches(BASE_URL).to_string();
        let route = format!("{} {path}", request.method().as_str());
        self.calls.lock().unwrap().push(route.clone());

        self.gate.acquire().await.unwrap().forget();

        let reply = self.routes.lock().unwrap().get(&route).cloned();
        match reply {
            Some(Reply::Status(status, body)) => Ok(HttpResponse::with_body(status, body)),
            Some(Reply::Fail(error)) => Err(error),
            None => Ok(HttpResponse::with_body(404, r#"{"message":"no route"}"#)),
        }
    }
}

/// Wall clock pinned to a settable instant.
pub struct FixedClock(Mutex<DateTime<Local>>);

impl FixedClock {
    pub fn new() -> Arc<Self> {
        let noon = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        Arc::new(Self(Mutex::new(
            Local.from_local_datetime(&noon).earliest().unwrap(),
        )))
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        *self.0.lock().unwrap()
    }
}

/// Store whose writes take `delay` to land, as a slow disk would.
pub struct SlowKv {
    inner: Arc<MemoryKv>,
    delay: Duration,
}

impl SlowKv {
    pub fn new(inner: &Arc<MemoryKv>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::clone(inner),
            delay,
        })
    }
}

#[async_trait]
impl KvStore for SlowKv {
    async fn execute(&self, operation: KvOperation) -> KvResult {
        if matches!(operation, KvOperation::Set { .. }) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.execute(operation).await
    }
}

pub fn config() -> Config {
    Config {
        api_base_url: BASE_URL.into(),
        ..Config::default()
    }
}

pub fn caps(http: &Arc<FakeHttp>, kv: &Arc<MemoryKv>, clock: &Arc<FixedClock>) -> Capabilities {
    Capabilities::new(
        Arc::clone(http) as Arc<dyn HttpClient>,
        Arc::clone(kv) as Arc<dyn KvStore>,
        Arc::clone(clock) as Arc<dyn Clock>,
    )
}

/// A report as the backend lists it, recorded `minutes_ago` before `clock`.
pub fn wire_report(
    clock: &FixedClock,
    id: i64,
    minutes_ago: i64,
    estado: &str,
    modified: bool,
) -> serde_json::Value {
    let at = (clock.now() - chrono::Duration::minutes(minutes_ago)).naive_local();
    json!({
        "id_denuncia": id,
        "descripcion": format!("report {id}"),
        "tipo": "ASALTO",
        "calle_avenida": "Av. Ayacucho",
        "modulo_epi": "EPI_N5_Alalay",
        "fecha": format!("{}T00:00:00.000Z", at.format("%Y-%m-%d")),
        "hora": at.format("%H:%M:%S").to_string(),
        "estado": estado,
        "fue_modificada": i32::from(modified),
        "id_ciudadano": CITIZEN
    })
}

pub fn citizen_login_body() -> serde_json::Value {
    json!({
        "success": true,
        "usuario": {
            "id_ciudadano": CITIZEN,
            "nombres": "Ana",
            "apellido_paterno": "Rojas",
            "correo": "ana@example.com"
        }
    })
}

pub async fn wait_for<F>(rx: &mut watch::Receiver<ViewModel>, mut predicate: F) -> ViewModel
where
    F: FnMut(&ViewModel) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            {
                let view = rx.borrow_and_update();
                if predicate(&view) {
                    return view.clone();
                }
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("view never reached the expected state")
}

pub fn login(email: &str) -> Event {
    Event::LoginRequested {
        email: email.into(),
        password: SecretString::new("hunter2".into()),
        push_token: None,
    }
}

/// Starts a core and signs in as the test citizen.
pub async fn signed_in(http: &Arc<FakeHttp>, clock: &Arc<FixedClock>) -> Core {
    http.reply("POST /login", 200, citizen_login_body());
    let core = Core::start(config(), caps(http, &Arc::new(MemoryKv::new()), clock)).unwrap();
    core.dispatch(login("ana@example.com"));
    wait_for(&mut core.subscribe(), |v| {
        matches!(v.state, ViewState::CitizenHome { .. })
    })
    .await;
    core
}
