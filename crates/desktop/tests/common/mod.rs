#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rxdesk_core::{InstallState, InstallationStatus, SystemId};
use rxdesk_desktop::probe::ProbeError;
use rxdesk_desktop::settings::ProbeSettings;
use rxdesk_desktop::{
    ActivationEvent, AgentContext, ConnectivityProbe, HostControl, LicenseGuard, RemoteAuthorityClient, RemoteError,
    Transport,
};
use rxdesk_infra::{InMemoryConfigStore, InteractiveLoop, ManualClock, WorkerPool, WorkerPoolConfig};
use serde_json::{Map, Value};

pub const SYSTEM_ID: &str = "PH-0042";

/// Ordered record of side effects across the fakes.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
}

pub fn status(state: InstallState) -> InstallationStatus {
    InstallationStatus::new(SystemId::new(SYSTEM_ID).unwrap(), state)
}

type Scripted = Result<Option<InstallationStatus>, RemoteError>;

pub struct FakeRemote {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Mutex<Scripted>,
    status_calls: AtomicUsize,
    pub patches: Mutex<Vec<Map<String, Value>>>,
    pub logs: Mutex<Vec<ActivationEvent>>,
    journal: Journal,
}

impl FakeRemote {
    pub fn new(journal: Journal) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Err(RemoteError::Network("connection refused".into()))),
            status_calls: AtomicUsize::new(0),
            patches: Mutex::new(Vec::new()),
            logs: Mutex::new(Vec::new()),
            journal,
        }
    }

    /// Queue one `get_status` answer.
    pub fn push(&self, answer: Scripted) {
        self.script.lock().unwrap().push_back(answer);
    }

    pub fn push_status(&self, status: InstallationStatus) {
        self.push(Ok(Some(status)));
    }

    /// Answer used once the queue is empty.
    pub fn always(&self, answer: Scripted) {
        *self.fallback.lock().unwrap() = answer;
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn patch_count(&self) -> usize {
        self.patches.lock().unwrap().len()
    }
}

impl RemoteAuthorityClient for FakeRemote {
    fn get_status(&self, _system_id: &SystemId) -> Result<Option<InstallationStatus>, RemoteError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }

    fn patch_installation(&self, _system_id: &SystemId, fields: Map<String, Value>) -> Result<(), RemoteError> {
        self.journal.lock().unwrap().push("patch".to_string());
        self.patches.lock().unwrap().push(fields);
        Ok(())
    }

    fn post_activation_log(&self, event: ActivationEvent, _system_id: &SystemId, _host: &str) -> Result<(), RemoteError> {
        self.journal.lock().unwrap().push(format!("log:{event}"));
        self.logs.lock().unwrap().push(event);
        Ok(())
    }
}

pub struct RecordingHost {
    journal: Journal,
}

impl HostControl for RecordingHost {
    fn close_storage(&self) {
        self.journal.lock().unwrap().push("close_storage".to_string());
    }

    fn power_off(&self) -> std::io::Result<()> {
        self.journal.lock().unwrap().push("power_off".to_string());
        Ok(())
    }

    fn terminate(&self) {
        self.journal.lock().unwrap().push("terminate".to_string());
    }
}

pub struct FakeTransport {
    pub sockets: bool,
    pub http_status: Option<u16>,
    pub tcp_calls: AtomicUsize,
    pub http_calls: AtomicUsize,
}

impl FakeTransport {
    pub fn offline() -> Self {
        Self {
            sockets: false,
            http_status: None,
            tcp_calls: AtomicUsize::new(0),
            http_calls: AtomicUsize::new(0),
        }
    }

    pub fn online() -> Self {
        Self {
            sockets: true,
            http_status: Some(200),
            ..Self::offline()
        }
    }
}

impl Transport for FakeTransport {
    fn tcp_connect(&self, _target: &str, _timeout: Duration) -> bool {
        self.tcp_calls.fetch_add(1, Ordering::SeqCst);
        self.sockets
    }

    fn http_get(&self, _url: &str, _timeout: Duration, _verify_tls: bool) -> Result<u16, ProbeError> {
        self.http_calls.fetch_add(1, Ordering::SeqCst);
        self.http_status
            .ok_or_else(|| ProbeError::Request("unreachable".into()))
    }
}

/// A full agent wired to fakes, driven from the test thread.
pub struct Harness {
    pub event_loop: InteractiveLoop,
    pub ctx: AgentContext,
    pub store: Arc<InMemoryConfigStore>,
    pub remote: Arc<FakeRemote>,
    pub clock: Arc<ManualClock>,
    pub journal: Journal,
}

impl Harness {
    pub fn new(store: InMemoryConfigStore) -> Self {
        rxdesk_observability::init_for_tests();

        let event_loop = InteractiveLoop::new();
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::new(store);
        let remote = Arc::new(FakeRemote::new(journal.clone()));
        let clock = Arc::new(ManualClock::new(t0()));
        let host = Arc::new(RecordingHost {
            journal: journal.clone(),
        });
        let pool = Arc::new(
            WorkerPool::new(WorkerPoolConfig::default().with_name("test-worker"), event_loop.handle()).unwrap(),
        );

        let ctx = AgentContext::new(store.clone(), remote.clone(), pool, host, clock.clone())
            .with_wait_timeout(Duration::from_secs(5));

        Self {
            event_loop,
            ctx,
            store,
            remote,
            clock,
            journal,
        }
    }

    /// Registered installation with an active cached status.
    pub fn registered() -> Self {
        Self::new(
            InMemoryConfigStore::new()
                .with("system_id", SYSTEM_ID)
                .with("account_created", "true")
                .with("status", "active"),
        )
    }

    pub fn guard(&self) -> LicenseGuard {
        LicenseGuard::new(&self.ctx)
    }

    pub fn probe(&self, transport: Arc<FakeTransport>) -> ConnectivityProbe {
        ConnectivityProbe::new(transport, ProbeSettings::default(), "https://licensing.example.com/rest/v1")
    }

    /// Poll once and drive the loop until the result has been applied.
    pub fn poll(&mut self, guard: &LicenseGuard) {
        guard.poll_now();
        let done = self
            .event_loop
            .run_until(|| !guard.is_polling(), Duration::from_secs(5));
        assert!(done, "poll did not complete");
    }

    /// Drive the loop until `cond` holds.
    pub fn run_until(&mut self, cond: impl FnMut() -> bool) {
        assert!(
            self.event_loop.run_until(cond, Duration::from_secs(5)),
            "condition not reached"
        );
    }

    pub fn config(&self, key: &str) -> Option<String> {
        self.store.snapshot().get(key).cloned()
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}
