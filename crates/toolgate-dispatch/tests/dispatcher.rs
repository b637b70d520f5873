// crates/toolgate-dispatch/tests/dispatcher.rs
// ============================================================================
// Module: Dispatcher Tests
// Description: Usage, authorization, and single-flight dispatch behavior.
// ============================================================================
//! ## Overview
//! Drives the dispatcher with in-memory storage and controllable handlers to
//! check the counting order, the authorization gate, and per-identity
//! single-flight release on success, failure, and cancellation.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use toolgate_core::AccessKey;
use toolgate_core::Artifact;
use toolgate_core::AuthorizationGate;
use toolgate_core::CommandName;
use toolgate_core::DenyReason;
use toolgate_core::Identity;
use toolgate_core::InMemoryKeyStore;
use toolgate_core::InMemoryUsageMeter;
use toolgate_core::KeyId;
use toolgate_core::KeyLifecycleManager;
use toolgate_core::KeyStore;
use toolgate_core::LifecycleConfig;
use toolgate_core::ManualClock;
use toolgate_core::Payload;
use toolgate_core::StoreError;
use toolgate_core::Timestamp;
use toolgate_core::ToolError;
use toolgate_core::UsageError;
use toolgate_core::UsageMeter;
use toolgate_dispatch::AuditSink;
use toolgate_dispatch::BuiltinSettings;
use toolgate_dispatch::DispatchAuditEvent;
use toolgate_dispatch::DispatchError;
use toolgate_dispatch::DispatchOutcome;
use toolgate_dispatch::Dispatcher;
use toolgate_dispatch::HandlerTable;
use toolgate_dispatch::HandlerTableBuilder;
use toolgate_dispatch::KeyAction;
use toolgate_dispatch::KeyLifecycleAuditEvent;
use toolgate_dispatch::ToolHandler;
use toolgate_dispatch::register_builtins;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Handler that blocks until the test releases a permit.
struct BlockingHandler {
    release: Arc<Semaphore>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolHandler for BlockingHandler {
    async fn invoke(&self, identity: &Identity, _payload: &Payload) -> Result<Artifact, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let permit = self.release.acquire().await.map_err(|_| ToolError::new("closed", "closed"))?;
        permit.forget();
        Ok(Artifact::Text(format!("done for {identity}")))
    }
}

/// Handler that counts calls and echoes the payload text.
struct EchoHandler {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolHandler for EchoHandler {
    async fn invoke(&self, _identity: &Identity, payload: &Payload) -> Result<Artifact, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Artifact::Text(payload.text().unwrap_or_default().to_string()))
    }
}

/// Audit sink that keeps every record in memory.
#[derive(Default)]
struct RecordingSink {
    dispatches: Mutex<Vec<DispatchAuditEvent>>,
    keys: Mutex<Vec<KeyLifecycleAuditEvent>>,
}

impl AuditSink for RecordingSink {
    fn record_dispatch(&self, event: &DispatchAuditEvent) {
        self.dispatches.lock().unwrap().push(event.clone());
    }

    fn record_key(&self, event: &KeyLifecycleAuditEvent) {
        self.keys.lock().unwrap().push(event.clone());
    }
}

/// Usage meter whose storage is always down.
struct BrokenMeter;

impl UsageMeter for BrokenMeter {
    fn increment(&self) -> Result<u64, UsageError> {
        Err(UsageError::Storage("disk gone".to_string()))
    }

    fn total(&self) -> Result<u64, UsageError> {
        Err(UsageError::Storage("disk gone".to_string()))
    }
}

/// Key store whose reads always fail.
struct BrokenStore;

impl KeyStore for BrokenStore {
    fn insert(&self, _key: &AccessKey) -> Result<(), StoreError> {
        Err(StoreError::Store("offline".to_string()))
    }

    fn find(&self, _id: &KeyId) -> Result<Option<AccessKey>, StoreError> {
        Err(StoreError::Store("offline".to_string()))
    }

    fn find_by_owner(
        &self,
        _owner: &Identity,
        _now: Timestamp,
    ) -> Result<Option<AccessKey>, StoreError> {
        Err(StoreError::Store("offline".to_string()))
    }

    fn update(&self, _key: &AccessKey) -> Result<AccessKey, StoreError> {
        Err(StoreError::Store("offline".to_string()))
    }

    fn list(&self) -> Result<Vec<AccessKey>, StoreError> {
        Err(StoreError::Store("offline".to_string()))
    }
}

struct Fixture {
    dispatcher: Arc<Dispatcher<InMemoryKeyStore, InMemoryUsageMeter>>,
    lifecycle: Arc<KeyLifecycleManager<InMemoryKeyStore>>,
    usage: InMemoryUsageMeter,
    audit: Arc<RecordingSink>,
    clock: Arc<ManualClock>,
}

fn lifecycle() -> (Arc<KeyLifecycleManager<InMemoryKeyStore>>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(1_000_000)));
    let manager =
        KeyLifecycleManager::new(InMemoryKeyStore::new(), clock.clone(), LifecycleConfig::default())
            .unwrap();
    (Arc::new(manager), clock)
}

fn fixture_with(
    settings: BuiltinSettings,
    extra: impl FnOnce(HandlerTableBuilder) -> HandlerTableBuilder,
) -> Fixture {
    let (lifecycle, clock) = lifecycle();
    let audit = Arc::new(RecordingSink::default());
    let sink: Arc<dyn AuditSink> = audit.clone();
    let builder = register_builtins(HandlerTable::builder(), &lifecycle, settings, &sink);
    let handlers = extra(builder).fill_unavailable().build();
    let usage = InMemoryUsageMeter::new();
    let dispatcher = Dispatcher::new(
        usage.clone(),
        AuthorizationGate::new(Arc::clone(&lifecycle)),
        handlers,
        sink,
    );
    Fixture {
        dispatcher: Arc::new(dispatcher),
        lifecycle,
        usage,
        audit,
        clock,
    }
}

fn fixture(extra: impl FnOnce(HandlerTableBuilder) -> HandlerTableBuilder) -> Fixture {
    fixture_with(BuiltinSettings::default(), extra)
}

fn bind_key(fixture: &Fixture, identity: &Identity) {
    let key = fixture.lifecycle.generate_key().unwrap();
    fixture.lifecycle.register_key(&key.id, identity).unwrap();
}

async fn wait_until_running(
    dispatcher: &Dispatcher<InMemoryKeyStore, InMemoryUsageMeter>,
    identity: &Identity,
) {
    for _ in 0 .. 500 {
        if dispatcher.is_running(identity) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("handler for {identity} never started");
}

async fn wait_until_idle(
    dispatcher: &Dispatcher<InMemoryKeyStore, InMemoryUsageMeter>,
    identity: &Identity,
) {
    for _ in 0 .. 500 {
        if !dispatcher.is_running(identity) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("slot for {identity} was never released");
}

fn json_field<'a>(artifact: &'a Artifact, field: &str) -> &'a serde_json::Value {
    match artifact {
        Artifact::Json(value) => &value[field],
        other => panic!("expected json artifact, got {other:?}"),
    }
}

// ============================================================================
// SECTION: Authorization
// ============================================================================

#[tokio::test]
async fn gated_command_without_key_is_denied_and_counted() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = Arc::clone(&calls);
    let fx = fixture(move |builder| {
        builder.register(CommandName::Dump, EchoHandler {
            calls: handler_calls,
        })
    });
    let user = Identity::new("42");

    let err = fx.dispatcher.handle(&user, "dump", Payload::Empty).await.unwrap_err();

    assert_eq!(
        err,
        DispatchError::Unauthorized {
            reason: DenyReason::NoUsableKey,
        }
    );
    assert_eq!(fx.usage.total().unwrap(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn gated_command_with_bound_key_runs_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = Arc::clone(&calls);
    let fx = fixture(move |builder| {
        builder.register(CommandName::Pseudocode, EchoHandler {
            calls: handler_calls,
        })
    });
    let user = Identity::new("alice");
    bind_key(&fx, &user);

    let artifact = fx
        .dispatcher
        .handle(&user, "/pseudocode", Payload::Text("main".to_string()))
        .await
        .unwrap();

    assert_eq!(artifact, Artifact::Text("main".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.usage.total().unwrap(), 1);
}

#[tokio::test]
async fn expired_key_is_denied_after_validity_elapses() {
    let fx = fixture(|builder| builder);
    let user = Identity::new("bob");
    bind_key(&fx, &user);
    fx.clock.advance(Duration::from_secs(25 * 3_600));

    let err = fx.dispatcher.handle(&user, "courses", Payload::Empty).await.unwrap_err();

    assert_eq!(err.kind(), "unauthorized");
    assert_eq!(fx.usage.total().unwrap(), 1);
}

#[tokio::test]
async fn unknown_command_is_counted_and_rejected() {
    let fx = fixture(|builder| builder);
    let user = Identity::new("carol");

    let err = fx.dispatcher.handle(&user, "shutdown", Payload::Empty).await.unwrap_err();

    assert_eq!(err, DispatchError::UnknownCommand("shutdown".to_string()));
    assert_eq!(fx.usage.total().unwrap(), 1);
}

#[tokio::test]
async fn usage_failure_fails_closed_before_any_handler_runs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (lifecycle, _clock) = lifecycle();
    let handlers = HandlerTable::builder()
        .register(CommandName::Start, EchoHandler {
            calls: Arc::clone(&calls),
        })
        .build();
    let dispatcher = Dispatcher::new(
        BrokenMeter,
        AuthorizationGate::new(lifecycle),
        handlers,
        Arc::new(toolgate_dispatch::NoopAuditSink),
    );

    let err = dispatcher.handle(&Identity::new("dan"), "start", Payload::Empty).await.unwrap_err();

    assert!(matches!(err, DispatchError::Usage(_)));
    assert_eq!(err.outcome(), DispatchOutcome::StorageError);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn key_store_failure_is_not_reported_as_denial() {
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(0)));
    let lifecycle =
        Arc::new(KeyLifecycleManager::new(BrokenStore, clock, LifecycleConfig::default()).unwrap());
    let handlers = HandlerTable::builder().fill_unavailable().build();
    let usage = InMemoryUsageMeter::new();
    let dispatcher = Dispatcher::new(
        usage.clone(),
        AuthorizationGate::new(lifecycle),
        handlers,
        Arc::new(toolgate_dispatch::NoopAuditSink),
    );

    let err = dispatcher.handle(&Identity::new("erin"), "dump", Payload::Empty).await.unwrap_err();

    assert_eq!(err, DispatchError::Store(StoreError::Store("offline".to_string())));
    assert_eq!(usage.total().unwrap(), 1);
}

// ============================================================================
// SECTION: Single-Flight
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_command_from_same_identity_is_busy() {
    let release = Arc::new(Semaphore::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = BlockingHandler {
        release: Arc::clone(&release),
        calls: Arc::clone(&calls),
    };
    let fx = fixture(move |builder| builder.register(CommandName::ModLib, handler));
    let user = Identity::new("frank");
    bind_key(&fx, &user);

    let first = {
        let dispatcher = Arc::clone(&fx.dispatcher);
        let user = user.clone();
        tokio::spawn(async move { dispatcher.handle(&user, "mod_lib", Payload::Empty).await })
    };
    wait_until_running(&fx.dispatcher, &user).await;

    let second = fx.dispatcher.handle(&user, "mod_lib", Payload::Empty).await;
    assert_eq!(second.unwrap_err(), DispatchError::Busy);

    release.add_permits(1);
    let first = first.await.unwrap().unwrap();
    assert_eq!(first, Artifact::Text("done for frank".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.usage.total().unwrap(), 2);
    assert!(!fx.dispatcher.is_running(&user));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn free_commands_also_respect_single_flight() {
    let release = Arc::new(Semaphore::new(0));
    let handler = BlockingHandler {
        release: Arc::clone(&release),
        calls: Arc::new(AtomicUsize::new(0)),
    };
    let fx = fixture(move |builder| builder.register(CommandName::Dump, handler));
    let user = Identity::new("gina");
    bind_key(&fx, &user);

    let first = {
        let dispatcher = Arc::clone(&fx.dispatcher);
        let user = user.clone();
        tokio::spawn(async move { dispatcher.handle(&user, "dump", Payload::Empty).await })
    };
    wait_until_running(&fx.dispatcher, &user).await;

    let err = fx.dispatcher.handle(&user, "help", Payload::Empty).await.unwrap_err();
    assert_eq!(err, DispatchError::Busy);

    release.add_permits(1);
    first.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn distinct_identities_run_concurrently() {
    let release = Arc::new(Semaphore::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = BlockingHandler {
        release: Arc::clone(&release),
        calls: Arc::clone(&calls),
    };
    let fx = fixture(move |builder| builder.register(CommandName::Dump, handler));
    let alice = Identity::new("alice");
    let bob = Identity::new("bob");
    bind_key(&fx, &alice);
    bind_key(&fx, &bob);

    let mut tasks = Vec::new();
    for user in [alice.clone(), bob.clone()] {
        let dispatcher = Arc::clone(&fx.dispatcher);
        tasks.push(tokio::spawn(
            async move { dispatcher.handle(&user, "dump", Payload::Empty).await },
        ));
    }
    wait_until_running(&fx.dispatcher, &alice).await;
    wait_until_running(&fx.dispatcher, &bob).await;
    for _ in 0 .. 200 {
        if calls.load(Ordering::SeqCst) == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    release.add_permits(2);
    for task in tasks {
        task.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn slot_is_released_after_handler_failure() {
    let fx = fixture(|builder| builder);
    let user = Identity::new("hank");
    bind_key(&fx, &user);

    for _ in 0 .. 2 {
        let err = fx.dispatcher.handle(&user, "aes_keys", Payload::Empty).await.unwrap_err();
        match err {
            DispatchError::HandlerFailed {
                cause,
            } => assert_eq!(cause.code, "tool_unavailable"),
            other => panic!("expected handler failure, got {other:?}"),
        }
    }
    assert!(!fx.dispatcher.is_running(&user));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slot_is_released_when_dispatch_is_cancelled() {
    let release = Arc::new(Semaphore::new(0));
    let handler = BlockingHandler {
        release: Arc::clone(&release),
        calls: Arc::new(AtomicUsize::new(0)),
    };
    let fx = fixture(move |builder| builder.register(CommandName::GenCombo, handler));
    let user = Identity::new("ivy");
    bind_key(&fx, &user);

    let task = {
        let dispatcher = Arc::clone(&fx.dispatcher);
        let user = user.clone();
        tokio::spawn(async move { dispatcher.handle(&user, "gen_combo", Payload::Empty).await })
    };
    wait_until_running(&fx.dispatcher, &user).await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    wait_until_idle(&fx.dispatcher, &user).await;

    let reply = fx.dispatcher.handle(&user, "start", Payload::Empty).await.unwrap();
    assert!(matches!(reply, Artifact::Text(_)));
}

// ============================================================================
// SECTION: Built-In Commands
// ============================================================================

#[tokio::test]
async fn key_commands_issue_bind_and_report_validity() {
    let fx = fixture(|builder| builder);
    let user = Identity::new("jade");

    let issued = fx.dispatcher.handle(&user, "generate_key", Payload::Empty).await.unwrap();
    let key_id = json_field(&issued, "key_id").as_str().unwrap().to_string();

    let bound = fx.dispatcher.handle(&user, "set_key", Payload::Text(key_id.clone())).await.unwrap();
    assert_eq!(json_field(&bound, "status"), "registered");

    let left = fx.dispatcher.handle(&user, "time_left", Payload::Empty).await.unwrap();
    assert_eq!(json_field(&left, "remaining"), "24h 0m 0s");
    assert_eq!(json_field(&left, "remaining_ms").as_u64(), Some(24 * 3_600 * 1_000));

    let again = fx.dispatcher.handle(&user, "set_key", Payload::Text(key_id)).await.unwrap();
    assert_eq!(json_field(&again, "status"), "registered");
    assert_eq!(fx.usage.total().unwrap(), 4);

    let keys = fx.audit.keys.lock().unwrap();
    let actions: Vec<_> = keys.iter().map(|event| (event.action, event.outcome)).collect();
    assert_eq!(actions, vec![
        (KeyAction::Generate, "ok"),
        (KeyAction::Register, "ok"),
        (KeyAction::Register, "ok"),
    ]);
    drop(keys);
}

#[tokio::test]
async fn set_key_rejects_missing_and_foreign_keys() {
    let fx = fixture(|builder| builder);
    let owner = Identity::new("kim");
    let thief = Identity::new("lou");
    let key = fx.lifecycle.generate_key().unwrap();
    fx.lifecycle.register_key(&key.id, &owner).unwrap();

    let missing = fx.dispatcher.handle(&thief, "set_key", Payload::Empty).await.unwrap_err();
    let foreign = fx
        .dispatcher
        .handle(&thief, "set_key", Payload::Text(key.id.as_str().to_string()))
        .await
        .unwrap_err();
    let unknown =
        fx.dispatcher.handle(&thief, "set_key", Payload::Text("nope".to_string())).await.unwrap_err();

    let codes: Vec<String> = [missing, foreign, unknown]
        .into_iter()
        .map(|err| match err {
            DispatchError::HandlerFailed {
                cause,
            } => cause.code,
            other => panic!("expected handler failure, got {other:?}"),
        })
        .collect();
    assert_eq!(codes, vec!["missing_key", "already_bound", "not_found"]);
}

#[tokio::test]
async fn time_left_without_key_reports_no_key_registered() {
    let fx = fixture(|builder| builder);

    let err =
        fx.dispatcher.handle(&Identity::new("max"), "time_left", Payload::Empty).await.unwrap_err();

    match err {
        DispatchError::HandlerFailed {
            cause,
        } => assert_eq!(cause.code, "no_key_registered"),
        other => panic!("expected handler failure, got {other:?}"),
    }
}

#[tokio::test]
async fn generate_key_is_limited_to_admins_when_configured() {
    let settings = BuiltinSettings {
        welcome: "hi".to_string(),
        admins: vec![Identity::new("root")],
    };
    let fx = fixture_with(settings, |builder| builder);

    let err =
        fx.dispatcher.handle(&Identity::new("nia"), "generate_key", Payload::Empty).await.unwrap_err();
    assert_eq!(err.kind(), "handler_failed");
    assert!(fx.lifecycle.list_keys().unwrap().is_empty());

    fx.dispatcher.handle(&Identity::new("root"), "generate_key", Payload::Empty).await.unwrap();
    assert_eq!(fx.lifecycle.list_keys().unwrap().len(), 1);
}

#[tokio::test]
async fn welcome_lists_every_command() {
    let settings = BuiltinSettings {
        welcome: "Welcome aboard".to_string(),
        admins: Vec::new(),
    };
    let fx = fixture_with(settings, |builder| builder);

    let reply = fx.dispatcher.handle(&Identity::new("oz"), "start", Payload::Empty).await.unwrap();

    let Artifact::Text(text) = reply else {
        panic!("expected text reply");
    };
    assert!(text.starts_with("Welcome aboard"));
    for command in CommandName::ALL {
        assert!(text.contains(&format!("/{command}")), "missing {command}");
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

#[tokio::test]
async fn every_dispatch_is_audited_with_its_outcome() {
    let fx = fixture(|builder| builder);
    let user = Identity::new("pat");

    let _ = fx.dispatcher.handle(&user, "help", Payload::Empty).await;
    let _ = fx.dispatcher.handle(&user, "dump", Payload::Empty).await;
    let _ = fx.dispatcher.handle(&user, "bogus", Payload::Empty).await;

    let events = fx.audit.dispatches.lock().unwrap();
    let summary: Vec<_> = events
        .iter()
        .map(|event| (event.command.as_str(), event.outcome, event.error_kind, event.usage_total))
        .collect();
    assert_eq!(summary, vec![
        ("help", DispatchOutcome::Ok, None, Some(1)),
        ("dump", DispatchOutcome::Unauthorized, Some("unauthorized"), Some(2)),
        ("bogus", DispatchOutcome::UnknownCommand, Some("unknown_command"), Some(3)),
    ]);
    assert!(events.iter().all(|event| event.identity == "pat"));
    drop(events);
}
