// crates/toolgate-dispatch/tests/audit_sinks.rs
// ============================================================================
// Module: Audit Sink Tests
// Description: JSON-lines output of the file audit sink.
// ============================================================================
//! ## Overview
//! Ensures audit records land as one JSON object per line and that key ids
//! never appear in full.

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

use serde_json::Value;
use toolgate_core::Identity;
use toolgate_core::KeyId;
use toolgate_dispatch::AuditSink;
use toolgate_dispatch::DispatchAuditEvent;
use toolgate_dispatch::DispatchOutcome;
use toolgate_dispatch::FileAuditSink;
use toolgate_dispatch::KeyAction;
use toolgate_dispatch::KeyLifecycleAuditEvent;

#[test]
fn file_sink_appends_one_json_object_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let identity = Identity::new("user-7");
    let key_id = KeyId::new("0123456789abcdef0123456789abcdef");

    {
        let sink = FileAuditSink::new(&path).unwrap();
        sink.record_dispatch(&DispatchAuditEvent::new(
            &identity,
            "dump",
            DispatchOutcome::Unauthorized,
            Some("unauthorized"),
            Some(3),
            1,
        ));
        sink.record_key(&KeyLifecycleAuditEvent::new(
            KeyAction::Register,
            Some(&key_id),
            Some(&identity),
            "ok",
        ));
    }
    let reopened = FileAuditSink::new(&path).unwrap();
    reopened.record_key(&KeyLifecycleAuditEvent::new(KeyAction::Generate, None, None, "not_admin"));

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<Value> =
        contents.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(lines.len(), 3);

    assert_eq!(lines[0]["event"], "command_dispatch");
    assert_eq!(lines[0]["outcome"], "unauthorized");
    assert_eq!(lines[0]["usage_total"].as_u64(), Some(3));

    assert_eq!(lines[1]["event"], "key_lifecycle");
    assert_eq!(lines[1]["action"], "register");
    assert_eq!(lines[1]["identity"], "user-7");
    let redacted = lines[1]["key_id"].as_str().unwrap();
    assert_ne!(redacted, key_id.as_str());
    assert!(!contents.contains(key_id.as_str()));

    assert_eq!(lines[2]["action"], "generate");
    assert!(lines[2]["key_id"].is_null());
}
