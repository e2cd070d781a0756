//! Scanning a scripts directory and syncing it into an engine.

mod common;

use std::fs;

use tempfile::tempdir;

use chrollo::{EngineState, HookPhase, ScriptLoader};
use common::TestEngine;

#[test]
fn scan_and_sync() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("01_auth.lua"),
        r#"chrollo.stomp.onPreConnect(function(ctx) ctx.headers.passcode = "x" end)"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("02_disabled.lua"),
        "-- @enabled false\nchrollo.stomp.onMessage(function(ctx) end)\n",
    )
    .unwrap();
    fs::create_dir(dir.path().join("trace")).unwrap();
    fs::write(
        dir.path().join("trace").join("log.lua"),
        r#"chrollo.stomp.onMessage(function(ctx) console.log(ctx.type) end)"#,
    )
    .unwrap();

    let scan = ScriptLoader::new(dir.path()).scan();
    assert_eq!(scan.scripts.len(), 3);
    assert_eq!(scan.enabled().count(), 2);

    let mut t = TestEngine::new();
    t.engine.sync_scripts(&scan.scripts).unwrap();

    assert_eq!(t.engine.state(), EngineState::Loaded { scripts: 2 });
    assert_eq!(t.engine.hook_count(HookPhase::PreConnect), 1);
    assert_eq!(t.engine.hook_count(HookPhase::OnMessage), 1);
}

#[test]
fn broken_script_reports_its_id() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("broken.lua"), "chrollo.stomp.onMessage(").unwrap();

    let scan = ScriptLoader::new(dir.path()).scan();
    let mut t = TestEngine::new();
    t.engine.sync_scripts(&scan.scripts).unwrap();

    assert_eq!(t.engine.state(), EngineState::Error);
    let console = t.console();
    assert_eq!(console.len(), 1);
    assert!(console[0].starts_with("[SCRIPT ERROR]"));
    assert!(console[0].contains("broken"));
}
