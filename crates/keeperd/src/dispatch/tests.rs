use std::sync::Arc;
use std::sync::atomic::Ordering;

use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tempfile::TempDir;

use keeper_config::Config;

use super::*;
use crate::health::StructuredHealthReporter;
use crate::tests::support::archive::tar_gz_bytes;
use crate::tests::support::callback::{ChannelCallback, Reply, next_reply};
use crate::tests::support::fake_ipfs::{ScriptOptions, script};
use crate::tests::support::http::FakeHttpServer;

#[fixture]
fn dispatcher() -> CommandDispatcher {
    let config = Config {
        startup_timeout_secs: 10,
        stop_grace_period_ms: 2_000,
        ..Config::default()
    };
    let manager = LifecycleManager::new(&config, Arc::new(StructuredHealthReporter::new()));
    CommandDispatcher::new(Arc::new(manager))
}

fn run(dispatcher: &CommandDispatcher, action: &str, args: &Value) -> Reply {
    let (callback, replies) = ChannelCallback::pair();
    assert!(dispatcher.execute(action, args, callback), "{action} not handled");
    next_reply(&replies)
}

#[rstest]
#[case("restart")]
#[case("INIT")]
#[case("")]
fn unknown_actions_are_not_handled(dispatcher: CommandDispatcher, #[case] action: &str) {
    let (callback, replies) = ChannelCallback::pair();
    assert!(!dispatcher.execute(action, &json!([]), callback));
    assert!(replies.try_recv().is_err());
}

#[rstest]
fn stop_without_daemon_succeeds(dispatcher: CommandDispatcher) {
    let reply = run(&dispatcher, "stop", &json!([]));
    assert_eq!(reply, Reply::Success("daemon already stopped".to_owned()));
}

#[rstest]
fn status_reports_state(dispatcher: CommandDispatcher) {
    let reply = run(&dispatcher, "status", &Value::Null);
    assert_eq!(reply, Reply::Success("not_installed".to_owned()));
}

#[rstest]
fn start_before_init_reports_error(dispatcher: CommandDispatcher) {
    let reply = run(&dispatcher, "start", &json!([]));
    assert!(!reply.is_success());
    assert!(reply.message().contains("run init first"), "{reply:?}");
}

#[rstest]
#[case(json!([{"appFilesDir": "/tmp/x/"}]), "Invalid Config JSON Object")]
#[case(json!([{"appFilesDir": "/tmp/x/", "src": "::nope", "resetRepo": true}]), "Malformed URL")]
#[case(json!([{"appFilesDir": "", "src": "http://fake/a.tar.gz", "resetRepo": true}]), "install root must not be empty")]
#[case(json!([{"appFilesDir": "/tmp/x/", "src": "ftp://fake/a.tar.gz", "resetRepo": true}]), "unsupported archive URL scheme")]
fn invalid_init_arguments_are_rejected(
    dispatcher: CommandDispatcher,
    #[case] args: Value,
    #[case] prefix: &str,
) {
    let reply = run(&dispatcher, "init", &args);
    assert!(!reply.is_success());
    assert!(reply.message().starts_with(prefix), "{reply:?}");
}

#[rstest]
fn second_init_while_first_runs_is_rejected(dispatcher: CommandDispatcher) {
    dispatcher.init_in_flight.store(true, Ordering::SeqCst);
    let args = json!([{"appFilesDir": "/tmp/x/", "src": "http://fake/a.tar.gz", "resetRepo": true}]);
    let reply = run(&dispatcher, "init", &args);
    assert_eq!(reply, Reply::Error("init already in progress".to_owned()));
}

#[rstest]
fn second_start_while_first_runs_is_rejected(dispatcher: CommandDispatcher) {
    dispatcher.start_in_flight.store(true, Ordering::SeqCst);
    let reply = run(&dispatcher, "start", &json!([]));
    assert_eq!(reply, Reply::Error("start already in progress".to_owned()));
}

#[test]
fn in_flight_guard_releases_on_drop() {
    let flag = Arc::new(AtomicBool::new(false));
    let guard = InFlight::claim(&flag).expect("first claim");
    assert!(InFlight::claim(&flag).is_none());
    drop(guard);
    assert!(InFlight::claim(&flag).is_some());
}

#[rstest]
fn full_lifecycle_through_actions(dispatcher: CommandDispatcher) {
    let temp = TempDir::new().expect("temp dir");
    let log = temp.path().join("invocations.log");
    let archive = tar_gz_bytes(&[(
        "go-ipfs/ipfs",
        script(&log, ScriptOptions::default()).as_bytes(),
        0o644,
    )]);
    let server = FakeHttpServer::serve_ok(archive);
    let args = json!([{
        "appFilesDir": temp.path().join("app").to_string_lossy(),
        "src": server.url("/go-ipfs.tar.gz").as_str(),
        "resetRepo": true,
    }]);

    let init = run(&dispatcher, "init", &args);
    assert!(init.is_success(), "{init:?}");
    assert!(init.message().contains("prepared"));

    let start = run(&dispatcher, "start", &json!([]));
    assert!(start.message().starts_with("daemon started (pid "), "{start:?}");

    let status = run(&dispatcher, "status", &json!([]));
    assert!(status.message().starts_with("running (pid "), "{status:?}");

    let stop = run(&dispatcher, "stop", &json!([]));
    assert_eq!(stop, Reply::Success("daemon stopped (exit code 0)".to_owned()));
    assert_eq!(
        run(&dispatcher, "status", &json!([])),
        Reply::Success("stopped".to_owned())
    );
}

#[rstest]
fn requests_after_shutdown_are_refused(dispatcher: CommandDispatcher) {
    dispatcher.shutdown();

    let args = json!([{"appFilesDir": "/tmp/x/", "src": "http://fake/a.tar.gz", "resetRepo": true}]);
    assert_eq!(
        run(&dispatcher, "init", &args),
        Reply::Error("init rejected; keeper is shutting down".to_owned())
    );
    assert_eq!(
        run(&dispatcher, "start", &json!([])),
        Reply::Error("start rejected; keeper is shutting down".to_owned())
    );
    assert_eq!(
        run(&dispatcher, "stop", &json!([])),
        Reply::Success("daemon already stopped".to_owned())
    );
}

#[rstest]
fn shutdown_stops_a_started_daemon(dispatcher: CommandDispatcher) {
    let temp = TempDir::new().expect("temp dir");
    let archive = tar_gz_bytes(&[(
        "go-ipfs/ipfs",
        script(&temp.path().join("invocations.log"), ScriptOptions::default()).as_bytes(),
        0o644,
    )]);
    let server = FakeHttpServer::serve_ok(archive);
    let args = json!([{
        "appFilesDir": temp.path().join("app").to_string_lossy(),
        "src": server.url("/go-ipfs.tar.gz").as_str(),
        "resetRepo": false,
    }]);
    assert!(run(&dispatcher, "init", &args).is_success());
    assert!(run(&dispatcher, "start", &json!([])).is_success());
    assert!(dispatcher.manager().is_running());

    dispatcher.shutdown();
    assert!(!dispatcher.manager().is_running());
    assert_eq!(
        run(&dispatcher, "status", &json!([])),
        Reply::Success("stopped".to_owned())
    );
}
