//! Installing the global logger. One test: the subscriber is process-wide.

use pretty_assertions::assert_eq;
use reflow_log::{Config, LogError, init_with};

#[test]
fn install_reload_and_refuse_second_install() {
    let config = Config {
        reloadable: true,
        ..Config::test()
    };
    let guard = init_with(config).unwrap();
    tracing::info!(task = "n1:1", "installed");

    let handle = guard.reload_handle().unwrap();
    assert_eq!(handle.current().as_str(), "trace");
    handle.reload("warn,reflow_coordinator=debug").unwrap();
    assert_eq!(handle.current().as_str(), "warn,reflow_coordinator=debug");

    let err = handle.reload("reflow=bogus").unwrap_err();
    assert!(matches!(err, LogError::Filter { .. }));
    assert_eq!(handle.current().as_str(), "warn,reflow_coordinator=debug");

    let second = init_with(Config::test()).unwrap_err();
    assert!(matches!(second, LogError::Init(_)));
}
