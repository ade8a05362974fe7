// Environment layer of the configuration loader
//
// Kept in its own test binary with a single test: it mutates the process
// environment, which other tests must not observe.

use std::time::Duration;

use roomsim_core::config::Config;
use roomsim_core::Credentials;

const VARS: [(&str, &str); 6] = [
    ("ROOMSIM_CONNECTION__URL", "ws://x"),
    ("ROOMSIM_CONNECTION__TOKEN", "tok"),
    ("ROOMSIM_PUBLISH__TARGETS", "a.h264,data://127.0.0.1:9"),
    ("ROOMSIM_PUBLISH__DATA_CHUNK_SIZE", "128"),
    ("ROOMSIM_PUBLISH__FPS", "25"),
    ("ROOMSIM_LOGGING__FORMAT", "json"),
];

#[test]
fn test_environment_overrides_defaults() {
    std::env::remove_var("ROOMSIM_CONFIG_PATH");
    for (key, value) in VARS {
        std::env::set_var(key, value);
    }

    let loaded = Config::load(None);

    for (key, _) in VARS {
        std::env::remove_var(key);
    }
    let config = loaded.unwrap();

    assert_eq!(config.publish.targets, vec!["a.h264", "data://127.0.0.1:9"]);
    assert_eq!(config.publish.data_chunk_size, 128);
    assert_eq!(config.publish.fps, 25.0);
    assert_eq!(config.connection.url.as_deref(), Some("ws://x"));
    assert!(config.logging.is_json());

    // Untouched keys keep their defaults
    assert_eq!(config.publish.dial_timeout_secs, 10);
    assert_eq!(config.logging.level, "info");

    assert!(config.validate().is_empty(), "{:?}", config.validate());
    assert!(matches!(config.credentials().unwrap(), Credentials::Token { .. }));
    assert_eq!(config.publish_plan().options.data_chunk_size, 128);
    assert_eq!(config.publish_plan().options.dial_timeout, Duration::from_secs(10));
}
