// ABOUTME: Integration tests for settings parsing and validation.
// ABOUTME: Tests YAML parsing, defaults, and rejection of invalid values.

use reimage::config::*;
use reimage::error::Error;
use reimage::runtime::RuntimeType;
use std::path::Path;
use std::time::Duration;

mod parsing {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let settings = Settings::from_yaml("{}").unwrap();
        assert_eq!(settings.proxy.image, "ubuntu/squid:latest");
        assert_eq!(settings.proxy.port, 3128);
        assert_eq!(settings.proxy.probe_interval, Duration::from_millis(250));
        assert_eq!(settings.proxy.probe_attempts, 80);
        assert_eq!(settings.stop_timeout, Duration::from_secs(10));
        assert!(settings.script.is_none());
    }

    #[test]
    fn parse_full_settings() {
        let yaml = r#"
proxy:
  image: registry.local/squid:6
  port: 3129
  spool_path: /cache
  log_path: /logs
  probe_interval: 100ms
  probe_attempts: 10
status_dir: /run/reimage
stop_timeout: 30s
script: /etc/reimage/upgrade.sh
runtime: podman
socket: /run/podman/podman.sock
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.proxy.image, "registry.local/squid:6");
        assert_eq!(settings.proxy.port, 3129);
        assert_eq!(settings.proxy.spool_path, "/cache");
        assert_eq!(settings.proxy.probe_interval, Duration::from_millis(100));
        assert_eq!(settings.status_dir, Path::new("/run/reimage"));
        assert_eq!(settings.stop_timeout, Duration::from_secs(30));
        assert_eq!(settings.runtime, Some(RuntimeType::Podman));

        let rc = settings.runtime_config();
        assert_eq!(rc.socket.as_deref(), Some("/run/podman/podman.sock"));
    }

    #[test]
    fn sidecar_url_uses_configured_port() {
        let settings = Settings::from_yaml("proxy:\n  port: 8080\n").unwrap();
        assert_eq!(settings.proxy.local_url(), "http://127.0.0.1:8080/");
    }
}

mod validation {
    use super::*;

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Settings::from_yaml("proxy:\n  colour: blue\n").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn zero_port_is_rejected() {
        let err = Settings::from_yaml("proxy:\n  port: 0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn zero_probe_attempts_are_rejected() {
        let err = Settings::from_yaml("proxy:\n  probe_attempts: 0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn relative_status_dir_is_rejected() {
        let err = Settings::from_yaml("status_dir: tmp\n").unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }
}

mod loading {
    use super::*;

    #[test]
    fn no_path_means_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.proxy.port, 3128);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yml");
        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reimage.yml");
        std::fs::write(&path, "stop_timeout: 2s\n").unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.stop_timeout, Duration::from_secs(2));
    }
}
