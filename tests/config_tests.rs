//! Unit tests for configuration validation and the state directory.

use camino::Utf8PathBuf;
use elestio::config::{ConfigError, ElestioConfig};
use elestio::store::{Credential, CredentialStore, Session, SessionStore};
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn valid_config() -> ElestioConfig {
    ElestioConfig {
        default_project: Some(String::from("7")),
        ..ElestioConfig::default()
    }
}

fn temp_root(tmp: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap_or_else(|non_utf8_path| {
        panic!("temp dir should be utf8: {}", non_utf8_path.display())
    })
}

#[rstest]
fn defaults_are_valid(valid_config: ElestioConfig) {
    valid_config
        .validate()
        .unwrap_or_else(|err| panic!("defaults should validate: {err}"));
    assert_eq!(valid_config.deploy_timeout().as_secs(), 600);
    assert_eq!(valid_config.poll_interval().as_secs(), 15);
    assert_eq!(valid_config.not_found_interval().as_secs(), 10);
}

/// Verifies that validation produces actionable errors mentioning both the
/// environment variable and configuration file for each required field.
#[rstest]
#[case::base_url(|cfg: &mut ElestioConfig| cfg.base_url.clear(), "ELESTIO_BASE_URL", "base_url")]
#[case::provider(
    |cfg: &mut ElestioConfig| cfg.default_provider.clear(),
    "ELESTIO_DEFAULT_PROVIDER",
    "default_provider"
)]
#[case::datacenter(
    |cfg: &mut ElestioConfig| cfg.default_datacenter = String::from("  "),
    "ELESTIO_DEFAULT_DATACENTER",
    "default_datacenter"
)]
#[case::server_type(
    |cfg: &mut ElestioConfig| cfg.default_server_type.clear(),
    "ELESTIO_DEFAULT_SERVER_TYPE",
    "default_server_type"
)]
#[case::support(
    |cfg: &mut ElestioConfig| cfg.default_support.clear(),
    "ELESTIO_DEFAULT_SUPPORT",
    "default_support"
)]
fn missing_fields_produce_actionable_errors(
    valid_config: ElestioConfig,
    #[case] mutate: fn(&mut ElestioConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    mutate(&mut cfg);

    let Err(ConfigError::MissingField(message)) = cfg.validate() else {
        panic!("expected MissingField for {toml_key}");
    };
    assert!(message.contains(env_var), "error should mention {env_var}: {message}");
    assert!(message.contains(toml_key), "error should mention {toml_key}: {message}");
    assert!(
        message.contains("elestio.toml"),
        "error should mention config file: {message}"
    );
}

#[rstest]
fn zero_poll_interval_is_rejected(valid_config: ElestioConfig) {
    let cfg = ElestioConfig {
        poll_interval_secs: 0,
        ..valid_config
    };

    let Err(ConfigError::InvalidValue(message)) = cfg.validate() else {
        panic!("zero interval should be rejected");
    };
    assert!(
        message.contains("ELESTIO_POLL_INTERVAL_SECS"),
        "unexpected error: {message}"
    );
}

#[rstest]
fn state_dir_override_is_used_for_the_store(valid_config: ElestioConfig) {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = temp_root(&tmp);
    let cfg = ElestioConfig {
        state_dir: Some(root.to_string()),
        ..valid_config
    };

    let store = cfg
        .file_store()
        .unwrap_or_else(|err| panic!("file store: {err}"));

    assert_eq!(store.root(), root.as_path());
    assert_eq!(store.credentials_path(), root.join("credentials.toml"));
    assert_eq!(store.session_path(), root.join("session.toml"));
}

#[rstest]
fn store_survives_a_reopen(valid_config: ElestioConfig) {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let cfg = ElestioConfig {
        state_dir: Some(temp_root(&tmp).join("nested").to_string()),
        ..valid_config
    };
    let expiry = chrono::DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
        .unwrap_or_else(|err| panic!("timestamp: {err}"))
        .to_utc();

    let writer = cfg.file_store().unwrap_or_else(|err| panic!("store: {err}"));
    writer
        .save_credential(&Credential::new("ops@example.com", "api-secret"))
        .unwrap_or_else(|err| panic!("save credential: {err}"));
    writer
        .save_session(&Session::new("jwt", expiry))
        .unwrap_or_else(|err| panic!("save session: {err}"));

    let reader = cfg.file_store().unwrap_or_else(|err| panic!("store: {err}"));
    let credential = reader
        .load_credential()
        .unwrap_or_else(|err| panic!("load credential: {err}"));
    let session = reader
        .load_session()
        .unwrap_or_else(|err| panic!("load session: {err}"));

    assert_eq!(credential, Some(Credential::new("ops@example.com", "api-secret")));
    assert_eq!(session, Session::new("jwt", expiry));
}
