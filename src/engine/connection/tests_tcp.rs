//! Unit tests for TCP, HTTP and TLS connection paths.
//!
//! All HTTP-compatible endpoints use Bollard's `connect_with_http`, which
//! creates the client configuration synchronously without validating
//! connectivity. If Bollard changes to validate endpoints eagerly, these
//! tests may start failing.

use std::path::{Path, PathBuf};

use mockable::MockEnv;
use rstest::{fixture, rstest};

use super::super::probe::MockHostProbe;
use super::super::{EngineConnector, EngineResolver, HostResolver, Platform, TlsSettings};
use super::env_with;
use crate::error::{EngineError, FuncdockError};

#[fixture]
fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().expect("failed to create runtime")
}

// =============================================================================
// EngineConnector::connect: TCP and HTTP endpoint creation
// =============================================================================

#[rstest]
#[case::tcp_with_hostname("tcp://host:2375")]
#[case::tcp_with_ip("tcp://192.168.1.100:2376")]
#[case::http_endpoint("http://remotehost:2375")]
#[case::https_endpoint("https://remotehost:2376")]
#[case::tcp_with_fqdn("tcp://docker.example.com:2375")]
fn connect_http_compatible_endpoints_creates_client(#[case] endpoint: &str) {
    let result = EngineConnector::connect(endpoint);
    result.unwrap_or_else(|_| panic!("connect {endpoint} should create client"));
}

#[rstest]
fn connect_tls_reports_missing_certificates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let tls = TlsSettings::from_cert_dir(dir.path());

    let result = EngineConnector::connect_tls("tcp://docker.example.com:2376", &tls);

    assert!(
        matches!(
            result,
            Err(FuncdockError::Engine(EngineError::ConnectionFailed { ref message }))
                if message.contains("docker.example.com:2376")
        ),
        "missing certificates must fail with a connection error"
    );
}

// =============================================================================
// TLS settings from the environment
// =============================================================================

#[rstest]
fn tls_settings_absent_without_verify_flag() {
    let env = env_with(&[("DOCKER_CERT_PATH", "/certs")]);
    assert_eq!(HostResolver::new(&env).tls_settings(), None);
}

#[rstest]
#[case::one("1")]
#[case::word("true")]
fn tls_settings_use_cert_path(#[case] verify: &str) {
    let env = env_with(&[("DOCKER_TLS_VERIFY", verify), ("DOCKER_CERT_PATH", "/certs")]);
    assert_eq!(
        HostResolver::new(&env).tls_settings(),
        Some(TlsSettings {
            ca: PathBuf::from("/certs/ca.pem"),
            cert: PathBuf::from("/certs/cert.pem"),
            key: PathBuf::from("/certs/key.pem"),
        })
    );
}

#[rstest]
fn tls_settings_default_to_home_docker_dir() {
    let env = env_with(&[("DOCKER_TLS_VERIFY", "1"), ("HOME", "/home/dev")]);
    let tls = HostResolver::new(&env)
        .tls_settings()
        .expect("tls requested");
    assert_eq!(tls.ca, Path::new("/home/dev/.docker/ca.pem"));
}

#[rstest]
#[case::zero("0")]
#[case::false_word("false")]
fn tls_settings_disabled_by_false_value(#[case] verify: &str) {
    let env = env_with(&[("DOCKER_TLS_VERIFY", verify), ("DOCKER_CERT_PATH", "/certs")]);
    assert_eq!(HostResolver::new(&env).tls_settings(), None);
}

// =============================================================================
// Resolution of network hosts
// =============================================================================

#[rstest]
#[case::tcp("tcp://10.0.0.5:2375")]
#[case::http("http://10.0.0.5:2375")]
fn network_override_yields_empty_remote_hint(
    runtime: tokio::runtime::Runtime,
    #[case] host: &str,
) {
    let env: MockEnv = env_with(&[("DOCKER_HOST", host)]);
    let mut probe = MockHostProbe::new();
    probe.expect_socket_exists().never();
    probe.expect_platform().return_const(Platform::Linux);

    let resolved = runtime
        .block_on(EngineResolver::new(&env, &probe).resolve(None))
        .expect("network host resolves");

    assert_eq!(resolved.handle.host(), host);
    assert_eq!(resolved.remote_host, "");
}

#[rstest]
fn tls_override_without_certificates_fails(runtime: tokio::runtime::Runtime) {
    let dir = tempfile::tempdir().expect("tempdir");
    let cert_path = dir.path().to_string_lossy().into_owned();
    let env = env_with(&[
        ("DOCKER_HOST", "tcp://10.0.0.5:2376"),
        ("DOCKER_TLS_VERIFY", "1"),
        ("DOCKER_CERT_PATH", cert_path.as_str()),
    ]);
    let mut probe = MockHostProbe::new();
    probe.expect_platform().return_const(Platform::Linux);

    let error = runtime
        .block_on(EngineResolver::new(&env, &probe).resolve(None))
        .expect_err("tls without certificates");

    assert!(matches!(
        error,
        FuncdockError::Engine(EngineError::ConnectionFailed { .. })
    ));
}
