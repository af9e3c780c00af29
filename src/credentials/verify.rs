//! Live credential checks against a registry's `/v2/` endpoint.
//!
//! The check mirrors `docker login`: an unauthenticated request reveals the
//! authentication scheme, then the credentials are presented either directly
//! (Basic) or to the token realm named in the challenge (Bearer). Anonymous
//! credentials pass only when the registry needs no login at all.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::WWW_AUTHENTICATE;
use reqwest::{Client, StatusCode, Url};

use super::registry::{DOCKER_HUB, registry_equals};
use super::{Credentials, CredentialsVerifier};
use crate::BoxFuture;
use crate::error::CredentialsError;

/// Upper bound on each registry round trip.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Registry API host serving Docker Hub.
const DOCKER_HUB_API: &str = "registry-1.docker.io";

/// Verifies credentials by logging in to the registry over HTTP.
#[derive(Debug, Clone)]
pub struct RegistryVerifier {
    client: Client,
}

impl RegistryVerifier {
    /// Builds a verifier; `verify_tls = false` accepts self-signed registry
    /// certificates.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::HttpClient`] when the TLS backend cannot
    /// be initialised.
    pub fn new(verify_tls: bool) -> Result<Self, CredentialsError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|error| CredentialsError::HttpClient {
                message: error.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Checks `credentials` against `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Unauthorized`] when the registry rejects
    /// the credentials and [`CredentialsError::RegistryUnreachable`] for
    /// transport failures or unexpected responses.
    pub async fn check(
        &self,
        registry: &str,
        credentials: &Credentials,
    ) -> Result<(), CredentialsError> {
        let url = v2_url(registry);
        tracing::debug!(registry, %url, "verifying registry credentials");

        let unauthenticated = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|error| transport_error(registry, &error))?;
        let status = unauthenticated.status();
        if status.is_success() {
            return Ok(());
        }
        if status != StatusCode::UNAUTHORIZED || credentials.is_anonymous() {
            return judge(registry, status);
        }

        let challenge = unauthenticated
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .and_then(Challenge::parse);
        let request = match challenge {
            Some(Challenge { scheme, params }) if scheme == "bearer" => {
                let Some(realm) = params.get("realm") else {
                    return Err(transport_error(registry, &"bearer challenge without realm"));
                };
                let service = params.get("service").map(String::as_str);
                self.client
                    .get(token_url(registry, realm, service, &credentials.username)?)
            }
            _ => self.client.get(&url),
        };

        let response = request
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
            .map_err(|error| transport_error(registry, &error))?;
        judge(registry, response.status())
    }
}

impl CredentialsVerifier for RegistryVerifier {
    fn verify(
        &self,
        registry: String,
        credentials: Credentials,
    ) -> BoxFuture<'_, Result<(), CredentialsError>> {
        Box::pin(async move { self.check(&registry, &credentials).await })
    }
}

fn judge(registry: &str, status: StatusCode) -> Result<(), CredentialsError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(CredentialsError::Unauthorized {
            registry: registry.to_owned(),
        })
    } else {
        Err(transport_error(registry, &format!("unexpected status {status}")))
    }
}

fn transport_error(registry: &str, error: &dyn std::fmt::Display) -> CredentialsError {
    CredentialsError::RegistryUnreachable {
        registry: registry.to_owned(),
        message: error.to_string(),
    }
}

/// The `/v2/` endpoint for `registry`.
///
/// An explicit scheme is kept; otherwise loopback registries use plain HTTP
/// and everything else HTTPS.
fn v2_url(registry: &str) -> String {
    let (scheme, rest) = registry
        .split_once("://")
        .map_or((None, registry), |(scheme, rest)| (Some(scheme), rest));
    let authority = rest.split('/').next().unwrap_or(rest);

    if registry_equals(authority, DOCKER_HUB) {
        return format!("https://{DOCKER_HUB_API}/v2/");
    }
    let chosen = scheme.unwrap_or(if is_loopback(authority) { "http" } else { "https" });
    format!("{chosen}://{authority}/v2/")
}

fn is_loopback(authority: &str) -> bool {
    let host = if authority.starts_with('[') {
        authority
            .split_once(']')
            .map_or(authority, |(host, _port)| host)
            .trim_start_matches('[')
    } else {
        authority
            .split_once(':')
            .map_or(authority, |(host, _port)| host)
    };
    host == "localhost" || host == "::1" || host.starts_with("127.")
}

fn token_url(
    registry: &str,
    realm: &str,
    service: Option<&str>,
    username: &str,
) -> Result<Url, CredentialsError> {
    let mut url = Url::parse(realm).map_err(|error| transport_error(registry, &error))?;
    {
        let mut query = url.query_pairs_mut();
        if let Some(name) = service {
            query.append_pair("service", name);
        }
        query.append_pair("account", username);
    }
    Ok(url)
}

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, PartialEq, Eq)]
struct Challenge {
    /// Lowercased scheme, e.g. `basic` or `bearer`.
    scheme: String,
    /// Parameters keyed by lowercased name.
    params: BTreeMap<String, String>,
}

impl Challenge {
    fn parse(header: &str) -> Option<Self> {
        let trimmed = header.trim();
        let (scheme, rest) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));
        if scheme.is_empty() {
            return None;
        }
        Some(Self {
            scheme: scheme.to_ascii_lowercase(),
            params: parse_params(rest),
        })
    }
}

/// Parses `key=value` pairs separated by commas, honouring quoted values
/// with backslash escapes.
fn parse_params(input: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let mut chars = input.chars().peekable();
    loop {
        while chars.next_if(|ch| ch.is_whitespace() || *ch == ',').is_some() {}
        let key: String = std::iter::from_fn(|| {
            chars.next_if(|ch| *ch != '=' && *ch != ',' && !ch.is_whitespace())
        })
        .collect();
        if key.is_empty() {
            break;
        }
        while chars.next_if(|ch| ch.is_whitespace()).is_some() {}
        if chars.next_if_eq(&'=').is_none() {
            continue;
        }
        while chars.next_if(|ch| ch.is_whitespace()).is_some() {}

        let value = if chars.next_if_eq(&'"').is_some() {
            let mut quoted = String::new();
            let mut escaped = false;
            for ch in chars.by_ref() {
                match (escaped, ch) {
                    (true, _) => {
                        quoted.push(ch);
                        escaped = false;
                    }
                    (false, '\\') => escaped = true,
                    (false, '"') => break,
                    (false, _) => quoted.push(ch),
                }
            }
            quoted
        } else {
            std::iter::from_fn(|| chars.next_if(|ch| *ch != ',' && !ch.is_whitespace())).collect()
        };
        params.insert(key.to_ascii_lowercase(), value);
    }
    params
}
