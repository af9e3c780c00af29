//! Registry host comparison and image reference parsing.

use reqwest::Url;

use crate::error::CredentialsError;

/// Registry assumed for image references without an explicit registry host.
pub const DOCKER_HUB: &str = "docker.io";

/// Compares two registry spellings.
///
/// Registries are equal when host and port match after stripping any scheme
/// and path, with the standard ports 80 and 443 treated as no port at all. Any
/// two hosts ending in `docker.io` are equal, so `docker.io`,
/// `index.docker.io` and `registry-1.docker.io` all name Docker Hub.
#[must_use]
pub fn registry_equals(left: &str, right: &str) -> bool {
    let (left_host, left_port) = host_port(left);
    let (right_host, right_port) = host_port(right);

    (left_host == right_host && left_port == right_port)
        || (left_host.ends_with(DOCKER_HUB) && right_host.ends_with(DOCKER_HUB))
}

/// Splits a registry spelling into host and port, with the port empty when
/// absent or standard.
fn host_port(registry: &str) -> (String, String) {
    let (host, port) = raw_host_port(registry);
    if port == "80" || port == "443" {
        (host, String::new())
    } else {
        (host, port)
    }
}

fn raw_host_port(registry: &str) -> (String, String) {
    if !registry.contains("://") {
        if let Some((host, port)) = split_host_port(registry) {
            return (host.to_owned(), port.to_owned());
        }
    }

    let with_scheme = if registry.contains("://") {
        registry.to_owned()
    } else {
        format!("https://{registry}")
    };
    match Url::parse(&with_scheme) {
        Ok(url) => (
            url.host_str()
                .map(|host| host.trim_start_matches('[').trim_end_matches(']'))
                .unwrap_or_default()
                .to_owned(),
            url.port().map(|port| port.to_string()).unwrap_or_default(),
        ),
        Err(_) => (registry.to_owned(), String::new()),
    }
}

/// `host:port` or `[v6]:port` with nothing after the port.
fn split_host_port(value: &str) -> Option<(&str, &str)> {
    let (host, port) = value.rsplit_once(':')?;
    if port.is_empty() || !port.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let bare = if let Some(inner) = host.strip_prefix('[') {
        inner.strip_suffix(']')?
    } else if host.contains(':') || host.contains('/') {
        return None;
    } else {
        host
    };
    (!bare.is_empty()).then_some((bare, port))
}

/// Extracts the registry host from an image reference.
///
/// The first path component names a registry when it contains a `.` or a
/// `:`, or is `localhost`; otherwise the image lives on Docker Hub.
///
/// # Errors
///
/// Returns [`CredentialsError::InvalidReference`] for empty references and
/// references with empty components.
pub fn registry_from_image(image: &str) -> Result<String, CredentialsError> {
    let invalid = || CredentialsError::InvalidReference {
        reference: image.to_owned(),
    };
    let trimmed = image.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let name = trimmed.split_once('@').map_or(trimmed, |(name, _digest)| name);

    let Some((first, rest)) = name.split_once('/') else {
        return Ok(DOCKER_HUB.to_owned());
    };
    if first.is_empty() || rest.is_empty() || rest.split('/').any(str::is_empty) {
        return Err(invalid());
    }

    let is_registry = first.contains('.') || first.contains(':') || first == "localhost";
    Ok(if is_registry {
        first.to_owned()
    } else {
        DOCKER_HUB.to_owned()
    })
}
