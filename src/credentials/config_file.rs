//! Docker-style `config.json` and `auth.json` files.
//!
//! Both files share one layout: inline `auths` entries holding base64
//! `username:password`, per-registry `credHelpers`, and a global
//! `credsStore`. Keys this crate does not understand are carried through
//! untouched when a file is rewritten.

use std::collections::BTreeMap;
use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Credentials;
use super::registry::registry_equals;
use crate::error::CredentialsError;

/// File name of the function-local credentials file.
pub const AUTH_FILE_NAME: &str = "auth.json";

/// Permission bits for files holding credentials.
#[cfg(unix)]
const OWNER_ONLY: u32 = 0o600;

/// One entry of the `auths` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthEntry {
    /// Base64 encoding of `username:password`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,

    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// A Docker client configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DockerConfigFile {
    /// Inline credentials keyed by registry.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub auths: BTreeMap<String, AuthEntry>,

    /// Helper name (without the `docker-credential-` prefix) used for every
    /// registry without a more specific helper.
    #[serde(
        rename = "credsStore",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub creds_store: Option<String>,

    /// Helper names keyed by registry.
    #[serde(
        rename = "credHelpers",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub cred_helpers: BTreeMap<String, String>,

    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl DockerConfigFile {
    /// Reads `path`, returning `None` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::ConfigFile`] when the file cannot be read
    /// or is not valid JSON.
    pub fn load(path: &Utf8Path) -> Result<Option<Self>, CredentialsError> {
        let (parent, file_name) = split_path(path);
        let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
            Ok(dir) => dir,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(file_error(path, &error)),
        };
        let contents = match dir.read_to_string(file_name) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(file_error(path, &error)),
        };
        if contents.trim().is_empty() {
            return Ok(Some(Self::default()));
        }
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|error| file_error(path, &error))
    }

    /// Writes the file with owner-only permissions, creating its directory
    /// when needed.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::ConfigFile`] when the file cannot be
    /// written.
    pub fn save(&self, path: &Utf8Path) -> Result<(), CredentialsError> {
        let (parent, file_name) = split_path(path);
        let mut contents =
            serde_json::to_vec_pretty(self).map_err(|error| file_error(path, &error))?;
        contents.push(b'\n');

        let dir = Dir::create_ambient_dir_all(parent, ambient_authority())
            .and_then(|()| Dir::open_ambient_dir(parent, ambient_authority()))
            .map_err(|error| file_error(path, &error))?;

        let mut options = cap_std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        cap_std::fs::OpenOptionsExt::mode(&mut options, OWNER_ONLY);
        let mut file = dir
            .open_with(file_name, &options)
            .map(cap_std::fs_utf8::File::into_std)
            .map_err(|error| file_error(path, &error))?;
        // The creation mode does not apply to a file that already existed.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let current = file
                .metadata()
                .map_err(|error| file_error(path, &error))?
                .permissions()
                .mode();
            if current & 0o777 != OWNER_ONLY {
                file.set_permissions(std::fs::Permissions::from_mode(OWNER_ONLY))
                    .map_err(|error| file_error(path, &error))?;
            }
        }
        file.write_all(&contents)
            .and_then(|()| file.flush())
            .map_err(|error| file_error(path, &error))
    }

    /// Inline credentials for `registry`, with the key they were found under.
    ///
    /// Entries whose `auth` does not decode to a non-empty username are
    /// skipped.
    #[must_use]
    pub fn inline_credentials(&self, registry: &str) -> Option<(&str, Credentials)> {
        self.auths
            .iter()
            .filter(|(key, _)| registry_equals(key, registry))
            .find_map(|(key, entry)| {
                let credentials = decode_auth(entry.auth.as_deref()?)?;
                Some((key.as_str(), credentials))
            })
    }

    /// The per-registry helper for `registry`, with the key it is listed
    /// under.
    #[must_use]
    pub fn helper_for(&self, registry: &str) -> Option<(&str, &str)> {
        self.cred_helpers
            .iter()
            .find(|(key, helper)| !helper.is_empty() && registry_equals(key, registry))
            .map(|(key, helper)| (key.as_str(), helper.as_str()))
    }

    /// The global credential store, if one is configured.
    #[must_use]
    pub fn creds_store(&self) -> Option<&str> {
        self.creds_store.as_deref().filter(|store| !store.is_empty())
    }

    /// Sets the global credential store.
    pub fn set_creds_store(&mut self, helper: &str) {
        self.creds_store = Some(helper.to_owned());
    }
}

/// Decodes a base64 `username:password` pair.
///
/// Returns `None` when the value is not valid base64, lacks a `:`, or has an
/// empty username.
#[must_use]
pub fn decode_auth(encoded: &str) -> Option<Credentials> {
    let bytes = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    let (username, password) = decoded.split_once(':')?;
    if username.is_empty() {
        return None;
    }
    Some(Credentials::new(username, password))
}

/// Encodes credentials the way `auths` entries store them.
#[must_use]
pub fn encode_auth(credentials: &Credentials) -> String {
    STANDARD.encode(format!("{}:{}", credentials.username, credentials.password))
}

/// Location of the user's Docker configuration.
///
/// `DOCKER_CONFIG` names the directory when set; otherwise `~/.docker` is
/// used.
#[must_use]
pub fn docker_config_path<E: mockable::Env>(env: &E) -> Option<Utf8PathBuf> {
    if let Some(dir) = env.string("DOCKER_CONFIG").filter(|dir| !dir.is_empty()) {
        return Some(Utf8PathBuf::from(dir).join("config.json"));
    }
    home_dir(env).map(|home| home.join(".docker").join("config.json"))
}

/// Location of the function-local credentials file under `config_dir`, or
/// under `~/.config/func` when no directory is given.
#[must_use]
pub fn auth_file_path<E: mockable::Env>(
    env: &E,
    config_dir: Option<&Utf8Path>,
) -> Option<Utf8PathBuf> {
    if let Some(dir) = config_dir {
        return Some(dir.join(AUTH_FILE_NAME));
    }
    let base = env
        .string("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(Utf8PathBuf::from)
        .or_else(|| home_dir(env).map(|home| home.join(".config")))?;
    Some(base.join("func").join(AUTH_FILE_NAME))
}

fn home_dir<E: mockable::Env>(env: &E) -> Option<Utf8PathBuf> {
    env.string("HOME")
        .filter(|home| !home.is_empty())
        .map(Utf8PathBuf::from)
        .or_else(|| dirs::home_dir().and_then(|home| Utf8PathBuf::from_path_buf(home).ok()))
}

fn split_path(path: &Utf8Path) -> (&Utf8Path, &str) {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().unwrap_or(path.as_str());
    (parent, file_name)
}

fn file_error(path: &Utf8Path, error: &dyn std::fmt::Display) -> CredentialsError {
    CredentialsError::ConfigFile {
        path: path.as_std_path().to_path_buf(),
        message: error.to_string(),
    }
}
