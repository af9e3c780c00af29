//! Registry credential resolution.
//!
//! [`CredentialsResolver`] finds credentials for an image registry by walking
//! an ordered list of sources and stopping at the first usable entry:
//!
//! 1. The function-local `auth.json` (inline entries, then its `credsStore`).
//!    These are caller-managed and trusted without verification.
//! 2. The Docker configuration file: inline `auths`, then the registry's
//!    `credHelpers` entry, then the global `credsStore`. Each candidate is
//!    verified against the registry; a rejected candidate falls through to
//!    the next source.
//! 3. Any [`CredentialsLoader`]s registered by the caller, verified the same
//!    way.
//! 4. Anonymous access: when the registry accepts an unauthenticated request,
//!    empty credentials are returned and nobody is asked.
//! 5. An interactive prompt, retried while the registry rejects the answer.
//!
//! Freshly prompted credentials may then be saved through a credential
//! helper chosen by the user.

mod config_file;
mod discovery;
mod helper;
mod prompt;
mod registry;
mod verify;

#[cfg(all(test, unix))]
mod test_helpers;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use mockable::Env;

pub use config_file::{
    AUTH_FILE_NAME, AuthEntry, DockerConfigFile, auth_file_path, decode_auth, docker_config_path,
    encode_auth,
};
pub use discovery::discover_helpers;
pub use helper::{CredentialHelper, HELPER_PREFIX, is_unsupported_operation};
pub use prompt::{TerminalCredentialsPrompt, TerminalStoreChooser};
pub use registry::{DOCKER_HUB, registry_equals, registry_from_image};
pub use verify::RegistryVerifier;

use crate::BoxFuture;
use crate::error::CredentialsError;
use crate::path_search::search_dirs;

/// Default number of interactive attempts before giving up.
pub const DEFAULT_PROMPT_ATTEMPTS: u32 = 3;

/// A username and password for a registry.
///
/// The empty pair stands for anonymous access.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// The registry username.
    pub username: String,
    /// The registry password or token.
    pub password: String,
}

impl Credentials {
    /// Pairs a username with a password.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// No username and no password.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Whether these are the empty credentials of anonymous access.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Asks the user for credentials.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialsPrompt: Send + Sync {
    /// Returns candidate credentials for `registry`, or `None` when the user
    /// gives up.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::PromptFailed`] when input cannot be read.
    fn prompt(&self, registry: &str) -> Result<Option<Credentials>, CredentialsError>;
}

/// Checks credentials against a live registry.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialsVerifier: Send + Sync {
    /// Resolves to `Ok(())` when `registry` accepts `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Unauthorized`] when the registry rejects
    /// the credentials; any other error aborts resolution.
    fn verify(
        &self,
        registry: String,
        credentials: Credentials,
    ) -> BoxFuture<'_, Result<(), CredentialsError>>;
}

/// A non-interactive source of credentials, such as a cluster that shares
/// its registry login.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialsLoader: Send + Sync {
    /// Resolves to the credentials this source holds for `registry`, or
    /// `None` when it has none.
    ///
    /// # Errors
    ///
    /// Any error aborts resolution.
    fn load(
        &self,
        registry: String,
    ) -> BoxFuture<'_, Result<Option<Credentials>, CredentialsError>>;
}

/// Picks the credential helper that should save fresh credentials.
#[cfg_attr(test, mockall::automock)]
pub trait StoreChooser: Send + Sync {
    /// Chooses one of the `available` helper executables, or `None` to skip
    /// saving.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::PromptFailed`] when input cannot be read.
    fn choose(&self, available: &[String]) -> Result<Option<String>, CredentialsError>;
}

/// A [`StoreChooser`] that never saves.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStore;

impl StoreChooser for NoStore {
    fn choose(&self, _available: &[String]) -> Result<Option<String>, CredentialsError> {
        Ok(None)
    }
}

/// Resolves verified registry credentials from config files, credential
/// helpers and the user.
pub struct CredentialsResolver {
    auth_file: Option<Utf8PathBuf>,
    docker_config: Option<Utf8PathBuf>,
    search_dirs: Vec<PathBuf>,
    loaders: Vec<Arc<dyn CredentialsLoader>>,
    prompt: Option<Arc<dyn CredentialsPrompt>>,
    verifier: Arc<dyn CredentialsVerifier>,
    chooser: Arc<dyn StoreChooser>,
    prompt_attempts: u32,
}

impl CredentialsResolver {
    /// Creates a resolver with no config files, no prompt and no
    /// persistence.
    #[must_use]
    pub fn new(verifier: Arc<dyn CredentialsVerifier>) -> Self {
        Self {
            auth_file: None,
            docker_config: None,
            search_dirs: Vec::new(),
            loaders: Vec::new(),
            prompt: None,
            verifier,
            chooser: Arc::new(NoStore),
            prompt_attempts: DEFAULT_PROMPT_ATTEMPTS,
        }
    }

    /// Creates a resolver reading the standard file locations and `PATH`
    /// from `env`.
    ///
    /// `config_dir` overrides the directory holding the function-local
    /// `auth.json`.
    #[must_use]
    pub fn from_env<E: Env>(
        env: &E,
        config_dir: Option<&Utf8Path>,
        verifier: Arc<dyn CredentialsVerifier>,
    ) -> Self {
        Self {
            auth_file: auth_file_path(env, config_dir),
            docker_config: docker_config_path(env),
            search_dirs: search_dirs(env.string("PATH").as_deref()),
            ..Self::new(verifier)
        }
    }

    /// Sets the function-local `auth.json` path.
    #[must_use]
    pub fn with_auth_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.auth_file = Some(path.into());
        self
    }

    /// Sets the Docker `config.json` path.
    #[must_use]
    pub fn with_docker_config(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.docker_config = Some(path.into());
        self
    }

    /// Sets the directories searched for credential helpers.
    #[must_use]
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    /// Adds a loader consulted after the config files and before the
    /// prompt. Loaders run in the order they were added.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn CredentialsLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Enables interactive prompting.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn CredentialsPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Sets the chooser consulted before saving prompted credentials.
    #[must_use]
    pub fn with_store_chooser(mut self, chooser: Arc<dyn StoreChooser>) -> Self {
        self.chooser = chooser;
        self
    }

    /// Bounds the interactive loop; zero is treated as one attempt.
    #[must_use]
    pub const fn with_prompt_attempts(mut self, attempts: u32) -> Self {
        self.prompt_attempts = attempts;
        self
    }

    /// Credential helpers installed in the search directories.
    #[must_use]
    pub fn available_helpers(&self) -> Vec<String> {
        discover_helpers(&self.search_dirs)
    }

    /// Resolves credentials for the registry hosting `image`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::InvalidReference`] for malformed
    /// references, otherwise as [`Self::resolve`].
    pub async fn resolve_image(&self, image: &str) -> Result<Credentials, CredentialsError> {
        let registry = registry_from_image(image)?;
        self.resolve(&registry).await
    }

    /// Resolves credentials for `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::NotFound`] when no source yields
    /// credentials, [`CredentialsError::Unauthorized`] when every prompted
    /// attempt is rejected, and propagates config file, helper, loader and
    /// transport failures.
    pub async fn resolve(&self, registry: &str) -> Result<Credentials, CredentialsError> {
        let local = load(self.auth_file.as_deref())?;
        if let Some(credentials) = self.lookup_local(local.as_ref(), registry).await? {
            return Ok(credentials);
        }

        if let Some(docker) = load(self.docker_config.as_deref())?
            && let Some(credentials) = self.lookup_docker_config(&docker, registry).await?
        {
            return Ok(credentials);
        }

        if let Some(credentials) = self.lookup_loaders(registry).await? {
            return Ok(credentials);
        }

        let anonymous = Credentials::anonymous();
        if self.accept(registry, "anonymous", &anonymous).await? {
            return Ok(anonymous);
        }

        let credentials = self.prompt_until_verified(registry).await?;
        self.persist(local, registry, &credentials).await;
        Ok(credentials)
    }

    async fn lookup_local(
        &self,
        local: Option<&DockerConfigFile>,
        registry: &str,
    ) -> Result<Option<Credentials>, CredentialsError> {
        let Some(file) = local else {
            return Ok(None);
        };
        if let Some((_, credentials)) = file.inline_credentials(registry) {
            tracing::debug!(registry, "using function-local credentials");
            return Ok(Some(credentials));
        }
        let Some(store) = file.creds_store() else {
            return Ok(None);
        };
        let found = self.helper(store).find(registry).await?;
        if found.is_some() {
            tracing::debug!(registry, helper = store, "using function-local credentials store");
        }
        Ok(found.map(|(_, credentials)| credentials))
    }

    async fn lookup_docker_config(
        &self,
        docker: &DockerConfigFile,
        registry: &str,
    ) -> Result<Option<Credentials>, CredentialsError> {
        if let Some((_, credentials)) = docker.inline_credentials(registry)
            && self.accept(registry, "docker config", &credentials).await?
        {
            return Ok(Some(credentials));
        }

        if let Some((key, name)) = docker.helper_for(registry)
            && let Some(credentials) = self.helper(name).get(key).await?
            && self.accept(registry, "credHelpers", &credentials).await?
        {
            return Ok(Some(credentials));
        }

        if let Some(store) = docker.creds_store()
            && let Some((_, credentials)) = self.helper(store).find(registry).await?
            && self.accept(registry, "credsStore", &credentials).await?
        {
            return Ok(Some(credentials));
        }

        Ok(None)
    }

    async fn lookup_loaders(
        &self,
        registry: &str,
    ) -> Result<Option<Credentials>, CredentialsError> {
        for loader in &self.loaders {
            if let Some(credentials) = loader.load(registry.to_owned()).await?
                && self.accept(registry, "loader", &credentials).await?
            {
                return Ok(Some(credentials));
            }
        }
        Ok(None)
    }

    /// Verifies a stored candidate; a rejection means "try the next source".
    async fn accept(
        &self,
        registry: &str,
        source: &'static str,
        credentials: &Credentials,
    ) -> Result<bool, CredentialsError> {
        match self
            .verifier
            .verify(registry.to_owned(), credentials.clone())
            .await
        {
            Ok(()) => {
                tracing::debug!(registry, source, "stored credentials verified");
                Ok(true)
            }
            Err(CredentialsError::Unauthorized { .. }) => {
                tracing::debug!(registry, source, "stored credentials rejected");
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    async fn prompt_until_verified(&self, registry: &str) -> Result<Credentials, CredentialsError> {
        let not_found = || CredentialsError::NotFound {
            registry: registry.to_owned(),
        };
        let Some(prompt) = self.prompt.as_ref() else {
            return Err(not_found());
        };

        for attempt in 1..=self.prompt_attempts.max(1) {
            let asking = Arc::clone(prompt);
            let owned = registry.to_owned();
            let Some(candidate) = off_runtime(move || asking.prompt(&owned)).await? else {
                return Err(not_found());
            };
            match self
                .verifier
                .verify(registry.to_owned(), candidate.clone())
                .await
            {
                Ok(()) => return Ok(candidate),
                Err(CredentialsError::Unauthorized { .. }) => {
                    tracing::warn!(registry, attempt, "registry rejected the credentials");
                }
                Err(error) => return Err(error),
            }
        }

        Err(CredentialsError::Unauthorized {
            registry: registry.to_owned(),
        })
    }

    async fn persist(
        &self,
        local: Option<DockerConfigFile>,
        registry: &str,
        credentials: &Credentials,
    ) {
        match self.save(local, registry, credentials).await {
            Ok(()) => {}
            Err(error) if is_unsupported_operation(&error) => {
                tracing::warn!(registry, %error, "credential helper cannot save credentials");
            }
            Err(error) => tracing::warn!(registry, %error, "failed to save credentials"),
        }
    }

    async fn save(
        &self,
        local: Option<DockerConfigFile>,
        registry: &str,
        credentials: &Credentials,
    ) -> Result<(), CredentialsError> {
        let configured = local
            .as_ref()
            .and_then(DockerConfigFile::creds_store)
            .map(str::to_owned);
        let store = if let Some(name) = configured {
            name
        } else {
            let available = self.available_helpers();
            let chooser = Arc::clone(&self.chooser);
            let chosen = off_runtime(move || chooser.choose(&available))
                .await?
                .unwrap_or_default();
            let name = chosen.strip_prefix(HELPER_PREFIX).unwrap_or(&chosen).to_owned();
            if name.is_empty() {
                tracing::debug!(registry, "not saving credentials");
                return Ok(());
            }
            if let Some(path) = self.auth_file.as_deref() {
                let mut file = local.unwrap_or_default();
                file.set_creds_store(&name);
                file.save(path)?;
            }
            name
        };

        self.helper(&store).store(registry, credentials).await?;
        tracing::info!(registry, helper = %store, "saved credentials");
        Ok(())
    }

    fn helper(&self, name: &str) -> CredentialHelper {
        CredentialHelper::locate(name, &self.search_dirs)
    }
}

/// Runs a terminal interaction on the blocking pool.
async fn off_runtime<T, F>(interaction: F) -> Result<T, CredentialsError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CredentialsError> + Send + 'static,
{
    tokio::task::spawn_blocking(interaction)
        .await
        .map_err(|error| CredentialsError::PromptFailed {
            message: error.to_string(),
        })?
}

fn load(path: Option<&Utf8Path>) -> Result<Option<DockerConfigFile>, CredentialsError> {
    path.map_or(Ok(None), DockerConfigFile::load)
}
