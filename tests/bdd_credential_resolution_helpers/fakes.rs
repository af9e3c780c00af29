//! In-process stand-ins for the registry, the user and a credential helper.

use std::collections::VecDeque;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use funcdock::BoxFuture;
use funcdock::credentials::{Credentials, CredentialsPrompt, CredentialsVerifier, StoreChooser};
use funcdock::error::CredentialsError;

use super::state::StepResult;

/// A registry that accepts a fixed set of logins.
pub struct AllowListVerifier {
    accepted: Vec<Credentials>,
}

impl AllowListVerifier {
    pub(crate) const fn new(accepted: Vec<Credentials>) -> Self {
        Self { accepted }
    }
}

impl CredentialsVerifier for AllowListVerifier {
    fn verify(
        &self,
        registry: String,
        credentials: Credentials,
    ) -> BoxFuture<'_, Result<(), CredentialsError>> {
        let accepted = self.accepted.contains(&credentials);
        Box::pin(async move {
            if accepted {
                Ok(())
            } else {
                Err(CredentialsError::Unauthorized { registry })
            }
        })
    }
}

/// A user who gives the queued answers, then gives up.
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<Credentials>>,
    asked: AtomicUsize,
}

impl ScriptedPrompt {
    pub(crate) fn new(answers: Vec<Credentials>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            asked: AtomicUsize::new(0),
        }
    }

    pub(crate) fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl CredentialsPrompt for ScriptedPrompt {
    fn prompt(&self, _registry: &str) -> Result<Option<Credentials>, CredentialsError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        let mut answers = self
            .answers
            .lock()
            .map_err(|_| CredentialsError::PromptFailed {
                message: String::from("answer queue poisoned"),
            })?;
        Ok(answers.pop_front())
    }
}

/// Always picks the same helper, or declines.
pub struct FixedChooser(pub(crate) Option<String>);

impl StoreChooser for FixedChooser {
    fn choose(&self, available: &[String]) -> Result<Option<String>, CredentialsError> {
        Ok(self
            .0
            .clone()
            .filter(|name| available.iter().any(|helper| helper.ends_with(name.as_str()))))
    }
}

/// Installs `docker-credential-<name>` in `bin`, backed by `<name>.entries`.
pub(crate) fn install_helper(
    bin: &Path,
    name: &str,
    entries: &[(String, Credentials)],
) -> StepResult<()> {
    let db = bin.join(format!("{name}.entries"));
    let seeded: String = entries
        .iter()
        .map(|(url, creds)| format!("{url}\t{}\t{}\n", creds.username, creds.password))
        .collect();
    std::fs::write(&db, seeded).map_err(|error| format!("failed to seed helper: {error}"))?;

    let program = bin.join(format!("docker-credential-{name}"));
    std::fs::write(&program, HELPER_SCRIPT.replace("@DB@", &db.to_string_lossy()))
        .map_err(|error| format!("failed to write helper: {error}"))?;
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755))
        .map_err(|error| format!("failed to make helper executable: {error}"))
}

/// `(url, username)` pairs stored by helper `name`.
pub(crate) fn helper_entries(bin: &Path, name: &str) -> StepResult<Vec<(String, String)>> {
    let db = std::fs::read_to_string(bin.join(format!("{name}.entries")))
        .map_err(|error| format!("failed to read helper entries: {error}"))?;
    Ok(db
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            Some((fields.next()?.to_owned(), fields.next()?.to_owned()))
        })
        .collect())
}

const HELPER_SCRIPT: &str = r#"#!/bin/sh
db='@DB@'
case "$1" in
list)
    awk -F '\t' 'BEGIN { printf "{"; sep = "" }
        { printf "%s\"%s\":\"%s\"", sep, $1, $2; sep = "," }
        END { print "}" }' "$db"
    ;;
get)
    url=$(cat)
    awk -F '\t' -v url="$url" '$1 == url { found = 1
            printf "{\"ServerURL\":\"%s\",\"Username\":\"%s\",\"Secret\":\"%s\"}\n", $1, $2, $3 }
        END { if (!found) { print "credentials not found in native keychain"; exit 1 } }' "$db"
    ;;
store)
    payload=$(cat)
    url=$(printf '%s' "$payload" | sed -n 's/.*"ServerURL":"\([^"]*\)".*/\1/p')
    user=$(printf '%s' "$payload" | sed -n 's/.*"Username":"\([^"]*\)".*/\1/p')
    secret=$(printf '%s' "$payload" | sed -n 's/.*"Secret":"\([^"]*\)".*/\1/p')
    awk -F '\t' -v url="$url" '$1 != url' "$db" > "$db.tmp" && mv "$db.tmp" "$db"
    printf '%s\t%s\t%s\n' "$url" "$user" "$secret" >> "$db"
    ;;
*)
    echo "unknown operation: $1"
    exit 1
    ;;
esac
"#;
