//! Fake credential helpers for unit tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use super::helper::CredentialHelper;

/// Writes an executable script into `dir`.
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

/// A `docker-credential-*` script backed by a tab-separated entry file.
///
/// Every invocation appends its operation to a call log so tests can assert
/// which operations ran.
pub(crate) struct FakeHelper {
    pub(crate) dir: PathBuf,
    pub(crate) name: String,
    pub(crate) program: PathBuf,
    db: PathBuf,
    log: PathBuf,
}

impl FakeHelper {
    /// Installs `docker-credential-<name>` seeded with `(url, user, secret)`
    /// entries.
    pub(crate) fn install(dir: &Path, name: &str, entries: &[(&str, &str, &str)]) -> Self {
        let db = dir.join(format!("{name}.entries"));
        let log = dir.join(format!("{name}.calls"));
        let seeded: String = entries
            .iter()
            .map(|(url, user, secret)| format!("{url}\t{user}\t{secret}\n"))
            .collect();
        std::fs::write(&db, seeded).expect("seed entries");
        std::fs::write(&log, "").expect("create call log");

        let body = SCRIPT
            .replace("@DB@", &db.to_string_lossy())
            .replace("@LOG@", &log.to_string_lossy());
        let program = write_script(dir, &format!("docker-credential-{name}"), &body);
        Self {
            dir: dir.to_path_buf(),
            name: name.to_owned(),
            program,
            db,
            log,
        }
    }

    pub(crate) fn helper(&self) -> CredentialHelper {
        CredentialHelper::locate(&self.name, &[self.dir.clone()])
    }

    /// Operations invoked so far, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .expect("read call log")
            .lines()
            .map(str::to_owned)
            .collect()
    }

    /// Stored `(url, user, secret)` entries.
    pub(crate) fn entries(&self) -> Vec<(String, String, String)> {
        std::fs::read_to_string(&self.db)
            .expect("read entries")
            .lines()
            .filter_map(|line| {
                let mut fields = line.split('\t');
                Some((
                    fields.next()?.to_owned(),
                    fields.next()?.to_owned(),
                    fields.next()?.to_owned(),
                ))
            })
            .collect()
    }
}

const SCRIPT: &str = r#"#!/bin/sh
db='@DB@'
echo "$1" >> '@LOG@'
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
erase)
    url=$(cat)
    awk -F '\t' -v url="$url" '$1 != url' "$db" > "$db.tmp" && mv "$db.tmp" "$db"
    ;;
*)
    echo "unknown operation: $1"
    exit 1
    ;;
esac
"#;
