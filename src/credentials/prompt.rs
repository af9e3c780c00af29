//! Terminal implementations of the credential prompts.

use std::io;

use super::{Credentials, CredentialsPrompt, StoreChooser};
use crate::error::CredentialsError;
use crate::terminal;

/// Asks for a username and password on the terminal.
///
/// An empty username or closed input means the user gave up.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalCredentialsPrompt;

impl CredentialsPrompt for TerminalCredentialsPrompt {
    fn prompt(&self, registry: &str) -> Result<Option<Credentials>, CredentialsError> {
        terminal::notice(&format!(
            "Please provide credentials for image registry ({registry})."
        ))
        .map_err(prompt_failed)?;

        let username = match terminal::read_line("Username: ") {
            Ok(name) => name.trim().to_owned(),
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(error) => return Err(prompt_failed(error)),
        };
        if username.is_empty() {
            return Ok(None);
        }

        match terminal::read_secret("Password: ") {
            Ok(password) => Ok(Some(Credentials::new(username, password))),
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::UnexpectedEof | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(error) => Err(prompt_failed(error)),
        }
    }
}

/// Offers the discovered credential helpers as a numbered menu.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalStoreChooser;

impl StoreChooser for TerminalStoreChooser {
    fn choose(&self, available: &[String]) -> Result<Option<String>, CredentialsError> {
        if available.is_empty() {
            return Ok(None);
        }

        let mut menu = String::from("Choose a credentials helper to save the credentials:\n");
        menu.push_str("  0) do not save\n");
        for (index, helper) in available.iter().enumerate() {
            menu.push_str(&format!("  {}) {helper}\n", index + 1));
        }
        terminal::notice(menu.trim_end()).map_err(prompt_failed)?;

        match terminal::read_line("Helper: ") {
            Ok(answer) => Ok(parse_choice(&answer, available)),
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(error) => Err(prompt_failed(error)),
        }
    }
}

/// Maps a menu answer to a helper; `0`, blank or invalid answers select
/// nothing. A helper may also be named directly.
fn parse_choice(answer: &str, available: &[String]) -> Option<String> {
    let trimmed = answer.trim();
    if let Ok(number) = trimmed.parse::<usize>() {
        return number
            .checked_sub(1)
            .and_then(|index| available.get(index))
            .cloned();
    }
    available.iter().find(|helper| *helper == trimmed).cloned()
}

fn prompt_failed(error: io::Error) -> CredentialsError {
    CredentialsError::PromptFailed {
        message: error.to_string(),
    }
}
