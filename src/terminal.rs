//! Interactive terminal input for prompts.
//!
//! Prompts are written to stderr so that stdout stays clean for command
//! output. Secrets are read with the terminal in raw mode and never echoed.
//! When stdin is not a terminal, input is read line by line instead.

use std::io::{self, BufRead, IsTerminal, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

/// Longest secret accepted from the terminal.
const MAX_SECRET_LEN: usize = 4096;

/// Write `prompt` to stderr and read one line of visible input.
pub(crate) fn read_line(prompt: &str) -> io::Result<String> {
    write_prompt(prompt)?;
    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed before a value was entered",
        ));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

/// Write `prompt` to stderr and read a secret without echoing it.
pub(crate) fn read_secret(prompt: &str) -> io::Result<String> {
    if !io::stdin().is_terminal() {
        return read_line(prompt);
    }

    write_prompt(prompt)?;
    terminal::enable_raw_mode()?;
    let secret = read_masked();
    if let Err(error) = terminal::disable_raw_mode() {
        tracing::debug!(%error, "cannot restore terminal mode");
    }
    writeln!(io::stderr())?;
    secret
}

/// Ask a yes/no question; anything other than `yes` or `y` means no.
pub(crate) fn confirm(question: &str) -> io::Result<bool> {
    let answer = read_line(&format!("{question} (yes/no): "))?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "yes" | "y"
    ))
}

/// Print an informational line on stderr.
pub(crate) fn notice(message: &str) -> io::Result<()> {
    let mut stderr = io::stderr().lock();
    writeln!(stderr, "{message}")?;
    stderr.flush()
}

fn write_prompt(prompt: &str) -> io::Result<()> {
    let mut stderr = io::stderr().lock();
    write!(stderr, "{prompt}")?;
    stderr.flush()
}

fn read_masked() -> io::Result<String> {
    let mut secret = String::new();
    loop {
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event::read()?
        else {
            continue;
        };

        match code {
            KeyCode::Enter => return Ok(secret),
            KeyCode::Backspace => {
                secret.pop();
            }
            KeyCode::Char('c' | 'd') if modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "input cancelled",
                ));
            }
            KeyCode::Char(ch) => {
                if secret.len() >= MAX_SECRET_LEN {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "secret is too long",
                    ));
                }
                secret.push(ch);
            }
            _ => {}
        }
    }
}
