//! Clipboard integration with fallbacks for headless environments.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::domain::errors::ToolError;

/// Destination for copied text.
pub trait Clipboard {
    fn copy(&mut self, text: &str) -> Result<(), ToolError>;
}

/// System clipboard through `arboard`, falling back to platform copy utilities.
pub struct SystemClipboard {
    primary: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        let primary = match arboard::Clipboard::new() {
            Ok(clipboard) => Some(clipboard),
            Err(err) => {
                tracing::debug!(error = %err, "system clipboard unavailable");
                None
            }
        };
        Self { primary }
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Clipboard for SystemClipboard {
    fn copy(&mut self, text: &str) -> Result<(), ToolError> {
        if let Some(primary) = self.primary.as_mut()
            && primary.set_text(text.to_owned()).is_ok()
        {
            return Ok(());
        }

        self.primary = None;
        fallback_copy(text)
    }
}

fn fallback_copy(text: &str) -> Result<(), ToolError> {
    for command in fallback_commands() {
        match try_command_copy(command, text) {
            Ok(()) => return Ok(()),
            Err(err) => tracing::debug!(error = %err, "clipboard fallback failed"),
        }
    }
    Err(ToolError::Unavailable("clipboard".to_owned()))
}

fn try_command_copy(command: &[&str], text: &str) -> Result<(), ToolError> {
    let Some((program, args)) = command.split_first() else {
        return Err(ToolError::Unavailable("clipboard".to_owned()));
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|_| ToolError::Unavailable((*program).to_owned()))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes()).map_err(|err| ToolError::Failed {
            tool: (*program).to_owned(),
            message: err.to_string(),
        })?;
    }

    let status = child.wait().map_err(|err| ToolError::Failed {
        tool: (*program).to_owned(),
        message: err.to_string(),
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(ToolError::Failed {
            tool: (*program).to_owned(),
            message: format!("exited with {status}"),
        })
    }
}

#[cfg(target_os = "macos")]
fn fallback_commands() -> Vec<&'static [&'static str]> {
    vec![&["pbcopy"]]
}

#[cfg(all(unix, not(target_os = "macos")))]
fn fallback_commands() -> Vec<&'static [&'static str]> {
    vec![
        &["xclip", "-selection", "clipboard"],
        &["xsel", "--clipboard", "--input"],
        &["wl-copy"],
    ]
}

#[cfg(target_os = "windows")]
fn fallback_commands() -> Vec<&'static [&'static str]> {
    vec![&["powershell.exe", "-NoProfile", "-Command", "Set-Clipboard"]]
}

#[cfg(not(any(unix, target_os = "windows")))]
fn fallback_commands() -> Vec<&'static [&'static str]> {
    Vec::new()
}

#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryClipboard {
    pub contents: Option<String>,
    pub fail: bool,
}

#[cfg(test)]
impl Clipboard for MemoryClipboard {
    fn copy(&mut self, text: &str) -> Result<(), ToolError> {
        if self.fail {
            return Err(ToolError::Unavailable("memory clipboard".to_owned()));
        }
        self.contents = Some(text.to_owned());
        Ok(())
    }
}
