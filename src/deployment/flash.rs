use std::borrow::Cow;

use crate::error::{DeployError, Result};

use super::transport::CommandOutput;

const PLACEHOLDERS: [&str; 4] = ["board", "port", "image", "programmer"];

/// Flash command template such as
/// `avrdude -c {programmer} -p {board} -P {port} -U flash:w:{image}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashCommand {
    template: String,
    programmer: String,
}

impl FlashCommand {
    pub fn new(template: impl Into<String>, programmer: impl Into<String>) -> Result<FlashCommand> {
        let template = template.into();
        let mut has_image = false;
        for name in placeholders(&template)? {
            if !PLACEHOLDERS.contains(&name) {
                return Err(DeployError::config(format!(
                    "unknown placeholder {{{}}} in flash command `{}`",
                    name, template
                )));
            }
            has_image |= name == "image";
        }
        if !has_image {
            return Err(DeployError::config(format!(
                "flash command `{}` does not reference {{image}}",
                template
            )));
        }

        Ok(FlashCommand {
            template,
            programmer: programmer.into(),
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Substitutes the placeholders in a single pass, quoting values for the shell.
    pub fn render(&self, board: &str, port: &str, image: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + image.len());
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            // validated in `new`, every brace is closed
            let close = after.find('}').unwrap_or(after.len());
            let value = match &after[..close] {
                "board" => board,
                "port" => port,
                "image" => image,
                _ => self.programmer.as_str(),
            };
            out.push_str(&shell_quote(value));
            rest = after.get(close + 1..).unwrap_or("");
        }
        out.push_str(rest);
        out
    }
}

fn placeholders(template: &str) -> Result<Vec<&str>> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            DeployError::config(format!("unclosed placeholder in flash command `{}`", template))
        })?;
        names.push(&after[..close]);
        rest = &after[close + 1..];
    }
    Ok(names)
}

/// Quotes `value` for a POSIX shell unless it only holds safe characters.
pub fn shell_quote(value: &str) -> Cow<'_, str> {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_./:@%+=,-".contains(c));
    if safe {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("'{}'", value.replace('\'', "'\\''")))
    }
}

/// Outcome of invoking the flash tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub succeeded: bool,
}

impl FlashResult {
    pub fn new(command: String, output: CommandOutput) -> FlashResult {
        FlashResult {
            command,
            succeeded: output.success(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }

    /// Turns an unsuccessful result into `DeployError::FlashFailure`.
    pub fn check(self) -> Result<FlashResult> {
        if self.succeeded {
            Ok(self)
        } else {
            Err(DeployError::FlashFailure(Box::new(self)))
        }
    }
}
