//! Shell export formatting for fetched passwords

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Target syntax for `get-env` and `generate-env`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shell {
    Fish,
    Bash,
    Zsh,
    /// `NAME='value'`, for `.env` files and `eval` in any POSIX shell
    #[default]
    Plain,
}

impl Shell {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shell::Fish => "fish",
            Shell::Bash => "bash",
            Shell::Zsh => "zsh",
            Shell::Plain => "plain",
        }
    }

    /// One assignment line, without a trailing newline
    pub fn export_line(&self, name: &str, value: &str) -> String {
        match self {
            Shell::Fish => format!("set -x {} {}", name, fish_quote(value)),
            Shell::Bash | Shell::Zsh => format!("export {}={}", name, posix_quote(value)),
            Shell::Plain => format!("{}={}", name, posix_quote(value)),
        }
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Shell {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fish" => Ok(Shell::Fish),
            "bash" | "sh" => Ok(Shell::Bash),
            "zsh" => Ok(Shell::Zsh),
            "plain" | "env" | "dotenv" => Ok(Shell::Plain),
            other => Err(format!(
                "unsupported shell '{}' (expected fish, bash, zsh or plain)",
                other
            )),
        }
    }
}

/// Render every password as an assignment, sorted by account name
pub fn format_exports(passwords: &HashMap<String, String>, shell: Shell) -> String {
    let mut names: Vec<&String> = passwords.keys().collect();
    names.sort();

    names
        .into_iter()
        .map(|name| {
            let mut line = shell.export_line(name, &passwords[name]);
            line.push('\n');
            line
        })
        .collect()
}

fn posix_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

// fish only treats \\ and \' as escapes inside single quotes
fn fish_quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', r"\\").replace('\'', r"\'"))
}
