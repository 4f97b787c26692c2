//! Command line assembly and executable resolution.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

#[cfg(windows)]
const PATH_SEP: char = ';';
#[cfg(not(windows))]
const PATH_SEP: char = ':';

/// Searched after `PATH`; GUI launchers and service managers often start
/// with a minimal `PATH` that misses these.
const FALLBACK_BINS: &[&str] = &[
    "/usr/local/bin",
    "/opt/homebrew/bin",
    "/opt/homebrew/sbin",
    "/usr/bin",
    "/bin",
    "/usr/sbin",
    "/sbin",
];

/// Executable plus arguments, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r#"[^\s"']+|"([^"]*)"|'([^']*)'"#).expect("token regex is valid")
    })
}

/// Split a command line into tokens. Quoted substrings are kept as one
/// token with the quotes removed.
pub fn split_command(command: &str) -> Vec<String> {
    token_regex()
        .find_iter(command)
        .map(|m| {
            let token = m.as_str();
            let token = token.strip_prefix('"').unwrap_or(token);
            let token = token.strip_suffix('"').unwrap_or(token);
            let token = token.strip_prefix('\'').unwrap_or(token);
            let token = token.strip_suffix('\'').unwrap_or(token);
            token.to_string()
        })
        .collect()
}

/// Combine the provider's command with its rendered template.
///
/// When the rendered template starts with the command's executable it is
/// taken as the whole invocation; otherwise its tokens follow the command's
/// own arguments.
pub fn build_command(cli_command: &str, rendered_template: &str) -> Invocation {
    let mut cli_parts = split_command(cli_command).into_iter();
    let program = cli_parts.next().unwrap_or_default();
    let base_args: Vec<String> = cli_parts.collect();

    let template_parts = split_command(rendered_template);
    if template_parts.first().map(String::as_str) == Some(program.as_str()) {
        return Invocation {
            program,
            args: template_parts.into_iter().skip(1).collect(),
        };
    }

    let mut args = base_args;
    args.extend(template_parts);
    Invocation { program, args }
}

/// `PATH` (or `path_override`) followed by the fallback directories,
/// de-duplicated in order.
pub fn search_path(path_override: Option<&str>) -> String {
    let current = match path_override {
        Some(p) => p.to_string(),
        None => std::env::var("PATH").unwrap_or_default(),
    };

    let mut seen = HashSet::new();
    let mut parts: Vec<&str> = Vec::new();
    for dir in current.split(PATH_SEP).chain(FALLBACK_BINS.iter().copied()) {
        if !dir.is_empty() && seen.insert(dir) {
            parts.push(dir);
        }
    }
    parts.join(&PATH_SEP.to_string())
}

/// Find the executable for `command`.
///
/// A command containing a path separator must itself be executable.
/// Otherwise the first executable match along [`search_path`] wins.
pub fn resolve_command(command: &str, path_override: Option<&str>) -> Option<PathBuf> {
    if command.contains('/') {
        let path = PathBuf::from(command);
        return is_executable(&path).then_some(path);
    }

    search_path(path_override)
        .split(PATH_SEP)
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(command))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file()
}
