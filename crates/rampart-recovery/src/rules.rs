//! Built-in fix rules, one family per error kind.

use rampart_core::{
    CodeEdit, ErrorContext, ErrorKind, FixKind, FixPayload, FixSuggestion, Language,
};
use std::path::{Path, PathBuf};

use crate::aliases::{is_python_stdlib, npm_package, python_package};

/// Programs considered when correcting a mistyped command.
const KNOWN_COMMANDS: &[&str] = &[
    "git", "python", "python3", "pip", "pip3", "node", "npm", "npx", "yarn", "pnpm", "cargo",
    "rustc", "rustup", "go", "make", "cmake", "docker", "kubectl", "ls", "cat", "grep", "find",
    "sed", "awk", "curl", "wget", "tar", "mkdir", "cp", "mv", "echo", "touch", "chmod", "ssh",
    "java", "javac", "ruby", "gem", "bundle", "pytest", "poetry", "tsc", "deno", "bun", "uv",
];

/// Detail key holding the full failed command line, when known.
pub const COMMAND_LINE_DETAIL: &str = "command_line";

/// Suggestions from the built-in rules, unranked.
#[must_use]
pub fn rule_suggestions(context: &ErrorContext, workspace: &Path) -> Vec<FixSuggestion> {
    match context.kind {
        ErrorKind::DependencyMissing => dependency_fixes(context, workspace),
        ErrorKind::CommandNotFound => command_fixes(context),
        ErrorKind::NameResolution => name_fixes(context),
        ErrorKind::Indentation => indentation_fixes(context),
        ErrorKind::FileNotFound => missing_path_fixes(context, workspace),
        ErrorKind::PermissionDenied => permission_fixes(context),
        ErrorKind::Runtime if context.detail("key").is_some() => env_key_fixes(context),
        ErrorKind::Unknown => Vec::new(),
        _ => vec![manual_hint(context)],
    }
}

fn manual(description: impl Into<String>, confidence: f64, hint: impl Into<String>) -> FixSuggestion {
    FixSuggestion::new(
        description,
        FixKind::EditCode,
        confidence,
        FixPayload::Manual { hint: hint.into() },
    )
}

fn manual_hint(context: &ErrorContext) -> FixSuggestion {
    let location = match (&context.file, context.line) {
        (Some(file), Some(line)) => format!(" at {}:{line}", file.display()),
        (Some(file), None) => format!(" in {}", file.display()),
        _ => String::new(),
    };
    let hint = match context.kind {
        ErrorKind::Syntax => format!("Fix the syntax error{location}"),
        ErrorKind::TypeMismatch => format!("Check the types involved{location}"),
        ErrorKind::MissingAttribute => match context.detail("attribute") {
            Some(attr) => format!("`{attr}` does not exist on that value{location}"),
            None => format!("Check the attribute or method name{location}"),
        },
        ErrorKind::MissingImport => match (context.detail("name"), context.detail("module")) {
            (Some(name), Some(module)) => format!("`{module}` does not export `{name}`"),
            _ => format!("Check the import path{location}"),
        },
        _ => format!("Inspect the failure{location}: {}", context.message),
    };
    manual(hint.clone(), 0.3, hint).with_estimate(60)
}

/// Whether `path` can be dropped into a shell command unquoted.
fn shell_safe(path: &str) -> bool {
    !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '+'))
}

fn dependency_fixes(context: &ErrorContext, workspace: &Path) -> Vec<FixSuggestion> {
    let Some(module) = context.detail("module") else {
        return vec![manual_hint(context)];
    };
    match context.language {
        Language::Python if is_python_stdlib(module) => vec![manual(
            format!("`{module}` is part of the standard library"),
            0.3,
            format!("`{module}` ships with Python; check the interpreter version"),
        )],
        Language::Python => {
            let package = python_package(module);
            let requirements = workspace.join("requirements.txt");
            let manifest = requirements.is_file().then_some(requirements);
            // Without a manifest to record it in, this is a plain command.
            let kind = if manifest.is_some() {
                FixKind::InstallPackage
            } else {
                FixKind::RunCommand
            };
            vec![
                FixSuggestion::new(
                    format!("Install the `{package}` package"),
                    kind,
                    0.85,
                    FixPayload::InstallPackage {
                        manager: "pip".to_string(),
                        package: package.clone(),
                        command: format!("pip install {package}"),
                        manifest,
                    },
                )
                .with_estimate(30),
            ]
        },
        Language::JavaScript | Language::TypeScript => npm_package(module)
            .map(|package| {
                FixSuggestion::new(
                    format!("Install the `{package}` package"),
                    FixKind::InstallPackage,
                    0.8,
                    FixPayload::InstallPackage {
                        manager: "npm".to_string(),
                        package: package.clone(),
                        command: format!("npm install {package}"),
                        manifest: None,
                    },
                )
                .with_estimate(30)
            })
            .into_iter()
            .collect(),
        Language::Rust => vec![
            FixSuggestion::new(
                format!("Add the `{module}` crate"),
                FixKind::InstallPackage,
                0.7,
                FixPayload::InstallPackage {
                    manager: "cargo".to_string(),
                    package: module.to_string(),
                    command: format!("cargo add {module}"),
                    manifest: None,
                },
            )
            .with_estimate(20),
        ],
        Language::Go => vec![
            FixSuggestion::new(
                format!("Fetch the `{module}` module"),
                FixKind::InstallPackage,
                0.7,
                FixPayload::InstallPackage {
                    manager: "go".to_string(),
                    package: module.to_string(),
                    command: format!("go get {module}"),
                    manifest: None,
                },
            )
            .with_estimate(20),
        ],
        _ => vec![manual_hint(context)],
    }
}

/// Levenshtein distance over chars.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len().saturating_add(1)];
    for (i, ca) in a.chars().enumerate() {
        current[0] = i.saturating_add(1);
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j].saturating_add(usize::from(ca != *cb));
            let insertion = current[j].saturating_add(1);
            let deletion = previous[j.saturating_add(1)].saturating_add(1);
            current[j.saturating_add(1)] = substitution.min(insertion).min(deletion);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Closest known program to `typo`, with its distance.
fn closest_command(typo: &str) -> Option<(&'static str, usize)> {
    let limit = if typo.chars().count() <= 3 { 1 } else { 2 };
    KNOWN_COMMANDS
        .iter()
        .map(|known| (*known, edit_distance(typo, known)))
        .filter(|(_, d)| *d > 0 && *d <= limit)
        .min_by_key(|(_, d)| *d)
}

fn command_fixes(context: &ErrorContext) -> Vec<FixSuggestion> {
    let Some(typo) = context.detail("command") else {
        return vec![manual_hint(context)];
    };
    let Some((known, distance)) = closest_command(typo) else {
        return vec![manual(
            format!("Install `{typo}`"),
            0.2,
            format!("`{typo}` is not on PATH; install it or fix PATH"),
        )];
    };
    let confidence = if distance == 1 { 0.85 } else { 0.7 };

    let corrected = context.detail(COMMAND_LINE_DETAIL).and_then(|line| {
        let trimmed = line.trim_start();
        trimmed
            .strip_prefix(typo)
            .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
            .map(|rest| format!("{known}{rest}"))
    });
    match corrected {
        Some(command) => vec![
            FixSuggestion::new(
                format!("Run `{known}` instead of `{typo}`"),
                FixKind::RunCommand,
                confidence,
                FixPayload::RunCommand { command },
            )
            .with_estimate(5),
        ],
        None => vec![manual(
            format!("Did you mean `{known}`?"),
            confidence,
            format!("`{typo}` looks like a typo of `{known}`"),
        )],
    }
}

fn name_fixes(context: &ErrorContext) -> Vec<FixSuggestion> {
    match (context.language, context.detail("name"), &context.file) {
        (Language::Python, Some(name), Some(file)) if is_python_stdlib(name) => vec![
            FixSuggestion::new(
                format!("Add `import {name}`"),
                FixKind::EditCode,
                0.8,
                FixPayload::EditCode {
                    path: file.clone(),
                    edit: CodeEdit::InsertLine {
                        line: 1,
                        text: format!("import {name}"),
                    },
                },
            )
            .with_estimate(2),
        ],
        _ => vec![manual_hint(context)],
    }
}

fn indentation_fixes(context: &ErrorContext) -> Vec<FixSuggestion> {
    let Some(file) = &context.file else {
        return vec![manual_hint(context)];
    };
    vec![
        FixSuggestion::new(
            format!("Convert tab indentation to spaces in {}", file.display()),
            FixKind::EditCode,
            0.75,
            FixPayload::EditCode {
                path: file.clone(),
                edit: CodeEdit::NormalizeIndentation { tab_width: 4 },
            },
        )
        .with_estimate(2),
    ]
}

fn missing_path_fixes(context: &ErrorContext, workspace: &Path) -> Vec<FixSuggestion> {
    let Some(path) = context.detail("path").filter(|p| shell_safe(p)) else {
        return vec![manual_hint(context)];
    };
    let as_path = Path::new(path);
    let looks_like_dir = path.ends_with('/') || as_path.extension().is_none();
    let directory = if looks_like_dir {
        Some(as_path.to_path_buf())
    } else {
        as_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .filter(|p| !workspace.join(p).exists())
            .map(Path::to_path_buf)
    };
    let Some(directory) = directory else {
        return vec![manual_hint(context)];
    };
    let confidence = if looks_like_dir { 0.65 } else { 0.6 };
    let shown = directory.display();
    vec![
        FixSuggestion::new(
            format!("Create the missing directory {shown}"),
            FixKind::RunCommand,
            confidence,
            FixPayload::RunCommand {
                command: format!("mkdir -p {shown}"),
            },
        )
        .with_estimate(1),
    ]
}

fn permission_fixes(context: &ErrorContext) -> Vec<FixSuggestion> {
    let script = context.detail("path").filter(|p| {
        shell_safe(p)
            && (p.starts_with("./")
                || Path::new(p)
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| matches!(e, "sh" | "bash" | "py" | "pl" | "rb")))
    });
    match script {
        Some(script) => vec![
            FixSuggestion::new(
                format!("Make {script} executable"),
                FixKind::RunCommand,
                0.7,
                FixPayload::RunCommand {
                    command: format!("chmod +x {script}"),
                },
            )
            .with_estimate(1)
            .requiring_approval(),
        ],
        None => vec![manual_hint(context)],
    }
}

fn env_key_fixes(context: &ErrorContext) -> Vec<FixSuggestion> {
    let Some(key) = context.detail("key") else {
        return Vec::new();
    };
    vec![
        FixSuggestion::new(
            format!("Add `{key}` to .env"),
            FixKind::EditConfig,
            0.5,
            FixPayload::EditConfig {
                path: PathBuf::from(".env"),
                key: key.to_string(),
                value: String::new(),
            },
        )
        .with_estimate(30)
        .requiring_approval(),
    ]
}

/// Set `key=value` in dotenv-style `content`, replacing an existing entry.
#[must_use]
pub fn set_config_key(content: &str, key: &str, value: &str) -> String {
    let entry = format!("{key}={value}");
    let mut replaced = false;
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            let name = line
                .trim_start()
                .trim_start_matches("export ")
                .split('=')
                .next()
                .unwrap_or_default()
                .trim();
            if !replaced && name == key {
                replaced = true;
                entry.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(entry);
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
