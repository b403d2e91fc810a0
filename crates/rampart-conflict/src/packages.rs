//! Package requirements: parsing install commands and checking that two
//! version requirements can be satisfied together.

use rampart_core::PackageRequirement;
use semver::{Comparator, Op, Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::fmt;

const QUOTES: [char; 2] = ['"', '\''];

/// Package manager an install command was written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    /// `pip install`, `python -m pip install`.
    Pip,
    /// `npm install`.
    Npm,
    /// `yarn add`.
    Yarn,
    /// `pnpm add`.
    Pnpm,
    /// `cargo add`.
    Cargo,
}

impl PackageManager {
    /// Flags that consume the following argument.
    fn value_flags(self) -> &'static [&'static str] {
        match self {
            Self::Pip => &[
                "-r",
                "--requirement",
                "-c",
                "--constraint",
                "-e",
                "--editable",
                "-i",
                "--index-url",
                "--extra-index-url",
                "-t",
                "--target",
                "--prefix",
                "--root",
                "-f",
                "--find-links",
            ],
            Self::Npm | Self::Yarn | Self::Pnpm => {
                &["--registry", "--prefix", "--workspace", "--tag", "--filter"]
            },
            Self::Cargo => &[
                "-F",
                "--features",
                "--path",
                "--git",
                "--branch",
                "--tag",
                "--rev",
                "--rename",
                "-p",
                "--package",
                "--registry",
                "--manifest-path",
            ],
        }
    }

    fn parse_token(self, token: &str) -> Option<PackageRequirement> {
        match self {
            Self::Pip => parse_pip_token(token),
            Self::Npm | Self::Yarn | Self::Pnpm => parse_npm_token(token),
            Self::Cargo => parse_cargo_token(token),
        }
    }

    /// Spell `name` pinned to `requirement` the way this manager reads it.
    #[must_use]
    pub fn spell(self, name: &str, requirement: &str) -> String {
        let requirement = requirement.trim();
        if is_wildcard(requirement) {
            return name.to_string();
        }
        match self {
            Self::Pip => {
                let spelled = if requirement.starts_with(['=', '<', '>', '!', '~']) {
                    format!("{name}{requirement}")
                } else {
                    format!("{name}=={}", requirement.trim_start_matches('^'))
                };
                if spelled.contains(['<', '>', '!']) {
                    format!("'{spelled}'")
                } else {
                    spelled
                }
            },
            Self::Cargo => {
                let requirement = requirement
                    .strip_prefix("==")
                    .map_or_else(|| requirement.to_string(), |rest| format!("={rest}"));
                format!("{name}@{requirement}")
            },
            Self::Npm | Self::Yarn | Self::Pnpm => {
                format!("{name}@{}", requirement.trim_start_matches("=="))
            },
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pip => "pip",
            Self::Npm => "npm",
            Self::Yarn => "yarn",
            Self::Pnpm => "pnpm",
            Self::Cargo => "cargo",
        };
        f.write_str(s)
    }
}

/// A requirement found in an install command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequirement {
    /// Manager the command invokes.
    pub manager: PackageManager,
    /// The argument as written, without quotes.
    pub token: String,
    /// Name and requirement extracted from the token.
    pub requirement: PackageRequirement,
}

/// Canonical package name for comparisons: lowercase, `_` folded into `-`.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('_', "-")
}

pub(crate) fn is_wildcard(requirement: &str) -> bool {
    requirement.is_empty() || requirement == "*" || requirement.eq_ignore_ascii_case("latest")
}

/// Extract package requirements from an install command.
///
/// Recognizes `pip`/`pip3 install`, `python -m pip install`,
/// `npm install`/`npm i`, `yarn add`, `pnpm add` and `cargo add`, in any
/// segment of a compound command. Flags, paths and URLs are skipped.
#[must_use]
pub fn parse_install_command(command: &str) -> Vec<ParsedRequirement> {
    command
        .split([';', '|', '&'])
        .flat_map(parse_segment)
        .collect()
}

fn parse_segment(segment: &str) -> Vec<ParsedRequirement> {
    let tokens: Vec<&str> = segment
        .split_whitespace()
        .map(|t| t.trim_matches(QUOTES))
        .collect();
    let start = tokens
        .iter()
        .position(|t| *t != "sudo" && !(t.contains('=') && !t.starts_with('-')))
        .unwrap_or(tokens.len());

    let (manager, args) = match &tokens[start..] {
        ["pip" | "pip3", "install", args @ ..] => (PackageManager::Pip, args),
        [python, "-m", "pip", "install", args @ ..] if python.starts_with("python") => {
            (PackageManager::Pip, args)
        },
        ["npm", "install" | "i" | "add", args @ ..] => (PackageManager::Npm, args),
        ["yarn", "add", args @ ..] => (PackageManager::Yarn, args),
        ["pnpm", "add" | "install" | "i", args @ ..] => (PackageManager::Pnpm, args),
        ["cargo", "add", args @ ..] => (PackageManager::Cargo, args),
        _ => return Vec::new(),
    };

    let mut found = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg.starts_with('-') {
            skip_next =
                !arg.contains('=') && manager.value_flags().iter().any(|flag| flag == arg);
            continue;
        }
        if let Some(requirement) = manager.parse_token(arg) {
            found.push(ParsedRequirement {
                manager,
                token: (*arg).to_string(),
                requirement,
            });
        }
    }
    found
}

fn parse_pip_token(token: &str) -> Option<PackageRequirement> {
    if token.contains(['/', ':']) || token.starts_with('.') {
        return None;
    }
    let (name, requirement) = match token.find(['=', '<', '>', '!', '~']) {
        Some(pos) => token.split_at(pos),
        None => (token, ""),
    };
    let name = name.split('[').next().unwrap_or(name).trim();
    (!name.is_empty()).then(|| PackageRequirement::new(name, requirement.trim()))
}

fn parse_npm_token(token: &str) -> Option<PackageRequirement> {
    if token.contains(':')
        || token.starts_with('.')
        || (token.contains('/') && !token.starts_with('@'))
    {
        return None;
    }
    let (name, requirement) = match token.rfind('@') {
        Some(pos) if pos > 0 => (&token[..pos], &token[pos.saturating_add(1)..]),
        _ => (token, ""),
    };
    (!name.is_empty()).then(|| PackageRequirement::new(name, requirement))
}

fn parse_cargo_token(token: &str) -> Option<PackageRequirement> {
    if token.contains(['/', ':']) {
        return None;
    }
    let (name, requirement) = token.split_once('@').unwrap_or((token, ""));
    (!name.is_empty()).then(|| PackageRequirement::new(name, requirement))
}

/// Rewrite every install of `package` (normalized) in `command` to
/// `requirement`.
pub(crate) fn rewrite_command(command: &str, package: &str, requirement: &str) -> String {
    let mut rewritten = command.to_string();
    for parsed in parse_install_command(command) {
        if normalize_name(&parsed.requirement.name) != package
            || is_wildcard(&parsed.requirement.requirement)
        {
            continue;
        }
        let spelled = parsed.manager.spell(&parsed.requirement.name, requirement);
        rewritten = rewritten
            .split(' ')
            .map(|t| {
                if t.trim_matches(QUOTES) == parsed.token {
                    spelled.as_str()
                } else {
                    t
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
    }
    rewritten
}

/// Translate pip spellings into semver syntax and parse.
fn parse_requirement(requirement: &str) -> Option<VersionReq> {
    let translated = requirement
        .replace("===", "=")
        .replace("==", "=")
        .replace("~=", "~");
    VersionReq::parse(&translated).ok()
}

/// Smallest version a comparator admits.
fn lower_bound(comparator: &Comparator) -> Version {
    let minor = comparator.minor.unwrap_or(0);
    let patch = comparator.patch.unwrap_or(0);
    match comparator.op {
        Op::Greater => match (comparator.minor, comparator.patch) {
            (Some(_), Some(p)) => Version::new(comparator.major, minor, p.saturating_add(1)),
            (Some(m), None) => Version::new(comparator.major, m.saturating_add(1), 0),
            _ => Version::new(comparator.major.saturating_add(1), 0, 0),
        },
        _ => Version::new(comparator.major, minor, patch),
    }
}

/// Whether some version satisfies both requirements.
///
/// Wildcards are compatible with everything. Requirements that do not parse
/// as version ranges are compatible only when they are spelled the same.
#[must_use]
pub fn requirements_compatible(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    if is_wildcard(a) || is_wildcard(b) {
        return true;
    }
    match (parse_requirement(a), parse_requirement(b)) {
        (Some(ra), Some(rb)) => std::iter::once(Version::new(0, 0, 0))
            .chain(ra.comparators.iter().map(lower_bound))
            .chain(rb.comparators.iter().map(lower_bound))
            .any(|v| ra.matches(&v) && rb.matches(&v)),
        _ => a.replace(' ', "") == b.replace(' ', ""),
    }
}
