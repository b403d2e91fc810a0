//! Turning raw failure text into an [`ErrorContext`].
//!
//! Classification walks an ordered rule list and stops at the first match.
//! Named capture groups (`module`, `name`, `attribute`, `command`, `path`,
//! `key`) become [`ErrorContext::details`]. Location and language are
//! extracted independently of the kind.

use rampart_core::{ErrorContext, ErrorKind, FailureAnalyzer, Language};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Lines of context on each side of the error line in a snippet.
const SNIPPET_RADIUS: u32 = 2;

/// Files larger than this are not read for snippets.
const MAX_SNIPPET_SOURCE_BYTES: u64 = 2 * 1024 * 1024;

/// Messages are cut to this many characters in signatures.
const SIGNATURE_MESSAGE_CHARS: usize = 200;

struct ErrorRule {
    name: &'static str,
    kind: ErrorKind,
    language: Option<Language>,
    pattern: Regex,
}

impl ErrorRule {
    fn new(
        name: &'static str,
        kind: ErrorKind,
        language: Option<Language>,
        pattern: &str,
    ) -> Self {
        Self {
            name,
            kind,
            language,
            pattern: Regex::new(pattern).expect("invalid built-in error pattern"),
        }
    }
}

static RULES: LazyLock<Vec<ErrorRule>> = LazyLock::new(|| {
    use ErrorKind as K;
    use Language as L;
    vec![
        ErrorRule::new(
            "python-module-not-found",
            K::DependencyMissing,
            Some(L::Python),
            r"(?:ModuleNotFoundError|ImportError): No module named '(?P<module>[\w.]+)'",
        ),
        ErrorRule::new(
            "python-cannot-import",
            K::MissingImport,
            Some(L::Python),
            r"ImportError: cannot import name '(?P<name>\w+)' from '(?P<module>[\w.]+)'",
        ),
        ErrorRule::new(
            "typescript-cannot-find-module",
            K::DependencyMissing,
            Some(L::TypeScript),
            r"TS2307: Cannot find module '(?P<module>[^'./][^']*)'",
        ),
        ErrorRule::new(
            "node-missing-local-module",
            K::FileNotFound,
            Some(L::JavaScript),
            r"Cannot find module '(?P<path>[./][^']*)'",
        ),
        ErrorRule::new(
            "node-cannot-find-module",
            K::DependencyMissing,
            Some(L::JavaScript),
            r"Cannot find module '(?P<module>[^']+)'",
        ),
        ErrorRule::new(
            "rust-undeclared-crate",
            K::DependencyMissing,
            Some(L::Rust),
            r"error\[E0433\]: failed to resolve: use of (?:undeclared crate or module|unresolved module or unlinked crate) `(?P<module>\w+)`",
        ),
        ErrorRule::new(
            "rust-unresolved-import",
            K::MissingImport,
            Some(L::Rust),
            r"error\[E0432\]: unresolved import `(?P<name>[\w:]+)`",
        ),
        ErrorRule::new(
            "go-missing-package",
            K::DependencyMissing,
            Some(L::Go),
            r"no required module provides package (?P<module>[^\s;:]+)",
        ),
        ErrorRule::new(
            "python-indentation",
            K::Indentation,
            Some(L::Python),
            r"\b(?:IndentationError|TabError)\b",
        ),
        ErrorRule::new(
            "shell-syntax",
            K::Syntax,
            Some(L::Shell),
            r"syntax error near unexpected token|syntax error: unexpected|unexpected EOF while looking for matching",
        ),
        ErrorRule::new(
            "rust-syntax",
            K::Syntax,
            Some(L::Rust),
            r"(?m)^error: expected .+, found ",
        ),
        ErrorRule::new("syntax-error", K::Syntax, None, r"\bSyntaxError\b"),
        ErrorRule::new(
            "python-name-error",
            K::NameResolution,
            Some(L::Python),
            r"NameError: name '(?P<name>\w+)' is not defined",
        ),
        ErrorRule::new(
            "js-reference-error",
            K::NameResolution,
            Some(L::JavaScript),
            r"ReferenceError: (?P<name>[\w$]+) is not defined",
        ),
        ErrorRule::new(
            "rust-cannot-find",
            K::NameResolution,
            Some(L::Rust),
            r"error\[E0425\]: cannot find (?:value|function) `(?P<name>\w+)`",
        ),
        ErrorRule::new(
            "c-undeclared",
            K::NameResolution,
            Some(L::C),
            r"'(?P<name>\w+)' undeclared|use of undeclared identifier '\w+'",
        ),
        ErrorRule::new(
            "go-undefined",
            K::NameResolution,
            Some(L::Go),
            r"\bundefined: (?P<name>\w+)",
        ),
        ErrorRule::new(
            "python-attribute",
            K::MissingAttribute,
            Some(L::Python),
            r"AttributeError: (?:'(?P<object>\w+)' object|module '(?P<module>[\w.]+)') has no attribute '(?P<attribute>\w+)'",
        ),
        ErrorRule::new(
            "rust-no-field",
            K::MissingAttribute,
            Some(L::Rust),
            r"error\[E0(?:609|610|599)\]: no (?:field|method named) `(?P<attribute>\w+)`",
        ),
        ErrorRule::new(
            "type-mismatch",
            K::TypeMismatch,
            None,
            r"\bTypeError\b|error\[E0308\]: mismatched types|\bTS2(?:322|345)\b|incompatible types",
        ),
        ErrorRule::new(
            "zsh-command-not-found",
            K::CommandNotFound,
            Some(L::Shell),
            r"command not found: (?P<command>[\w.+-]+)",
        ),
        ErrorRule::new(
            "command-not-found",
            K::CommandNotFound,
            Some(L::Shell),
            r"(?m)(?:^|: )(?P<command>[\w.+-]+): (?:command )?not found",
        ),
        ErrorRule::new(
            "python-permission-error",
            K::PermissionDenied,
            Some(L::Python),
            r"PermissionError: \[Errno 13\] Permission denied: '(?P<path>[^']+)'",
        ),
        ErrorRule::new(
            "permission-denied",
            K::PermissionDenied,
            None,
            r#"(?:(?P<path>[^\s:'"]+): )?Permission denied|\bEACCES\b"#,
        ),
        ErrorRule::new(
            "python-file-not-found",
            K::FileNotFound,
            Some(L::Python),
            r"FileNotFoundError: \[Errno 2\] No such file or directory: '(?P<path>[^']+)'",
        ),
        ErrorRule::new(
            "node-enoent",
            K::FileNotFound,
            Some(L::JavaScript),
            r"ENOENT: no such file or directory, \w+ '(?P<path>[^']+)'",
        ),
        ErrorRule::new(
            "cannot-access",
            K::FileNotFound,
            None,
            r"cannot (?:access|open|stat) '(?P<path>[^']+)'",
        ),
        ErrorRule::new(
            "no-such-file",
            K::FileNotFound,
            None,
            r#"(?:(?P<path>[^\s:'"]+): )?No such file or directory"#,
        ),
        ErrorRule::new(
            "python-env-key-error",
            K::Runtime,
            Some(L::Python),
            r"KeyError: '(?P<key>[A-Z][A-Z0-9_]*)'",
        ),
        ErrorRule::new(
            "missing-env-var",
            K::Runtime,
            None,
            r#"(?i:environment variable|env var)\s+['"`]?(?P<key>[A-Z][A-Z0-9_]*)['"`]?\s+(?:is\s+)?(?i:not set|missing|undefined|required)"#,
        ),
        ErrorRule::new("rust-panic", K::Runtime, Some(L::Rust), r"thread '.+' panicked at"),
        ErrorRule::new("go-panic", K::Runtime, Some(L::Go), r"(?m)^panic: "),
        ErrorRule::new(
            "java-exception",
            K::Runtime,
            Some(L::Java),
            r#"Exception in thread ""#,
        ),
        ErrorRule::new(
            "exception",
            K::Runtime,
            None,
            r"(?m)^(?P<exception>\w+(?:Error|Exception)): ",
        ),
    ]
});

struct LocationRule {
    pattern: Regex,
    /// Use the last match instead of the first.
    innermost: bool,
}

static LOCATIONS: LazyLock<Vec<LocationRule>> = LazyLock::new(|| {
    let rule = |pattern: &str, innermost: bool| LocationRule {
        pattern: Regex::new(pattern).expect("invalid built-in location pattern"),
        innermost,
    };
    vec![
        rule(r#"File "(?P<file>[^"]+)", line (?P<line>\d+)"#, true),
        rule(r"-->\s*(?P<file>[^\s:]+):(?P<line>\d+):(?P<col>\d+)", false),
        rule(
            r"(?P<file>[\w./-]+\.(?:sh|bash)): line (?P<line>\d+):",
            false,
        ),
        rule(
            r"(?P<file>(?:[A-Za-z]:)?[\w./\\-]+\.(?:py|rs|m?js|cjs|jsx|tsx?|go|c|cc|cpp|h|hpp|java|rb)):(?P<line>\d+)(?::(?P<col>\d+))?",
            false,
        ),
    ]
});

static LANGUAGE_HINTS: LazyLock<Vec<(Regex, Language)>> = LazyLock::new(|| {
    [
        (r"Traceback \(most recent call last\)|File .+\.py., line", Language::Python),
        (r"error\[E\d{4}\]|panicked at|-->\s*\S+\.rs:", Language::Rust),
        (r"\bTS\d{4}\b", Language::TypeScript),
        (r"node:internal|npm ERR!|\bat .+\.m?js:\d+", Language::JavaScript),
        (r"goroutine \d+|\.go:\d+|(?m)^go: ", Language::Go),
        (r"Exception in thread|\.java:\d+", Language::Java),
        (r"\.(?:c|cc|cpp|h|hpp):\d+:\d+: (?:fatal )?error", Language::C),
        (r"(?m)^(?:ba|z|da)?sh: ", Language::Shell),
    ]
    .into_iter()
    .map(|(p, lang)| (Regex::new(p).expect("invalid built-in language hint"), lang))
    .collect()
});

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b0x[0-9a-fA-F]+\b|\b\d+\b").expect("invalid number pattern"));

static PATH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:[A-Za-z]:)?(?:\.{0,2}/)?[\w.-]+(?:/[\w.-]+)+/?"#).expect("invalid path pattern")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("invalid whitespace pattern"));

/// Stable key for an error, used to look up learned patterns.
///
/// The kind plus the message with paths, numbers and addresses erased, so
/// the same failure in another file or line maps to the same key. Quoted
/// names are kept: a missing `requests` and a missing `numpy` need
/// different fixes.
#[must_use]
pub fn error_signature(context: &ErrorContext) -> String {
    let shape = PATH_TOKEN.replace_all(&context.message, "<path>");
    let shape = NUMBER.replace_all(&shape, "<n>");
    let shape = WHITESPACE.replace_all(shape.trim(), " ");
    let shape: String = shape.chars().take(SIGNATURE_MESSAGE_CHARS).collect();
    format!("{}:{shape}", context.kind)
}

/// The line of `text` containing byte offset `at`.
fn line_at(text: &str, at: usize) -> &str {
    let start = text[..at].rfind('\n').map_or(0, |i| i.saturating_add(1));
    let end = text[at..]
        .find('\n')
        .map_or(text.len(), |i| i.saturating_add(at));
    text[start..end].trim()
}

/// Regex-driven [`FailureAnalyzer`].
#[derive(Debug, Clone, Default)]
pub struct ErrorAnalyzer {
    base_dir: Option<PathBuf>,
}

impl ErrorAnalyzer {
    /// Analyzer resolving relative file names against the current directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative file names in error text against `dir`.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Classify `raw` and extract location, language and details.
    ///
    /// `source` is the file the failure came from, when the caller knows
    /// it; it fills in the location when the text names none.
    #[must_use]
    pub fn analyze(&self, raw: &str, source: Option<&Path>) -> ErrorContext {
        let mut context = ErrorContext::unknown(raw);
        let mut rule_language = None;

        if let Some((rule, caps)) = RULES
            .iter()
            .find_map(|rule| rule.pattern.captures(raw).map(|caps| (rule, caps)))
        {
            context.kind = rule.kind;
            rule_language = rule.language;
            if let Some(whole) = caps.get(0) {
                context.message = line_at(raw, whole.start()).to_string();
            }
            for name in rule.pattern.capture_names().flatten() {
                if let Some(value) = caps.name(name) {
                    context
                        .details
                        .insert(name.to_string(), value.as_str().to_string());
                }
            }
            tracing::debug!(rule = rule.name, kind = %rule.kind, "Error classified");
        }

        self.locate(raw, &mut context);
        if context.file.is_none()
            && let Some(source) = source
        {
            context.file = Some(source.to_path_buf());
        }

        context.language = rule_language
            .or_else(|| {
                context
                    .file
                    .as_deref()
                    .map(Language::from_path)
                    .filter(|l| *l != Language::Unknown)
            })
            .or_else(|| {
                LANGUAGE_HINTS
                    .iter()
                    .find(|(pattern, _)| pattern.is_match(raw))
                    .map(|(_, lang)| *lang)
            })
            .unwrap_or(Language::Unknown);

        context.snippet = self.snippet(&context);
        context
    }

    fn locate(&self, raw: &str, context: &mut ErrorContext) {
        for rule in LOCATIONS.iter() {
            let caps = if rule.innermost {
                rule.pattern.captures_iter(raw).last()
            } else {
                rule.pattern.captures(raw)
            };
            let Some(caps) = caps else {
                continue;
            };
            context.file = caps.name("file").map(|m| PathBuf::from(m.as_str()));
            context.line = caps.name("line").and_then(|m| m.as_str().parse().ok());
            context.column = caps.name("col").and_then(|m| m.as_str().parse().ok());
            return;
        }
    }

    /// Resolve a file named in error text.
    #[must_use]
    pub fn resolve(&self, file: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if file.is_relative() => base.join(file),
            _ => file.to_path_buf(),
        }
    }

    fn snippet(&self, context: &ErrorContext) -> Option<String> {
        let file = self.resolve(context.file.as_deref()?);
        let line = context.line?;
        let metadata = std::fs::metadata(&file).ok()?;
        if !metadata.is_file() || metadata.len() > MAX_SNIPPET_SOURCE_BYTES {
            return None;
        }
        let text = std::fs::read_to_string(&file).ok()?;

        let first = line.saturating_sub(SNIPPET_RADIUS).max(1);
        let last = line.saturating_add(SNIPPET_RADIUS);
        let rendered: Vec<String> = (first..=last)
            .zip(text.lines().skip(usize::try_from(first.saturating_sub(1)).ok()?))
            .map(|(n, src)| {
                let marker = if n == line { '>' } else { ' ' };
                format!("{marker}{n:>5} | {src}")
            })
            .collect();
        if rendered.is_empty() {
            None
        } else {
            Some(rendered.join("\n"))
        }
    }
}

impl FailureAnalyzer for ErrorAnalyzer {
    fn analyze(&self, raw: &str, source: Option<&Path>) -> ErrorContext {
        ErrorAnalyzer::analyze(self, raw, source)
    }
}
