//! Failure diagnosis records: what went wrong and how it might be fixed.
//!
//! [`ErrorContext`] is the structured form of a raw error message. Fix
//! engines turn it into ranked [`FixSuggestion`]s and remember how well each
//! fix worked as a [`LearnedPattern`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::types::Timestamp;

/// Canonical error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Source failed to parse.
    Syntax,
    /// An import statement names something that does not exist in the module.
    MissingImport,
    /// An identifier is not defined.
    NameResolution,
    /// A value has the wrong type.
    TypeMismatch,
    /// An object has no such attribute or field.
    MissingAttribute,
    /// A path does not exist.
    FileNotFound,
    /// The OS refused access.
    PermissionDenied,
    /// The shell could not find the program.
    CommandNotFound,
    /// A package or module is not installed.
    DependencyMissing,
    /// Inconsistent indentation.
    Indentation,
    /// A runtime failure with a recognizable shape.
    Runtime,
    /// Nothing matched.
    Unknown,
}

impl ErrorKind {
    /// Stable snake-case name, used in signatures.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::MissingImport => "missing_import",
            Self::NameResolution => "name_resolution",
            Self::TypeMismatch => "type_mismatch",
            Self::MissingAttribute => "missing_attribute",
            Self::FileNotFound => "file_not_found",
            Self::PermissionDenied => "permission_denied",
            Self::CommandNotFound => "command_not_found",
            Self::DependencyMissing => "dependency_missing",
            Self::Indentation => "indentation",
            Self::Runtime => "runtime",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source language inferred from the error text or file extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// Python.
    Python,
    /// Rust.
    Rust,
    /// JavaScript.
    JavaScript,
    /// TypeScript.
    TypeScript,
    /// Go.
    Go,
    /// POSIX shell.
    Shell,
    /// C or C++.
    C,
    /// Java.
    Java,
    /// Not determined.
    #[default]
    Unknown,
}

impl Language {
    /// Infer a language from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py" | "pyi") => Self::Python,
            Some("rs") => Self::Rust,
            Some("js" | "mjs" | "cjs" | "jsx") => Self::JavaScript,
            Some("ts" | "tsx") => Self::TypeScript,
            Some("go") => Self::Go,
            Some("sh" | "bash" | "zsh") => Self::Shell,
            Some("c" | "h" | "cc" | "cpp" | "hpp" | "cxx") => Self::C,
            Some("java") => Self::Java,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Python => "python",
            Self::Rust => "rust",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
            Self::Shell => "shell",
            Self::C => "c",
            Self::Java => "java",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Structured extraction from a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Canonical kind.
    pub kind: ErrorKind,
    /// The single most relevant error line.
    pub message: String,
    /// The full raw text the analysis was run on.
    pub raw: String,
    /// Source file, when one was named.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// 1-based line number.
    #[serde(default)]
    pub line: Option<u32>,
    /// 1-based column number.
    #[serde(default)]
    pub column: Option<u32>,
    /// Source lines around the error.
    #[serde(default)]
    pub snippet: Option<String>,
    /// Inferred source language.
    #[serde(default)]
    pub language: Language,
    /// Extracted names: `module`, `name`, `attribute`, `command`, `path`, `key`.
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

impl ErrorContext {
    /// Context for text that matched no pattern.
    #[must_use]
    pub fn unknown(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let message = raw
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default()
            .trim()
            .to_string();
        Self {
            kind: ErrorKind::Unknown,
            message,
            raw,
            file: None,
            line: None,
            column: None,
            snippet: None,
            language: Language::Unknown,
            details: BTreeMap::new(),
        }
    }

    /// Look up an extracted detail.
    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }

    /// Add an extracted detail.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(file) = &self.file {
            write!(f, " ({}", file.display())?;
            if let Some(line) = self.line {
                write!(f, ":{line}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Produces an [`ErrorContext`] from raw failure text.
///
/// Implemented by the recovery engine; the executor uses it to annotate
/// failed results without depending on the recovery crate.
pub trait FailureAnalyzer: Send + Sync {
    /// Classify `raw` and extract its location. `source` is the file the
    /// failure came from, when known.
    fn analyze(&self, raw: &str, source: Option<&Path>) -> ErrorContext;
}

/// Category of a proposed fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    /// Edit a source file.
    EditCode,
    /// Run a shell command.
    RunCommand,
    /// Install a package and record it as a project dependency, either
    /// through the package manager itself or in a requirements manifest.
    InstallPackage,
    /// Edit a configuration file.
    EditConfig,
}

impl fmt::Display for FixKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EditCode => "edit_code",
            Self::RunCommand => "run_command",
            Self::InstallPackage => "install_package",
            Self::EditConfig => "edit_config",
        };
        f.write_str(s)
    }
}

/// Confidence label derived from a numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    /// Below 0.6.
    Low,
    /// 0.6 up to 0.9.
    Medium,
    /// 0.9 and above.
    High,
}

impl ConfidenceTier {
    /// Threshold for HIGH.
    pub const HIGH: f64 = 0.9;
    /// Threshold for MEDIUM.
    pub const MEDIUM: f64 = 0.6;

    /// Tier for a confidence score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= Self::HIGH {
            Self::High
        } else if score >= Self::MEDIUM {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

/// A concrete edit to a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CodeEdit {
    /// Replace the first occurrence of `find`.
    Replace {
        /// Text to find.
        find: String,
        /// Replacement.
        replace: String,
    },
    /// Insert a line before 1-based `line`.
    InsertLine {
        /// 1-based line number; past the end appends.
        line: u32,
        /// Line text without newline.
        text: String,
    },
    /// Replace 1-based `line`.
    ReplaceLine {
        /// 1-based line number.
        line: u32,
        /// Line text without newline.
        text: String,
    },
    /// Expand leading tabs to spaces.
    NormalizeIndentation {
        /// Spaces per tab.
        tab_width: u8,
    },
}

impl CodeEdit {
    /// Apply the edit to `source`. Returns `None` when it does not apply.
    #[must_use]
    pub fn apply(&self, source: &str) -> Option<String> {
        match self {
            Self::Replace { find, replace } => {
                if find.is_empty() || !source.contains(find.as_str()) {
                    return None;
                }
                Some(source.replacen(find.as_str(), replace, 1))
            },
            Self::InsertLine { line, text } => {
                let mut lines: Vec<&str> = source.lines().collect();
                let index = usize::try_from(line.saturating_sub(1))
                    .unwrap_or(usize::MAX)
                    .min(lines.len());
                lines.insert(index, text);
                Some(join_lines(&lines, source))
            },
            Self::ReplaceLine { line, text } => {
                let mut lines: Vec<&str> = source.lines().collect();
                let index = usize::try_from(line.checked_sub(1)?).ok()?;
                let slot = lines.get_mut(index)?;
                *slot = text;
                Some(join_lines(&lines, source))
            },
            Self::NormalizeIndentation { tab_width } => {
                let spaces = " ".repeat(usize::from(*tab_width));
                let mut changed = false;
                let normalized: Vec<String> = source
                    .lines()
                    .map(|l| {
                        let indent_len = l.len().saturating_sub(l.trim_start().len());
                        let (indent, rest) = l.split_at(indent_len);
                        if indent.contains('\t') {
                            changed = true;
                            format!("{}{rest}", indent.replace('\t', &spaces))
                        } else {
                            l.to_string()
                        }
                    })
                    .collect();
                if !changed {
                    return None;
                }
                let refs: Vec<&str> = normalized.iter().map(String::as_str).collect();
                Some(join_lines(&refs, source))
            },
        }
    }
}

fn join_lines(lines: &[&str], original: &str) -> String {
    let mut out = lines.join("\n");
    if original.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// The concrete action a suggestion would take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FixPayload {
    /// Run a shell command.
    RunCommand {
        /// Command to run.
        command: String,
    },
    /// Install a package with a package manager.
    InstallPackage {
        /// Package manager (`pip`, `npm`, `cargo`).
        manager: String,
        /// Package to install.
        package: String,
        /// The install command line.
        command: String,
        /// Manifest to record the dependency in, if any.
        #[serde(default)]
        manifest: Option<PathBuf>,
    },
    /// Edit a source file.
    EditCode {
        /// File to edit.
        path: PathBuf,
        /// The edit.
        edit: CodeEdit,
    },
    /// Set a key in a configuration file.
    EditConfig {
        /// Configuration file.
        path: PathBuf,
        /// Key to set.
        key: String,
        /// Value to set.
        value: String,
    },
    /// No automatic action; a hint for the human.
    Manual {
        /// What to try.
        hint: String,
    },
}

impl FixPayload {
    /// The command this payload runs, if any.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::RunCommand { command } | Self::InstallPackage { command, .. } => {
                Some(command.as_str())
            },
            _ => None,
        }
    }

    /// Whether applying this payload does something.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::Manual { .. })
    }
}

/// Where a suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    /// A built-in rule.
    Rule,
    /// A learned pattern with a proven success rate.
    Learned,
}

/// A proposed remedy for an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSuggestion {
    /// Human-readable description.
    pub description: String,
    /// Category.
    pub kind: FixKind,
    /// Confidence score in `[0, 1]`.
    pub confidence: f64,
    /// Concrete action.
    pub payload: FixPayload,
    /// Estimated time to apply, in seconds.
    pub estimated_secs: u32,
    /// Whether a human must approve regardless of confidence.
    pub requires_approval: bool,
    /// Where the suggestion came from.
    pub source: SuggestionSource,
}

impl FixSuggestion {
    /// Create a rule-based suggestion.
    #[must_use]
    pub fn new(
        description: impl Into<String>,
        kind: FixKind,
        confidence: f64,
        payload: FixPayload,
    ) -> Self {
        Self {
            description: description.into(),
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            payload,
            estimated_secs: 5,
            requires_approval: false,
            source: SuggestionSource::Rule,
        }
    }

    /// Set the time estimate.
    #[must_use]
    pub fn with_estimate(mut self, secs: u32) -> Self {
        self.estimated_secs = secs;
        self
    }

    /// Require explicit approval.
    #[must_use]
    pub fn requiring_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Mark the suggestion as learned.
    #[must_use]
    pub fn learned(mut self) -> Self {
        self.source = SuggestionSource::Learned;
        self
    }

    /// Confidence tier.
    #[must_use]
    pub fn tier(&self) -> ConfidenceTier {
        ConfidenceTier::from_score(self.confidence)
    }

    /// Stable key identifying the action, independent of wording and score.
    #[must_use]
    pub fn fix_signature(&self) -> String {
        match &self.payload {
            FixPayload::RunCommand { command } => format!("run:{}", command.trim()),
            FixPayload::InstallPackage {
                manager, package, ..
            } => format!("install:{manager}:{package}"),
            FixPayload::EditCode { edit, .. } => match edit {
                CodeEdit::Replace { find, replace } => format!("edit:replace:{find}->{replace}"),
                CodeEdit::InsertLine { text, .. } => format!("edit:insert:{}", text.trim()),
                CodeEdit::ReplaceLine { text, .. } => format!("edit:line:{}", text.trim()),
                CodeEdit::NormalizeIndentation { tab_width } => {
                    format!("edit:indent:{tab_width}")
                },
            },
            FixPayload::EditConfig { path, key, .. } => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("config:{name}:{key}")
            },
            FixPayload::Manual { hint } => format!("manual:{hint}"),
        }
    }
}

impl fmt::Display for FixSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {:.2}] {} (~{}s)",
            self.tier(),
            self.confidence,
            self.description,
            self.estimated_secs
        )
    }
}

/// Persisted mapping from an error signature to a fix's track record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    /// Error signature (kind plus normalized message shape).
    pub error_signature: String,
    /// Fix signature, see [`FixSuggestion::fix_signature`].
    pub fix_signature: String,
    /// The suggestion that was applied, replayed when the pattern qualifies.
    pub suggestion: FixSuggestion,
    /// Running success rate in `[0, 1]`.
    pub success_rate: f64,
    /// Number of recorded outcomes.
    pub uses: u32,
    /// When the last outcome was recorded.
    pub last_used: Timestamp,
}

impl LearnedPattern {
    /// A pattern with no recorded outcomes.
    #[must_use]
    pub fn new(error_signature: impl Into<String>, suggestion: FixSuggestion) -> Self {
        Self {
            error_signature: error_signature.into(),
            fix_signature: suggestion.fix_signature(),
            suggestion,
            success_rate: 0.0,
            uses: 0,
            last_used: Timestamp::now(),
        }
    }

    /// Record one outcome.
    ///
    /// The first outcome seeds the rate; later ones update it with an
    /// exponential moving average of smoothing factor `alpha`. The rate stays
    /// in `[0, 1]`.
    pub fn record(&mut self, succeeded: bool, alpha: f64) {
        let outcome = if succeeded { 1.0 } else { 0.0 };
        let rate = if self.uses == 0 {
            outcome
        } else {
            let alpha = alpha.clamp(0.0, 1.0);
            self.success_rate + alpha * (outcome - self.success_rate)
        };
        self.success_rate = rate.clamp(0.0, 1.0);
        self.uses = self.uses.saturating_add(1);
        self.last_used = Timestamp::now();
    }

    /// Whether the pattern has earned HIGH-confidence surfacing.
    #[must_use]
    pub fn qualifies(&self, min_rate: f64, min_uses: u32) -> bool {
        self.success_rate >= min_rate && self.uses >= min_uses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(cmd: &str, confidence: f64) -> FixSuggestion {
        FixSuggestion::new(
            "run it",
            FixKind::RunCommand,
            confidence,
            FixPayload::RunCommand {
                command: cmd.to_string(),
            },
        )
    }

    #[test]
    fn test_confidence_tiers() {
        assert_eq!(ConfidenceTier::from_score(0.95), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(0.9), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(0.85), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(0.6), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(0.59), ConfidenceTier::Low);
        assert!(ConfidenceTier::High > ConfidenceTier::Low);
    }

    #[test]
    fn test_suggestion_clamps_confidence() {
        assert!((run("x", 1.7).confidence - 1.0).abs() < f64::EPSILON);
        assert!(run("x", -2.0).confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn test_fix_signature_ignores_wording() {
        let a = run("pip install requests", 0.8);
        let b = run(" pip install requests ", 0.5).learned();
        assert_eq!(a.fix_signature(), b.fix_signature());
        assert_eq!(a.fix_signature(), "run:pip install requests");
    }

    #[test]
    fn test_learned_pattern_first_outcome_seeds() {
        let mut pattern = LearnedPattern::new("dependency_missing:x", run("pip install x", 0.8));
        pattern.record(true, 0.3);
        assert!((pattern.success_rate - 1.0).abs() < f64::EPSILON);
        pattern.record(false, 0.3);
        assert!((pattern.success_rate - 0.7).abs() < 1e-9);
        assert_eq!(pattern.uses, 2);
    }

    #[test]
    fn test_learned_pattern_converges_monotonically() {
        let mut pattern = LearnedPattern::new("sig", run("fix", 0.8));
        pattern.record(false, 0.3);
        let mut previous = pattern.success_rate;
        for _ in 0..50 {
            pattern.record(true, 0.3);
            assert!(pattern.success_rate >= previous);
            assert!(pattern.success_rate <= 1.0);
            previous = pattern.success_rate;
        }
        assert!(pattern.success_rate > 0.99);
        assert!(pattern.qualifies(0.9, 3));
    }

    #[test]
    fn test_code_edit_replace_line_and_insert() {
        let src = "a\nb\nc\n";
        let edit = CodeEdit::ReplaceLine {
            line: 2,
            text: "B".to_string(),
        };
        assert_eq!(edit.apply(src).unwrap(), "a\nB\nc\n");
        let edit = CodeEdit::InsertLine {
            line: 1,
            text: "import os".to_string(),
        };
        assert_eq!(edit.apply(src).unwrap(), "import os\na\nb\nc\n");
        let edit = CodeEdit::ReplaceLine {
            line: 9,
            text: "x".to_string(),
        };
        assert!(edit.apply(src).is_none());
    }

    #[test]
    fn test_code_edit_normalize_indentation() {
        let src = "def f():\n\treturn 1\n";
        let edit = CodeEdit::NormalizeIndentation { tab_width: 4 };
        assert_eq!(edit.apply(src).unwrap(), "def f():\n    return 1\n");
        assert!(edit.apply("x = 1\n").is_none());
    }

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path(Path::new("a/b.py")), Language::Python);
        assert_eq!(Language::from_path(Path::new("main.rs")), Language::Rust);
        assert_eq!(Language::from_path(Path::new("README")), Language::Unknown);
    }

    #[test]
    fn test_unknown_context_uses_last_line() {
        let ctx = ErrorContext::unknown("first\nsomething odd happened\n\n");
        assert_eq!(ctx.kind, ErrorKind::Unknown);
        assert_eq!(ctx.message, "something odd happened");
    }
}
