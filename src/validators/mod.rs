//! Static validators for Dockerfile and compose content.
//!
//! Validators are pure and total: any input produces a (possibly empty)
//! list of diagnostics, never an error.

pub mod compose;
pub mod dockerfile;
pub mod yaml;

pub use compose::validate_compose;
pub use dockerfile::validate_dockerfile;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub rule_id: String,
    pub severity: Severity,
    pub line: usize,
    pub col: usize,
    pub end_line: usize,
    pub end_col: usize,
    pub message: String,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
}

impl Diagnostic {
    /// Whole-line diagnostic.
    pub fn new(
        rule_id: &str,
        severity: Severity,
        line: usize,
        message: impl Into<String>,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity,
            line,
            col: 1,
            end_line: line,
            end_col: 999,
            message: message.into(),
            explanation: explanation.into(),
            fix: None,
        }
    }

    pub fn error(rule_id: &str, line: usize, message: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self::new(rule_id, Severity::Error, line, message, explanation)
    }

    pub fn warning(rule_id: &str, line: usize, message: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self::new(rule_id, Severity::Warning, line, message, explanation)
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {} [{}] {}", self.line, self.col, self.severity, self.rule_id, self.message)
    }
}

/// Which validator a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Dockerfile,
    Compose,
}

impl FileKind {
    /// Guess the kind from a file name: `Dockerfile`, `*.dockerfile`,
    /// `Dockerfile.*` or any `.yml`/`.yaml` file.
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name == "dockerfile" || name.starts_with("dockerfile.") || name.ends_with(".dockerfile") {
            return Some(FileKind::Dockerfile);
        }
        if name.ends_with(".yml") || name.ends_with(".yaml") {
            return Some(FileKind::Compose);
        }
        None
    }
}

/// Run the validator for `kind` over `content`.
pub fn validate(kind: FileKind, content: &str, workspace_paths: &[String]) -> Vec<Diagnostic> {
    match kind {
        FileKind::Dockerfile => validate_dockerfile(content),
        FileKind::Compose => validate_compose(content, workspace_paths),
    }
}

/// Split diagnostics into (errors, warnings), keeping order.
pub fn partition(diagnostics: &[Diagnostic]) -> (Vec<&Diagnostic>, Vec<&Diagnostic>) {
    diagnostics.iter().partition(|d| d.is_error())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Dockerfile", Some(FileKind::Dockerfile))]
    #[test_case("api/Dockerfile.dev", Some(FileKind::Dockerfile))]
    #[test_case("web.dockerfile", Some(FileKind::Dockerfile))]
    #[test_case("compose.yml", Some(FileKind::Compose))]
    #[test_case("docker-compose.yaml", Some(FileKind::Compose))]
    #[test_case("index.js", None)]
    fn test_detect_kind(path: &str, expected: Option<FileKind>) {
        assert_eq!(FileKind::detect(Path::new(path)), expected);
    }

    #[test]
    fn test_diagnostic_serializes_camel_case() {
        let d = Diagnostic::error("DF-E-001", 3, "msg", "why").with_fix("do this");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["ruleId"], "DF-E-001");
        assert_eq!(json["severity"], "error");
        assert_eq!(json["endLine"], 3);
        assert_eq!(json["fix"], "do this");
    }

    #[test]
    fn test_fix_omitted_when_absent() {
        let d = Diagnostic::warning("DC-W-002", 1, "msg", "why");
        let json = serde_json::to_value(&d).unwrap();
        assert!(json.get("fix").is_none());
    }
}
