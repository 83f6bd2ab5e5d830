use dockyard::error::{Error, Result};
use dockyard::validators::{self, partition, Diagnostic, FileKind};
use dockyard::workspace;
use std::fs;
use std::path::{Path, PathBuf};

/// Lint a Dockerfile or compose file; exit status 1 when it has errors
pub fn validate(file: &Path, json: bool, workspace_dir: Option<PathBuf>) -> Result<i32> {
    let kind = FileKind::detect(file).ok_or_else(|| Error::UnknownFileKind(file.to_path_buf()))?;
    if !file.exists() {
        return Err(Error::PathNotFound(file.to_path_buf()));
    }
    let content = fs::read_to_string(file)?;

    // Compose build contexts are checked against the directory the file lives in
    let workspace_paths = match kind {
        FileKind::Compose => {
            let dir = workspace_dir.unwrap_or_else(|| match file.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            });
            workspace::paths(&workspace::load_dir(&dir)?)
        }
        FileKind::Dockerfile => Vec::new(),
    };

    let diagnostics = validators::validate(kind, &content, &workspace_paths);
    if json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    } else {
        for line in report(&file.display().to_string(), &diagnostics) {
            println!("{line}");
        }
    }

    let has_errors = diagnostics.iter().any(Diagnostic::is_error);
    Ok(if has_errors { 1 } else { 0 })
}

fn report(name: &str, diagnostics: &[Diagnostic]) -> Vec<String> {
    if diagnostics.is_empty() {
        return vec![format!("{name}: no problems found")];
    }

    let mut lines = Vec::new();
    for d in diagnostics {
        lines.push(format!("{name}:{d}"));
        lines.push(format!("    {}", d.explanation));
        if let Some(fix) = &d.fix {
            lines.push(format!("    fix: {fix}"));
        }
    }
    let (errors, warnings) = partition(diagnostics);
    lines.push(format!("{} error(s), {} warning(s)", errors.len(), warnings.len()));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_clean_file() {
        assert_eq!(report("Dockerfile", &[]), vec!["Dockerfile: no problems found"]);
    }

    #[test]
    fn test_report_lists_findings() {
        let diagnostics = validators::validate(FileKind::Dockerfile, "FROM node\nCOPPY . /app\n", &[]);
        let lines = report("Dockerfile", &diagnostics);
        assert!(lines.iter().any(|l| l.starts_with("Dockerfile:1:1: warning [DF-W-001]")));
        assert!(lines.iter().any(|l| l.starts_with("Dockerfile:2:1: error [DF-E-003]")));
        assert_eq!(lines.last().map(String::as_str), Some("1 error(s), 1 warning(s)"));
    }
}
