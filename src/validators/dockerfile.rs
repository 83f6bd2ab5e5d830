use super::Diagnostic;
use tracing::instrument;

pub const KNOWN_INSTRUCTIONS: &[&str] = &[
    "FROM", "RUN", "CMD", "LABEL", "EXPOSE", "ENV", "ADD", "COPY", "ENTRYPOINT", "VOLUME", "USER",
    "WORKDIR", "ARG", "ONBUILD", "STOPSIGNAL", "HEALTHCHECK", "SHELL",
];

/// Base images that almost always serve on a port.
const PORT_LISTENING_IMAGES: &[&str] = &[
    "nginx", "node", "apache", "httpd", "python", "flask", "express", "rails",
];

/// One logical instruction after continuation lines are joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Line the instruction starts on (1-based)
    pub line: usize,
    /// Uppercased keyword
    pub keyword: String,
    pub rest: String,
}

impl Instruction {
    fn from_text(line: usize, text: &str) -> Self {
        let text = text.trim();
        let (keyword, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        Self {
            line,
            keyword: keyword.to_uppercase(),
            rest: rest.trim().to_string(),
        }
    }

    /// Exec form: argument written as a JSON array.
    pub fn is_exec_form(&self) -> bool {
        self.rest.starts_with('[')
    }
}

/// Split content into logical instructions.
///
/// A trailing `\` joins the next line; comments and blank lines are skipped,
/// including inside a continued instruction.
pub fn parse_instructions(content: &str) -> Vec<Instruction> {
    let mut result = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (body, continues) = match line.strip_suffix('\\') {
            Some(body) => (body.trim(), true),
            None => (line, false),
        };

        let text = match pending.take() {
            Some((start, mut joined)) => {
                joined.push(' ');
                joined.push_str(body);
                (start, joined)
            }
            None => (idx + 1, body.to_string()),
        };

        if continues {
            pending = Some(text);
        } else {
            result.push(Instruction::from_text(text.0, &text.1));
        }
    }

    if let Some((start, text)) = pending {
        result.push(Instruction::from_text(start, &text));
    }
    result
}

/// Lint a Dockerfile.
#[instrument(skip(content), fields(bytes = content.len()))]
pub fn validate_dockerfile(content: &str) -> Vec<Diagnostic> {
    let instructions = parse_instructions(content);
    if instructions.is_empty() {
        return Vec::new();
    }

    if !instructions.iter().any(|i| i.keyword == "FROM") {
        return vec![missing_from(instructions[0].line)];
    }

    let mut diagnostics = Vec::new();
    if let Some(misplaced) = check_from_first(&instructions) {
        diagnostics.push(misplaced);
    }

    let mut stages: Vec<String> = Vec::new();
    let mut run_lines = Vec::new();
    let mut last_cmd: Option<&Instruction> = None;
    let mut last_entrypoint: Option<&Instruction> = None;
    let mut has_expose = false;

    for inst in &instructions {
        if !KNOWN_INSTRUCTIONS.contains(&inst.keyword.as_str()) {
            diagnostics.push(unknown_instruction(inst));
            continue;
        }

        let found = match inst.keyword.as_str() {
            "FROM" => {
                let warning = check_from_tag(inst, &stages);
                if let Some(alias) = stage_alias(&inst.rest) {
                    stages.push(alias);
                }
                vec![warning]
            }
            "COPY" => vec![check_copy_args(inst)],
            "ADD" => vec![check_copy_args(inst), check_add_over_copy(inst)],
            "CMD" => {
                last_cmd = Some(inst);
                vec![check_exec_form(inst)]
            }
            "ENTRYPOINT" => {
                last_entrypoint = Some(inst);
                vec![check_exec_form(inst)]
            }
            "ENV" => vec![check_env_format(inst)],
            "EXPOSE" => {
                has_expose = true;
                vec![check_expose(inst)]
            }
            "WORKDIR" => vec![check_workdir(inst)],
            "RUN" => {
                run_lines.push(inst.line);
                vec![check_apt_get(inst)]
            }
            _ => Vec::new(),
        };
        diagnostics.extend(found.into_iter().flatten());
    }

    diagnostics.extend(check_run_count(&run_lines));
    if let (Some(cmd), Some(entrypoint)) = (last_cmd, last_entrypoint) {
        diagnostics.extend(check_shell_form_pair(cmd, entrypoint));
    }
    if !has_expose {
        diagnostics.extend(last_cmd.and_then(check_missing_expose));
    }

    diagnostics
}

fn missing_from(line: usize) -> Diagnostic {
    Diagnostic::error(
        "DF-E-001",
        line,
        "Dockerfile must begin with a FROM instruction",
        "Every Dockerfile must start with FROM to set the base image. Without it Docker cannot construct a build context.",
    )
    .with_fix("Add `FROM <image>` as the first instruction.")
}

fn check_from_first(instructions: &[Instruction]) -> Option<Diagnostic> {
    let first = instructions.iter().find(|i| i.keyword != "ARG")?;
    if first.keyword == "FROM" {
        return None;
    }
    Some(
        Diagnostic::error(
            "DF-E-002",
            first.line,
            "FROM must be the first non-ARG instruction",
            "ARG is the only instruction allowed before FROM. All others (RUN, COPY, LABEL, etc.) must come after the base image is declared.",
        )
        .with_fix("Move the FROM instruction above all non-ARG instructions."),
    )
}

fn unknown_instruction(inst: &Instruction) -> Diagnostic {
    let suggestion = closest_instruction(&inst.keyword);
    let fix = match suggestion {
        Some(known) => format!("Did you mean {known}?"),
        None => format!("Use one of: {}", KNOWN_INSTRUCTIONS.join(", ")),
    };
    Diagnostic::error(
        "DF-E-003",
        inst.line,
        format!("Unknown instruction: {}", inst.keyword),
        format!(
            "'{}' is not a valid Dockerfile instruction. Check for typos such as COPPY, FRROM or RRUN.",
            inst.keyword
        ),
    )
    .with_fix(fix)
}

/// Nearest known keyword within edit distance 2.
fn closest_instruction(keyword: &str) -> Option<&'static str> {
    KNOWN_INSTRUCTIONS
        .iter()
        .map(|known| (edit_distance(keyword, known), *known))
        .filter(|(d, _)| *d <= 2)
        .min_by_key(|(d, _)| *d)
        .map(|(_, known)| known)
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            row[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(row[j] + 1);
        }
        prev = row;
    }
    prev[b.len()]
}

fn check_copy_args(inst: &Instruction) -> Option<Diagnostic> {
    let operands = inst.rest.split_whitespace().filter(|t| !t.starts_with("--")).count();
    if operands >= 2 {
        return None;
    }
    Some(
        Diagnostic::error(
            "DF-E-004",
            inst.line,
            format!("{} requires at least two arguments: <src> <dest>", inst.keyword),
            format!(
                "{} needs a source path and a destination path. A single argument is ambiguous and will fail at build time.",
                inst.keyword
            ),
        )
        .with_fix("Example: `COPY . /app`"),
    )
}

fn check_exec_form(inst: &Instruction) -> Option<Diagnostic> {
    if !inst.is_exec_form() || is_string_array(&inst.rest) {
        return None;
    }
    Some(
        Diagnostic::error(
            "DF-E-005",
            inst.line,
            "Invalid exec form: must be a proper JSON array",
            format!(
                "{} exec form must be a valid JSON array of strings, e.g. [\"npm\",\"start\"]. Mixing shell and exec tokens causes a parse error.",
                inst.keyword
            ),
        )
        .with_fix("Use either shell form or exec form `[\"executable\",\"param\"]`."),
    )
}

fn is_string_array(text: &str) -> bool {
    serde_json::from_str::<Vec<String>>(text.trim()).is_ok()
}

fn check_env_format(inst: &Instruction) -> Option<Diagnostic> {
    if inst.rest.contains('=') {
        return None;
    }
    Some(
        Diagnostic::error(
            "DF-E-006",
            inst.line,
            "ENV instruction requires KEY=VALUE format",
            "The modern ENV syntax requires `KEY=VALUE`. The legacy `ENV KEY VALUE` form only sets one variable and is deprecated.",
        )
        .with_fix(match inst.rest.split_once(char::is_whitespace) {
            Some((key, value)) => format!("Change to `ENV {key}={}`", value.trim()),
            None => format!("Change to `ENV {}=<value>`", inst.rest),
        }),
    )
}

fn check_expose(inst: &Instruction) -> Option<Diagnostic> {
    let bad = inst.rest.split_whitespace().find_map(|entry| {
        let port = entry.split('/').next().unwrap_or_default();
        let valid = !port.is_empty()
            && port.chars().all(|c| c.is_ascii_digit())
            && port.parse::<u16>().is_ok_and(|p| p > 0);
        (!valid).then(|| port.to_string())
    });
    let port = match bad {
        Some(port) => port,
        None if inst.rest.is_empty() => String::new(),
        None => return None,
    };
    Some(
        Diagnostic::error(
            "DF-E-007",
            inst.line,
            "EXPOSE argument must be a valid port number",
            format!(
                "'{port}' is not a valid port number. EXPOSE accepts integers in the range 1-65535, optionally followed by /tcp or /udp."
            ),
        )
        .with_fix("Example: `EXPOSE 8080` or `EXPOSE 80/tcp`"),
    )
}

fn check_workdir(inst: &Instruction) -> Option<Diagnostic> {
    if !inst.rest.split('/').any(|segment| segment == "..") {
        return None;
    }
    Some(
        Diagnostic::error(
            "DF-E-008",
            inst.line,
            "WORKDIR must be an absolute path or a valid relative path within the image",
            "A WORKDIR path containing `..` can escape the intended directory. Use an absolute path like `/app` instead.",
        )
        .with_fix("Change to an absolute path, e.g. `WORKDIR /app`"),
    )
}

/// Image reference of a FROM line, skipping `--platform=...` style options.
fn from_image(rest: &str) -> &str {
    rest.split_whitespace().find(|t| !t.starts_with("--")).unwrap_or_default()
}

fn stage_alias(rest: &str) -> Option<String> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    tokens
        .windows(2)
        .find(|w| w[0].eq_ignore_ascii_case("as"))
        .map(|w| w[1].to_string())
}

fn check_from_tag(inst: &Instruction, stages: &[String]) -> Option<Diagnostic> {
    let image = from_image(&inst.rest);
    if image.is_empty() || image == "scratch" || image.contains('@') || image.contains('$') {
        return None;
    }
    if stages.iter().any(|s| s == image) {
        return None;
    }

    let (name, tag) = split_image_ref(image);
    if tag.is_some_and(|t| t != "latest") {
        return None;
    }
    Some(
        Diagnostic::warning(
            "DF-W-001",
            inst.line,
            "Avoid using :latest; pin a specific version for reproducibility",
            "The :latest tag resolves to whatever the registry considers current at build time. Pinning (e.g. `node:18.20-alpine`) guarantees identical builds across machines and time.",
        )
        .with_fix(format!("Pin a version: `FROM {name}:<version>`")),
    )
}

/// Split `repo[:tag]`, ignoring a registry port such as `host:5000/repo`.
pub fn split_image_ref(image: &str) -> (&str, Option<&str>) {
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, Some(tag)),
        _ => (image, None),
    }
}

fn check_run_count(run_lines: &[usize]) -> Option<Diagnostic> {
    if run_lines.len() < 3 {
        return None;
    }
    let last = *run_lines.last()?;
    Some(
        Diagnostic::warning(
            "DF-W-002",
            last,
            "Consider combining RUN instructions with && to reduce image layers",
            "Each RUN instruction creates a new image layer. Combining them with && keeps the image smaller and the layer count lower.",
        )
        .with_fix("Merge: `RUN apt-get update && apt-get install ...`"),
    )
}

fn check_add_over_copy(inst: &Instruction) -> Option<Diagnostic> {
    let source = inst.rest.split_whitespace().find(|t| !t.starts_with("--")).unwrap_or_default();
    let remote = source.starts_with("http://") || source.starts_with("https://");
    let archive = source.contains(".tar.") || source.ends_with(".tar") || source.ends_with(".tgz");
    if remote || archive {
        return None;
    }
    Some(
        Diagnostic::warning(
            "DF-W-003",
            inst.line,
            "Prefer COPY over ADD for local file copies; ADD has implicit tar extraction behavior",
            "ADD automatically extracts tar archives and can fetch remote URLs, which makes builds less predictable. COPY is explicit and safer for local files.",
        )
        .with_fix(format!("Replace `ADD {0}` with `COPY {0}`", inst.rest)),
    )
}

fn check_apt_get(inst: &Instruction) -> Option<Diagnostic> {
    if !inst.rest.contains("apt-get install") {
        return None;
    }
    if inst.rest.contains("--no-install-recommends") || inst.rest.contains("apt-get clean") {
        return None;
    }
    Some(
        Diagnostic::warning(
            "DF-W-005",
            inst.line,
            "Consider --no-install-recommends and cleaning apt cache to reduce layer size",
            "Without --no-install-recommends, apt installs suggested packages that bloat the layer. Without apt-get clean the package cache remains in the image.",
        )
        .with_fix("Append `--no-install-recommends && rm -rf /var/lib/apt/lists/*`"),
    )
}

fn check_shell_form_pair(cmd: &Instruction, entrypoint: &Instruction) -> Option<Diagnostic> {
    if cmd.is_exec_form() || entrypoint.is_exec_form() {
        return None;
    }
    Some(
        Diagnostic::warning(
            "DF-W-006",
            cmd.line.max(entrypoint.line),
            "When combining CMD and ENTRYPOINT, prefer exec form (JSON array) for both",
            "When both CMD and ENTRYPOINT are in shell form, CMD arguments are not passed to ENTRYPOINT. Exec form gives proper signal propagation and argument passing.",
        )
        .with_fix("Use exec form: `ENTRYPOINT [\"executable\"]` and `CMD [\"param\"]`"),
    )
}

fn check_missing_expose(cmd: &Instruction) -> Option<Diagnostic> {
    let text = cmd.rest.to_lowercase();
    if !PORT_LISTENING_IMAGES.iter().any(|img| text.contains(img)) {
        return None;
    }
    Some(
        Diagnostic::warning(
            "DF-W-007",
            cmd.line,
            "Consider adding EXPOSE to document the port your service listens on",
            "EXPOSE is a documentation hint telling consumers which port the service binds. It does not publish the port but makes the Dockerfile self-describing.",
        )
        .with_fix("Add `EXPOSE 80` (or the appropriate port) before CMD."),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn rule_ids(content: &str) -> Vec<String> {
        validate_dockerfile(content).into_iter().map(|d| d.rule_id).collect()
    }

    const CLEAN: &str = "FROM node:18-alpine\nWORKDIR /app\nCOPY package.json .\nRUN npm install\nEXPOSE 3000\nCMD [\"node\", \"index.js\"]\n";

    #[test]
    fn test_clean_dockerfile_has_no_findings() {
        assert!(validate_dockerfile(CLEAN).is_empty());
    }

    #[test]
    fn test_empty_content() {
        assert!(validate_dockerfile("").is_empty());
        assert!(validate_dockerfile("# just a comment\n\n").is_empty());
    }

    #[test]
    fn test_missing_from_returns_early() {
        let diags = validate_dockerfile("RUN echo hi");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].is_error());
        assert_eq!(diags[0].rule_id, "DF-E-001");
    }

    #[test]
    fn test_from_after_other_instruction() {
        let diags = validate_dockerfile("ARG V=1\nLABEL a=b\nFROM alpine:3.19\n");
        assert_eq!(diags[0].rule_id, "DF-E-002");
        assert_eq!(diags[0].line, 2);
    }

    #[test]
    fn test_arg_before_from_is_fine() {
        assert!(rule_ids("ARG BASE=alpine:3.19\nFROM alpine:3.19\n").is_empty());
    }

    #[test]
    fn test_continuation_lines_join() {
        let instructions = parse_instructions("FROM alpine:3.19\nRUN apk add \\\n    # comment inside\n    curl \\\n    git\nCMD sh\n");
        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[1].line, 2);
        assert_eq!(instructions[1].keyword, "RUN");
        assert_eq!(instructions[1].rest, "apk add curl git");
        assert_eq!(instructions[2].line, 6);
    }

    #[test]
    fn test_trailing_continuation_is_kept() {
        let instructions = parse_instructions("FROM alpine:3.19\nRUN echo \\");
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[1].rest, "echo");
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert!(rule_ids("from alpine:3.19\nrun echo hi\n").is_empty());
    }

    #[test_case("FROM alpine:3.19\nCOPPY . /app", "DF-E-003" ; "unknown instruction")]
    #[test_case("FROM alpine:3.19\nCOPY .", "DF-E-004" ; "copy one argument")]
    #[test_case("FROM alpine:3.19\nCMD [\"npm\", start]", "DF-E-005" ; "bad exec form")]
    #[test_case("FROM alpine:3.19\nENTRYPOINT [\"a\", 1]", "DF-E-005" ; "non string exec form")]
    #[test_case("FROM alpine:3.19\nENV NODE_ENV production", "DF-E-006" ; "legacy env")]
    #[test_case("FROM alpine:3.19\nEXPOSE http", "DF-E-007" ; "non numeric expose")]
    #[test_case("FROM alpine:3.19\nEXPOSE 80 99999/udp", "DF-E-007" ; "out of range expose")]
    #[test_case("FROM alpine:3.19\nWORKDIR ../outside", "DF-E-008" ; "workdir escapes")]
    #[test_case("FROM alpine:3.19\nWORKDIR /app/../etc", "DF-E-008" ; "workdir inner parent")]
    fn test_errors(content: &str, rule: &str) {
        let diags = validate_dockerfile(content);
        let found = diags.iter().find(|d| d.rule_id == rule);
        assert!(found.is_some_and(Diagnostic::is_error), "expected {rule} in {diags:?}");
    }

    #[test_case("FROM node" ; "implicit tag")]
    #[test_case("FROM node:latest" ; "explicit latest")]
    #[test_case("FROM --platform=linux/amd64 node" ; "platform option")]
    fn test_latest_tag_warns(content: &str) {
        assert_eq!(rule_ids(content), vec!["DF-W-001"]);
    }

    #[test_case("FROM scratch" ; "scratch")]
    #[test_case("FROM node@sha256:abc" ; "digest")]
    #[test_case("FROM registry:5000/node:18" ; "registry port")]
    #[test_case("FROM node:18 AS build\nFROM build" ; "stage reference")]
    fn test_pinned_or_special_from_is_quiet(content: &str) {
        assert!(!rule_ids(content).contains(&"DF-W-001".to_string()));
    }

    #[test]
    fn test_run_count_warning_on_third_run() {
        let diags = validate_dockerfile("FROM alpine:3.19\nRUN a\nRUN b\nRUN c\n");
        let warn = diags.iter().find(|d| d.rule_id == "DF-W-002").unwrap();
        assert_eq!(warn.line, 4);
    }

    #[test]
    fn test_add_local_path_warns_but_archive_does_not() {
        assert!(rule_ids("FROM alpine:3.19\nADD . /app").contains(&"DF-W-003".to_string()));
        assert!(rule_ids("FROM alpine:3.19\nADD app.tar.gz /app").is_empty());
        assert!(rule_ids("FROM alpine:3.19\nADD https://example.com/x /x").is_empty());
    }

    #[test]
    fn test_apt_get_without_cleanup() {
        assert!(rule_ids("FROM debian:12\nRUN apt-get install -y curl").contains(&"DF-W-005".to_string()));
        assert!(rule_ids("FROM debian:12\nRUN apt-get install -y --no-install-recommends curl").is_empty());
    }

    #[test]
    fn test_shell_form_cmd_and_entrypoint() {
        let diags = validate_dockerfile("FROM alpine:3.19\nENTRYPOINT run.sh\nCMD --verbose\n");
        let warn = diags.iter().find(|d| d.rule_id == "DF-W-006").unwrap();
        assert_eq!(warn.line, 3);
        assert!(rule_ids("FROM alpine:3.19\nENTRYPOINT [\"run.sh\"]\nCMD [\"--verbose\"]\n").is_empty());
    }

    #[test]
    fn test_missing_expose_for_server_cmd() {
        assert!(rule_ids("FROM alpine:3.19\nCMD nginx -g 'daemon off;'").contains(&"DF-W-007".to_string()));
        assert!(rule_ids("FROM alpine:3.19\nEXPOSE 80\nCMD nginx -g 'daemon off;'").is_empty());
        assert!(rule_ids("FROM alpine:3.19\nCMD echo done").is_empty());
    }

    #[test]
    fn test_typo_suggestion() {
        let diags = validate_dockerfile("FROM alpine:3.19\nRUNN echo");
        assert_eq!(diags[0].fix.as_deref(), Some("Did you mean RUN?"));
    }

    #[test]
    fn test_collects_every_finding() {
        let diags = validate_dockerfile("FROM node\nCOPY .\nENV X\nWORKDIR ../x\n");
        let ids: Vec<_> = diags.iter().map(|d| d.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["DF-W-001", "DF-E-004", "DF-E-006", "DF-E-008"]);
    }
}
