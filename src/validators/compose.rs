use super::yaml::{parse_yaml, Mapping, Yaml};
use super::Diagnostic;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::instrument;

static SECRET_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)password|secret|passwd|token|api_key|private_key").expect("secret pattern compiles")
});

static DATABASE_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)postgres|mysql|mariadb|mongo").expect("database pattern compiles"));

/// Line numbers of service blocks, so findings point at the right place.
struct Locator<'a> {
    lines: Vec<(usize, usize, &'a str)>,
}

impl<'a> Locator<'a> {
    fn new(content: &'a str) -> Self {
        let lines = content
            .lines()
            .enumerate()
            .filter_map(|(idx, raw)| {
                let text = raw.trim_start();
                if text.is_empty() || text.starts_with('#') {
                    return None;
                }
                Some((idx + 1, raw.len() - text.len(), text))
            })
            .collect();
        Self { lines }
    }

    fn key_line(text: &str, key: &str) -> bool {
        let text = text.trim_matches(|c| c == '"' || c == '\'');
        text.strip_prefix(key)
            .map(|after| after.trim_start_matches(['"', '\'']))
            .is_some_and(|after| after.starts_with(':'))
    }

    /// Range of entries belonging to `services.<name>`: (header index, end index).
    fn service_block(&self, name: &str) -> Option<(usize, usize)> {
        let services = self
            .lines
            .iter()
            .position(|(_, indent, text)| *indent == 0 && Self::key_line(text, "services"))?;
        let svc_indent = self.lines.get(services + 1)?.1;
        let start = self.lines[services + 1..]
            .iter()
            .take_while(|(_, indent, _)| *indent >= svc_indent)
            .position(|(_, indent, text)| *indent == svc_indent && Self::key_line(text, name))?
            + services
            + 1;
        let end = self.lines[start + 1..]
            .iter()
            .position(|(_, indent, _)| *indent <= svc_indent)
            .map_or(self.lines.len(), |offset| start + 1 + offset);
        Some((start, end))
    }

    fn service(&self, name: &str) -> usize {
        self.service_block(name).map_or(1, |(start, _)| self.lines[start].0)
    }

    /// Line of `key` inside a service, falling back to the service header.
    fn field(&self, name: &str, key: &str) -> usize {
        let Some((start, end)) = self.service_block(name) else {
            return 1;
        };
        self.lines[start + 1..end]
            .iter()
            .find(|(_, _, text)| Self::key_line(text, key))
            .map_or(self.lines[start].0, |(line, _, _)| *line)
    }
}

/// Everything a per-service rule can look at.
struct ServiceContext<'a> {
    name: &'a str,
    svc: &'a Mapping,
    service_names: Vec<&'a str>,
    top_volumes: Option<&'a Mapping>,
    top_networks: Option<&'a Mapping>,
    workspace_paths: &'a [String],
    locator: &'a Locator<'a>,
}

impl ServiceContext<'_> {
    fn line(&self, key: &str) -> usize {
        self.locator.field(self.name, key)
    }
}

/// Lint a compose file against the workspace paths it may build from.
#[instrument(skip(content, workspace_paths), fields(bytes = content.len()))]
pub fn validate_compose(content: &str, workspace_paths: &[String]) -> Vec<Diagnostic> {
    let doc = match parse_yaml(content) {
        Ok(doc) => doc,
        Err(e) => {
            return vec![Diagnostic::error(
                "DC-YAML",
                e.line,
                format!("YAML parse error: {}", e.message),
                "The compose file could not be parsed as valid YAML. Check for unclosed brackets, bad indentation, or duplicate keys.",
            )];
        }
    };
    if doc.is_empty() {
        return Vec::new();
    }

    let declared = doc
        .get("services")
        .filter(|v| v.is_set() && !matches!(v, Yaml::Map(m) if m.is_empty()));
    let Some(services) = declared else {
        return vec![Diagnostic::error(
            "DC-E-001",
            1,
            "compose.yml must define a top-level 'services' key",
            "Docker Compose files must have a top-level `services` map listing the containers to run. Without it compose up has nothing to start.",
        )
        .with_fix("Add `services:` at the top level with at least one service underneath.")];
    };
    let Some(services) = services.as_map() else {
        return Vec::new();
    };

    let locator = Locator::new(content);
    let workspace_paths: Vec<String> = workspace_paths.iter().map(|p| normalize_path(p)).collect();
    let mut diagnostics = Vec::new();

    for (name, value) in services.iter() {
        let Some(svc) = value.as_map() else {
            continue;
        };
        let ctx = ServiceContext {
            name,
            svc,
            service_names: services.keys().collect(),
            top_volumes: doc.get("volumes").and_then(Yaml::as_map),
            top_networks: doc.get("networks").and_then(Yaml::as_map),
            workspace_paths: &workspace_paths,
            locator: &locator,
        };

        diagnostics.extend(check_image_or_build(&ctx));
        diagnostics.extend(check_build_context(&ctx));
        diagnostics.extend(check_ports(&ctx));
        diagnostics.extend(check_depends_on(&ctx));
        diagnostics.extend(check_volume_mounts(&ctx));
        diagnostics.extend(check_networks(&ctx));
        diagnostics.extend(check_image_tag(&ctx));
        diagnostics.extend(check_environment(&ctx));
        diagnostics.extend(check_restart_policy(&ctx));
    }

    diagnostics
}

/// `./api/` and `api` name the same workspace directory.
pub fn normalize_path(path: &str) -> String {
    let mut path = path.trim();
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.trim_end_matches('/').to_string()
}

/// Build context of a service: the string form or the `context` key of the map form.
pub fn build_context(svc: &Mapping) -> Option<String> {
    let build = svc.get("build")?;
    match build {
        Yaml::Map(map) => map.get("context").and_then(Yaml::as_text),
        other => other.as_text(),
    }
}

/// Service names listed under `depends_on`, in either list or map form.
pub fn depends_on(svc: &Mapping) -> Vec<String> {
    match svc.get("depends_on") {
        Some(Yaml::Seq(items)) => items.iter().filter_map(Yaml::as_text).collect(),
        Some(Yaml::Map(map)) => map.keys().map(str::to_string).collect(),
        Some(other) => other.as_text().into_iter().collect(),
        None => Vec::new(),
    }
}

fn check_image_or_build(ctx: &ServiceContext) -> Option<Diagnostic> {
    if ctx.svc.contains_key("image") || ctx.svc.contains_key("build") {
        return None;
    }
    Some(
        Diagnostic::error(
            "DC-E-002",
            ctx.locator.service(ctx.name),
            format!("Service '{}': must specify either 'image' or 'build'", ctx.name),
            "Every service needs to know what container to run. Use `image` to reference a pre-built image, or `build` to build from a Dockerfile.",
        )
        .with_fix(format!("Add `image: nginx:stable` or `build: .` under service '{}'.", ctx.name)),
    )
}

fn check_build_context(ctx: &ServiceContext) -> Option<Diagnostic> {
    let path = build_context(ctx.svc)?;
    let normalized = normalize_path(&path);
    if normalized.is_empty() || normalized == "." || ctx.workspace_paths.contains(&normalized) {
        return None;
    }
    Some(
        Diagnostic::error(
            "DC-E-005",
            ctx.line("build"),
            format!("Service '{}': build context '{path}' does not exist in workspace", ctx.name),
            format!("The build context path '{path}' was not found among workspace files. Compose cannot locate the Dockerfile."),
        )
        .with_fix(format!("Create the directory '{path}' or correct the path.")),
    )
}

/// `8080`, `8000-8010` and similar numeric port specs.
fn is_port_number(part: &str) -> bool {
    let part = part.split('/').next().unwrap_or_default();
    !part.is_empty()
        && part.split('-').all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

fn check_ports(ctx: &ServiceContext) -> Vec<Diagnostic> {
    let Some(ports) = ctx.svc.get("ports").and_then(Yaml::as_seq) else {
        return Vec::new();
    };
    let line = ctx.line("ports");
    let mut diagnostics = Vec::new();

    for entry in ports {
        let Some(raw) = entry.as_text() else {
            diagnostics.push(
                Diagnostic::error(
                    "DC-E-003",
                    line,
                    format!("Service '{}': ports entries must be strings in 'host:container' format", ctx.name),
                    "Each ports entry must be a string like \"8080:80\" or a bare number. Objects and other types are not valid in this position.",
                )
                .with_fix("Use string format: \"8080:80\""),
            );
            continue;
        };

        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() < 2 {
            continue;
        }
        let host = parts[parts.len() - 2];
        let container = parts[parts.len() - 1];
        if !is_port_number(host) || !is_port_number(container) {
            diagnostics.push(
                Diagnostic::error(
                    "DC-E-004",
                    line,
                    format!("Service '{}': invalid port mapping '{raw}'", ctx.name),
                    "Both the host and container port in a port mapping must be numeric. Non-numeric values cause compose up to fail.",
                )
                .with_fix("Correct the mapping to use integers, e.g. \"8080:80\"."),
            );
        }
    }
    diagnostics
}

fn check_depends_on(ctx: &ServiceContext) -> Vec<Diagnostic> {
    depends_on(ctx.svc)
        .into_iter()
        .filter(|dep| !ctx.service_names.contains(&dep.as_str()))
        .map(|dep| {
            Diagnostic::error(
                "DC-E-006",
                ctx.line("depends_on"),
                format!("Service '{}': depends_on references unknown service '{dep}'", ctx.name),
                format!("'{dep}' is listed in depends_on but is not defined in the services map. Compose will refuse to start."),
            )
            .with_fix(format!("Add service '{dep}' to the services map or remove the dependency."))
        })
        .collect()
}

fn check_volume_mounts(ctx: &ServiceContext) -> Vec<Diagnostic> {
    let Some(volumes) = ctx.svc.get("volumes").and_then(Yaml::as_seq) else {
        return Vec::new();
    };
    volumes
        .iter()
        .filter_map(Yaml::as_str)
        .filter_map(|mount| {
            let source = mount.split(':').next().unwrap_or_default();
            let is_path = source.starts_with('.') || source.starts_with('/') || source.starts_with('~');
            let declared = ctx.top_volumes.is_some_and(|v| v.contains_key(source));
            if source.is_empty() || is_path || declared || !mount.contains(':') {
                return None;
            }
            Some(
                Diagnostic::error(
                    "DC-E-007",
                    ctx.line("volumes"),
                    format!(
                        "Volume '{source}' is used by service '{}' but not declared under top-level 'volumes'",
                        ctx.name
                    ),
                    "Named volumes referenced in service volume mounts must be declared at the top-level 'volumes' key so Compose knows to create them.",
                )
                .with_fix(format!("Add `{source}:` under the top-level `volumes:` key.")),
            )
        })
        .collect()
}

/// Networks a service joins, in either list or map form.
pub fn service_networks(svc: &Mapping) -> Vec<String> {
    match svc.get("networks") {
        Some(Yaml::Seq(items)) => items.iter().filter_map(Yaml::as_text).collect(),
        Some(Yaml::Map(map)) => map.keys().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn check_networks(ctx: &ServiceContext) -> Vec<Diagnostic> {
    service_networks(ctx.svc)
        .into_iter()
        .filter(|net| !ctx.top_networks.is_some_and(|n| n.contains_key(net)))
        .map(|net| {
            Diagnostic::error(
                "DC-E-008",
                ctx.line("networks"),
                format!("Network '{net}' is used but not declared under top-level 'networks'"),
                "Networks named in a service must be declared at the top-level 'networks' key. Otherwise Compose doesn't know how to create them.",
            )
            .with_fix(format!("Add `{net}:` under the top-level `networks:` key."))
        })
        .collect()
}

fn check_image_tag(ctx: &ServiceContext) -> Vec<Diagnostic> {
    let Some(image) = ctx.svc.get("image").and_then(Yaml::as_text) else {
        return Vec::new();
    };
    let mut diagnostics = Vec::new();
    let line = ctx.line("image");

    let (name, tag) = super::dockerfile::split_image_ref(&image);
    if !image.contains('@') && tag.map_or(true, |t| t.is_empty() || t == "latest") {
        diagnostics.push(
            Diagnostic::warning(
                "DC-W-001",
                line,
                format!("Service '{}': avoid image:latest; pin a version for reproducibility", ctx.name),
                "The :latest tag resolves to whatever is current at pull time. Pinning a version guarantees the same image across deployments.",
            )
            .with_fix(format!("Pin the image version, e.g. `image: {name}:stable`")),
        );
    }

    if DATABASE_IMAGE.is_match(&image) && !ctx.svc.has("healthcheck") {
        diagnostics.push(
            Diagnostic::warning(
                "DC-W-003",
                line,
                format!(
                    "Service '{}': consider adding a healthcheck so dependent services wait for readiness",
                    ctx.name
                ),
                "Database services often take a moment to accept connections. A healthcheck lets depends_on: condition: service_healthy wait properly instead of racing.",
            )
            .with_fix("Add a `healthcheck:` block with a test command like `pg_isready`."),
        );
    }
    diagnostics
}

fn check_restart_policy(ctx: &ServiceContext) -> Option<Diagnostic> {
    if ctx.svc.has("restart") {
        return None;
    }
    Some(
        Diagnostic::warning(
            "DC-W-002",
            ctx.locator.service(ctx.name),
            format!("Service '{}': consider adding a restart policy (e.g., unless-stopped)", ctx.name),
            "Without a restart policy the container stays stopped after a crash or reboot. `unless-stopped` is a safe default for long-running services.",
        )
        .with_fix(format!("Add `restart: unless-stopped` under service '{}'.", ctx.name)),
    )
}

fn scalar_text(value: &Yaml) -> String {
    match value {
        Yaml::Bool(b) => b.to_string(),
        other => other.as_text().unwrap_or_default(),
    }
}

/// Environment as `(key, value)` pairs from either the list or the map form.
pub fn environment(svc: &Mapping) -> Vec<(String, String)> {
    match svc.get("environment") {
        Some(Yaml::Map(map)) => map.iter().map(|(k, v)| (k.to_string(), scalar_text(v))).collect(),
        Some(Yaml::Seq(items)) => items
            .iter()
            .flat_map(|item| match item {
                Yaml::Map(map) => map.iter().map(|(k, v)| (k.to_string(), scalar_text(v))).collect(),
                other => {
                    let text = other.as_text().unwrap_or_default();
                    match text.split_once('=') {
                        Some((k, v)) => vec![(k.to_string(), v.to_string())],
                        None if text.is_empty() => Vec::new(),
                        None => vec![(text, String::new())],
                    }
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn check_environment(ctx: &ServiceContext) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let line = ctx.line("environment");

    if let Some(items) = ctx.svc.get("environment").and_then(Yaml::as_seq) {
        let has_pairs = items.iter().any(|i| i.as_map().is_some());
        let has_strings = items.iter().any(|i| i.as_text().is_some());
        if has_pairs && has_strings {
            diagnostics.push(
                Diagnostic::warning(
                    "DC-W-004",
                    line,
                    format!(
                        "Service '{}': mix of array and map environment syntax; prefer one form consistently",
                        ctx.name
                    ),
                    "Using both array and map forms for the same service's environment is confusing and may cause unexpected merge behavior.",
                )
                .with_fix("Standardise on either the map form (`KEY: value`) or list form (`- KEY=value`)."),
            );
        }
    }

    for (key, value) in environment(ctx.svc) {
        if SECRET_KEY.is_match(&key) && !value.is_empty() {
            diagnostics.push(
                Diagnostic::warning(
                    "DC-W-005",
                    line,
                    format!(
                        "Service '{}': plain-text secret detected in environment; prefer Docker secrets or .env files",
                        ctx.name
                    ),
                    "Embedding passwords and tokens directly in compose.yml checks them into source control. Use a .env file or Docker secrets instead.",
                )
                .with_fix(format!("Move the value to a `.env` file and reference it as `${{{key}}}`.")),
            );
        }
    }
    diagnostics
}
