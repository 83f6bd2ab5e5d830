use super::util::{event, format_size, pad, split_reference};
use super::{Call, CommandResult};
use crate::state::{image_key, EventKind, ImageRecord, StateDelta};
use crate::validators::dockerfile::parse_instructions;
use crate::validators::{partition, validate_dockerfile};
use crate::workspace;
use serde_json::json;
use tracing::{debug, warn};

pub(crate) fn pull(call: &mut Call) -> CommandResult {
    let Some(reference) = call.cmd.args.first() else {
        return CommandResult::failure(vec!["Usage: docker pull <image[:tag]>".to_string()]);
    };
    let (repo, tag) = split_reference(reference);
    let key = image_key(&repo, &tag);
    let explicit_tag = reference.len() > repo.len();

    let mut output = Vec::new();
    if !explicit_tag {
        output.push(format!("Using default tag: {tag}"));
    }
    output.push(format!("{tag}: Pulling from library/{repo}"));

    if let Some(existing) = call.ctx.images.get(&key) {
        debug!(image = %key, "image already present");
        output.push(format!("Digest: {}", existing.id));
        output.push(format!("Status: Image is up to date for {key}"));
        return CommandResult::output(output);
    }

    let layer_count = 2 + call.ids.below(2) as usize;
    let layers: Vec<String> = (0..layer_count).map(|_| call.ids.digest()).collect();
    let image = ImageRecord {
        id: call.ids.digest(),
        repository: repo.clone(),
        tag: tag.clone(),
        size: call.ids.size_between(10_000_000, 210_000_000),
        created_at: call.ids.now(),
        layers,
    };

    for layer in &image.layers {
        output.push(format!("{}: Pull complete", short_digest(layer)));
    }
    output.push(format!("Digest: {}", image.id));
    output.push(format!("Status: Downloaded newer image for {key}"));
    output.push(format!("docker.io/library/{key}"));

    let events = vec![
        event(
            call.ids,
            EventKind::ImagePullStarted,
            json!({ "repository": repo, "tag": tag }),
            format!("Started pulling image {key}"),
        ),
        event(
            call.ids,
            EventKind::ImagePullComplete,
            json!({ "image": image }),
            format!("Pulled image {key}"),
        ),
    ];

    let mut images = call.ctx.images.clone();
    images.insert(key, image);
    CommandResult {
        state_delta: StateDelta {
            images: Some(images),
            ..StateDelta::default()
        },
        events,
        output_lines: output,
        succeeded: true,
    }
}

fn short_digest(digest: &str) -> String {
    digest.strip_prefix("sha256:").unwrap_or(digest).chars().take(12).collect()
}

pub(crate) fn images(call: &mut Call) -> CommandResult {
    let filter = call.cmd.args.first().map(|r| split_image_filter(r));

    let mut rows: Vec<&ImageRecord> = call
        .ctx
        .images
        .values()
        .filter(|img| match &filter {
            Some((repo, tag)) => img.repository == *repo && tag.as_ref().map_or(true, |t| img.tag == *t),
            None => true,
        })
        .collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.key().cmp(&b.key())));

    let mut output = vec![format!(
        "{}{}{}{}SIZE",
        pad("REPOSITORY", 20),
        pad("TAG", 12),
        pad("IMAGE ID", 14),
        pad("CREATED", 22)
    )];
    output.extend(rows.into_iter().map(|img| {
        format!(
            "{}{}{}{}{}",
            pad(&img.repository, 20),
            pad(&img.tag, 12),
            pad(img.short_id(), 14),
            pad(&img.created_at.format("%Y-%m-%d %H:%M:%S").to_string(), 22),
            format_size(img.size)
        )
    }));
    CommandResult::output(output)
}

/// `repo` or `repo:tag` as given to `docker images`.
fn split_image_filter(reference: &str) -> (String, Option<String>) {
    match crate::validators::dockerfile::split_image_ref(reference) {
        (repo, Some(tag)) => (repo.to_string(), Some(tag.to_string())),
        (repo, None) => (repo.to_string(), None),
    }
}

/// Path of the Dockerfile a build reads: `-f` wins, else `<context>/Dockerfile`.
fn dockerfile_path(call: &Call) -> String {
    if let Some(file) = call.cmd.value_of(&["f", "file"]) {
        return workspace_relative(file);
    }
    let context = call.cmd.args.first().map(String::as_str).unwrap_or(".");
    match workspace_relative(context).as_str() {
        "" | "." => "Dockerfile".to_string(),
        dir => format!("{dir}/Dockerfile"),
    }
}

fn workspace_relative(path: &str) -> String {
    crate::validators::compose::normalize_path(path)
}

pub(crate) fn build(call: &mut Call) -> CommandResult {
    let tag_flag = call.cmd.value_of(&["t", "tag"]).unwrap_or("unnamed:latest");
    let (repo, tag) = split_reference(tag_flag);
    let key = image_key(&repo, &tag);

    let content = match call.files {
        Some(files) => {
            let path = dockerfile_path(call);
            match workspace::get(files, &path) {
                Some(file) => Some(file.content.as_str()),
                None => {
                    warn!(path = %path, "dockerfile missing from workspace");
                    return CommandResult::failure(vec![format!(
                        "ERROR: failed to solve: failed to read dockerfile: open {path}: no such file or directory"
                    )]);
                }
            }
        }
        None => None,
    };

    let mut output = Vec::new();
    let instructions = content.map(parse_instructions).unwrap_or_default();

    if let Some(content) = content {
        let diagnostics = validate_dockerfile(content);
        let (errors, warnings) = partition(&diagnostics);
        output.extend(warnings.iter().map(|w| format!("WARNING: [{}] {}", w.rule_id, w.message)));

        if !errors.is_empty() {
            warn!(tag = %key, errors = errors.len(), "dockerfile validation failed");
            for (i, e) in errors.iter().enumerate() {
                output.push(format!("#{} ERROR [{}] {}", i + 1, e.rule_id, e.message));
                output.push(format!("    line {}: {}", e.line, e.explanation));
            }
            output.push(String::new());
            output.push("failed to solve: Dockerfile validation failed.".to_string());

            let failed = event(
                call.ids,
                EventKind::BuildFailed,
                json!({ "tag": key, "errors": errors }),
                format!("Build failed for {key}"),
            );
            return CommandResult {
                events: vec![failed],
                ..CommandResult::failure(output)
            };
        }
        if !warnings.is_empty() {
            output.push(String::new());
        }
    }

    let total = instructions.len();
    for (i, inst) in instructions.iter().enumerate() {
        output.push(format!("Step {}/{total} : {} {}", i + 1, inst.keyword, inst.rest));
        if inst.keyword == "RUN" {
            output.push(format!(" ---> Running in {}", call.ids.hex(12)));
        }
        output.push(format!(" ---> {}", call.ids.hex(12)));
    }

    let layer_count = instructions
        .iter()
        .filter(|i| matches!(i.keyword.as_str(), "RUN" | "COPY" | "ADD"))
        .count()
        .max(1);
    let image = ImageRecord {
        id: call.ids.digest(),
        repository: repo,
        tag,
        size: call.ids.size_between(20_000_000, 170_000_000),
        created_at: call.ids.now(),
        layers: (0..layer_count).map(|_| call.ids.digest()).collect(),
    };
    output.push(format!("Successfully built {}", image.short_id()));
    output.push(format!("Successfully tagged {key}"));

    let events = vec![
        event(
            call.ids,
            EventKind::BuildStep,
            json!({ "tag": key, "steps": total }),
            format!("Build step executed for {key}"),
        ),
        event(
            call.ids,
            EventKind::BuildComplete,
            json!({ "image": image }),
            format!("Built image {key} successfully"),
        ),
    ];

    let mut images = call.ctx.images.clone();
    images.insert(key, image);
    CommandResult {
        state_delta: StateDelta {
            images: Some(images),
            ..StateDelta::default()
        },
        events,
        output_lines: output,
        succeeded: true,
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testing::*;
    use crate::state::{EngineContext, EventKind};

    const DOCKERFILE: &str = "FROM node:18-alpine\nWORKDIR /app\nCOPY package.json .\nRUN npm install\nEXPOSE 3000\nCMD [\"node\", \"index.js\"]\n";

    #[test]
    fn test_pull_scenario() {
        let result = eval(&EngineContext::default(), "docker pull nginx");
        assert!(result.succeeded);
        let images = result.state_delta.images.as_ref().unwrap();
        assert!(images.contains_key("nginx:latest"));
        assert!(result
            .output_lines
            .iter()
            .any(|l| l.contains("Downloaded newer image for nginx:latest")));
        let kinds: Vec<_> = result.events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::ImagePullStarted, EventKind::ImagePullComplete]);
    }

    #[test]
    fn test_pull_is_idempotent() {
        let mut sim = Sim::new(EngineContext::default());
        sim.run("docker pull redis:7");
        let first_id = sim.ctx.images["redis:7"].id.clone();

        let again = sim.run("docker pull redis:7");
        assert!(again.events.is_empty());
        assert!(again.state_delta.is_empty());
        assert_eq!(sim.ctx.images["redis:7"].id, first_id);
        assert!(again.output_lines.iter().any(|l| l == "Status: Image is up to date for redis:7"));
        assert!(!again.output_lines.iter().any(|l| l.starts_with("Using default tag")));
    }

    #[test]
    fn test_pull_layers_and_size() {
        let result = eval(&EngineContext::default(), "docker pull alpine:3.19");
        let img = &result.state_delta.images.unwrap()["alpine:3.19"];
        assert!((2..=3).contains(&img.layers.len()));
        assert!((10_000_000..210_000_000).contains(&img.size));
        assert_eq!(img.repository, "alpine");
        assert_eq!(img.tag, "3.19");
    }

    #[test]
    fn test_pull_usage() {
        let result = eval(&EngineContext::default(), "docker pull");
        assert_eq!(result.output_lines, vec!["Usage: docker pull <image[:tag]>"]);
        assert!(!result.succeeded);
    }

    #[test]
    fn test_images_table_newest_first() {
        let mut sim = Sim::new(EngineContext::default());
        sim.run("docker pull nginx");
        sim.run("docker pull redis:7");
        let result = sim.run("docker images");
        assert!(result.output_lines[0].starts_with("REPOSITORY          TAG         IMAGE ID"));
        assert!(result.output_lines[1].starts_with("redis"));
        assert!(result.output_lines[2].starts_with("nginx"));
        assert!(result.output_lines[1].ends_with("MB"));
        assert!(result.events.is_empty());
        assert!(result.state_delta.is_empty());
    }

    #[test]
    fn test_images_filter_by_repository() {
        let ctx = with_images(&["nginx:1.25", "nginx:latest", "redis:7"]);
        let result = eval(&ctx, "docker images nginx");
        assert_eq!(result.output_lines.len(), 3);
    }

    #[test]
    fn test_build_from_workspace() {
        let mut sim = Sim::new(EngineContext::default()).with_files(&[("Dockerfile", DOCKERFILE)]);
        let result = sim.run("docker build -t myapp:1.0 .");
        assert!(result.succeeded, "{:?}", result.output_lines);
        assert!(result.output_lines.contains(&"Step 1/6 : FROM node:18-alpine".to_string()));
        assert_eq!(result.output_lines.last().map(String::as_str), Some("Successfully tagged myapp:1.0"));
        let kinds: Vec<_> = result.events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::BuildStep, EventKind::BuildComplete]);
        assert!(sim.ctx.images.contains_key("myapp:1.0"));
    }

    #[test]
    fn test_build_default_tag_without_workspace() {
        let result = eval(&EngineContext::default(), "docker build .");
        assert!(result.succeeded);
        assert!(result.state_delta.images.unwrap().contains_key("unnamed:latest"));
    }

    #[test]
    fn test_build_fails_on_dockerfile_errors() {
        let mut sim = Sim::new(EngineContext::default()).with_files(&[("Dockerfile", "FROM node\nCOPPY . /app\n")]);
        let result = sim.run("docker build -t broken .");
        assert!(!result.succeeded);
        assert!(result.state_delta.is_empty());
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].kind, EventKind::BuildFailed);
        assert_eq!(result.events[0].payload["tag"], "broken:latest");
        assert_eq!(result.events[0].payload["errors"][0]["ruleId"], "DF-E-003");

        assert_eq!(result.output_lines[0], "WARNING: [DF-W-001] Avoid using :latest; pin a specific version for reproducibility");
        assert_eq!(result.output_lines[1], "#1 ERROR [DF-E-003] Unknown instruction: COPPY");
        assert!(result.output_lines[2].starts_with("    line 2: "));
        assert_eq!(result.output_lines.last().map(String::as_str), Some("failed to solve: Dockerfile validation failed."));
        assert!(sim.ctx.images.is_empty());
    }

    #[test]
    fn test_build_reads_file_flag_and_context_dir() {
        let mut sim = Sim::new(EngineContext::default())
            .with_files(&[("api/Dockerfile", DOCKERFILE), ("Dockerfile.dev", DOCKERFILE)]);
        assert!(sim.run("docker build -t api ./api").succeeded);
        assert!(sim.run("docker build -t dev -f Dockerfile.dev .").succeeded);

        let missing = sim.run("docker build -t x .");
        assert!(!missing.succeeded);
        assert!(missing.events.is_empty());
        assert_eq!(
            missing.output_lines,
            vec!["ERROR: failed to solve: failed to read dockerfile: open Dockerfile: no such file or directory"]
        );
    }

    #[test]
    fn test_rebuild_supersedes_image() {
        let mut sim = Sim::new(EngineContext::default()).with_files(&[("Dockerfile", DOCKERFILE)]);
        sim.run("docker build -t app .");
        let first = sim.ctx.images["app:latest"].id.clone();
        sim.run("docker build -t app .");
        assert_ne!(sim.ctx.images["app:latest"].id, first);
        assert_eq!(sim.ctx.images.len(), 1);
    }
}
