use super::ids::IdSource;
use crate::state::{image_key, ContainerRecord, EngineEvent, EventKind, ImageRecord};
use crate::validators::dockerfile::split_image_ref;
use std::collections::BTreeMap;

pub(crate) fn event(
    ids: &mut dyn IdSource,
    kind: EventKind,
    payload: serde_json::Value,
    summary: impl Into<String>,
) -> EngineEvent {
    EngineEvent {
        id: ids.uuid(),
        kind,
        timestamp: ids.now(),
        payload,
        human_summary: summary.into(),
    }
}

/// Human-readable size with decimal units, as `docker images` prints it.
pub fn format_size(bytes: u64) -> String {
    let b = bytes as f64;
    if bytes >= 1_000_000_000 {
        format!("{:.2}GB", b / 1e9)
    } else if bytes >= 1_000_000 {
        format!("{:.1}MB", b / 1e6)
    } else {
        format!("{:.1}kB", b / 1e3)
    }
}

/// Left-align `s` in a column of `width`; longer text is kept whole.
pub fn pad(s: &str, width: usize) -> String {
    format!("{s:<width$}")
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// `repo[:tag]` split with the tag defaulting to `latest`.
pub fn split_reference(reference: &str) -> (String, String) {
    match split_image_ref(reference) {
        (repo, Some(tag)) if !tag.is_empty() => (repo.to_string(), tag.to_string()),
        (repo, _) => (repo.to_string(), "latest".to_string()),
    }
}

/// Find an image by `repo:tag`, falling back to `<ref>:latest`.
pub fn resolve_image<'a>(images: &'a BTreeMap<String, ImageRecord>, reference: &str) -> Option<&'a ImageRecord> {
    let (repo, tag) = split_reference(reference);
    images
        .get(&image_key(&repo, &tag))
        .or_else(|| images.get(reference))
}

/// Find a non-removed container by exact id, exact name, then id prefix.
pub fn resolve_container<'a>(
    containers: &'a BTreeMap<String, ContainerRecord>,
    reference: &str,
) -> Option<&'a ContainerRecord> {
    if reference.is_empty() {
        return None;
    }
    let candidates: Vec<&ContainerRecord> = containers.values().filter(|c| c.is_active()).collect();
    candidates
        .iter()
        .find(|c| c.id == reference)
        .or_else(|| candidates.iter().find(|c| c.name == reference))
        .or_else(|| candidates.iter().find(|c| c.id.starts_with(reference)))
        .copied()
}

/// Last `n` entries, or all of them when `n` is `None`.
pub fn tail<T: Clone>(lines: &[T], n: Option<usize>) -> Vec<T> {
    match n {
        Some(n) => lines[lines.len().saturating_sub(n)..].to_vec(),
        None => lines.to_vec(),
    }
}

/// Parse a `--tail` value: a count, or `all`. Anything else means no limit.
pub fn tail_count(value: Option<&str>) -> Option<usize> {
    value.filter(|v| *v != "all").and_then(|v| v.parse().ok())
}

const ADJECTIVES: &[&str] = &[
    "admiring", "agitated", "brave", "clever", "dreamy", "eager", "focused", "gallant", "happy",
    "jolly", "keen", "lucid", "nifty", "quirky", "serene", "upbeat", "vibrant", "zealous",
];

const SURNAMES: &[&str] = &[
    "babbage", "curie", "darwin", "einstein", "feynman", "galileo", "hopper", "kepler", "lovelace",
    "meitner", "newton", "noether", "pasteur", "ritchie", "shannon", "tesla", "turing", "wozniak",
];

/// `adjective_surname`, unique among active containers.
pub fn generate_name(ids: &mut dyn IdSource, containers: &BTreeMap<String, ContainerRecord>) -> String {
    let taken = |name: &str| containers.values().any(|c| c.is_active() && c.name == name);
    for _ in 0..8 {
        let name = format!("{}_{}", ids.pick(ADJECTIVES), ids.pick(SURNAMES));
        if !taken(&name) {
            return name;
        }
    }
    format!("{}_{}_{}", ids.pick(ADJECTIVES), ids.pick(SURNAMES), ids.hex(4))
}

/// Canned startup output for an image, chosen by what the image looks like.
pub fn startup_logs(ids: &mut dyn IdSource, image: &str) -> Vec<String> {
    let repo = split_image_ref(image).0;
    let base = repo.rsplit('/').next().unwrap_or(repo).to_lowercase();

    let is_database = ["postgres", "mysql", "mariadb", "mongo", "db"]
        .iter()
        .any(|family| base.contains(family));
    if is_database {
        return vec![
            format!("LOG:  database system was shut down at {}", ids.now().format("%Y-%m-%d %H:%M:%S UTC")),
            "LOG:  database system is ready to accept connections".to_string(),
        ];
    }
    if base.contains("redis") {
        return vec!["* Ready to accept connections".to_string()];
    }
    if ["nginx", "httpd", "web", "app"].iter().any(|family| base.contains(family)) {
        return vec!["/docker-entrypoint.sh: Configuration complete; ready for start up".to_string()];
    }
    vec!["service started".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ids::SequentialIds;
    use crate::state::ContainerStatus;
    use chrono::{DateTime, Utc};
    use test_case::test_case;

    fn container(id: &str, name: &str, status: ContainerStatus) -> ContainerRecord {
        ContainerRecord {
            id: id.to_string(),
            name: name.to_string(),
            image_id: "sha256:00".to_string(),
            status,
            ports: vec![],
            env: BTreeMap::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            started_at: None,
            stopped_at: None,
            logs: vec![],
            network_ids: vec![],
            volume_mounts: vec![],
        }
    }

    #[test_case(512, "0.5kB")]
    #[test_case(187_000_000, "187.0MB")]
    #[test_case(1_250_000_000, "1.25GB")]
    fn test_format_size(bytes: u64, expected: &str) {
        assert_eq!(format_size(bytes), expected);
    }

    #[test]
    fn test_pad_and_truncate() {
        assert_eq!(pad("ab", 4), "ab  ");
        assert_eq!(pad("abcdef", 4), "abcdef");
        assert_eq!(truncate("abcdef", 4), "abcd");
    }

    #[test_case("nginx", "nginx", "latest")]
    #[test_case("nginx:1.25", "nginx", "1.25")]
    #[test_case("localhost:5000/app", "localhost:5000/app", "latest")]
    fn test_split_reference(reference: &str, repo: &str, tag: &str) {
        assert_eq!(split_reference(reference), (repo.to_string(), tag.to_string()));
    }

    #[test]
    fn test_resolve_container_priority() {
        let mut containers = BTreeMap::new();
        containers.insert("abc123".to_string(), container("abc123", "web", ContainerStatus::Running));
        containers.insert("def456".to_string(), container("def456", "abc", ContainerStatus::Running));
        containers.insert("fff000".to_string(), container("fff000", "old", ContainerStatus::Removed));

        assert_eq!(resolve_container(&containers, "abc123").map(|c| c.name.as_str()), Some("web"));
        // exact name beats id prefix
        assert_eq!(resolve_container(&containers, "abc").map(|c| c.id.as_str()), Some("def456"));
        assert_eq!(resolve_container(&containers, "def").map(|c| c.name.as_str()), Some("abc"));
        assert!(resolve_container(&containers, "old").is_none());
        assert!(resolve_container(&containers, "").is_none());
    }

    #[test]
    fn test_tail() {
        let lines = vec!["a", "b", "c"];
        assert_eq!(tail(&lines, Some(2)), vec!["b", "c"]);
        assert_eq!(tail(&lines, Some(10)), lines);
        assert_eq!(tail(&lines, None), lines);
        assert_eq!(tail_count(Some("all")), None);
        assert_eq!(tail_count(Some("5")), Some(5));
    }

    #[test_case("postgres:16", "LOG:  database system is ready to accept connections")]
    #[test_case("redis:7", "* Ready to accept connections")]
    #[test_case("nginx:1.25", "/docker-entrypoint.sh: Configuration complete; ready for start up")]
    #[test_case("busybox", "service started")]
    fn test_startup_logs(image: &str, last: &str) {
        let logs = startup_logs(&mut SequentialIds::new(), image);
        assert_eq!(logs.last().map(String::as_str), Some(last));
    }

    #[test]
    fn test_generate_name_avoids_taken_names() {
        let mut ids = SequentialIds::new();
        let name = generate_name(&mut ids, &BTreeMap::new());
        assert!(name.contains('_'));

        let mut containers = BTreeMap::new();
        containers.insert("a".to_string(), container("a", &name, ContainerStatus::Running));
        let mut replay = SequentialIds::new();
        assert_ne!(generate_name(&mut replay, &containers), name);
    }
}
