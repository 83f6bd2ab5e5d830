use super::util::{event, pad, resolve_image, startup_logs, tail, tail_count, truncate};
use super::{Call, CommandResult};
use crate::state::{
    ComposeStack, ContainerRecord, ContainerStatus, EventKind, ImageRecord, NetworkDriver, NetworkRecord,
    PortMapping, StateDelta, VolumeMount, VolumeRecord, DEFAULT_STACK,
};
use crate::validators::compose::{build_context, depends_on, environment, service_networks, validate_compose};
use crate::validators::yaml::{parse_yaml, Mapping, Yaml};
use crate::validators::partition;
use crate::workspace;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

const NO_SERVICES: &str = "no compose services running";

/// The parts of a service definition the engine acts on.
#[derive(Debug)]
struct Service {
    name: String,
    image: Option<String>,
    build: Option<String>,
    ports: Vec<String>,
    environment: Vec<(String, String)>,
    depends_on: Vec<String>,
    networks: Vec<String>,
    volumes: Vec<String>,
}

impl Service {
    fn from_yaml(name: &str, svc: &Mapping) -> Self {
        let strings = |key: &str| -> Vec<String> {
            svc.get(key)
                .and_then(Yaml::as_seq)
                .map(|items| items.iter().filter_map(Yaml::as_text).collect())
                .unwrap_or_default()
        };
        let build = svc
            .get("build")
            .filter(|b| b.is_set())
            .map(|_| build_context(svc).unwrap_or_else(|| ".".to_string()));
        Self {
            name: name.to_string(),
            image: svc.get("image").and_then(Yaml::as_text),
            build,
            ports: strings("ports"),
            environment: environment(svc),
            depends_on: depends_on(svc),
            networks: service_networks(svc),
            volumes: strings("volumes"),
        }
    }

    /// The local image this service runs, or the line explaining why there is none.
    fn resolve<'a>(&self, images: &'a BTreeMap<String, ImageRecord>) -> Result<&'a ImageRecord, String> {
        let name = &self.name;
        match (&self.image, &self.build) {
            (Some(image), _) => resolve_image(images, image).ok_or_else(|| {
                format!("  Service '{name}': image '{image}' not found locally. Run 'docker pull {image}' first.")
            }),
            (None, Some(context)) => resolve_image(images, name).ok_or_else(|| {
                format!("  Service '{name}': no built image found for build context '{context}'. Run 'docker build -t {name} {context}' first.")
            }),
            (None, None) => Err(format!("  Service '{name}': no image or build specified")),
        }
    }
}

fn scoped(name: &str) -> String {
    format!("{DEFAULT_STACK}_{name}")
}

/// Services in dependency order: depth-first over `depends_on`, declaration
/// order among siblings. `None` on a cycle.
fn dependency_order(services: &[Service]) -> Option<Vec<String>> {
    fn visit<'a>(
        name: &'a str,
        services: &'a [Service],
        visiting: &mut BTreeSet<&'a str>,
        done: &mut BTreeSet<&'a str>,
        order: &mut Vec<String>,
    ) -> bool {
        if done.contains(name) {
            return true;
        }
        if !visiting.insert(name) {
            return false;
        }
        let Some(svc) = services.iter().find(|s| s.name == name) else {
            return true;
        };
        for dep in &svc.depends_on {
            if services.iter().any(|s| &s.name == dep) && !visit(dep, services, visiting, done, order) {
                return false;
            }
        }
        visiting.remove(name);
        done.insert(name);
        order.push(name.to_string());
        true
    }

    let mut visiting = BTreeSet::new();
    let mut done = BTreeSet::new();
    let mut order = Vec::new();
    for svc in services {
        if !visit(&svc.name, services, &mut visiting, &mut done, &mut order) {
            return None;
        }
    }
    Some(order)
}

/// Compose file to use: `-f` if given, otherwise the first configured name present.
fn compose_file<'a>(call: &Call<'a>) -> Result<(String, &'a str), String> {
    let files = call.files;
    if let Some(path) = call.cmd.value_of(&["f", "file"]) {
        return files
            .and_then(|f| workspace::get(f, path))
            .map(|file| (file.path.clone(), file.content.as_str()))
            .ok_or_else(|| format!("open {path}: no such file or directory"));
    }
    files
        .and_then(|f| call.compose_files.iter().find_map(|name| workspace::get(f, name)))
        .map(|file| (file.path.clone(), file.content.as_str()))
        .ok_or_else(|| "validating compose file: no compose.yml found in workspace".to_string())
}

fn network_driver(definition: Option<&Yaml>) -> NetworkDriver {
    match definition.and_then(Yaml::as_map).and_then(|m| m.get("driver")).and_then(Yaml::as_str) {
        Some("overlay") => NetworkDriver::Overlay,
        Some("host") => NetworkDriver::Host,
        Some("none") => NetworkDriver::None,
        _ => NetworkDriver::Bridge,
    }
}

pub(crate) fn up(call: &mut Call) -> CommandResult {
    let ctx = call.ctx;
    let detached = call.cmd.any_switch(&["d", "detach"]);

    let (path, content) = match compose_file(call) {
        Ok(found) => found,
        Err(line) => return CommandResult::failure(vec![line]),
    };
    let workspace_paths = call.files.map(workspace::paths).unwrap_or_default();
    let diagnostics = validate_compose(content, &workspace_paths);
    let (errors, warnings) = partition(&diagnostics);

    let mut output: Vec<String> = warnings
        .iter()
        .map(|w| format!("WARNING: [{}] {}", w.rule_id, w.message))
        .collect();
    if !warnings.is_empty() {
        output.push(String::new());
    }
    if !errors.is_empty() {
        warn!(file = %path, errors = errors.len(), "compose validation failed");
        output.push("validating compose file: compose validation failed.".to_string());
        output.extend(errors.iter().map(|e| format!("  Error [{}]: {}", e.rule_id, e.message)));
        let failed = event(
            call.ids,
            EventKind::ComposeFailed,
            json!({ "file": path, "errors": errors }),
            "Compose validation failed",
        );
        return CommandResult {
            events: vec![failed],
            ..CommandResult::failure(output)
        };
    }

    let doc = parse_yaml(content).unwrap_or_default();
    let services: Vec<Service> = doc
        .get("services")
        .and_then(Yaml::as_map)
        .map(|map| {
            map.iter()
                .filter_map(|(name, value)| value.as_map().map(|svc| Service::from_yaml(name, svc)))
                .collect()
        })
        .unwrap_or_default();
    if services.is_empty() {
        return CommandResult::failure(vec!["validating compose file: no services defined".to_string()]);
    }

    let mut images = BTreeMap::new();
    let mut missing = Vec::new();
    for svc in &services {
        match svc.resolve(&ctx.images) {
            Ok(image) => {
                images.insert(svc.name.as_str(), image);
            }
            Err(line) => missing.push(line),
        }
    }
    if !missing.is_empty() {
        debug!(missing = missing.len(), "compose images missing");
        output.push("validating compose file: compose validation failed.".to_string());
        output.extend(missing);
        return CommandResult::failure(output);
    }

    let Some(order) = dependency_order(&services) else {
        return CommandResult::failure(vec!["error: circular dependency detected in depends_on".to_string()]);
    };

    let mut containers = ctx.containers.clone();
    let mut bound_ports = ctx.bound_ports.clone();
    let mut networks = ctx.networks.clone();
    let mut volumes = ctx.volumes.clone();
    let mut tracked = ctx.stack().map(|s| s.container_ids.clone()).unwrap_or_default();
    let mut lines = Vec::new();
    let mut events = Vec::new();
    let mut failed = false;

    let top_networks = doc.get("networks").and_then(Yaml::as_map);
    let declared_networks = std::iter::once(("default", None))
        .chain(top_networks.into_iter().flat_map(|m| m.iter().map(|(k, v)| (k, Some(v)))));
    for (name, definition) in declared_networks {
        let scoped_name = scoped(name);
        if !networks.contains_key(&scoped_name) {
            networks.insert(
                scoped_name.clone(),
                NetworkRecord {
                    id: call.ids.hex(12),
                    name: scoped_name.clone(),
                    driver: network_driver(definition),
                    container_ids: Vec::new(),
                },
            );
            lines.push(format!(" ✔ Network {scoped_name}  Created"));
        }
    }
    for name in doc.get("volumes").and_then(Yaml::as_map).into_iter().flat_map(Mapping::keys) {
        let scoped_name = scoped(name);
        if !volumes.contains_key(&scoped_name) {
            volumes.insert(
                scoped_name.clone(),
                VolumeRecord {
                    id: call.ids.hex(12),
                    mountpoint: format!("/var/lib/docker/volumes/{scoped_name}/_data"),
                    name: scoped_name.clone(),
                },
            );
            lines.push(format!(" ✔ Volume {scoped_name}  Created"));
        }
    }

    for name in &order {
        let Some(svc) = services.iter().find(|s| &s.name == name) else {
            continue;
        };
        let image = images[name.as_str()];
        let existing = tracked
            .get(name)
            .and_then(|id| containers.get(id))
            .filter(|c| c.is_active())
            .cloned();

        if let Some(c) = existing {
            if c.is_running() {
                lines.push(format!(" ✔ Container {name}  Running"));
                continue;
            }
            let conflict = c
                .ports
                .iter()
                .find(|p| bound_ports.get(&p.host_key()).is_some_and(|owner| owner != &c.id));
            if let Some(p) = conflict {
                failed = true;
                lines.push(format!(" ✗ Container {name}  Error"));
                lines.push(format!("Error: Bind for 0.0.0.0:{} failed: port is already allocated", p.host_port));
                continue;
            }
            for p in &c.ports {
                bound_ports.insert(p.host_key(), c.id.clone());
            }
            let mut restarted = c.clone();
            restarted.status = ContainerStatus::Running;
            restarted.started_at = Some(call.ids.now());
            restarted.stopped_at = None;
            restarted.logs.extend(startup_logs(call.ids, &image.key()));
            containers.insert(c.id.clone(), restarted);
            events.push(event(
                call.ids,
                EventKind::ComposeServiceStarted,
                json!({ "service": name, "containerId": c.id, "imageKey": image.key() }),
                format!("Compose service '{name}' started (image: {})", image.key()),
            ));
            lines.push(format!(" ✔ Container {name}  Started"));
            continue;
        }

        if containers.values().any(|c| c.is_active() && &c.name == name) {
            failed = true;
            lines.push(format!(" ✗ Container {name}  Error"));
            lines.push(format!(
                "Error response from daemon: Conflict. The container name \"/{name}\" is already in use by container."
            ));
            continue;
        }

        let mut ports: Vec<PortMapping> = Vec::new();
        let mut conflict = None;
        for spec in &svc.ports {
            let Some(mapping) = PortMapping::parse(spec) else {
                warn!(service = %name, port = %spec, "port entry without a host binding skipped");
                continue;
            };
            let taken = bound_ports.contains_key(&mapping.host_key())
                || ports.iter().any(|p| p.host_port == mapping.host_port);
            if taken {
                conflict = Some(mapping.host_port);
                break;
            }
            ports.push(mapping);
        }
        if let Some(port) = conflict {
            warn!(service = %name, port, "compose service port already allocated");
            failed = true;
            lines.push(format!(" ✗ Container {name}  Error"));
            lines.push(format!("Error: Bind for 0.0.0.0:{port} failed: port is already allocated"));
            continue;
        }

        let id = call.ids.container_id();
        let now = call.ids.now();
        for p in &ports {
            bound_ports.insert(p.host_key(), id.clone());
        }

        let joined: Vec<String> = if svc.networks.is_empty() {
            vec![scoped("default")]
        } else {
            svc.networks.iter().map(|n| scoped(n)).collect()
        };
        let mut network_ids = Vec::new();
        for net in joined {
            if let Some(record) = networks.get_mut(&net) {
                record.container_ids.push(id.clone());
                network_ids.push(record.id.clone());
            }
        }

        let volume_mounts = svc
            .volumes
            .iter()
            .filter_map(|spec| {
                let (source, rest) = spec.split_once(':')?;
                let target = rest.split(':').next().unwrap_or(rest);
                let is_bind = source.starts_with('.') || source.starts_with('/') || source.starts_with('~');
                let volume_id = if is_bind {
                    source.to_string()
                } else {
                    volumes.get(&scoped(source))?.id.clone()
                };
                Some(VolumeMount {
                    volume_id,
                    mount_path: target.to_string(),
                })
            })
            .collect();

        let container = ContainerRecord {
            id: id.clone(),
            name: name.clone(),
            image_id: image.id.clone(),
            status: ContainerStatus::Running,
            ports,
            env: svc.environment.iter().cloned().collect(),
            created_at: now,
            started_at: Some(now),
            stopped_at: None,
            logs: startup_logs(call.ids, &image.key()),
            network_ids,
            volume_mounts,
        };
        containers.insert(id.clone(), container);
        tracked.insert(name.clone(), id.clone());

        events.push(event(
            call.ids,
            EventKind::ComposeServiceStarted,
            json!({ "service": name, "containerId": id, "imageKey": image.key() }),
            format!("Compose service '{name}' started (image: {})", image.key()),
        ));
        lines.push(format!(" ✔ Container {name}  Created"));
        if detached {
            lines.push(format!(" ✔ Container {name}  Started"));
        }
    }

    let running: Vec<&ContainerRecord> = order
        .iter()
        .filter_map(|name| tracked.get(name).and_then(|id| containers.get(id)))
        .filter(|c| c.is_running())
        .collect();
    output.push(format!("[+] Running {}/{}", running.len(), order.len()));
    output.extend(lines);
    if !detached {
        output.push(String::new());
        output.push(format!(
            "Attaching to {}",
            running.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
        ));
        for c in &running {
            output.extend(c.logs.iter().map(|line| format!("{}  | {line}", c.name)));
        }
    }

    let mut stacks = ctx.compose_stacks.clone();
    stacks.insert(
        DEFAULT_STACK.to_string(),
        ComposeStack {
            name: DEFAULT_STACK.to_string(),
            service_names: order,
            container_ids: tracked,
        },
    );

    CommandResult {
        state_delta: StateDelta {
            containers: (containers != ctx.containers).then_some(containers),
            bound_ports: (bound_ports != ctx.bound_ports).then_some(bound_ports),
            networks: (networks != ctx.networks).then_some(networks),
            volumes: (volumes != ctx.volumes).then_some(volumes),
            compose_stacks: (stacks != ctx.compose_stacks).then_some(stacks),
            ..StateDelta::default()
        },
        events,
        output_lines: output,
        succeeded: !failed,
    }
}

pub(crate) fn down(call: &mut Call) -> CommandResult {
    let ctx = call.ctx;
    let Some(stack) = ctx.stack() else {
        return CommandResult::output(vec!["no compose stack running".to_string()]);
    };

    let mut containers = ctx.containers.clone();
    let mut bound_ports = ctx.bound_ports.clone();
    let mut events = Vec::new();
    let mut output = Vec::new();

    let mut order: Vec<&String> = stack.service_names.iter().collect();
    order.extend(stack.container_ids.keys().filter(|svc| !stack.service_names.contains(svc)));

    for service in order.into_iter().rev() {
        let Some(c) = stack
            .container_ids
            .get(service)
            .and_then(|id| containers.get(id))
            .filter(|c| c.is_active())
            .cloned()
        else {
            continue;
        };

        for p in &c.ports {
            if bound_ports.get(&p.host_key()) == Some(&c.id) {
                bound_ports.remove(&p.host_key());
            }
        }
        let mut removed = c.clone();
        removed.status = ContainerStatus::Removed;
        if c.is_running() {
            removed.stopped_at = Some(call.ids.now());
            output.push(format!(" ✔ Container {}  Stopped", c.name));
        }
        containers.insert(c.id.clone(), removed);
        output.push(format!(" ✔ Container {}  Removed", c.name));
        events.push(event(
            call.ids,
            EventKind::ComposeServiceStopped,
            json!({ "service": service, "containerId": c.id }),
            format!("Compose service '{service}' stopped and removed"),
        ));
    }

    let prefix = format!("{}_", stack.name);
    let mut networks = ctx.networks.clone();
    networks.retain(|name, _| {
        let owned = name.starts_with(&prefix);
        if owned {
            output.push(format!(" ✔ Network {name}  Removed"));
        }
        !owned
    });

    let mut stacks = ctx.compose_stacks.clone();
    stacks.remove(&stack.name);
    if output.is_empty() {
        output.push("no compose stack running".to_string());
    }

    CommandResult {
        state_delta: StateDelta {
            containers: Some(containers),
            bound_ports: Some(bound_ports),
            networks: (networks != ctx.networks).then_some(networks),
            compose_stacks: Some(stacks),
            ..StateDelta::default()
        },
        events,
        output_lines: output,
        succeeded: true,
    }
}

/// Non-removed stack containers with their service names, in stack order.
fn stack_containers<'a>(call: &Call<'a>) -> Vec<(&'a str, &'a ContainerRecord)> {
    let ctx = call.ctx;
    let Some(stack) = ctx.stack() else {
        return Vec::new();
    };
    stack
        .service_names
        .iter()
        .filter_map(|svc| {
            let c = stack.container_ids.get(svc).and_then(|id| ctx.containers.get(id))?;
            c.is_active().then_some((svc.as_str(), c))
        })
        .collect()
}

pub(crate) fn ps(call: &mut Call) -> CommandResult {
    let managed = stack_containers(call);
    if managed.is_empty() {
        return CommandResult::output(vec![NO_SERVICES.to_string()]);
    }

    let mut output = vec![format!(
        "{}{}{}{}PORTS",
        pad("NAME", 22),
        pad("IMAGE", 20),
        pad("SERVICE", 16),
        pad("STATUS", 12)
    )];
    output.extend(managed.into_iter().map(|(service, c)| {
        let status = if c.is_running() { "Up".to_string() } else { c.status.to_string() };
        let ports = c.ports.iter().map(PortMapping::to_string).collect::<Vec<_>>().join(", ");
        format!(
            "{}{}{}{}{ports}",
            pad(&c.name, 22),
            pad(&truncate(&call.ctx.image_label(&c.image_id), 18), 20),
            pad(service, 16),
            pad(&status, 12)
        )
    }));
    CommandResult::output(output)
}

pub(crate) fn logs(call: &mut Call) -> CommandResult {
    let managed = stack_containers(call);
    if managed.is_empty() {
        return CommandResult::output(vec![NO_SERVICES.to_string()]);
    }

    let wanted = &call.cmd.args;
    if let Some(unknown) = wanted.iter().find(|w| !managed.iter().any(|(svc, _)| svc == w)) {
        return CommandResult::failure(vec![format!("no such service: {unknown}")]);
    }

    let count = tail_count(call.cmd.value_of(&["tail", "n"]));
    let mut output = Vec::new();
    for (service, c) in managed {
        if !wanted.is_empty() && !wanted.iter().any(|w| w == service) {
            continue;
        }
        let stored = if c.logs.is_empty() {
            vec!["(no log output)".to_string()]
        } else {
            c.logs.clone()
        };
        output.extend(tail(&stored, count).into_iter().map(|line| format!("{service}  | {line}")));
    }
    CommandResult::output(output)
}
