use super::util::{event, generate_name, pad, resolve_container, resolve_image, startup_logs, truncate};
use super::{Call, CommandResult};
use crate::state::{
    ContainerRecord, ContainerStatus, EngineEvent, EventKind, PortMapping, StateDelta, VolumeMount, VolumeRecord,
};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const BUILTIN_NETWORKS: &[&str] = &["bridge", "host", "none"];

pub(crate) fn no_such_container(reference: &str) -> String {
    format!("Error response from daemon: No such container: {reference}")
}

fn port_summary(ports: &[PortMapping]) -> String {
    ports
        .iter()
        .map(|p| format!("{}->{}", p.host_port, p.container_port))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn run(call: &mut Call) -> CommandResult {
    let cmd = call.cmd;
    let ctx = call.ctx;
    let Some(reference) = cmd.args.first() else {
        return CommandResult::failure(vec!["Usage: docker run [OPTIONS] IMAGE [COMMAND] [ARG...]".to_string()]);
    };

    let Some(image) = resolve_image(&ctx.images, reference) else {
        debug!(image = %reference, "image not found locally");
        return CommandResult::failure(vec![
            format!("Unable to find image '{reference}' locally"),
            format!("docker: Error response from daemon: pull access denied for {reference}, repository does not exist or may require 'docker login': denied: requested access to the resource is denied."),
            "See 'docker run --help'.".to_string(),
            String::new(),
            format!("Explain: Image {reference} does not exist locally. Try docker pull {reference} first."),
        ]);
    };

    let name = match cmd.value("name") {
        Some(name) => name.to_string(),
        None => generate_name(call.ids, &ctx.containers),
    };
    if ctx.active_containers().any(|c| c.name == name) {
        return CommandResult::failure(vec![
            format!("Error response from daemon: Conflict. The container name \"/{name}\" is already in use by container. You have to remove (or rename) that container to be able to reuse that name."),
            String::new(),
            format!("Explain: Container names must be unique. Remove the old one with docker rm {name} or pick another --name."),
        ]);
    }

    let mut ports: Vec<PortMapping> = Vec::new();
    for spec in cmd.values_of(&["p", "publish"]) {
        let Some(mapping) = PortMapping::parse(spec) else {
            return CommandResult::failure(vec![format!(
                "docker: invalid port specification: \"{spec}\". See 'docker run --help'."
            )]);
        };
        let taken = ctx.bound_ports.contains_key(&mapping.host_key())
            || ports.iter().any(|p| p.host_port == mapping.host_port);
        if taken {
            warn!(port = mapping.host_port, "host port already allocated");
            return CommandResult::failure(vec![
                format!("Error: failed to create endpoint on network bridge: Bind for 0.0.0.0:{} failed: port is already allocated.", mapping.host_port),
                String::new(),
                format!("Explain: Port {} is held by another running container. Stop it or choose another host port.", mapping.host_port),
            ]);
        }
        ports.push(mapping);
    }

    let mut networks = ctx.networks.clone();
    let mut network_ids = Vec::new();
    if let Some(network) = cmd.value_of(&["network", "net"]) {
        if !BUILTIN_NETWORKS.contains(&network) {
            let Some(record) = networks.values_mut().find(|n| n.name == network || n.id == network) else {
                return CommandResult::failure(vec![format!(
                    "docker: Error response from daemon: network {network} not found."
                )]);
            };
            network_ids.push(record.id.clone());
        }
    }

    let env: BTreeMap<String, String> = cmd
        .values_of(&["e", "env"])
        .into_iter()
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

    let mut volumes = ctx.volumes.clone();
    let mut mounts = Vec::new();
    for spec in cmd.values_of(&["v", "volume"]) {
        let (source, target) = match spec.split_once(':') {
            Some((source, rest)) => (source.to_string(), rest.split(':').next().unwrap_or(rest).to_string()),
            None => (call.ids.hex(12), spec.to_string()),
        };
        let is_bind = source.starts_with('.') || source.starts_with('/') || source.starts_with('~');
        let volume_id = if is_bind {
            source
        } else {
            volumes
                .entry(source.clone())
                .or_insert_with(|| VolumeRecord {
                    id: call.ids.hex(12),
                    mountpoint: format!("/var/lib/docker/volumes/{source}/_data"),
                    name: source.clone(),
                })
                .id
                .clone()
        };
        mounts.push(VolumeMount {
            volume_id,
            mount_path: target,
        });
    }

    let id = call.ids.container_id();
    let now = call.ids.now();
    let image_label = image.key();
    let container = ContainerRecord {
        id: id.clone(),
        name: name.clone(),
        image_id: image.id.clone(),
        status: ContainerStatus::Running,
        ports: ports.clone(),
        env,
        created_at: now,
        started_at: Some(now),
        stopped_at: None,
        logs: startup_logs(call.ids, &image_label),
        network_ids: network_ids.clone(),
        volume_mounts: mounts,
    };

    for net_id in &network_ids {
        if let Some(record) = networks.values_mut().find(|n| &n.id == net_id) {
            record.container_ids.push(id.clone());
        }
    }

    let mut bound_ports = ctx.bound_ports.clone();
    for p in &ports {
        bound_ports.insert(p.host_key(), id.clone());
    }

    let mut events = vec![event(
        call.ids,
        EventKind::ContainerCreated,
        json!({ "container": container }),
        format!("Created container {name} ({id})"),
    )];
    if !ports.is_empty() {
        events.push(event(
            call.ids,
            EventKind::PortBound,
            json!({ "ports": ports, "containerId": id }),
            format!("Bound ports {} for container {name}", port_summary(&ports)),
        ));
    }
    events.push(event(
        call.ids,
        EventKind::ContainerStarted,
        json!({ "containerId": id, "name": name }),
        format!("Started container {name}"),
    ));

    let detached = cmd.any_switch(&["d", "detach"]);
    let output = if detached {
        vec![id.clone()]
    } else {
        vec![
            format!("Attaching to {name}"),
            format!("{name}  | (simulated stdout from {image_label})"),
        ]
    };

    let mut containers = ctx.containers.clone();
    containers.insert(id, container);
    CommandResult {
        state_delta: StateDelta {
            containers: Some(containers),
            bound_ports: Some(bound_ports),
            networks: (networks != ctx.networks).then_some(networks),
            volumes: (volumes != ctx.volumes).then_some(volumes),
            ..StateDelta::default()
        },
        events,
        output_lines: output,
        succeeded: true,
    }
}

pub(crate) fn ps(call: &mut Call) -> CommandResult {
    let ctx = call.ctx;
    let show_all = call.cmd.any_switch(&["a", "all"]);
    let mut rows: Vec<&ContainerRecord> = ctx
        .active_containers()
        .filter(|c| show_all || c.is_running())
        .collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));

    if call.cmd.any_switch(&["q", "quiet"]) {
        return CommandResult::output(rows.iter().map(|c| c.id.clone()).collect());
    }

    let mut output = vec![format!(
        "{}{}{}{}{}{}NAMES",
        pad("CONTAINER ID", 14),
        pad("IMAGE", 20),
        pad("COMMAND", 12),
        pad("CREATED", 18),
        pad("STATUS", 12),
        pad("PORTS", 24)
    )];
    output.extend(rows.into_iter().map(|c| {
        let ports = c.ports.iter().map(PortMapping::to_string).collect::<Vec<_>>().join(", ");
        format!(
            "{}{}{}{}{}{}{}",
            pad(&truncate(&c.id, 12), 14),
            pad(&truncate(&ctx.image_label(&c.image_id), 18), 20),
            pad("\"...\"", 12),
            pad(&c.created_at.format("%Y-%m-%d %H:%M").to_string(), 18),
            pad(&c.status.to_string(), 12),
            pad(&truncate(&ports, 22), 24),
            c.name
        )
    }));
    CommandResult::output(output)
}

/// Working copies for commands that act on several containers in turn.
struct Batch {
    containers: BTreeMap<String, ContainerRecord>,
    bound_ports: BTreeMap<String, String>,
    events: Vec<EngineEvent>,
    output: Vec<String>,
    failed: bool,
}

impl Batch {
    fn new(call: &Call) -> Self {
        Self {
            containers: call.ctx.containers.clone(),
            bound_ports: call.ctx.bound_ports.clone(),
            events: Vec::new(),
            output: Vec::new(),
            failed: false,
        }
    }

    fn fail(&mut self, lines: impl IntoIterator<Item = String>) {
        self.output.extend(lines);
        self.failed = true;
    }

    fn release_ports(&mut self, container: &ContainerRecord) {
        for p in &container.ports {
            if self.bound_ports.get(&p.host_key()) == Some(&container.id) {
                self.bound_ports.remove(&p.host_key());
            }
        }
    }

    fn finish(self) -> CommandResult {
        let changed = !self.events.is_empty();
        CommandResult {
            state_delta: StateDelta {
                containers: changed.then_some(self.containers),
                bound_ports: changed.then_some(self.bound_ports),
                ..StateDelta::default()
            },
            events: self.events,
            output_lines: self.output,
            succeeded: !self.failed,
        }
    }
}

pub(crate) fn stop(call: &mut Call) -> CommandResult {
    if call.cmd.args.is_empty() {
        return CommandResult::failure(vec!["Usage: docker stop CONTAINER [CONTAINER...]".to_string()]);
    }
    let mut batch = Batch::new(call);

    for reference in &call.cmd.args {
        let Some(found) = resolve_container(&batch.containers, reference).cloned() else {
            batch.fail([no_such_container(reference)]);
            continue;
        };
        if !found.is_running() {
            batch.fail([
                format!("Error response from daemon: container {} is not running", found.name),
                "Explain: The container is already stopped.".to_string(),
            ]);
            continue;
        }

        batch.release_ports(&found);
        let mut stopped = found.clone();
        stopped.status = ContainerStatus::Stopped;
        stopped.stopped_at = Some(call.ids.now());
        batch.containers.insert(stopped.id.clone(), stopped);

        batch.events.push(event(
            call.ids,
            EventKind::ContainerStopped,
            json!({ "containerId": found.id, "name": found.name }),
            format!("Stopped container {}", found.name),
        ));
        if !found.ports.is_empty() {
            batch.events.push(event(
                call.ids,
                EventKind::PortReleased,
                json!({ "ports": found.ports, "containerId": found.id }),
                format!("Released ports {} for container {}", port_summary(&found.ports), found.name),
            ));
        }
        batch.output.push(found.name);
    }
    batch.finish()
}

pub(crate) fn start(call: &mut Call) -> CommandResult {
    if call.cmd.args.is_empty() {
        return CommandResult::failure(vec!["Usage: docker start CONTAINER [CONTAINER...]".to_string()]);
    }
    let mut batch = Batch::new(call);

    for reference in &call.cmd.args {
        let Some(found) = resolve_container(&batch.containers, reference).cloned() else {
            batch.fail([no_such_container(reference)]);
            continue;
        };
        if found.is_running() {
            batch.output.push(found.name);
            continue;
        }

        let conflict = found.ports.iter().find(|p| {
            batch
                .bound_ports
                .get(&p.host_key())
                .is_some_and(|owner| owner != &found.id)
        });
        if let Some(p) = conflict {
            batch.fail([
                format!("Error response from daemon: driver failed programming external connectivity on endpoint {}: Bind for 0.0.0.0:{} failed: port is already allocated.", found.name, p.host_port),
                format!("Explain: Port {} is held by another running container.", p.host_port),
            ]);
            continue;
        }

        for p in &found.ports {
            batch.bound_ports.insert(p.host_key(), found.id.clone());
        }
        let mut started = found.clone();
        started.status = ContainerStatus::Running;
        started.started_at = Some(call.ids.now());
        started.stopped_at = None;
        let label = call.ctx.image_label(&found.image_id);
        started.logs.extend(startup_logs(call.ids, &label));
        batch.containers.insert(started.id.clone(), started);

        if !found.ports.is_empty() {
            batch.events.push(event(
                call.ids,
                EventKind::PortBound,
                json!({ "ports": found.ports, "containerId": found.id }),
                format!("Bound ports {} for container {}", port_summary(&found.ports), found.name),
            ));
        }
        batch.events.push(event(
            call.ids,
            EventKind::ContainerStarted,
            json!({ "containerId": found.id, "name": found.name }),
            format!("Started container {}", found.name),
        ));
        batch.output.push(found.name);
    }
    batch.finish()
}

pub(crate) fn rm(call: &mut Call) -> CommandResult {
    if call.cmd.args.is_empty() {
        return CommandResult::failure(vec!["Usage: docker rm [OPTIONS] CONTAINER [CONTAINER...]".to_string()]);
    }
    let force = call.cmd.any_switch(&["f", "force"]);
    let mut batch = Batch::new(call);

    for reference in &call.cmd.args {
        let Some(found) = resolve_container(&batch.containers, reference).cloned() else {
            batch.fail([no_such_container(reference)]);
            continue;
        };
        if found.is_running() && !force {
            batch.fail([
                format!("Error response from daemon: You cannot remove a running container {}. Stop the container before attempting removal or force remove.", found.id),
                "Explain: Stop the container first with docker stop, or use docker rm -f.".to_string(),
            ]);
            continue;
        }

        let was_running = found.is_running();
        let mut removed = found.clone();
        removed.status = ContainerStatus::Removed;
        if was_running {
            batch.release_ports(&found);
            removed.stopped_at = Some(call.ids.now());
        }
        batch.containers.insert(removed.id.clone(), removed);

        if was_running && !found.ports.is_empty() {
            batch.events.push(event(
                call.ids,
                EventKind::PortReleased,
                json!({ "ports": found.ports, "containerId": found.id }),
                format!("Released ports {} for container {}", port_summary(&found.ports), found.name),
            ));
        }
        batch.events.push(event(
            call.ids,
            EventKind::ContainerRemoved,
            json!({ "containerId": found.id, "name": found.name }),
            format!("Removed container {}", found.name),
        ));
        batch.output.push(found.name);
    }
    batch.finish()
}
