//! The simulated engine's state: images, containers, networks, volumes,
//! compose stacks, the event log and the bound-port index.
//!
//! Everything here is plain data that serializes to nested maps and lists,
//! so a whole [`EngineContext`] can be snapshotted and restored.

use crate::parser::ParsedCommand;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the single compose stack the simulator manages.
pub const DEFAULT_STACK: &str = "default";

/// `repository:tag` lookup key for an image.
pub fn image_key(repository: &str, tag: &str) -> String {
    format!("{repository}:{tag}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Content digest, `sha256:<hex>`
    pub id: String,
    pub repository: String,
    pub tag: String,
    /// Size in bytes
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub layers: Vec<String>,
}

impl ImageRecord {
    pub fn key(&self) -> String {
        image_key(&self.repository, &self.tag)
    }

    /// First 12 hex digits of the digest, as `docker images` shows it.
    pub fn short_id(&self) -> &str {
        let hex = self.id.strip_prefix("sha256:").unwrap_or(&self.id);
        let end = hex.char_indices().nth(12).map_or(hex.len(), |(i, _)| i);
        &hex[..end]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

impl PortMapping {
    /// Parse `host:container[/proto]`, optionally prefixed by a bind address.
    pub fn parse(spec: &str) -> Option<Self> {
        let (ports, protocol) = match spec.rsplit_once('/') {
            Some((ports, "udp")) => (ports, Protocol::Udp),
            Some((ports, "tcp")) => (ports, Protocol::Tcp),
            Some(_) => return None,
            None => (spec, Protocol::Tcp),
        };
        let parts: Vec<&str> = ports.split(':').collect();
        let (host, container) = match parts.as_slice() {
            [host, container] | [_, host, container] => (*host, *container),
            _ => return None,
        };
        Some(Self {
            host_port: host.parse().ok()?,
            container_port: container.parse().ok()?,
            protocol,
        })
    }

    /// Key of this mapping in the bound-port index.
    pub fn host_key(&self) -> String {
        self.host_port.to_string()
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0.0.0.0:{}->{}/{}", self.host_port, self.container_port, self.protocol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Named volume id, or the host path of a bind mount
    pub volume_id: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Stopped,
    Removed,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::Removed => "removed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    /// 12 hex digits
    pub id: String,
    pub name: String,
    /// Digest of the image the container runs
    pub image_id: String,
    pub status: ContainerStatus,
    pub ports: Vec<PortMapping>,
    pub env: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub logs: Vec<String>,
    pub network_ids: Vec<String>,
    pub volume_mounts: Vec<VolumeMount>,
}

impl ContainerRecord {
    /// Anything but `removed`.
    pub fn is_active(&self) -> bool {
        self.status != ContainerStatus::Removed
    }

    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkDriver {
    #[default]
    Bridge,
    Overlay,
    Host,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    pub id: String,
    pub name: String,
    pub driver: NetworkDriver,
    pub container_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeRecord {
    pub id: String,
    pub name: String,
    pub mountpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeStack {
    pub name: String,
    /// Services in dependency order
    pub service_names: Vec<String>,
    /// Service name -> container id
    pub container_ids: BTreeMap<String, String>,
}

impl ComposeStack {
    /// Service a container belongs to, if the stack tracks it.
    pub fn service_of(&self, container_id: &str) -> Option<&str> {
        self.container_ids
            .iter()
            .find(|(_, id)| id.as_str() == container_id)
            .map(|(svc, _)| svc.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    ImagePullStarted,
    ImagePullComplete,
    BuildStep,
    BuildComplete,
    BuildFailed,
    ContainerCreated,
    ContainerStarted,
    ContainerStopped,
    ContainerRemoved,
    PortBound,
    PortReleased,
    ExecCommandRun,
    ComposeServiceStarted,
    ComposeServiceStopped,
    ComposeFailed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&s)
    }
}

/// One entry of the append-only audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub human_summary: String,
}

/// Aggregate state threaded through every command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineContext {
    /// Keyed by `repository:tag`
    pub images: BTreeMap<String, ImageRecord>,
    /// Keyed by container id
    pub containers: BTreeMap<String, ContainerRecord>,
    pub networks: BTreeMap<String, NetworkRecord>,
    pub volumes: BTreeMap<String, VolumeRecord>,
    pub compose_stacks: BTreeMap<String, ComposeStack>,
    pub event_log: Vec<EngineEvent>,
    /// Host port -> owning container id
    pub bound_ports: BTreeMap<String, String>,
    pub pending_command: Option<ParsedCommand>,
    pub last_error: Option<String>,
}

impl EngineContext {
    pub fn active_containers(&self) -> impl Iterator<Item = &ContainerRecord> {
        self.containers.values().filter(|c| c.is_active())
    }

    /// Image whose digest matches a container's `image_id`.
    pub fn image_by_id(&self, id: &str) -> Option<&ImageRecord> {
        self.images.values().find(|img| img.id == id)
    }

    /// `repository:tag` for display, or a shortened digest when the image is gone.
    pub fn image_label(&self, id: &str) -> String {
        match self.image_by_id(id) {
            Some(img) => img.key(),
            None => {
                let hex = id.strip_prefix("sha256:").unwrap_or(id);
                hex.chars().take(12).collect()
            }
        }
    }

    pub fn stack(&self) -> Option<&ComposeStack> {
        self.compose_stacks.get(DEFAULT_STACK)
    }

    /// Merge a delta: each top-level key present replaces the current one.
    pub fn apply(&mut self, delta: StateDelta) {
        let StateDelta {
            images,
            containers,
            networks,
            volumes,
            compose_stacks,
            bound_ports,
        } = delta;
        if let Some(images) = images {
            self.images = images;
        }
        if let Some(containers) = containers {
            self.containers = containers;
        }
        if let Some(networks) = networks {
            self.networks = networks;
        }
        if let Some(volumes) = volumes {
            self.volumes = volumes;
        }
        if let Some(stacks) = compose_stacks {
            self.compose_stacks = stacks;
        }
        if let Some(ports) = bound_ports {
            self.bound_ports = ports;
        }
    }

    pub fn record(&mut self, events: impl IntoIterator<Item = EngineEvent>) {
        self.event_log.extend(events);
    }
}

/// Partial state returned by a command. `None` means "unchanged".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<BTreeMap<String, ImageRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub containers: Option<BTreeMap<String, ContainerRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networks: Option<BTreeMap<String, NetworkRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volumes: Option<BTreeMap<String, VolumeRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose_stacks: Option<BTreeMap<String, ComposeStack>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_ports: Option<BTreeMap<String, String>>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.images.is_none()
            && self.containers.is_none()
            && self.networks.is_none()
            && self.volumes.is_none()
            && self.compose_stacks.is_none()
            && self.bound_ports.is_none()
    }
}
