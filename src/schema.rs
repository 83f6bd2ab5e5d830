use crate::error::{Error, Result};
use crate::parser::{self, ParsedCommand};
use crate::state::{image_key, EngineContext};
use std::collections::BTreeSet;

/// Validate a command before it is evaluated.
pub fn check_command(cmd: &ParsedCommand) -> Result<()> {
    if !cmd.is_docker() && cmd.subcommand.is_some() {
        return Err(Error::InvalidCommand(format!(
            "'{}' does not take a subcommand",
            cmd.command
        )));
    }

    if let Some(key) = cmd.flags.keys().find(|k| k.is_empty() || k.contains(char::is_whitespace)) {
        return Err(Error::InvalidCommand(format!("malformed flag name {key:?}")));
    }

    if !cmd.raw.trim().is_empty() {
        let reparsed = parser::parse(&cmd.raw);
        if reparsed.command != cmd.command {
            return Err(Error::InvalidCommand(format!(
                "command '{}' does not match its input '{}'",
                cmd.command,
                cmd.raw.trim()
            )));
        }
    }

    Ok(())
}

/// Validate the invariants a loaded state must hold.
pub fn check_context(ctx: &EngineContext) -> Result<()> {
    for (key, image) in &ctx.images {
        if *key != image_key(&image.repository, &image.tag) {
            return Err(Error::InvalidState(format!(
                "image stored under '{key}' is {}",
                image.key()
            )));
        }
    }

    for (id, container) in &ctx.containers {
        if *id != container.id {
            return Err(Error::InvalidState(format!(
                "container stored under '{id}' has id '{}'",
                container.id
            )));
        }
    }

    let mut names = BTreeSet::new();
    for container in ctx.active_containers() {
        if !names.insert(container.name.as_str()) {
            return Err(Error::InvalidState(format!(
                "container name '{}' is used twice",
                container.name
            )));
        }
    }

    for (port, owner) in &ctx.bound_ports {
        let holds_port = ctx
            .containers
            .get(owner)
            .filter(|c| c.is_active())
            .is_some_and(|c| c.ports.iter().any(|p| p.host_key() == *port));
        if !holds_port {
            return Err(Error::InvalidState(format!(
                "port {port} is bound to '{owner}', which does not publish it"
            )));
        }
    }

    for stack in ctx.compose_stacks.values() {
        if let Some((service, id)) = stack.container_ids.iter().find(|(_, id)| !ctx.containers.contains_key(*id)) {
            return Err(Error::InvalidState(format!(
                "stack '{}' service '{service}' points at unknown container '{id}'",
                stack.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{image, Sim};
    use crate::state::ContainerStatus;
    use test_case::test_case;

    #[test_case("docker run -d nginx" ; "docker")]
    #[test_case("ls -la" ; "other command")]
    #[test_case("" ; "empty")]
    fn test_parsed_commands_pass(raw: &str) {
        assert!(check_command(&parser::parse(raw)).is_ok());
    }

    #[test]
    fn test_subcommand_on_foreign_command() {
        let mut cmd = parser::parse("ls");
        cmd.subcommand = Some("ps".to_string());
        assert!(matches!(check_command(&cmd), Err(Error::InvalidCommand(_))));
    }

    #[test]
    fn test_command_must_match_raw() {
        let mut cmd = parser::parse("docker ps");
        cmd.command = "podman".to_string();
        assert!(check_command(&cmd).is_err());
    }

    #[test]
    fn test_empty_flag_name() {
        let mut cmd = parser::parse("docker ps");
        cmd.flags.insert(String::new(), parser::FlagValue::Switch(true));
        assert!(check_command(&cmd).is_err());
    }

    fn running_state() -> EngineContext {
        let mut sim = Sim::new(crate::engine::testing::with_image("nginx:latest"));
        sim.run("docker run -d -p 8080:80 --name web nginx");
        sim.ctx
    }

    #[test]
    fn test_engine_produced_state_is_valid() {
        assert!(check_context(&EngineContext::default()).is_ok());
        assert!(check_context(&running_state()).is_ok());
    }

    #[test]
    fn test_misfiled_image() {
        let mut ctx = EngineContext::default();
        ctx.images.insert("nginx:1.0".to_string(), image("nginx:latest"));
        assert!(matches!(check_context(&ctx), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_port_owned_by_removed_container() {
        let mut ctx = running_state();
        for c in ctx.containers.values_mut() {
            c.status = ContainerStatus::Removed;
        }
        assert!(check_context(&ctx).is_err());
    }

    #[test]
    fn test_duplicate_names() {
        let mut ctx = running_state();
        let mut twin = ctx.containers.values().next().unwrap().clone();
        twin.id = "feedfacecafe".to_string();
        twin.ports.clear();
        ctx.containers.insert(twin.id.clone(), twin);
        let err = check_context(&ctx).unwrap_err();
        assert!(err.to_string().contains("used twice"));
    }
}
