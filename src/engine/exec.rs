use super::container::no_such_container;
use super::util::{event, resolve_container, tail, tail_count};
use super::{Call, CommandResult};
use crate::state::{ContainerRecord, EngineContext, EventKind};
use serde_json::json;

const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

pub(crate) fn logs(call: &mut Call) -> CommandResult {
    let cmd = call.cmd;
    let Some(reference) = cmd.args.first() else {
        return CommandResult::failure(vec!["Usage: docker logs [OPTIONS] CONTAINER".to_string()]);
    };
    let Some(c) = resolve_container(&call.ctx.containers, reference) else {
        return CommandResult::failure(vec![no_such_container(reference)]);
    };

    let stored = if c.logs.is_empty() {
        vec![format!("{} | (no log output)", c.name)]
    } else {
        c.logs.clone()
    };

    let mut output = Vec::new();
    if cmd.any_switch(&["f", "follow"]) {
        output.push(format!("(Following logs for {} - press Ctrl+C to stop)", c.name));
    }
    output.extend(tail(&stored, tail_count(cmd.value_of(&["tail", "n"]))));
    CommandResult::output(output)
}

pub(crate) fn exec(call: &mut Call) -> CommandResult {
    let cmd = call.cmd;
    let interactive = cmd.any_switch(&["i", "interactive"]) && cmd.any_switch(&["t", "tty"]);
    if !interactive || cmd.args.len() < 2 {
        return CommandResult::failure(vec!["Usage: docker exec -it CONTAINER COMMAND [ARG...]".to_string()]);
    }

    let reference = &cmd.args[0];
    let Some(c) = resolve_container(&call.ctx.containers, reference) else {
        return CommandResult::failure(vec![no_such_container(reference)]);
    };
    if !c.is_running() {
        return CommandResult::failure(vec![
            format!("Error response from daemon: Container {} is not running", c.name),
            "Explain: exec needs a running container. Start it with docker start first.".to_string(),
        ]);
    }

    // `sh -c "..."` runs the wrapped command
    let command = match &cmd.args[1..] {
        [shell, flag, inner @ ..] if matches!(shell.as_str(), "sh" | "bash") && flag == "-c" && !inner.is_empty() => {
            inner.join(" ")
        }
        words => words.join(" "),
    };

    let Some(output) = canned_output(call.ctx, c, &command) else {
        let bin = command.split_whitespace().next().unwrap_or_default();
        return CommandResult::failure(vec![format!(
            "OCI runtime exec failed: exec failed: unable to start container process: exec: \"{bin}\": executable file not found in $PATH"
        )]);
    };

    let ran = event(
        call.ids,
        EventKind::ExecCommandRun,
        json!({ "containerId": c.id, "cmd": command }),
        format!("Ran '{command}' in {}", c.name),
    );
    CommandResult {
        events: vec![ran],
        ..CommandResult::output(output)
    }
}

fn canned_output(ctx: &EngineContext, c: &ContainerRecord, command: &str) -> Option<Vec<String>> {
    let lower = command.to_lowercase();
    let output = match lower.as_str() {
        "env" | "printenv" => {
            let defaults = [("PATH", DEFAULT_PATH), ("HOSTNAME", c.name.as_str()), ("TERM", "xterm-256color")];
            let mut lines: Vec<String> = defaults
                .iter()
                .map(|(key, value)| {
                    let value = c.env.get(*key).map_or(*value, String::as_str);
                    format!("{key}={value}")
                })
                .collect();
            lines.extend(
                c.env
                    .iter()
                    .filter(|(key, _)| !defaults.iter().any(|(d, _)| d == key))
                    .map(|(key, value)| format!("{key}={value}")),
            );
            lines
        }
        "cat /etc/os-release" => {
            let label = ctx.image_label(&c.image_id);
            let name = label.split(':').next().unwrap_or("linux");
            vec![
                format!("PRETTY_NAME=\"Simulated {name} Linux\""),
                "NAME=\"SimOS\"".to_string(),
                "ID=simdocker".to_string(),
                "HOME_URL=\"https://docker-yard.dev/\"".to_string(),
            ]
        }
        "ls /app" => vec!["index.js  node_modules  package.json".to_string()],
        "sh" | "bash" => vec![
            format!("Welcome to {} ({lower})", c.name),
            "This is a simulated shell. Try: env, ls /app, cat /etc/os-release".to_string(),
        ],
        _ => return None,
    };
    Some(output)
}

#[cfg(test)]
mod tests {
    use crate::engine::testing::*;
    use crate::state::EventKind;
    use test_case::test_case;

    fn sim_with_web() -> Sim {
        let mut sim = Sim::new(with_image("postgres:16"));
        assert!(sim.run("docker run -d -e POSTGRES_DB=app --name web postgres:16").succeeded);
        sim
    }

    #[test]
    fn test_logs_returns_stored_lines() {
        let mut sim = sim_with_web();
        let logs = sim.container_named("web").unwrap().logs.clone();
        assert_eq!(sim.run("docker logs web").output_lines, logs);

        let tailed = sim.run("docker logs --tail 1 web");
        assert_eq!(tailed.output_lines, vec![logs.last().unwrap().clone()]);
        assert!(tailed.events.is_empty());
        assert!(tailed.state_delta.is_empty());
    }

    #[test]
    fn test_logs_follow_banner() {
        let mut sim = sim_with_web();
        let result = sim.run("docker logs -f web");
        assert_eq!(result.output_lines[0], "(Following logs for web - press Ctrl+C to stop)");
    }

    #[test]
    fn test_logs_stopped_container_still_readable() {
        let mut sim = sim_with_web();
        sim.run("docker stop web");
        assert!(sim.run("docker logs web").succeeded);
    }

    #[test]
    fn test_logs_errors() {
        let mut sim = sim_with_web();
        assert_eq!(sim.run("docker logs").output_lines, vec!["Usage: docker logs [OPTIONS] CONTAINER"]);
        assert_eq!(
            sim.run("docker logs ghost").output_lines,
            vec!["Error response from daemon: No such container: ghost"]
        );
    }

    #[test]
    fn test_logs_empty_placeholder() {
        let mut sim = sim_with_web();
        let id = sim.container_named("web").unwrap().id.clone();
        sim.ctx.containers.get_mut(&id).unwrap().logs.clear();
        assert_eq!(sim.run("docker logs web").output_lines, vec!["web | (no log output)"]);
    }

    #[test]
    fn test_exec_env_merges_container_env() {
        let mut sim = sim_with_web();
        let result = sim.run("docker exec -it web env");
        assert!(result.output_lines.contains(&"HOSTNAME=web".to_string()));
        assert!(result.output_lines.contains(&"POSTGRES_DB=app".to_string()));
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].kind, EventKind::ExecCommandRun);
        assert_eq!(result.events[0].payload["cmd"], "env");
    }

    #[test_case("docker exec -it web cat /etc/os-release", "PRETTY_NAME=\"Simulated postgres Linux\"" ; "os release")]
    #[test_case("docker exec -it web ls /app", "index.js  node_modules  package.json" ; "ls app")]
    #[test_case("docker exec -it web sh", "Welcome to web (sh)" ; "shell")]
    #[test_case("docker exec -it web sh -c 'ls /app'", "index.js  node_modules  package.json" ; "wrapped")]
    fn test_exec_canned_commands(raw: &str, first_line: &str) {
        let mut sim = sim_with_web();
        let result = sim.run(raw);
        assert_eq!(result.output_lines[0], first_line);
        assert_eq!(result.events.len(), 1);
    }

    #[test]
    fn test_exec_unknown_binary() {
        let mut sim = sim_with_web();
        let result = sim.run("docker exec -it web python3 app.py");
        assert_eq!(
            result.output_lines,
            vec!["OCI runtime exec failed: exec failed: unable to start container process: exec: \"python3\": executable file not found in $PATH"]
        );
        assert!(result.events.is_empty());
        assert!(!result.succeeded);
    }

    #[test_case("docker exec web env" ; "missing it")]
    #[test_case("docker exec -i web env" ; "missing t")]
    #[test_case("docker exec -it web" ; "missing command")]
    fn test_exec_usage(raw: &str) {
        let mut sim = sim_with_web();
        assert_eq!(sim.run(raw).output_lines, vec!["Usage: docker exec -it CONTAINER COMMAND [ARG...]"]);
    }

    #[test]
    fn test_exec_requires_running() {
        let mut sim = sim_with_web();
        sim.run("docker stop web");
        let result = sim.run("docker exec -it web env");
        assert_eq!(result.output_lines[0], "Error response from daemon: Container web is not running");
        assert!(result.events.is_empty());
    }
}
