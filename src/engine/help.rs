pub const VERSION: &str = "Docker version 24.0.7, build simulated";

const ROOT: &[&str] = &[
    "",
    "Usage:  docker [OPTIONS] COMMAND",
    "",
    "A self-sufficient runtime for containers (simulated)",
    "",
    "Common Commands:",
    "  run         Create and run a new container from an image",
    "  exec        Execute a command in a running container",
    "  ps          List containers",
    "  build       Build an image from a Dockerfile",
    "  pull        Download an image from a registry",
    "  images      List images",
    "",
    "Management Commands:",
    "  compose*    Docker Compose",
    "",
    "Container Commands:",
    "  logs        Fetch the logs of a container",
    "  rm          Remove one or more containers",
    "  start       Start one or more stopped containers",
    "  stop        Stop one or more running containers",
    "",
    "Run 'docker COMMAND --help' for more information on a command.",
];

const COMPOSE: &[&str] = &[
    "",
    "Usage:  docker compose [OPTIONS] COMMAND",
    "",
    "Define and run multi-container applications with Docker",
    "",
    "Options:",
    "  -f, --file stringArray   Compose configuration files",
    "",
    "Commands:",
    "  down        Stop and remove containers, networks",
    "  logs        View output from containers",
    "  ps          List containers",
    "  up          Create and start containers",
    "",
    "Run 'docker compose COMMAND --help' for more information on a command.",
];

/// Usage text for a (possibly compound) subcommand; `None` for unknown ones.
pub fn usage(subcommand: Option<&str>) -> Option<Vec<String>> {
    let lines: &[&str] = match subcommand {
        None | Some("help") => ROOT,
        Some("compose") => COMPOSE,
        Some("pull") => &[
            "",
            "Usage:  docker pull [OPTIONS] NAME[:TAG|@DIGEST]",
            "",
            "Download an image from a registry",
        ],
        Some("images") => &[
            "",
            "Usage:  docker images [OPTIONS] [REPOSITORY[:TAG]]",
            "",
            "List images",
        ],
        Some("build") => &[
            "",
            "Usage:  docker build [OPTIONS] PATH | URL | -",
            "",
            "Build an image from a Dockerfile",
            "",
            "Options:",
            "  -f, --file string   Name of the Dockerfile (default: \"PATH/Dockerfile\")",
            "  -t, --tag list      Name and optionally a tag in the \"name:tag\" format",
        ],
        Some("run") => &[
            "",
            "Usage:  docker run [OPTIONS] IMAGE [COMMAND] [ARG...]",
            "",
            "Create and run a new container from an image",
            "",
            "Options:",
            "  -d, --detach          Run container in background and print container ID",
            "  -e, --env list        Set environment variables",
            "      --name string     Assign a name to the container",
            "  -p, --publish list    Publish a container's port(s) to the host",
            "  -v, --volume list     Bind mount a volume",
        ],
        Some("ps") => &[
            "",
            "Usage:  docker ps [OPTIONS]",
            "",
            "List containers",
            "",
            "Options:",
            "  -a, --all   Show all containers (default shows just running)",
        ],
        Some("stop") => &[
            "",
            "Usage:  docker stop [OPTIONS] CONTAINER [CONTAINER...]",
            "",
            "Stop one or more running containers",
        ],
        Some("start") => &[
            "",
            "Usage:  docker start [OPTIONS] CONTAINER [CONTAINER...]",
            "",
            "Start one or more stopped containers",
        ],
        Some("rm") => &[
            "",
            "Usage:  docker rm [OPTIONS] CONTAINER [CONTAINER...]",
            "",
            "Remove one or more containers",
            "",
            "Options:",
            "  -f, --force   Force the removal of a running container",
        ],
        Some("logs") => &[
            "",
            "Usage:  docker logs [OPTIONS] CONTAINER",
            "",
            "Fetch the logs of a container",
            "",
            "Options:",
            "  -f, --follow         Follow log output",
            "  -n, --tail string    Number of lines to show from the end of the logs (default \"all\")",
        ],
        Some("exec") => &[
            "",
            "Usage:  docker exec [OPTIONS] CONTAINER COMMAND [ARG...]",
            "",
            "Execute a command in a running container",
            "",
            "Options:",
            "  -i, --interactive   Keep STDIN open even if not attached",
            "  -t, --tty           Allocate a pseudo-TTY",
        ],
        Some("compose up") => &[
            "",
            "Usage:  docker compose up [OPTIONS] [SERVICE...]",
            "",
            "Create and start containers",
            "",
            "Options:",
            "  -d, --detach   Detached mode: Run containers in the background",
        ],
        Some("compose down") => &[
            "",
            "Usage:  docker compose down [OPTIONS] [SERVICES]",
            "",
            "Stop and remove containers, networks",
        ],
        Some("compose ps") => &[
            "",
            "Usage:  docker compose ps [OPTIONS] [SERVICE...]",
            "",
            "List containers",
        ],
        Some("compose logs") => &[
            "",
            "Usage:  docker compose logs [OPTIONS] [SERVICE...]",
            "",
            "View output from containers",
            "",
            "Options:",
            "  -n, --tail string   Number of lines to show from the end of the logs for each container (default \"all\")",
        ],
        Some(_) => return None,
    };
    Some(lines.iter().map(|l| l.to_string()).collect())
}

/// Output for a subcommand the simulator does not know.
pub fn unknown_command(subcommand: &str) -> Vec<String> {
    vec![
        format!("docker: '{subcommand}' is not a docker command. See 'docker --help'."),
        String::new(),
        "Usage:  docker [OPTIONS] COMMAND".to_string(),
        String::new(),
        "Run 'docker COMMAND --help' for more information on a command.".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_handled_subcommand_has_usage() {
        for sub in [
            "pull", "images", "build", "run", "ps", "stop", "start", "rm", "logs", "exec", "compose up",
            "compose down", "compose ps", "compose logs",
        ] {
            let text = usage(Some(sub)).unwrap();
            assert!(text.iter().any(|l| l.starts_with("Usage:")), "{sub}");
        }
    }

    #[test]
    fn test_unknown_has_no_usage() {
        assert!(usage(Some("swarm")).is_none());
        assert_eq!(unknown_command("swarm")[0], "docker: 'swarm' is not a docker command. See 'docker --help'.");
    }
}
