use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dockyard")]
#[command(author, version, about = "A simulated Docker CLI for learning containers")]
#[command(long_about = "Dockyard simulates the docker and docker compose commands against an \
in-memory engine. Images, containers, ports and compose stacks behave like the real thing, \
Dockerfiles and compose files from your workspace are linted with explanations, and nothing \
is ever executed on the host.")]
pub struct Cli {
    /// Workspace directory holding the Dockerfile and compose files
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Open the simulated terminal
    #[command(visible_alias = "repl")]
    Shell,

    /// Evaluate one docker command against the saved session
    #[command(visible_alias = "exec")]
    Run {
        /// Print the full result (delta, events, output) as JSON
        #[arg(long)]
        json: bool,

        /// The command line, e.g. `docker run -d -p 8080:80 nginx`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Lint a Dockerfile or compose file
    Validate {
        /// File to check; the validator is picked from its name
        file: PathBuf,

        /// Output diagnostics in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the session's event log
    #[command(visible_alias = "log")]
    Events {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Forget the saved session
    Reset {
        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Show how a command line is parsed
    Parse {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_keeps_docker_flags() {
        let cli = Cli::try_parse_from(["dockyard", "run", "--json", "docker", "run", "-d", "-p", "80:80", "nginx"]).unwrap();
        match cli.command {
            Command::Run { json, command } => {
                assert!(json);
                assert_eq!(command, vec!["docker", "run", "-d", "-p", "80:80", "nginx"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_aliases_and_global_workspace() {
        let cli = Cli::try_parse_from(["dockyard", "repl", "--workspace", "/srv/app"]).unwrap();
        assert!(matches!(cli.command, Command::Shell));
        assert_eq!(cli.workspace, Some(PathBuf::from("/srv/app")));

        let cli = Cli::try_parse_from(["dockyard", "log", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Events { json: true }));
    }
}
