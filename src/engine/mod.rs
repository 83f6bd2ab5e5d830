//! Command evaluation.
//!
//! [`Evaluator::evaluate`] takes a state snapshot, a parsed command and an
//! optional workspace snapshot and returns what changed: a [`StateDelta`],
//! the events to append and the lines to print. The input state is never
//! modified; the caller merges the delta. Evaluation is total: every
//! failure is reported through output lines (and, for validation failures,
//! an event), never through a panic or an `Err`.

mod compose;
mod container;
mod exec;
pub mod help;
pub mod ids;
mod image;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

use crate::parser::{self, ParsedCommand, COMPOSE};
use crate::schema;
use crate::state::{EngineContext, EngineEvent, StateDelta};
use crate::workspace::WorkspaceFiles;
use ids::{IdSource, RandomIds};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Compose file names tried, in order, when `-f` is not given.
pub const DEFAULT_COMPOSE_FILES: &[&str] =
    &["compose.yml", "compose.yaml", "docker-compose.yml", "docker-compose.yaml"];

const COMPOSE_SUBCOMMANDS: &[&str] = &["up", "down", "ps", "logs"];

/// Everything one command produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub state_delta: StateDelta,
    pub events: Vec<EngineEvent>,
    pub output_lines: Vec<String>,
    /// False for usage errors, failed preconditions and validation failures
    pub succeeded: bool,
}

impl CommandResult {
    /// Output only; no state change, no events.
    pub fn output(lines: Vec<String>) -> Self {
        Self {
            output_lines: lines,
            succeeded: true,
            ..Self::default()
        }
    }

    /// A failed command: output only, nothing committed.
    pub fn failure(lines: Vec<String>) -> Self {
        Self {
            output_lines: lines,
            succeeded: false,
            ..Self::default()
        }
    }

    /// First line of output, for `lastError`.
    pub fn error_message(&self) -> Option<&str> {
        if self.succeeded {
            return None;
        }
        self.output_lines.iter().map(String::as_str).find(|l| !l.trim().is_empty())
    }
}

/// What a handler gets to look at.
pub(crate) struct Call<'a> {
    pub ctx: &'a EngineContext,
    pub cmd: &'a ParsedCommand,
    pub files: Option<&'a WorkspaceFiles>,
    pub ids: &'a mut dyn IdSource,
    pub compose_files: &'a [String],
}

/// Evaluates commands with an injected id source.
pub struct Evaluator<G: IdSource = RandomIds> {
    ids: G,
    compose_files: Vec<String>,
}

impl Evaluator<RandomIds> {
    pub fn new() -> Self {
        Self::with_ids(RandomIds::default())
    }
}

impl Default for Evaluator<RandomIds> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: IdSource> Evaluator<G> {
    pub fn with_ids(ids: G) -> Self {
        Self {
            ids,
            compose_files: DEFAULT_COMPOSE_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the compose file names tried by `compose up`.
    pub fn compose_files(mut self, names: Vec<String>) -> Self {
        if !names.is_empty() {
            self.compose_files = names;
        }
        self
    }

    pub fn ids_mut(&mut self) -> &mut G {
        &mut self.ids
    }

    /// Evaluate one command against a state snapshot.
    #[instrument(skip_all, fields(command = %cmd.raw.trim()))]
    pub fn evaluate(
        &mut self,
        ctx: &EngineContext,
        cmd: &ParsedCommand,
        files: Option<&WorkspaceFiles>,
    ) -> CommandResult {
        if let Err(e) = schema::check_command(cmd) {
            warn!(error = %e, "rejected malformed command");
            return CommandResult::failure(vec![e.to_string()]);
        }

        if cmd.command.is_empty() {
            return CommandResult::output(Vec::new());
        }
        if !cmd.is_docker() {
            return CommandResult::failure(vec![format!("{}: command not found", cmd.command)]);
        }

        let normalized = normalize_compose(cmd);
        let cmd = normalized.as_ref().unwrap_or(cmd);
        let mut call = Call {
            ctx,
            cmd,
            files,
            ids: &mut self.ids,
            compose_files: &self.compose_files,
        };
        let result = dispatch(&mut call);
        debug!(
            succeeded = result.succeeded,
            events = result.events.len(),
            lines = result.output_lines.len(),
            "command evaluated"
        );
        result
    }
}

/// Evaluate with fresh random ids and the default compose file names.
pub fn evaluate(ctx: &EngineContext, cmd: &ParsedCommand, files: Option<&WorkspaceFiles>) -> CommandResult {
    Evaluator::new().evaluate(ctx, cmd, files)
}

/// `docker compose -f x.yml up -d` parses with `up` as the first argument;
/// re-read it as `compose up` while keeping the flags seen before it.
fn normalize_compose(cmd: &ParsedCommand) -> Option<ParsedCommand> {
    if cmd.subcommand.as_deref() != Some(COMPOSE) {
        return None;
    }
    let (first, rest) = cmd.args.split_first()?;
    if !COMPOSE_SUBCOMMANDS.contains(&first.as_str()) {
        return None;
    }

    let mut reparsed = parser::parse(&format!("docker compose {first} {}", parser::join(rest)));
    for (key, value) in &cmd.flags {
        reparsed.flags.entry(key.clone()).or_insert_with(|| value.clone());
    }
    reparsed.raw = cmd.raw.clone();
    Some(reparsed)
}

fn is_help(cmd: &ParsedCommand) -> bool {
    cmd.switch("help") || cmd.switch("h")
}

fn dispatch(call: &mut Call) -> CommandResult {
    let cmd = call.cmd;
    let Some(sub) = cmd.subcommand.as_deref() else {
        if cmd.any_switch(&["version", "v"]) {
            return CommandResult::output(vec![help::VERSION.to_string()]);
        }
        return CommandResult::output(help::usage(None).unwrap_or_default());
    };

    // `docker --version`: the parser takes the token after `docker` as the subcommand
    if sub.starts_with('-') {
        return match sub.trim_start_matches('-') {
            "version" | "v" => CommandResult::output(vec![help::VERSION.to_string()]),
            "help" | "h" => CommandResult::output(help::usage(None).unwrap_or_default()),
            _ => CommandResult::failure(vec![format!("unknown flag: {sub}"), "See 'docker --help'.".to_string()]),
        };
    }

    if is_help(cmd) || sub == "help" || sub == COMPOSE {
        return match help::usage(Some(sub)) {
            Some(text) => CommandResult::output(text),
            None => CommandResult::failure(help::unknown_command(sub)),
        };
    }

    debug!(subcommand = sub, "dispatching");
    match sub {
        "version" => CommandResult::output(vec![help::VERSION.to_string()]),
        "pull" => image::pull(call),
        "images" => image::images(call),
        "build" => image::build(call),
        "run" => container::run(call),
        "ps" => container::ps(call),
        "stop" => container::stop(call),
        "start" => container::start(call),
        "rm" => container::rm(call),
        "logs" => exec::logs(call),
        "exec" => exec::exec(call),
        "compose up" => compose::up(call),
        "compose down" => compose::down(call),
        "compose ps" => compose::ps(call),
        "compose logs" => compose::logs(call),
        other => CommandResult::failure(help::unknown_command(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_empty_command_is_silent() {
        let result = eval(&EngineContext::default(), "   ");
        assert!(result.succeeded);
        assert!(result.output_lines.is_empty());
    }

    #[test]
    fn test_non_docker_command() {
        let result = eval(&EngineContext::default(), "kubectl get pods");
        assert_eq!(result.output_lines, vec!["kubectl: command not found"]);
        assert!(!result.succeeded);
        assert!(result.state_delta.is_empty());
        assert!(result.events.is_empty());
    }

    #[test]
    fn test_unknown_subcommand() {
        let result = eval(&EngineContext::default(), "docker swarm init");
        assert_eq!(result.output_lines[0], "docker: 'swarm' is not a docker command. See 'docker --help'.");
        assert_eq!(result.output_lines.len(), 5);
        assert!(result.events.is_empty());
        assert!(result.state_delta.is_empty());
    }

    #[test_case("docker" ; "bare")]
    #[test_case("docker --help" ; "long help")]
    #[test_case("docker help" ; "help subcommand")]
    fn test_root_help(raw: &str) {
        let result = eval(&EngineContext::default(), raw);
        assert!(result.succeeded);
        assert!(result.output_lines.iter().any(|l| l == "Usage:  docker [OPTIONS] COMMAND"));
    }

    #[test]
    fn test_help_beats_dispatch() {
        let ctx = EngineContext::default();
        let result = eval(&ctx, "docker run --help nginx");
        assert!(result.output_lines.iter().any(|l| l.starts_with("Usage:  docker run")));
        assert!(result.events.is_empty());

        let result = eval(&ctx, "docker compose up --help");
        assert!(result.output_lines.iter().any(|l| l.starts_with("Usage:  docker compose up")));

        let result = eval(&ctx, "docker compose");
        assert!(result.output_lines.iter().any(|l| l.starts_with("Usage:  docker compose [OPTIONS]")));
    }

    #[test]
    fn test_hostname_short_flag_is_not_help() {
        let ctx = with_image("nginx:latest");
        let result = eval(&ctx, "docker run -d -h box nginx");
        assert!(result.succeeded, "{:?}", result.output_lines);
        assert_eq!(result.events.len(), 2);
    }

    #[test]
    fn test_version() {
        let ctx = EngineContext::default();
        assert_eq!(eval(&ctx, "docker --version").output_lines, vec![help::VERSION]);
        assert_eq!(eval(&ctx, "docker version").output_lines, vec![help::VERSION]);
    }

    #[test]
    fn test_malformed_command_is_rejected() {
        let cmd = ParsedCommand {
            raw: "ls".to_string(),
            command: "ls".to_string(),
            subcommand: Some("ps".to_string()),
            ..ParsedCommand::default()
        };
        let result = Evaluator::with_ids(ids::SequentialIds::new()).evaluate(&EngineContext::default(), &cmd, None);
        assert!(!result.succeeded);
        assert!(result.output_lines[0].starts_with("invalid command"));
    }

    #[test]
    fn test_compose_flags_before_subcommand() {
        let cmd = parser::parse("docker compose -f stack.yml up -d");
        let normalized = normalize_compose(&cmd).unwrap();
        assert_eq!(normalized.subcommand.as_deref(), Some("compose up"));
        assert_eq!(normalized.value("f"), Some("stack.yml"));
        assert!(normalized.switch("d"));
        assert_eq!(normalized.raw, cmd.raw);
    }

    #[test]
    fn test_compose_reparse_keeps_arguments_intact() {
        let cmd = parser::parse(r#"docker compose -f stack.yml logs C:\svc "two words""#);
        let normalized = normalize_compose(&cmd).unwrap();
        assert_eq!(normalized.subcommand.as_deref(), Some("compose logs"));
        assert_eq!(normalized.args, vec![r"C:\svc", "two words"]);
    }

    #[test]
    fn test_error_message_is_first_non_blank_line() {
        let result = CommandResult::failure(vec![String::new(), "boom".to_string()]);
        assert_eq!(result.error_message(), Some("boom"));
        assert_eq!(CommandResult::output(vec!["ok".to_string()]).error_message(), None);
    }

    #[test]
    fn test_input_state_is_not_modified() {
        let ctx = with_image("nginx:latest");
        let before = ctx.clone();
        let _ = eval(&ctx, "docker run -d -p 80:80 nginx");
        assert_eq!(ctx, before);
    }
}
