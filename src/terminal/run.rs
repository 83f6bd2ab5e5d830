use dockyard::config::Config;
use dockyard::error::Result;
use dockyard::workspace;
use std::path::PathBuf;

/// Evaluate one command against the saved session
pub fn run(command: &[String], json: bool, config: &Config, workspace_dir: Option<PathBuf>) -> Result<i32> {
    let raw = dockyard::parser::join(command);
    let files = workspace::load_dir(&config.workspace(workspace_dir)?)?;

    let mut session = super::open_session(config)?;
    let mut evaluator = super::evaluator(config);
    let result = session.submit(&raw, Some(&files), &mut evaluator);

    if config.persist_session {
        session.save()?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        super::print_result(&result);
    }

    Ok(if result.succeeded { 0 } else { 1 })
}
