mod events;
mod parse;
mod reset;
mod run;
mod shell;
mod validate;

pub use events::events;
pub use parse::parse;
pub use reset::reset;
pub use run::run;
pub use shell::shell;
pub use validate::validate;

use dockyard::config::Config;
use dockyard::engine::{CommandResult, Evaluator};
use dockyard::session::Session;

fn evaluator(config: &Config) -> Evaluator {
    Evaluator::new().compose_files(config.compose_files.clone())
}

fn open_session(config: &Config) -> dockyard::error::Result<Session> {
    if config.persist_session {
        Session::load()
    } else {
        Ok(Session::default())
    }
}

fn print_result(result: &CommandResult) {
    for line in &result.output_lines {
        println!("{line}");
    }
}
