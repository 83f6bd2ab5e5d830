use dockyard::config::Config;
use dockyard::error::Result;
use dockyard::workspace;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::warn;

/// Interactive terminal: one command at a time, state saved after each
pub fn shell(config: &Config, workspace_dir: Option<PathBuf>) -> Result<()> {
    let dir = config.workspace(workspace_dir)?;
    let mut session = super::open_session(config)?;
    let mut evaluator = super::evaluator(config);

    println!(
        "dockyard {} - simulated docker in {}. Type 'exit' to leave.",
        env!("CARGO_PKG_VERSION"),
        dir.display()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("{}", config.prompt);
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            break;
        }

        let raw = line.trim();
        match raw {
            "" | "clear" => continue,
            "exit" | "quit" => break,
            _ => {}
        }

        // Re-read the workspace so edits made between commands are seen
        let files = match workspace::load_dir(&dir) {
            Ok(files) => Some(files),
            Err(e) => {
                warn!(error = %e, "workspace unavailable");
                None
            }
        };

        let result = session.submit(raw, files.as_ref(), &mut evaluator);
        super::print_result(&result);

        if config.persist_session {
            session.save()?;
        }
    }

    Ok(())
}
