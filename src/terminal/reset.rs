use dockyard::error::Result;
use dockyard::session::Session;
use std::io::{self, BufRead, Write};

/// Delete the saved session
pub fn reset(force: bool) -> Result<()> {
    if !Session::session_path()?.exists() {
        println!("No saved session.");
        return Ok(());
    }

    if !force {
        let session = Session::load()?;
        print!(
            "Forget {} images, {} containers and {} events? [y/N] ",
            session.engine.images.len(),
            session.engine.active_containers().count(),
            session.engine.event_log.len()
        );
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }

    Session::remove()?;
    println!("Session reset");
    Ok(())
}
