use dockyard::error::Result;
use dockyard::session::Session;
use dockyard::state::EngineEvent;

/// List the session's event log
pub fn events(json: bool) -> Result<()> {
    let session = Session::load()?;
    let events = &session.engine.event_log;

    if json {
        println!("{}", serde_json::to_string_pretty(events)?);
        return Ok(());
    }

    if events.is_empty() {
        println!("No events yet. Try: dockyard run docker pull nginx");
        return Ok(());
    }

    for line in table(events) {
        println!("{line}");
    }
    Ok(())
}

fn table(events: &[EngineEvent]) -> Vec<String> {
    let mut lines = vec![
        format!("{:<20} {:<24} {}", "TIME", "EVENT", "SUMMARY"),
        "-".repeat(80),
    ];
    lines.extend(events.iter().map(|e| {
        format!(
            "{:<20} {:<24} {}",
            e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            e.kind.to_string(),
            e.human_summary
        )
    }));
    lines
}
