use dockyard::error::Result;

/// Print the parsed form of a command line
pub fn parse(command: &[String]) -> Result<()> {
    let parsed = dockyard::parse(&dockyard::parser::join(command));
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}
