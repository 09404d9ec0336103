use anyhow::Result;

pub fn execute() -> Result<()> {
    println!("devbot version {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
