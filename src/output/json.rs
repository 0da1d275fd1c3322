use crate::model::ScanForest;
use anyhow::Result;

pub fn print_json(forest: &ScanForest) -> Result<()> {
    let json = serde_json::to_string_pretty(forest)?;
    println!("{}", json);
    Ok(())
}
