use super::RunSummary;
use anyhow::Context;
use std::path::Path;

pub fn write_json(summary: &RunSummary, out: &Path) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(summary)?;
    std::fs::write(out, body).with_context(|| format!("failed to write {}", out.display()))?;
    Ok(())
}

pub fn read_json(path: &Path) -> anyhow::Result<RunSummary> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&raw)?)
}
