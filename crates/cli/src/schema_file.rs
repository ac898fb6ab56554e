use anyhow::{Context, Result};
use cmdparse_schema::{DEFAULT_SCHEMA_NAME, ParserSchema};
use std::fs;
use std::path::{Path, PathBuf};

pub fn load_schema(path: &Path) -> Result<ParserSchema> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read schema: {}", path.display()))?;
    let schema = ParserSchema::from_json(&contents)
        .with_context(|| format!("failed to parse schema: {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        commands = schema.commands.len(),
        "loaded schema"
    );
    Ok(schema)
}

/// Write the starter schema into `dir`. An existing file is kept unless
/// `overwrite` is set.
pub fn write_default_schema(dir: &Path, overwrite: bool) -> Result<(PathBuf, bool)> {
    let dest = dir.join(DEFAULT_SCHEMA_NAME);
    if dest.exists() && !overwrite {
        return Ok((dest, false));
    }

    let mut out = ParserSchema::example()
        .to_json_pretty()
        .context("failed to serialize schema")?;
    out.push('\n');

    let tmp = dest.with_extension("tmp");
    fs::write(&tmp, out.as_bytes())
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    if overwrite && dest.exists() {
        fs::remove_file(&dest).with_context(|| format!("failed to remove {}", dest.display()))?;
    }
    fs::rename(&tmp, &dest)
        .with_context(|| format!("failed to move {} into place", dest.display()))?;
    Ok((dest, true))
}
