use anyhow::{Context, Result};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::LoreConfig;

/// Write every record as one JSON object per line. `-` writes to stdout.
pub fn export(config: &LoreConfig, path: &Path) -> Result<()> {
    let engine = super::open_engine(config)?;
    let snapshot = engine.snapshot();

    let sink: Box<dyn Write> = if path == Path::new("-") {
        Box::new(std::io::stdout().lock())
    } else {
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create export file: {}", path.display()))?;
        Box::new(file)
    };
    let mut out = BufWriter::new(sink);

    for record in snapshot.records() {
        serde_json::to_writer(&mut out, record.as_ref())?;
        out.write_all(b"\n")?;
    }
    out.flush().context("failed to flush export")?;

    eprintln!("Exported {} records.", snapshot.len());
    Ok(())
}
