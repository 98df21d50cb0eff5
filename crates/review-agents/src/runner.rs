//! JSONL batch runner: one `SampleInput` per input line, one
//! `SampleAudit` per output line.

use anyhow::{Context, Result};
use arbitration::{ArbitrationEngine, SampleInput};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

/// Outcome counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub processed: usize,
    /// Lines that failed to parse or runs that hit a fatal error
    pub abandoned: usize,
}

/// Run every sample in `reader`; a failed sample is logged and skipped.
pub async fn process_stream<R, W>(
    engine: &ArbitrationEngine<'_>,
    reader: R,
    writer: &mut W,
) -> Result<BatchStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = BatchStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let input: SampleInput = match serde_json::from_str(&line) {
            Ok(input) => input,
            Err(e) => {
                error!(line = line_no, error = %e, "Skipping malformed sample");
                stats.abandoned += 1;
                continue;
            }
        };

        let sample_id = input.sample_id.clone();
        match engine.run_input(input).await {
            Ok(audit) => {
                let json = audit
                    .to_json_line()
                    .context("Failed to serialize audit")?;
                writer.write_all(json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                stats.processed += 1;
            }
            Err(e) => {
                error!(sample_id = %sample_id, error = %e, "Sample abandoned");
                stats.abandoned += 1;
            }
        }
    }

    writer.flush().await?;
    info!(
        processed = stats.processed,
        abandoned = stats.abandoned,
        "Batch complete"
    );
    Ok(stats)
}
