//! Drives a [`Dispatcher`] from JSON lines, one `ClientRequest` per line.
//!
//! Every non-blank input line produces exactly one output line. Lines starting
//! with `#` are comments.

use std::io::Write;

use anyhow::Context;
use serde::Serialize;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{ClientRequest, ServerResponse},
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};
use voting::Dispatcher;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplayOutput {
    Ok { response: ServerResponse },
    Error { error: ApiError },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub handled: usize,
    pub failed: usize,
}

pub async fn replay<R, W>(
    dispatcher: &mut Dispatcher,
    input: R,
    out: &mut W,
) -> anyhow::Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut stats = ReplayStats::default();
    let mut lines = input.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines
        .next_line()
        .await
        .context("failed to read replay input")?
    {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let output = match serde_json::from_str::<ClientRequest>(line) {
            Ok(request) => match dispatcher.handle(request).await {
                Ok(response) => ReplayOutput::Ok { response },
                Err(error) => ReplayOutput::Error { error },
            },
            Err(err) => ReplayOutput::Error {
                error: ApiError::new(
                    ErrorCode::Validation,
                    format!("malformed request on line {line_no}: {err}"),
                ),
            },
        };

        stats.handled += 1;
        if let ReplayOutput::Error { error } = &output {
            stats.failed += 1;
            debug!(line_no, code = ?error.code, "request failed");
        }

        serde_json::to_writer(&mut *out, &output).context("failed to write replay output")?;
        writeln!(out).context("failed to write replay output")?;
        out.flush().context("failed to flush replay output")?;
    }

    info!(handled = stats.handled, failed = stats.failed, "replay finished");
    Ok(stats)
}
