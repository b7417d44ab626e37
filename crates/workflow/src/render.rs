//! Human-readable status and caption text.

use relayfile_transfer::TransferProgress;

use crate::error::WorkflowError;
use crate::types::IntakeSummary;

const BAR_WIDTH: usize = 10;
const BAR_FILLED: &str = "◾";
const BAR_EMPTY: &str = "◽";

/// Formats a byte count with two decimals: `1.50MB`.
pub fn humanbytes(size: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size.max(0.0);
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.2}{unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2}PB")
}

/// Ten-cell bar for a percentage in `0..=100`.
pub fn progress_bar(percentage: f64) -> String {
    let filled = ((percentage.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64) as usize;
    let filled = filled.min(BAR_WIDTH);
    format!(
        "{}{}",
        BAR_FILLED.repeat(filled),
        BAR_EMPTY.repeat(BAR_WIDTH - filled)
    )
}

/// Multi-line progress status for a transfer or upload.
pub fn progress_status(title: &str, progress: &TransferProgress) -> String {
    let pct = progress.percentage();
    let eta = progress.eta.map(|d| d.as_secs()).unwrap_or(0);
    format!(
        "Please wait...\n\n{title}\n[{bar}]  {pct:.1}%\n{done} of {total}\nSpeed: {speed}/s\nETA: {eta}s",
        bar = progress_bar(pct),
        done = humanbytes(progress.transferred as f64),
        total = humanbytes(progress.total as f64),
        speed = humanbytes(progress.bytes_per_second),
    )
}

pub fn intake_prompt(summary: &IntakeSummary) -> String {
    format!(
        "What do you want me to do with this file?\n• File Name : {}\n• File Size : {}",
        summary.file_name, summary.size_text
    )
}

pub fn kind_prompt(name: &str) -> String {
    format!("Select the output file type\n• File Name : {name}")
}

pub fn transfer_complete(total: u64) -> String {
    format!("✅ Download complete: {}", humanbytes(total as f64))
}

pub const PREPARING: &str = "Please wait...\nPreparing fast download...";
pub const DONE: &str = "✅ Done!";

/// The user-facing cause of a failed session.
pub fn failure_status(error: &WorkflowError) -> String {
    match error {
        WorkflowError::SourceUnavailable(e) => format!("❌ Could not get the file: {e}"),
        WorkflowError::Transfer(e) => format!("❌ Download failed: {e}"),
        WorkflowError::Publish(e) => format!("❌ Upload failed: {e}"),
        WorkflowError::Cancelled(_) => "❌ Cancelled".to_string(),
        other => format!("❌ {other}"),
    }
}

/// Values substituted into a caption template.
#[derive(Debug, Clone)]
pub struct CaptionContext<'a> {
    pub filename: &'a str,
    pub size: u64,
    pub duration_secs: Option<u64>,
}

/// Expands `{filename}`, `{filesize}` and `{duration}` in `template`.
///
/// Unknown placeholders are left as they are. A missing duration renders
/// as an empty string.
pub fn render_caption(template: &str, ctx: &CaptionContext<'_>) -> String {
    let duration = ctx.duration_secs.map(format_duration).unwrap_or_default();
    let rendered = template
        .replace("{filename}", ctx.filename)
        .replace("{filesize}", &humanbytes(ctx.size as f64))
        .replace("{duration}", &duration);
    let rendered = rendered.trim();
    if rendered.is_empty() {
        ctx.filename.to_string()
    } else {
        rendered.to_string()
    }
}

/// `H:MM:SS`, or `M:SS` under an hour.
pub fn format_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}
