//! Progress bar construction.

use indicatif::{ProgressBar, ProgressStyle};

const COUNT_TEMPLATE: &str =
    "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed, ETA {eta_precise}";
const BYTES_TEMPLATE: &str =
    "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg} | {bytes_per_sec}, ETA {eta_precise}";

fn bar(len: u64, template: &str, message: String) -> ProgressBar {
    // Bars only make sense on an interactive terminal.
    if !atty::is(atty::Stream::Stderr) {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░ "),
    );
    pb.set_message(message);
    pb
}

/// Bar counting items (chunks, files).
pub fn count_bar(len: u64, message: impl Into<String>) -> ProgressBar {
    bar(len, COUNT_TEMPLATE, message.into())
}

/// Bar counting bytes of one transfer.
pub fn bytes_bar(len: u64, message: impl Into<String>) -> ProgressBar {
    bar(len, BYTES_TEMPLATE, message.into())
}
