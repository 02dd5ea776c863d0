use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::Progress;

/// Terminal progress bar tracking bytes against the scanned total.
///
/// Renders to stderr (not stdout) so piped output stays clean.
/// Hidden if quiet mode is active.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(quiet: bool) -> Self {
        if quiet {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new(0);
        bar.set_draw_target(ProgressDrawTarget::stderr());
        // The template is a constant; a parse failure would only lose styling.
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
             {bytes}/{total_bytes} ({bytes_per_sec}) {wide_msg}",
        ) {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar }
    }
}

impl Progress for BarProgress {
    fn report(&self, current: u64, total: u64, message: &str) {
        self.bar.set_length(total.max(current));
        self.bar.set_position(current);
        self.bar.set_message(message.to_string());
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_bar_is_hidden_and_tracks_position() {
        let progress = BarProgress::new(true);
        assert!(progress.bar.is_hidden());
        progress.report(10, 4, "copy a");
        assert_eq!(progress.bar.position(), 10);
        assert_eq!(progress.bar.length(), Some(10));
        progress.finish();
    }
}
