use indicatif::ProgressStyle;

/// Receives `(completed, total)` after every finished batch.
pub trait ProgressSink {
    fn update(&mut self, completed: u64, total: u64);

    fn finish(&mut self) {}
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&mut self, _completed: u64, _total: u64) {}
}

/// Fixed-width `[####    ]` bar drawn in place on the terminal.
pub struct ProgressBar {
    bar: indicatif::ProgressBar,
}

impl ProgressBar {
    pub fn new(total: u64) -> Self {
        Self::with_bar(indicatif::ProgressBar::new(total))
    }

    fn with_bar(bar: indicatif::ProgressBar) -> Self {
        let style = ProgressStyle::with_template("[{bar:100}]")
            .map(|style| style.progress_chars("# "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        ProgressBar { bar }
    }
}

impl ProgressSink for ProgressBar {
    fn update(&mut self, completed: u64, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(completed);
    }

    fn finish(&mut self) {
        self.bar.finish();
    }
}
