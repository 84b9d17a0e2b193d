use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::config::Config;

enum Mode {
    Lines,
    Ops,
    Bytes,
    Seconds,
}

/// Progress sink for the controller loop. A no-op when disabled, so the
/// core never branches on display concerns.
pub struct Progress {
    bar: Option<ProgressBar>,
    mode: Mode,
}

impl Progress {
    pub fn new(conf: &Config, len_hint: Option<u64>) -> Self {
        let (len, mode) = if let Some(lines) = len_hint {
            (lines, Mode::Lines)
        } else if conf.limit_ops != 0 {
            (conf.limit_ops, Mode::Ops)
        } else if conf.limit_bytes != 0 {
            (conf.limit_bytes, Mode::Bytes)
        } else if conf.limit_seconds != 0 {
            (conf.limit_seconds, Mode::Seconds)
        } else {
            (0, Mode::Lines)
        };

        if conf.quiet || conf.no_progress || len == 0 {
            return Self { bar: None, mode };
        }

        let bar = ProgressBar::new(len);
        bar.set_draw_target(ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template("{bar:40} {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("=> ");
        bar.set_style(style);

        Self {
            bar: Some(bar),
            mode,
        }
    }

    pub fn tick(&self, lines: u64, insert_bytes: u64, elapsed: Duration) {
        let Some(bar) = &self.bar else {
            return;
        };
        match self.mode {
            Mode::Lines | Mode::Ops => bar.set_position(lines),
            Mode::Bytes => bar.set_position(insert_bytes),
            Mode::Seconds => bar.set_position(elapsed.as_secs()),
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        self.finish();
    }
}
