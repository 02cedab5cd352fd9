//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one spinner line per stage, cleared on completion.
//! Non-TTY mode: nothing is drawn, summaries go through `log`.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Refresh the spinner every this many records.
pub const TICK_EVERY: u64 = 4096;

fn stage_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {prefix:<8.cyan.bold} {human_pos:>12} records {elapsed:>4} {wide_msg:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Detects whether stderr is a terminal.
    pub fn new() -> Self {
        Self::with_tty(std::io::stderr().is_terminal())
    }

    pub fn with_tty(is_tty: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Spinner counting records for one stage (`walk`, `check`).
    ///
    /// Hidden when not on a TTY. Advance with [`StageLine::tick`].
    pub fn stage_line(&self, name: &str) -> StageLine {
        if !self.is_tty {
            return StageLine::new(ProgressBar::hidden());
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(stage_style());
        pb.set_prefix(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        StageLine::new(pb)
    }

    /// Print a line above the spinners.
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.is_tty {
            let _ = self.multi.println(msg);
        } else {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// For the log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedProgress = Arc<ProgressContext>;

/// Batched record counter on top of a spinner.
pub struct StageLine {
    pb: ProgressBar,
    pending: u64,
}

impl StageLine {
    fn new(pb: ProgressBar) -> Self {
        Self { pb, pending: 0 }
    }

    pub fn tick(&mut self) {
        self.pending += 1;
        if self.pending >= TICK_EVERY {
            self.pb.inc(self.pending);
            self.pending = 0;
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.pb.set_message(msg.into());
    }

    /// Flush pending counts and clear the line.
    pub fn finish(mut self) -> u64 {
        self.pb.inc(self.pending);
        self.pending = 0;
        let total = self.pb.position();
        self.pb.finish_and_clear();
        total
    }
}

/// Format number with thousand separators.
pub fn fmt_num(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_num_small() {
        assert_eq!(fmt_num(0), "0");
        assert_eq!(fmt_num(123), "123");
    }

    #[test]
    fn fmt_num_thousands() {
        assert_eq!(fmt_num(1_000), "1,000");
        assert_eq!(fmt_num(123_456), "123,456");
        assert_eq!(fmt_num(1_234_567_890), "1,234,567,890");
    }

    #[test]
    fn hidden_stage_still_counts() {
        let ctx = ProgressContext::with_tty(false);
        let mut line = ctx.stage_line("walk");
        for _ in 0..TICK_EVERY + 3 {
            line.tick();
        }
        assert_eq!(line.finish(), TICK_EVERY + 3);
    }
}
