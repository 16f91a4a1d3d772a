//! Output channels for run results.
//!
//! Channels are product output (failure reports, test logs), separate from
//! the `tracing` diagnostics controlled by `RUST_LOG`.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::core::classifier::ChannelEffect;

/// Named output channels the learner can look at.
pub trait OutputSink: Send + Sync {
    /// Replace the channel's content; `show` brings it to the learner's attention.
    fn write(&self, channel: &str, text: &str, show: bool);
    fn clear(&self, channel: &str);
}

/// Apply classifier effects to a sink, in order.
pub fn apply_effects(sink: &dyn OutputSink, effects: &[ChannelEffect]) {
    for effect in effects {
        match effect {
            ChannelEffect::Write {
                channel,
                text,
                show,
            } => sink.write(channel, text, *show),
            ChannelEffect::Clear { channel } => sink.clear(channel),
        }
    }
}

/// Prints shown channels to a terminal stream; hidden writes go to `debug!`.
pub struct TerminalSink<W> {
    out: Mutex<W>,
}

impl TerminalSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> OutputSink for TerminalSink<W> {
    fn write(&self, channel: &str, text: &str, show: bool) {
        if !show {
            debug!(channel, lines = text.lines().count(), "channel updated");
            return;
        }
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let result = writeln!(out, "=== {channel} ===")
            .and_then(|()| writeln!(out, "{}", text.trim_end()))
            .and_then(|()| out.flush());
        if let Err(err) = result {
            warn!(channel, err = %err, "failed to write channel output");
        }
    }

    fn clear(&self, channel: &str) {
        debug!(channel, "channel cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shown_channel_is_printed_with_header() {
        let sink = TerminalSink::new(Vec::new());
        sink.write("CodeRoad (Tests)", "SyntaxError: unexpected token\n", true);
        let printed = String::from_utf8(sink.into_inner()).expect("utf8");
        assert_eq!(
            printed,
            "=== CodeRoad (Tests) ===\nSyntaxError: unexpected token\n"
        );
    }

    #[test]
    fn hidden_channel_and_clear_print_nothing() {
        let sink = TerminalSink::new(Vec::new());
        apply_effects(
            &sink,
            &[
                ChannelEffect::Write {
                    channel: "CodeRoad (Logs)".to_string(),
                    text: "log line".to_string(),
                    show: false,
                },
                ChannelEffect::Clear {
                    channel: "CodeRoad (Tests)".to_string(),
                },
            ],
        );
        assert!(sink.into_inner().is_empty());
    }
}
