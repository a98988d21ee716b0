//! Terminal output for streamed replies.
//!
//! The stream driver talks to a [`Renderer`]: in append mode it hands over
//! each fragment once, in arrival order; in refresh mode it hands over full
//! snapshots and the renderer replaces what it drew before.
//! `TerminalRenderer<W: Write>` is the ANSI implementation used by the CLI;
//! `RecordingRenderer` captures calls for tests.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crossterm::cursor::{MoveToColumn, MoveUp};
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use gt_protocol::{ChatMessage, FragmentKind, Role};
use serde::Deserialize;

use crate::assembler::format_citations;
use crate::style::{format_tokens, wrapped_rows, Style, Tone};

/// Presentation style of an appended fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleTag {
    Thinking,
    Reply,
}

impl From<FragmentKind> for StyleTag {
    fn from(kind: FragmentKind) -> Self {
        match kind {
            FragmentKind::Reasoning => StyleTag::Thinking,
            FragmentKind::Content => StyleTag::Reply,
        }
    }
}

/// How a stream is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Each fragment is written once and never rewritten (raw mode).
    Append,
    /// Each snapshot replaces the previously drawn view.
    Refresh,
}

impl RenderMode {
    pub fn from_raw(raw: bool) -> Self {
        if raw {
            RenderMode::Append
        } else {
            RenderMode::Refresh
        }
    }
}

/// What refresh mode does with a view taller than the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Overflow {
    /// Show the top of the view and a `...` line.
    #[default]
    Ellipsis,
    /// Show the top of the view only.
    Crop,
    /// Draw everything; rows scrolled off screen cannot be redrawn.
    Visible,
}

impl FromStr for Overflow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ellipsis" => Ok(Overflow::Ellipsis),
            "crop" => Ok(Overflow::Crop),
            "visible" => Ok(Overflow::Visible),
            other => Err(format!(
                "unknown overflow mode '{other}' (expected ellipsis, crop or visible)"
            )),
        }
    }
}

impl fmt::Display for Overflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Overflow::Ellipsis => "ellipsis",
            Overflow::Crop => "crop",
            Overflow::Visible => "visible",
        };
        f.write_str(name)
    }
}

/// Display capability consumed by the stream driver.
pub trait Renderer {
    /// Append-only output of one fragment.
    fn emit_append(&mut self, text: &str, style: StyleTag);
    /// Replace the current view with `full_text`.
    fn emit_snapshot(&mut self, full_text: &str);
    /// The stream is over; the current view becomes permanent.
    fn emit_stream_end(&mut self);
}

/// ANSI terminal renderer.
pub struct TerminalRenderer<W: Write> {
    pub writer: W,
    style: Style,
    width: u16,
    height: u16,
    overflow: Overflow,
    /// Rows occupied by the live view, erased before the next snapshot.
    drawn_rows: usize,
    /// Full text of the last snapshot when it did not fit the terminal.
    clipped_view: Option<String>,
    last_tag: Option<StyleTag>,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(writer: W, style: Style) -> Self {
        let (width, height) = crossterm::terminal::size().unwrap_or((80, 24));
        Self::with_size(writer, style, width, height)
    }

    pub fn with_size(writer: W, style: Style, width: u16, height: u16) -> Self {
        Self {
            writer,
            style,
            width: width.max(1),
            height: height.max(3),
            overflow: Overflow::default(),
            drawn_rows: 0,
            clipped_view: None,
            last_tag: None,
        }
    }

    pub fn set_overflow(&mut self, overflow: Overflow) {
        self.overflow = overflow;
    }

    pub fn overflow(&self) -> Overflow {
        self.overflow
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    /// `AI: ` label printed before a reply.
    pub fn emit_reply_label(&mut self) {
        self.last_tag = None;
        let _ = writeln!(self.writer, "{}", self.style.paint(Tone::BoldCyan, "AI: "));
        let _ = self.writer.flush();
    }

    /// Print a stored message, e.g. when replaying a loaded conversation.
    pub fn emit_message(&mut self, message: &ChatMessage) {
        match message.role {
            Role::System => {}
            Role::User => {
                let _ = writeln!(self.writer, "> {}", message.content);
            }
            Role::Assistant => {
                let _ = write!(self.writer, "{}", self.style.paint(Tone::BoldCyan, "AI: "));
                let _ = writeln!(self.writer, "{}", message.content);
                if let Some(citations) = &message.citations {
                    let block = format_citations(citations);
                    let _ = writeln!(self.writer, "{}", block.trim_start_matches('\n'));
                }
            }
        }
        let _ = self.writer.flush();
    }

    /// Informational line (dim).
    pub fn emit_notice(&mut self, msg: &str) {
        let _ = writeln!(self.writer, "{}", self.style.paint(Tone::Dim, msg));
        let _ = self.writer.flush();
    }

    /// Confirmation line (green).
    pub fn emit_success(&mut self, msg: &str) {
        let _ = writeln!(self.writer, "{}", self.style.paint(Tone::Green, msg));
        let _ = self.writer.flush();
    }

    /// Warning line (yellow).
    pub fn emit_warning(&mut self, msg: &str) {
        let _ = writeln!(self.writer, "{}", self.style.paint(Tone::Yellow, msg));
        let _ = self.writer.flush();
    }

    /// Show an error: `[gpt-term] error: msg`
    pub fn emit_error(&mut self, msg: &str) {
        let line = format!("[gpt-term] error: {msg}");
        let _ = writeln!(self.writer, "{}", self.style.paint(Tone::Red, &line));
        let _ = self.writer.flush();
    }

    /// Shown when the user interrupts a reply.
    pub fn emit_cancelled(&mut self) {
        let _ = writeln!(self.writer, "{}", self.style.paint(Tone::Dim, "Aborted."));
        let _ = self.writer.flush();
    }

    /// Token summary printed on exit.
    pub fn emit_tokens_spent(&mut self, tokens: usize) {
        let line = format!("Total tokens spent: {}", format_tokens(tokens));
        let _ = writeln!(self.writer, "{}", self.style.paint(Tone::Bold, &line));
        let _ = self.writer.flush();
    }

    /// Erase the live view drawn by the previous snapshot.
    fn erase_view(&mut self) {
        if self.drawn_rows == 0 {
            return;
        }
        let up = u16::try_from(self.drawn_rows - 1).unwrap_or(u16::MAX);
        let _ = queue!(self.writer, MoveToColumn(0));
        if up > 0 {
            let _ = queue!(self.writer, MoveUp(up));
        }
        let _ = queue!(self.writer, Clear(ClearType::FromCursorDown));
        self.drawn_rows = 0;
    }

    /// Lines of `text` that fit the terminal under the overflow policy,
    /// with the rows they occupy.
    fn fit_lines<'a>(&self, text: &'a str) -> (Vec<&'a str>, usize, bool) {
        let budget = usize::from(self.height) - 1;
        let mut lines = Vec::new();
        let mut rows = 0;
        for line in text.split('\n') {
            let line_rows = wrapped_rows(line, self.width);
            if self.overflow != Overflow::Visible && rows + line_rows > budget {
                return (lines, rows, true);
            }
            rows += line_rows;
            lines.push(line);
        }
        (lines, rows, false)
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn emit_append(&mut self, text: &str, style: StyleTag) {
        if self.last_tag == Some(StyleTag::Thinking) && style == StyleTag::Reply {
            let _ = write!(self.writer, "\n\n");
        }
        self.last_tag = Some(style);
        match style {
            StyleTag::Thinking => {
                let _ = write!(self.writer, "{}", self.style.paint(Tone::Yellow, text));
            }
            StyleTag::Reply => {
                let _ = write!(self.writer, "{text}");
            }
        }
        let _ = self.writer.flush();
    }

    fn emit_snapshot(&mut self, full_text: &str) {
        self.erase_view();

        let (mut lines, mut rows, truncated) = self.fit_lines(full_text);
        if truncated && self.overflow == Overflow::Ellipsis {
            // Make room for the ellipsis row.
            let budget = usize::from(self.height) - 1;
            while rows + 1 > budget {
                match lines.pop() {
                    Some(line) => rows -= wrapped_rows(line, self.width),
                    None => break,
                }
            }
        }

        let _ = write!(self.writer, "{}", lines.join("\n"));
        if truncated && self.overflow == Overflow::Ellipsis {
            let _ = write!(self.writer, "\n{}", self.style.paint(Tone::Dim, "..."));
            rows += 1;
        }
        let _ = self.writer.flush();
        self.drawn_rows = rows.max(1);
        self.clipped_view = truncated.then(|| full_text.to_string());
    }

    fn emit_stream_end(&mut self) {
        // The final view is printed in full, even if taller than the terminal.
        if let Some(full_text) = self.clipped_view.take() {
            self.erase_view();
            let _ = write!(self.writer, "{full_text}");
        }
        let _ = writeln!(self.writer);
        let _ = self.writer.flush();
        self.drawn_rows = 0;
        self.last_tag = None;
    }
}

/// A call received by [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCall {
    Append { text: String, style: StyleTag },
    Snapshot(String),
    End,
}

/// Renderer that records every call, for tests.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub calls: Vec<RenderCall>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenation of all appended text.
    pub fn appended(&self) -> String {
        self.calls
            .iter()
            .filter_map(|call| match call {
                RenderCall::Append { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn snapshots(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                RenderCall::Snapshot(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn last_snapshot(&self) -> Option<&str> {
        self.snapshots().last().copied()
    }
}

impl Renderer for RecordingRenderer {
    fn emit_append(&mut self, text: &str, style: StyleTag) {
        self.calls.push(RenderCall::Append {
            text: text.to_string(),
            style,
        });
    }

    fn emit_snapshot(&mut self, full_text: &str) {
        self.calls.push(RenderCall::Snapshot(full_text.to_string()));
    }

    fn emit_stream_end(&mut self) {
        self.calls.push(RenderCall::End);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_renderer(style: Style) -> TerminalRenderer<Vec<u8>> {
        TerminalRenderer::with_size(Vec::new(), style, 20, 6)
    }

    fn output_str(r: &TerminalRenderer<Vec<u8>>) -> String {
        String::from_utf8_lossy(&r.writer).to_string()
    }

    #[test]
    fn append_mode_writes_fragments_verbatim() {
        let mut r = make_renderer(Style::disabled());
        r.emit_append("Hello", StyleTag::Reply);
        r.emit_append(" world", StyleTag::Reply);
        assert_eq!(output_str(&r), "Hello world");
    }

    #[test]
    fn append_mode_colors_thinking_and_separates_reply() {
        let mut r = make_renderer(Style::force_enabled());
        r.emit_append("hmm", StyleTag::Thinking);
        r.emit_append("answer", StyleTag::Reply);
        assert_eq!(output_str(&r), "\x1b[33mhmm\x1b[0m\n\nanswer");
    }

    #[test]
    fn first_snapshot_draws_without_erasing() {
        let mut r = make_renderer(Style::disabled());
        r.emit_snapshot("line one");
        assert_eq!(output_str(&r), "line one");
    }

    #[test]
    fn second_snapshot_erases_previous_view() {
        let mut r = make_renderer(Style::disabled());
        r.emit_snapshot("a\nb");
        r.writer.clear();
        r.emit_snapshot("a\nbc");

        let out = output_str(&r);
        // column 0, up one row, clear to end of screen, redraw
        assert!(out.starts_with("\x1b[1G\x1b[1A\x1b[J"), "got {out:?}");
        assert!(out.ends_with("a\nbc"));
    }

    #[test]
    fn single_row_view_erases_without_moving_up() {
        let mut r = make_renderer(Style::disabled());
        r.emit_snapshot("abc");
        r.writer.clear();
        r.emit_snapshot("abcd");
        assert_eq!(output_str(&r), "\x1b[1G\x1b[Jabcd");
    }

    #[test]
    fn stream_end_makes_view_permanent() {
        let mut r = make_renderer(Style::disabled());
        r.emit_snapshot("done");
        r.emit_stream_end();
        r.writer.clear();
        r.emit_snapshot("next");
        assert_eq!(output_str(&r), "next");
    }

    #[test]
    fn stream_end_prints_clipped_view_in_full() {
        let mut r = make_renderer(Style::disabled());
        r.emit_snapshot("1\n2\n3\n4\n5\n6\n7\n8");
        r.emit_stream_end();
        // the live view (five rows) is erased, then everything is printed
        assert_eq!(
            output_str(&r),
            "1\n2\n3\n4\n...\x1b[1G\x1b[4A\x1b[J1\n2\n3\n4\n5\n6\n7\n8\n"
        );
    }

    #[test]
    fn stream_end_after_cropped_view_prints_full_text() {
        let mut r = make_renderer(Style::disabled());
        r.set_overflow(Overflow::Crop);
        r.emit_snapshot("a\nb\nc\nd\ne\nf\ng");
        r.emit_snapshot("a\nb\nc\nd\ne\nf\ng\nh");
        r.writer.clear();
        r.emit_stream_end();
        assert!(output_str(&r).ends_with("a\nb\nc\nd\ne\nf\ng\nh\n"));
    }

    #[test]
    fn stream_end_does_not_redraw_fitting_view() {
        let mut r = make_renderer(Style::disabled());
        r.emit_snapshot("short");
        r.emit_stream_end();
        assert_eq!(output_str(&r), "short\n");
    }

    #[test]
    fn overflow_ellipsis_truncates_tall_views() {
        let mut r = make_renderer(Style::disabled());
        r.emit_snapshot("1\n2\n3\n4\n5\n6\n7\n8");
        // height 6: five usable rows, four lines plus the ellipsis row
        assert_eq!(output_str(&r), "1\n2\n3\n4\n...");
    }

    #[test]
    fn overflow_crop_truncates_without_marker() {
        let mut r = make_renderer(Style::disabled());
        r.set_overflow(Overflow::Crop);
        r.emit_snapshot("1\n2\n3\n4\n5\n6\n7\n8");
        assert_eq!(output_str(&r), "1\n2\n3\n4\n5");
    }

    #[test]
    fn overflow_visible_draws_everything() {
        let mut r = make_renderer(Style::disabled());
        r.set_overflow(Overflow::Visible);
        r.emit_snapshot("1\n2\n3\n4\n5\n6\n7\n8");
        assert_eq!(output_str(&r), "1\n2\n3\n4\n5\n6\n7\n8");
    }

    #[test]
    fn wrapped_lines_count_as_multiple_rows() {
        let mut r = make_renderer(Style::disabled());
        r.emit_snapshot(&"x".repeat(45));
        r.writer.clear();
        r.emit_snapshot("y");
        // 45 columns at width 20 is three rows: move up two
        assert!(output_str(&r).starts_with("\x1b[1G\x1b[2A\x1b[J"));
    }

    #[test]
    fn overflow_parse_and_display() {
        assert_eq!("Crop".parse::<Overflow>().unwrap(), Overflow::Crop);
        assert_eq!(" visible ".parse::<Overflow>().unwrap(), Overflow::Visible);
        assert!("scroll".parse::<Overflow>().is_err());
        assert_eq!(Overflow::Ellipsis.to_string(), "ellipsis");
    }

    #[test]
    fn render_mode_from_raw_flag() {
        assert_eq!(RenderMode::from_raw(true), RenderMode::Append);
        assert_eq!(RenderMode::from_raw(false), RenderMode::Refresh);
    }

    #[test]
    fn message_replay_prints_citations() {
        let mut r = make_renderer(Style::disabled());
        r.emit_message(&ChatMessage::user("question"));
        r.emit_message(
            &ChatMessage::assistant("answer").with_citations(Some(vec!["https://a".into()])),
        );
        assert_eq!(
            output_str(&r),
            "> question\nAI: answer\n> Citations:  \n\n[1] https://a  \n\n"
        );
    }

    #[test]
    fn system_messages_are_not_replayed() {
        let mut r = make_renderer(Style::disabled());
        r.emit_message(&ChatMessage::system("You are a helpful assistant."));
        assert_eq!(output_str(&r), "");
    }

    #[test]
    fn error_and_cancel_lines() {
        let mut r = make_renderer(Style::disabled());
        r.emit_error("timeout");
        r.emit_cancelled();
        assert_eq!(output_str(&r), "[gpt-term] error: timeout\nAborted.\n");
    }

    #[test]
    fn recording_renderer_collects_calls() {
        let mut r = RecordingRenderer::new();
        r.emit_append("a", StyleTag::Thinking);
        r.emit_snapshot("snap");
        r.emit_append("b", StyleTag::Reply);
        r.emit_stream_end();

        assert_eq!(r.appended(), "ab");
        assert_eq!(r.snapshots(), vec!["snap"]);
        assert_eq!(r.last_snapshot(), Some("snap"));
        assert_eq!(r.calls.last(), Some(&RenderCall::End));
    }
}
