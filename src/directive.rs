//! Streaming directive interceptor.
//!
//! The model is instructed to embed memory directives in its reply, e.g.
//! `<<<SAVE_MEMORY:favourite_drink|User likes tea.>>>`. Replies arrive one
//! token at a time and a marker can be split across any number of tokens, so
//! the interceptor runs a small state machine over an accumulating buffer:
//!
//! | State        | Input                              | Action                                              | Next        |
//! |--------------|------------------------------------|-----------------------------------------------------|-------------|
//! | `Scanning`   | start marker found at `i`          | flush `buffer[..i]`, drop it from the buffer        | `Collecting`|
//! | `Scanning`   | no marker, tail may begin a marker | flush everything before the tail                    | `Scanning`  |
//! | `Collecting` | end marker found after the start   | emit directive (or drop a malformed body)           | `Scanning`  |
//! | `Collecting` | no end marker                      | wait for more input                                 | `Collecting`|
//! | `Scanning`   | end of stream                      | flush the remaining buffer                          | done        |
//! | `Collecting` | end of stream                      | discard the unterminated directive                  | done        |
//!
//! Directive syntax never reaches a [`InterceptEvent::Passthrough`] event.

use crate::memory::normalize_title;

/// Start marker for an explicit save.
pub const SAVE_MARKER: &str = "<<<SAVE_MEMORY:";
/// Start marker for a suggestion that needs user confirmation.
pub const SUGGEST_MARKER: &str = "<<<SUGGEST_MEMORY:";
/// Shared end marker.
pub const END_MARKER: &str = ">>>";
/// Separates the title from the content inside a directive body.
pub const SEPARATOR: char = '|';

/// The kind of memory side effect a directive requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    /// Persist immediately.
    Save,
    /// Notify only; persistence needs an explicit confirmation.
    Suggest,
}

impl DirectiveKind {
    const ALL: [Self; 2] = [Self::Save, Self::Suggest];

    /// Literal start marker for this kind.
    #[must_use]
    pub fn start_marker(self) -> &'static str {
        match self {
            Self::Save => SAVE_MARKER,
            Self::Suggest => SUGGEST_MARKER,
        }
    }

    fn max_marker_len() -> usize {
        Self::ALL
            .iter()
            .map(|k| k.start_marker().len())
            .max()
            .unwrap_or_default()
    }
}

/// A directive extracted from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveRecord {
    pub kind: DirectiveKind,
    /// Normalized title (see [`normalize_title`]).
    pub title: String,
    pub content: String,
}

/// Output of the interceptor, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptEvent {
    /// Text that is free of directive syntax.
    Passthrough(String),
    /// A complete, well-formed directive.
    Directive(DirectiveRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Scanning,
    /// The buffer starts with the start marker of this kind.
    Collecting(DirectiveKind),
}

/// Incremental parser for one streamed reply.
///
/// Feed tokens with [`push`](Self::push) and end the stream with
/// [`finish`](Self::finish). The interceptor never fails; malformed or
/// unterminated directives are dropped.
#[derive(Debug)]
pub struct DirectiveInterceptor {
    buffer: String,
    mode: Mode,
}

impl Default for DirectiveInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveInterceptor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            mode: Mode::Scanning,
        }
    }

    /// Whether a directive is currently being collected.
    #[must_use]
    pub fn is_collecting(&self) -> bool {
        matches!(self.mode, Mode::Collecting(_))
    }

    /// Number of bytes currently withheld.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one fragment and return the events it completes.
    pub fn push(&mut self, fragment: &str) -> Vec<InterceptEvent> {
        self.buffer.push_str(fragment);
        let mut events = Vec::new();

        loop {
            match self.mode {
                Mode::Scanning => {
                    if let Some((pos, kind)) = find_start_marker(&self.buffer) {
                        if pos > 0 {
                            let text: String = self.buffer.drain(..pos).collect();
                            events.push(InterceptEvent::Passthrough(text));
                        }
                        self.mode = Mode::Collecting(kind);
                        continue;
                    }

                    let keep = held_back_suffix_len(&self.buffer);
                    let flush_to = self.buffer.len() - keep;
                    if flush_to > 0 {
                        let text: String = self.buffer.drain(..flush_to).collect();
                        events.push(InterceptEvent::Passthrough(text));
                    }
                    break;
                }
                Mode::Collecting(kind) => {
                    let body_start = kind.start_marker().len();
                    let Some(rel_end) = self.buffer[body_start..].find(END_MARKER) else {
                        break;
                    };
                    let body_end = body_start + rel_end;

                    if let Some(directive) = parse_body(kind, &self.buffer[body_start..body_end]) {
                        events.push(InterceptEvent::Directive(directive));
                    } else {
                        tracing::debug!(
                            kind = ?kind,
                            body_length = body_end - body_start,
                            "Dropping malformed directive body"
                        );
                    }

                    self.buffer.drain(..body_end + END_MARKER.len());
                    self.mode = Mode::Scanning;
                }
            }
        }

        events
    }

    /// Signal end of stream and flush whatever can still be emitted.
    pub fn finish(self) -> Vec<InterceptEvent> {
        match self.mode {
            Mode::Scanning if !self.buffer.is_empty() => {
                vec![InterceptEvent::Passthrough(self.buffer)]
            }
            Mode::Scanning => Vec::new(),
            Mode::Collecting(kind) => {
                tracing::warn!(
                    kind = ?kind,
                    discarded_length = self.buffer.len(),
                    "Discarding unterminated directive at end of stream"
                );
                Vec::new()
            }
        }
    }
}

/// Earliest-starting start marker in `buffer`.
fn find_start_marker(buffer: &str) -> Option<(usize, DirectiveKind)> {
    DirectiveKind::ALL
        .iter()
        .filter_map(|&kind| buffer.find(kind.start_marker()).map(|pos| (pos, kind)))
        .min_by_key(|&(pos, _)| pos)
}

/// Length in bytes of the longest suffix of `buffer` that is a proper prefix
/// of some start marker. Always below `max_marker_len()` characters.
fn held_back_suffix_len(buffer: &str) -> usize {
    let longest = DirectiveKind::max_marker_len().saturating_sub(1);
    let upper = longest.min(buffer.len());

    (1..=upper)
        .rev()
        .find(|&n| {
            let start = buffer.len() - n;
            buffer.is_char_boundary(start)
                && DirectiveKind::ALL
                    .iter()
                    .any(|k| k.start_marker().starts_with(&buffer[start..]))
        })
        .unwrap_or(0)
}

fn parse_body(kind: DirectiveKind, body: &str) -> Option<DirectiveRecord> {
    let (raw_title, content) = body.split_once(SEPARATOR)?;
    let title = normalize_title(raw_title);
    if title.is_empty() {
        return None;
    }
    Some(DirectiveRecord {
        kind,
        title,
        content: content.trim().to_string(),
    })
}
