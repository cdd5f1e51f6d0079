//! Incremental `text/event-stream` parser.
//!
//! Bytes arrive in arbitrary chunks. [`EventParser`] splits them into lines
//! (`\r\n`, `\n` or a lone `\r`), collects the lines of the current frame and,
//! on every blank line, turns the frame into a [`ServerSentEvent`] via
//! [`process_event`].

use crate::types::ServerSentEvent;
use tracing::{debug, trace, warn};

const CR: u8 = b'\r';
const LF: u8 = b'\n';
const BOM: char = '\u{feff}';

/// Field names understood by the parser. Matching is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Event,
    Data,
    Id,
    Retry,
    Unknown,
}

impl Field {
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("event") {
            Self::Event
        } else if name.eq_ignore_ascii_case("data") {
            Self::Data
        } else if name.eq_ignore_ascii_case("id") {
            Self::Id
        } else if name.eq_ignore_ascii_case("retry") {
            Self::Retry
        } else {
            Self::Unknown
        }
    }
}

/// One physical, non-empty line of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// Text after the leading `:`.
    Comment(&'a str),
    Field { name: &'a str, value: &'a str },
}

/// Split a line at its first `:`. One leading space of the value is dropped;
/// a line without `:` is a field name with an empty value.
pub fn parse_line(line: &str) -> Line<'_> {
    match line.split_once(':') {
        Some(("", comment)) => Line::Comment(comment),
        Some((name, value)) => Line::Field {
            name,
            value: value.strip_prefix(' ').unwrap_or(value),
        },
        None => Line::Field {
            name: line,
            value: "",
        },
    }
}

/// Interpret the buffered fragments of one frame as a single event.
///
/// Each fragment may hold several lines (`\n` or `\r\n` terminated); empty
/// lines are skipped. Unknown fields and unparseable `retry` values are
/// logged and ignored. The returned event is empty when no recognized field
/// was present.
pub fn process_event<S: AsRef<str>>(fragments: &[S]) -> ServerSentEvent {
    let mut event: Option<ServerSentEvent> = None;

    for fragment in fragments {
        for line in fragment.as_ref().lines().filter(|l| !l.is_empty()) {
            apply_line(&mut event, line);
        }
    }

    trace!("Event received");
    event.unwrap_or_default()
}

fn apply_line(event: &mut Option<ServerSentEvent>, line: &str) {
    let (name, value) = match parse_line(line) {
        Line::Comment(comment) => {
            trace!("Comment received: {}", comment);
            return;
        }
        Line::Field { name, value } => (name, value),
    };

    match Field::from_name(name) {
        Field::Event => {
            event.get_or_insert_with(Default::default).event_type = Some(value.to_string());
        }
        Field::Data => {
            let event = event.get_or_insert_with(Default::default);
            event.data.push_str(value);
            event.data.push('\n');
        }
        Field::Id => {
            if value.contains('\0') {
                debug!("Ignoring id containing NUL: {:?}", value);
            } else {
                event.get_or_insert_with(Default::default).last_event_id = Some(value.to_string());
            }
        }
        Field::Retry => match parse_retry(value) {
            Some(ms) => event.get_or_insert_with(Default::default).retry = Some(ms),
            None => debug!("Ignoring invalid retry value: {}", value),
        },
        Field::Unknown => warn!("Unknown line received: {}", line),
    }
}

/// `retry` takes ASCII digits only; signs and whitespace are rejected.
fn parse_retry(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Streaming parser state for one connection.
///
/// Holds the bytes of the unterminated line and the completed lines of the
/// current frame. A new connection must start from a fresh parser.
#[derive(Debug, Default)]
pub struct EventParser {
    /// Bytes of the current line, not yet terminated.
    partial: Vec<u8>,
    /// Completed lines of the current frame.
    frame: Vec<String>,
    /// The previous chunk ended in `\r`; a leading `\n` belongs to it.
    skip_lf: bool,
    /// At least one line has been completed on this stream.
    started: bool,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, calling `on_event` for every frame it completes.
    /// Returns the number of events delivered.
    pub fn feed<F: FnMut(ServerSentEvent)>(&mut self, chunk: &[u8], mut on_event: F) -> usize {
        let mut rest = chunk;
        let mut delivered = 0;

        if self.skip_lf && !rest.is_empty() {
            if rest[0] == LF {
                rest = &rest[1..];
            }
            self.skip_lf = false;
        }

        while let Some(pos) = rest.iter().position(|&b| b == CR || b == LF) {
            self.partial.extend_from_slice(&rest[..pos]);
            let terminator = rest[pos];
            rest = &rest[pos + 1..];

            if terminator == CR {
                match rest.first() {
                    Some(&LF) => rest = &rest[1..],
                    Some(_) => {}
                    None => self.skip_lf = true,
                }
            }

            if self.end_line() {
                self.dispatch(&mut on_event);
                delivered += 1;
            }
        }

        self.partial.extend_from_slice(rest);
        delivered
    }

    /// True when nothing is buffered for the current frame.
    pub fn is_idle(&self) -> bool {
        self.partial.is_empty() && self.frame.is_empty()
    }

    /// Finish the current line. Returns `true` when it was blank, i.e. the
    /// frame is complete.
    fn end_line(&mut self) -> bool {
        let mut line = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();

        if !self.started {
            self.started = true;
            if line.starts_with(BOM) {
                line.replace_range(..BOM.len_utf8(), "");
            }
        }

        if line.is_empty() {
            return true;
        }
        self.frame.push(line);
        false
    }

    fn dispatch<F: FnMut(ServerSentEvent)>(&mut self, on_event: &mut F) {
        let frame = std::mem::take(&mut self.frame);
        on_event(process_event(&frame));
    }
}
