//! Bounded newest-first scrolling buffer for the live tail view.

use std::collections::VecDeque;

use logdash_core::config::DEFAULT_BUFFER_CAPACITY;

/// Status family of a raw access-log line, used to color the tail view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Success,
    Redirect,
    ClientError,
    ServerError,
    Other,
}

impl StatusClass {
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            300..=399 => Self::Redirect,
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Other,
        }
    }

    /// Classify a combined-format line by the status that follows the quoted
    /// request (`"GET / HTTP/1.1" 404 ...`).
    pub fn of_line(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if !token.ends_with('"') {
                continue;
            }
            if let Some(status) = tokens.clone().next().and_then(parse_status) {
                return Self::from_status(status);
            }
        }
        Self::Other
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "2xx",
            Self::Redirect => "3xx",
            Self::ClientError => "4xx",
            Self::ServerError => "5xx",
            Self::Other => "other",
        }
    }
}

fn parse_status(token: &str) -> Option<u16> {
    if token.len() != 3 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// One raw line in the tail view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailLine {
    pub text: String,
    pub status: StatusClass,
}

impl TailLine {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let status = StatusClass::of_line(&text);
        Self { text, status }
    }
}

/// Newest-first sequence of tail lines, never longer than its capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollingBuffer {
    lines: VecDeque<TailLine>,
    capacity: usize,
}

impl Default for ScrollingBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }
}

impl ScrollingBuffer {
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Prepend each line in the order received, then evict from the tail.
    ///
    /// The last line of `batch` ends up at the head.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = TailLine>) {
        for line in batch {
            self.lines.push_front(line);
        }
        self.lines.truncate(self.capacity);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Lines, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &TailLine> {
        self.lines.iter()
    }

    pub fn to_vec(&self) -> Vec<TailLine> {
        self.lines.iter().cloned().collect()
    }
}
