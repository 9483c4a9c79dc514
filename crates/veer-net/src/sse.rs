//! Server-Sent Events
//!
//! Incremental `text/event-stream` decoding. Stream sources push raw
//! chunks in and get complete messages out.

/// One dispatched event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: String,
    pub data: String,
    pub last_event_id: String,
}

/// Buffers partial lines across chunks and assembles fields into events
#[derive(Debug, Default)]
pub struct EventStreamParser {
    pending: String,
    event_type: Option<String>,
    data: Vec<String>,
    last_event_id: String,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return every event it completes
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.pending.push_str(chunk);
        let mut events = Vec::new();
        while let Some(end) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=end).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Id of the last event seen, for reconnection
    pub fn last_event_id(&self) -> &str {
        &self.last_event_id
    }

    fn line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        let (field, value) = match line.split_once(':') {
            Some(("", _)) => return None,
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.last_event_id = value.to_string(),
            // retry is a reconnection hint; sources reconnect on their own schedule
            _ => {}
        }
        None
    }

    /// A blank line ends the event. Events without data are dropped.
    fn dispatch(&mut self) -> Option<SseEvent> {
        let event_type = self.event_type.take().unwrap_or_else(|| "message".to_string());
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent { event_type, data, last_event_id: self.last_event_id.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_event() {
        let mut parser = EventStreamParser::new();
        let events = parser.feed("event: update\ndata: hello\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "update");
        assert_eq!(events[0].data, "hello");

        let next = parser.feed("data: plain\n\n");
        assert_eq!(next[0].event_type, "message");
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut parser = EventStreamParser::new();
        let events = parser.feed(": keepalive\n\ndata: <a>\r\ndata:</a>\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "<a>\n</a>");
    }

    #[test]
    fn test_parser_handles_split_chunks() {
        let mut parser = EventStreamParser::new();
        assert!(parser.feed("id: 7\ndata: <veer-str").is_empty());
        let events = parser.feed("eam></veer-stream>\n\ndata: two\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "<veer-stream></veer-stream>");
        assert_eq!(events[0].last_event_id, "7");
        assert_eq!(events[1].data, "two");
        assert_eq!(parser.last_event_id(), "7");
    }
}
