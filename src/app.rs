use chrono::Utc;
use ratatui::layout::Rect;

use crate::exchange::{AnswerClient, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

/// A transcript entry. Never mutated once pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub content: String,
    pub sender: Sender,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub transcript: Vec<Message>,
    pub input: String,
    pub cursor: usize,
    pub pending: bool,

    // Chat view layout, updated during render
    pub scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub chat_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8, // 0-2 for the overlay ellipsis

    pub client: AnswerClient,

    // Id of the last message the view was scrolled to
    scroll_anchor: Option<i64>,
    last_id: i64,
}

impl App {
    pub fn new(client: AnswerClient) -> Self {
        Self {
            should_quit: false,
            transcript: Vec::new(),
            input: String::new(),
            cursor: 0,
            pending: false,

            scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,

            animation_frame: 0,

            client,

            scroll_anchor: None,
            last_id: 0,
        }
    }

    /// Take the input line as a user message.
    ///
    /// Returns the prompt to send, or `None` when the input is blank, in
    /// which case nothing changes.
    pub fn submit(&mut self) -> Option<String> {
        if self.input.trim().is_empty() {
            return None;
        }

        let prompt = std::mem::take(&mut self.input);
        self.cursor = 0;
        self.push_message(Sender::User, prompt.clone());
        Some(prompt)
    }

    pub fn begin_exchange(&mut self) {
        self.pending = true;
    }

    /// Record the result of an exchange and leave the pending state.
    pub fn complete_exchange(&mut self, outcome: &Outcome) {
        self.push_message(Sender::Assistant, outcome.text().to_string());
        self.pending = false;
    }

    pub fn last_message_id(&self) -> Option<i64> {
        self.transcript.last().map(|msg| msg.id)
    }

    fn push_message(&mut self, sender: Sender, content: String) {
        let id = self.next_id();
        self.transcript.push(Message { id, content, sender });
    }

    // Millisecond timestamps, bumped past the previous id on collision
    fn next_id(&mut self) -> i64 {
        let id = Utc::now().timestamp_millis().max(self.last_id + 1);
        self.last_id = id;
        id
    }

    /// Post-layout hook: scroll to the newest message if the transcript
    /// changed since the last call. `content_lines` is the wrapped height of
    /// the transcript as the renderer lays it out. Returns whether it scrolled.
    pub fn sync_scroll(&mut self, content_lines: usize) -> bool {
        let last = self.last_message_id();
        if last == self.scroll_anchor {
            return false;
        }

        self.scroll_anchor = last;
        self.scroll_to_bottom(content_lines);
        true
    }

    pub fn scroll_to_bottom(&mut self, content_lines: usize) {
        let total_lines = u16::try_from(content_lines).unwrap_or(u16::MAX);
        self.scroll = total_lines.saturating_sub(self.chat_height);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_add(lines);
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up((self.chat_height / 2).max(1));
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down((self.chat_height / 2).max(1));
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.pending {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{CONNECTION_ERROR_TEXT, DEFAULT_ENDPOINT};

    fn test_app() -> App {
        App::new(AnswerClient::new(DEFAULT_ENDPOINT))
    }

    #[test]
    fn test_submit_blank_input_is_ignored() {
        let mut app = test_app();

        assert_eq!(app.submit(), None);

        app.input = "   \t ".to_string();
        app.cursor = 5;
        assert_eq!(app.submit(), None);

        assert!(app.transcript.is_empty());
        assert_eq!(app.input, "   \t ");
        assert!(!app.pending);
    }

    #[test]
    fn test_submit_appends_user_message_and_clears_input() {
        let mut app = test_app();
        app.input = "  hello there ".to_string();
        app.cursor = 14;

        let prompt = app.submit();

        assert_eq!(prompt.as_deref(), Some("  hello there "));
        assert_eq!(app.transcript.len(), 1);
        assert_eq!(app.transcript[0].sender, Sender::User);
        assert_eq!(app.transcript[0].content, "  hello there ");
        assert!(app.input.is_empty());
        assert_eq!(app.cursor, 0);
    }

    #[test]
    fn test_exchange_lifecycle_toggles_pending() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.submit();

        app.begin_exchange();
        assert!(app.pending);

        app.complete_exchange(&Outcome::Success("hello".to_string()));

        assert!(!app.pending);
        assert_eq!(app.transcript.len(), 2);
        assert_eq!(app.transcript[1].sender, Sender::Assistant);
        assert_eq!(app.transcript[1].content, "hello");
    }

    #[test]
    fn test_transport_error_becomes_assistant_message() {
        let mut app = test_app();
        app.begin_exchange();

        app.complete_exchange(&Outcome::TransportError);

        assert!(!app.pending);
        assert_eq!(app.transcript[0].content, CONNECTION_ERROR_TEXT);
    }

    #[test]
    fn test_sequential_exchanges_alternate_in_order() {
        let mut app = test_app();

        for i in 0..5 {
            app.input = format!("question {}", i);
            app.submit();
            app.begin_exchange();
            app.complete_exchange(&Outcome::Success(format!("answer {}", i)));
        }

        assert_eq!(app.transcript.len(), 10);
        for (i, pair) in app.transcript.chunks(2).enumerate() {
            assert_eq!(pair[0].sender, Sender::User);
            assert_eq!(pair[0].content, format!("question {}", i));
            assert_eq!(pair[1].sender, Sender::Assistant);
            assert_eq!(pair[1].content, format!("answer {}", i));
        }
    }

    #[test]
    fn test_message_ids_are_unique_and_increasing() {
        let mut app = test_app();

        for _ in 0..50 {
            app.input = "x".to_string();
            app.submit();
        }

        let ids: Vec<i64> = app.transcript.iter().map(|m| m.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_overlapping_exchange_clears_pending_on_first_reply() {
        let mut app = test_app();
        app.input = "one".to_string();
        app.submit();
        app.begin_exchange();
        app.input = "two".to_string();
        app.submit();
        app.begin_exchange();

        app.complete_exchange(&Outcome::Success("second answer".to_string()));

        assert!(!app.pending);
        let contents: Vec<&str> = app.transcript.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "second answer"]);
    }

    #[test]
    fn test_sync_scroll_fires_once_per_change() {
        let mut app = test_app();
        app.chat_height = 4;

        // Empty transcript has nothing to scroll to.
        assert!(!app.sync_scroll(1));

        for i in 0..4 {
            app.input = format!("message {}", i);
            app.submit();
        }

        assert!(app.sync_scroll(12));
        assert_eq!(app.scroll, 12 - 4);

        let before = app.transcript.clone();
        assert!(!app.sync_scroll(12));
        assert_eq!(app.scroll, 8);
        assert_eq!(app.transcript, before);
    }

    #[test]
    fn test_manual_scroll_is_kept_until_transcript_changes() {
        let mut app = test_app();
        app.chat_height = 4;
        for i in 0..4 {
            app.input = format!("message {}", i);
            app.submit();
        }
        app.sync_scroll(12);

        app.scroll_up(3);
        assert!(!app.sync_scroll(12));
        assert_eq!(app.scroll, 5);

        app.complete_exchange(&Outcome::Success("reply".to_string()));
        assert!(app.sync_scroll(15));
        assert_eq!(app.scroll, 15 - 4);
    }

    #[test]
    fn test_scroll_to_bottom_short_transcript_stays_at_top() {
        let mut app = test_app();
        app.chat_height = 20;

        app.scroll_to_bottom(6);

        assert_eq!(app.scroll, 0);
    }

    #[test]
    fn test_tick_animation_only_while_pending() {
        let mut app = test_app();
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);

        app.begin_exchange();
        app.tick_animation();
        app.tick_animation();
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);
        app.tick_animation();
        assert_eq!(app.animation_frame, 1);
    }
}
