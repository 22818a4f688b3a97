use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use tokio::sync::mpsc::UnboundedSender;

use crate::app::App;
use crate::exchange::{self, Outcome};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent, events: &UnboundedSender<AppEvent>) {
    match event {
        AppEvent::Key(key) => handle_key(app, key, events),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(width, height) => {
            tracing::trace!(width, height, "terminal resized");
        }
        AppEvent::Tick => {
            app.tick_animation();
        }
        AppEvent::ExchangeFinished(outcome) => {
            if let Outcome::HttpError { status, message } = &outcome {
                tracing::warn!(status, %message, "answering service returned an error");
            }
            tracing::info!(?outcome, "exchange finished");
            app.complete_exchange(&outcome);
        }
    }
}

fn handle_key(app: &mut App, key: KeyEvent, events: &UnboundedSender<AppEvent>) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // The pending overlay is decoration only, every key still lands here.
    match key.code {
        KeyCode::Esc => {
            app.should_quit = true;
        }
        KeyCode::Enter => {
            if let Some(prompt) = app.submit() {
                dispatch_exchange(app, prompt, events);
            }
        }

        // Transcript scrolling
        KeyCode::PageUp => app.scroll_half_page_up(),
        KeyCode::PageDown => app.scroll_half_page_down(),
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),

        // Line editing
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

/// Enter the pending state and run the exchange in the background. The
/// outcome comes back through the event channel.
fn dispatch_exchange(app: &mut App, prompt: String, events: &UnboundedSender<AppEvent>) {
    app.begin_exchange();
    tracing::info!(chars = prompt.chars().count(), endpoint = app.client.endpoint(), "sending prompt");

    let client = app.client.clone();
    let events = events.clone();
    tokio::spawn(async move {
        let outcome = exchange::exchange(&client, &prompt).await;
        // The loop is gone if the user quit mid-exchange.
        let _ = events.send(AppEvent::ExchangeFinished(outcome));
    });
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);

    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Sender;
    use crate::exchange::{AnswerClient, CONNECTION_ERROR_TEXT};
    use serde_json::json;
    use tokio::sync::mpsc;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, text: &str, tx: &UnboundedSender<AppEvent>) {
        for c in text.chars() {
            handle_event(app, key(KeyCode::Char(c)), tx);
        }
    }

    #[test]
    fn test_char_to_byte_index_multibyte() {
        let s = "olá, mundo";
        assert_eq!(char_to_byte_index(s, 2), 2);
        assert_eq!(char_to_byte_index(s, 3), 4);
        assert_eq!(char_to_byte_index(s, 100), s.len());
    }

    #[tokio::test]
    async fn test_line_editing_is_utf8_safe() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(AnswerClient::new("http://127.0.0.1:9/answer"));

        type_text(&mut app, "olá", &tx);
        handle_event(&mut app, key(KeyCode::Left), &tx);
        handle_event(&mut app, key(KeyCode::Backspace), &tx);
        assert_eq!(app.input, "oá");
        assert_eq!(app.cursor, 1);

        handle_event(&mut app, key(KeyCode::Home), &tx);
        handle_event(&mut app, key(KeyCode::Delete), &tx);
        assert_eq!(app.input, "á");

        handle_event(&mut app, key(KeyCode::End), &tx);
        type_text(&mut app, "!", &tx);
        assert_eq!(app.input, "á!");
        assert_eq!(app.cursor, 2);
    }

    #[tokio::test]
    async fn test_enter_runs_one_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/answer"))
            .and(body_json(json!({ "prompt": "hi there" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "hello" })))
            .expect(1)
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = App::new(AnswerClient::new(&format!("{}/answer", server.uri())));

        type_text(&mut app, "hi there", &tx);
        handle_event(&mut app, key(KeyCode::Enter), &tx);

        assert!(app.pending);
        assert!(app.input.is_empty());
        assert_eq!(app.transcript.len(), 1);
        assert_eq!(app.transcript[0].sender, Sender::User);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, AppEvent::ExchangeFinished(Outcome::Success(_))));
        handle_event(&mut app, event, &tx);

        assert!(!app.pending);
        assert_eq!(app.transcript.len(), 2);
        assert_eq!(app.transcript[1].sender, Sender::Assistant);
        assert_eq!(app.transcript[1].content, "hello");
    }

    #[tokio::test]
    async fn test_enter_on_blank_input_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = App::new(AnswerClient::new(&format!("{}/answer", server.uri())));

        type_text(&mut app, "   ", &tx);
        handle_event(&mut app, key(KeyCode::Enter), &tx);

        assert!(!app.pending);
        assert!(app.transcript.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service_reports_connection_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = App::new(AnswerClient::new(&format!("http://127.0.0.1:{}/answer", port)));

        type_text(&mut app, "anyone?", &tx);
        handle_event(&mut app, key(KeyCode::Enter), &tx);
        let event = rx.recv().await.unwrap();
        handle_event(&mut app, event, &tx);

        assert!(!app.pending);
        assert_eq!(app.transcript[1].content, CONNECTION_ERROR_TEXT);
    }

    #[tokio::test]
    async fn test_input_stays_live_while_pending() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(AnswerClient::new("http://127.0.0.1:9/answer"));
        app.begin_exchange();

        type_text(&mut app, "next", &tx);

        assert_eq!(app.input, "next");
    }

    #[tokio::test]
    async fn test_quit_keys() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(AnswerClient::new("http://127.0.0.1:9/answer"));

        handle_event(&mut app, key(KeyCode::Esc), &tx);
        assert!(app.should_quit);

        let mut app = App::new(AnswerClient::new("http://127.0.0.1:9/answer"));
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        handle_event(&mut app, AppEvent::Key(ctrl_c), &tx);
        assert!(app.should_quit);
        assert!(app.input.is_empty());
    }
}
