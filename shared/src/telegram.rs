use reqwest::{Client, Response};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{Event, Level, Subscriber};

const MARKDOWN_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Operator chat sink. Messages are queued and delivered by a background task.
#[derive(Clone)]
pub struct TelegramSubscriber {
    sender: mpsc::UnboundedSender<(String, Level)>,
}

pub fn escape_markdown(message: &str) -> String {
    let mut escaped = String::with_capacity(message.len());
    for c in message.chars() {
        if MARKDOWN_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn format_message(message: &str, level: Level) -> String {
    if level == Level::INFO {
        escape_markdown(message)
    } else {
        format!("*{}*: `{}`", level.as_str(), escape_markdown(message))
    }
}

async fn send_message(
    client: &Client,
    bot_token: &str,
    chat_id: &str,
    message: String,
    level: Level,
) -> anyhow::Result<Response> {
    let url = format!("https://api.telegram.org/bot{}/sendMessage", bot_token);
    let message = format_message(&message, level);
    let params = [
        ("chat_id", chat_id),
        ("text", &message),
        ("parse_mode", "MarkdownV2"),
    ];

    Ok(client.post(&url).form(&params).send().await?)
}

async fn sender_task(
    mut reader: mpsc::UnboundedReceiver<(String, Level)>,
    client: Client,
    bot_token: String,
    chat_id: String,
) {
    while let Some((message, level)) = reader.recv().await {
        match send_message(&client, &bot_token, &chat_id, message, level).await {
            Ok(response) if response.status().is_success() => {}
            // We use eprintln! here because it doesn't make sense to send back a message to the chat
            Ok(response) => eprintln!(
                "Failed to send message: Received HTTP {}:",
                response.status()
            ),
            Err(e) => eprintln!("Failed to send message: {}", e),
        }
    }
}

impl TelegramSubscriber {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(sender_task(receiver, Client::new(), bot_token, chat_id));
        Self { sender }
    }

    pub fn send_to_telegram(&self, message: &str, level: &Level) {
        let _ = self.sender.send((message.to_string(), *level));
    }
}

impl<S: Subscriber> tracing_subscriber::Layer<S> for TelegramSubscriber {
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let message = format!("{}", visitor);

        // Warnings and errors are forwarded so operators can react on them
        let level = event.metadata().level();
        if level <= &Level::WARN {
            self.send_to_telegram(&message, level);
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl fmt::Display for MessageVisitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
}
