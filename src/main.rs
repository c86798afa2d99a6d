//! Local console front end.
//!
//! The dispatcher only speaks [`DeliveryGateway`]; this binary plugs in a
//! console adapter so the whole flow can be driven from a terminal. Buttons
//! render as a numbered list and a numeric input maps back to the button's
//! payload; anything else is free text. Delivered documents are copied into
//! the working directory under their display filename.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::AsyncBufReadExt;

use dispogen::catalog::SqliteCatalog;
use dispogen::config;
use dispogen::flow::{Dispatcher, ReportSettings};
use dispogen::gateway::{
    Button, ConversationId, DeliveryGateway, Event, EventKind, GatewayError, MessageId,
};

/// The single local conversation.
const CONSOLE_CONVERSATION: ConversationId = 0;

struct ConsoleGateway {
    next_id: AtomicI64,
    last_message: AtomicI64,
    last_buttons: Mutex<Vec<Button>>,
}

impl ConsoleGateway {
    fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            last_message: AtomicI64::new(0),
            last_buttons: Mutex::new(Vec::new()),
        }
    }

    fn print_message(&self, text: &str, buttons: &[Button]) -> MessageId {
        println!();
        println!("{text}");
        for (idx, button) in buttons.iter().enumerate() {
            println!("  [{}] {}", idx + 1, button.label);
        }
        if let Ok(mut last) = self.last_buttons.lock() {
            *last = buttons.to_vec();
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.last_message.store(id, Ordering::Relaxed);
        id
    }

    /// Payload of the `choice`-th button (1-based) of the latest message.
    fn button_payload(&self, choice: usize) -> Option<String> {
        let buttons = self.last_buttons.lock().ok()?;
        buttons.get(choice.checked_sub(1)?).map(|b| b.payload.clone())
    }

    fn last_message(&self) -> MessageId {
        self.last_message.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl DeliveryGateway for ConsoleGateway {
    async fn send_text(
        &self,
        _conversation: ConversationId,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageId, GatewayError> {
        Ok(self.print_message(text, buttons))
    }

    async fn edit_text(
        &self,
        _conversation: ConversationId,
        _message: MessageId,
        text: &str,
        buttons: &[Button],
    ) -> Result<(), GatewayError> {
        // A terminal can't rewrite history; an edit prints as a new message.
        self.print_message(text, buttons);
        Ok(())
    }

    async fn send_document(
        &self,
        _conversation: ConversationId,
        path: &Path,
        filename: &str,
    ) -> Result<(), GatewayError> {
        let target = std::env::current_dir()?.join(filename);
        std::fs::copy(path, &target)?;
        println!();
        println!("Saved {}", target.display());
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let output_dir = match config.output_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let catalog = match config.db_path() {
        Some(path) => SqliteCatalog::open_at(path),
        None => SqliteCatalog::open(),
    };
    let catalog = match catalog {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Failed to open catalog: {e}");
            std::process::exit(1);
        }
    };

    let gateway = Arc::new(ConsoleGateway::new());
    let dispatcher = Dispatcher::new(
        catalog,
        gateway.clone(),
        ReportSettings {
            template_path: config.template_path(),
            output_dir,
        },
    );

    println!("dispogen console — type a button number, free text, or \"quit\".");
    dispatcher
        .handle_event(Event {
            conversation: CONSOLE_CONVERSATION,
            kind: EventKind::Command("start".to_string()),
        })
        .await;

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        let kind = match line
            .parse::<usize>()
            .ok()
            .and_then(|n| gateway.button_payload(n))
        {
            Some(payload) => EventKind::ButtonPress {
                message: gateway.last_message(),
                payload,
            },
            None => EventKind::Text(line),
        };
        dispatcher
            .handle_event(Event {
                conversation: CONSOLE_CONVERSATION,
                kind,
            })
            .await;
    }
}
