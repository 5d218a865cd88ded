//! Interactive console: the terminal as a command sender

use anyhow::Result;
use chat_core::{ChatService, CommandHandler, ConfigStore, ProgressIndicator, Recipient};
use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

// ANSI colors
const CYAN: &str = "\x1b[96m";
const DIM: &str = "\x1b[2m";
const YELLOW: &str = "\x1b[93m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Prints replies to stdout; shows download progress when stdout is a terminal
pub struct ConsoleRecipient {
    name: String,
    interactive: bool,
}

impl ConsoleRecipient {
    pub fn new() -> Self {
        Self {
            name: "console".to_string(),
            interactive: std::io::stdout().is_terminal(),
        }
    }
}

impl Default for ConsoleRecipient {
    fn default() -> Self {
        Self::new()
    }
}

impl Recipient for ConsoleRecipient {
    fn id(&self) -> &str {
        &self.name
    }

    fn send_message(&self, text: &str) {
        println!("{}", text);
    }

    fn progress_indicator(&self, label: &str) -> Option<Box<dyn ProgressIndicator>> {
        if !self.interactive {
            return None;
        }

        let pb = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.cyan} {msg} [{bar:30.cyan/dim}] {percent}%")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        pb.set_message(label.to_string());
        Some(Box::new(TerminalBar(pb)))
    }
}

struct TerminalBar(ProgressBar);

impl ProgressIndicator for TerminalBar {
    fn set_progress(&self, fraction: f64) {
        self.0.set_position((fraction * 100.0).round() as u64);
    }

    fn close(&self) {
        self.0.finish_and_clear();
    }
}

/// Run the console until `exit`, `quit` or EOF
pub async fn run(config_path: &Path) -> Result<()> {
    let config = ConfigStore::open(config_path)?;
    let mut handler = CommandHandler::new(ChatService::new(config));
    let recipient: Arc<dyn Recipient> = Arc::new(ConsoleRecipient::new());

    print_welcome(handler.service(), config_path);

    let mut rl = DefaultEditor::new()?;

    loop {
        let prompt = format!("{}ollama>{} ", CYAN, RESET);

        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if matches!(line, "exit" | "quit") {
                    break;
                }

                let args: Vec<&str> = line.split_whitespace().collect();
                handler.handle(recipient.clone(), &args[..]).await;
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}^C{}", DIM, RESET);
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}Error:{} {}", YELLOW, RESET, e);
                break;
            }
        }
    }

    handler.shutdown().await;
    println!("{}Goodbye!{}", DIM, RESET);
    Ok(())
}

fn print_welcome(service: &ChatService, config_path: &Path) {
    let config = service.config();
    println!();
    println!("{}ollama-chat{}", BOLD, RESET);
    println!("  Config:  {}", config_path.display());
    println!("  Backend: {:?}", config.api_type());
    println!("  Mode:    {}", config.mode());
    println!("  Model:   {}", service.ollama().model());
    println!(
        "{}  Type a message, or setmodel <model>, setmode <built-in|standalone>, download <model>, exit{}",
        DIM, RESET
    );
    println!();
}
