use crate::core::{Message, MessageKind};
use colored::*;
use std::io::Write;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.len()).bright_cyan());
}

pub fn print_success(text: &str) {
    println!("{}", text.green());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

pub fn print_prompt(text: &str) {
    print!("{}", text.yellow().bold());
    let _ = std::io::stdout().flush();
}

pub fn print_message(message: &Message) {
    let time = message
        .created_at
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_default();

    match message.kind {
        MessageKind::User => println!("{} {}", format!("You: {}", message.text).bold(), time.dimmed()),
        MessageKind::Assistant => println!("{}\n{}", format!("AI: {}", message.text), time.dimmed()),
        MessageKind::Error => eprintln!("{}", message.text.red()),
        MessageKind::System => println!("{}", message.text.dimmed().italic()),
    }
}
