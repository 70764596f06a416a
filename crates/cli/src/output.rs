//! CLI output formatting utilities.
//!
//! Colored status lines and human-readable sizes. Colors are only emitted when the
//! stream supports them.

use owo_colors::{OwoColorize, Stream};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ADD: &str = "+";
  pub const MODIFY: &str = "~";
  pub const REMOVE: &str = "-";
}

pub fn truncate_hash(hash: &str) -> &str {
  let len = hash.len().min(12);
  &hash[..len]
}

pub fn format_bytes(bytes: u64) -> String {
  const KB: u64 = 1024;
  const MB: u64 = KB * 1024;

  if bytes >= MB {
    format!("{:.1} MB", bytes as f64 / MB as f64)
  } else if bytes >= KB {
    format!("{:.1} KB", bytes as f64 / KB as f64)
  } else {
    format!("{} B", bytes)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// One line per agent action: `+ <id> <name> (<hash>)`.
pub fn print_action(kind: &str, deployment_id: &str, name: &str, digest: &str) {
  let symbol = action_symbol(kind);
  let symbol = match kind {
    "deploy" => symbol.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    "update" => symbol.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
    _ => symbol.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
  };
  let hash = digest.split_once(':').map_or(digest, |(_, hex)| hex);
  println!(
    "  {} {} {} {}",
    symbol,
    deployment_id,
    name,
    format!("({})", truncate_hash(hash)).if_supports_color(Stream::Stdout, |s| s.dimmed())
  );
}

fn action_symbol(kind: &str) -> &'static str {
  match kind {
    "deploy" => symbols::ADD,
    "update" => symbols::MODIFY,
    _ => symbols::REMOVE,
  }
}
