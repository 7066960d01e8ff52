//! CLI output formatting utilities.
//!
//! Everything except a command's own result goes to stderr so `tukit open` can be
//! scripted as `id=$(tukit open | sed 's/^ID: //')`.

use owo_colors::{OwoColorize, Stream};

pub mod symbols {
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

/// Print the id of a newly opened transaction in the format scripts parse.
pub fn print_transaction_id(id: &str) {
  println!("ID: {}", id);
}

/// Convert a child or tukit status into a process exit code.
///
/// Statuses outside `0..=255` cannot be reported faithfully and become 1.
pub fn exit_code(status: i32) -> std::process::ExitCode {
  std::process::ExitCode::from(u8::try_from(status).unwrap_or(1))
}
