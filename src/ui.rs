use catalogkit::Phase;
use colored::{ColoredString, Colorize};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message on stderr, below an error
pub fn hint(msg: &str) {
    eprintln!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Color a request phase by outcome
pub fn phase(phase: &Phase) -> ColoredString {
    let label = phase.as_str();
    match phase {
        Phase::Successful => label.green(),
        Phase::Failed | Phase::Rejected => label.red(),
        Phase::Unknown(_) => label.magenta(),
        _ => label.yellow(),
    }
}

/// `-` for absent values
pub fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}
