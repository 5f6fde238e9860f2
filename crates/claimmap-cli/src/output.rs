use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "!".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Prints rows as a rounded table, or `empty` when there are none.
pub fn print_table<const N: usize>(header: [&str; N], rows: &[[String; N]], empty: &str) {
    if rows.is_empty() {
        println!("{empty}");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(header);
    for row in rows {
        builder.push_record(row.iter().map(String::as_str));
    }
    let table = builder.build().with(Style::rounded()).to_string();
    println!("{table}");
}

/// Prints `key: value` pairs; `None` values are shown as `(none)`.
pub fn print_fields(fields: &[(&str, Option<&str>)]) {
    for (key, value) in fields {
        match value {
            Some(value) => println!("{}: {}", key.cyan(), value),
            None => println!("{}: {}", key.cyan(), "(none)".dimmed()),
        }
    }
}
