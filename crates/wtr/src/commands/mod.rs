//! Command implementations for the wtr CLI.

pub mod hook;
pub mod migrate;
pub mod status;
pub mod wait;

use serde_json::Value;

/// Print a JSON result object to stdout.
pub(crate) fn print_result(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

/// Print an error result and exit 1.
pub(crate) fn fail(value: Value) -> ! {
    print_result(&value);
    std::process::exit(1);
}
