//! Interactive release pick.

use std::io::{BufRead, Write};

use thiserror::Error;
use tooldrop_schema::CatalogEntry;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("invalid selection '{0}': enter a number")]
    NotANumber(String),

    #[error("invalid selection {choice}: pick 1-{count}")]
    OutOfRange { choice: usize, count: usize },

    #[error("no releases to choose from")]
    Empty,
}

/// Interpret a typed answer. Blank input takes `default` (1-based).
pub fn parse_selection(input: &str, count: usize, default: usize) -> Result<usize, SelectionError> {
    if count == 0 {
        return Err(SelectionError::Empty);
    }
    let input = input.trim();
    let choice = if input.is_empty() {
        default
    } else {
        input
            .parse::<usize>()
            .map_err(|_| SelectionError::NotANumber(input.to_string()))?
    };
    if choice == 0 || choice > count {
        return Err(SelectionError::OutOfRange { choice, count });
    }
    Ok(choice - 1)
}

/// Ask the user to pick one of `entries` (already printed as a numbered table).
pub fn pick_release<'c>(
    entries: &[&'c CatalogEntry],
    default: usize,
) -> anyhow::Result<&'c CatalogEntry> {
    print!("  Select a release (1-{}) [{default}]: ", entries.len());
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().lock().read_line(&mut input)?;

    let index = parse_selection(&input, entries.len(), default)?;
    Ok(entries[index])
}
