//! Result printing: one JSON object per line on stdout, machine-friendly.

use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use waveprint_core::matching::QueryResult;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

/// Print ranked results, or the empty marker when there are none.
pub fn print_results(query_path: &str, results: &[QueryResult]) -> Result<()> {
    if results.is_empty() {
        print_json(&QueryResult::empty(query_path, 0.0, 0.0))
    } else {
        for result in results {
            print_json(result)?;
        }
        Ok(())
    }
}
