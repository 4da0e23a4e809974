//! Read-only date report over the dataset.
//!
//! The report is the product here, so matched rows go to stdout; logging
//! stays on stderr via `tracing` like everywhere else.

use chrono::NaiveDate;
use itertools::Itertools;
use std::path::Path;
use tracing::info;

use crate::dataset::{self, DatasetError};
use crate::models::NewsRecord;

/// Print the stored news for `date`, or the set of dates that do have news.
pub fn print_report(path: &Path, date: NaiveDate) -> Result<(), DatasetError> {
    let records = dataset::load(path)?;
    let wanted = date.format("%Y-%m-%d").to_string();
    let matches: Vec<&NewsRecord> = records.iter().filter(|row| row.date == wanted).collect();

    if matches.is_empty() {
        info!(date = %wanted, "No rows for requested date");
        println!("No news stored for {wanted}");
        let dates = available_dates(&records);
        match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => {
                println!("Available range: {first} ~ {last}");
                println!("Available dates: {}", dates.join(", "));
            }
            _ => println!("The dataset is empty."),
        }
        return Ok(());
    }

    info!(date = %wanted, count = matches.len(), "Query matched");
    println!("{} news item(s) for {wanted}", matches.len());
    for (index, row) in matches.iter().enumerate() {
        println!("[{}] {}", index + 1, row.title);
        println!("    {}", row.link);
    }
    Ok(())
}

/// Sorted distinct dates present in the dataset.
pub fn available_dates(records: &[NewsRecord]) -> Vec<String> {
    records
        .iter()
        .map(|row| row.date.clone())
        .unique()
        .sorted()
        .collect()
}
