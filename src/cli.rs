//! Command-line interface definitions.
//!
//! Two subcommands cover the two halves of the tool: `harvest` runs a full
//! harvest-and-merge pass for one date, `query` reads the dataset back. A
//! handful of flags override the corresponding configuration values; the
//! full tunable surface lives in the YAML file passed via `--config`.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Harvest today's news into the configured dataset
/// baidu-news harvest
///
/// # Harvest a specific date, with a config file
/// baidu-news --config harvest.yaml harvest --date 2025-10-03
///
/// # Read back one day's rows
/// baidu-news query --date 2025-10-03
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML configuration file
    #[arg(short, long, env = "BAIDU_NEWS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Harvest news for one date and merge them into the dataset
    Harvest {
        /// Target date (YYYY-MM-DD); defaults to the configured date, else today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Override the configured target item count
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Override the configured dataset path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the stored news for one date
    Query {
        /// Date to look up (YYYY-MM-DD); defaults to the configured date, else today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harvest_flags() {
        let cli = Cli::parse_from([
            "baidu-news",
            "harvest",
            "--date",
            "2025-10-03",
            "-n",
            "20",
        ]);
        match cli.command {
            Command::Harvest { date, count, output } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2025, 10, 3));
                assert_eq!(count, Some(20));
                assert_eq!(output, None);
            }
            other => panic!("expected harvest, got {other:?}"),
        }
    }

    #[test]
    fn test_query_defaults() {
        let cli = Cli::parse_from(["baidu-news", "query"]);
        assert!(cli.config.is_none());
        match cli.command {
            Command::Query { date } => assert!(date.is_none()),
            other => panic!("expected query, got {other:?}"),
        }
    }

    #[test]
    fn test_config_flag_applies_to_any_subcommand() {
        let cli = Cli::parse_from(["baidu-news", "--config", "harvest.yaml", "query"]);
        assert_eq!(cli.config, Some(PathBuf::from("harvest.yaml")));
    }
}
