use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "mediadex",
    version,
    about = "Keep a searchable, analysis-annotated index of a media directory"
)]
pub struct CliArgs {
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "MEDIADEX_CONFIG",
        help = "JSON configuration file (default: built-in defaults)"
    )]
    pub config: Option<PathBuf>,
    #[arg(
        short,
        long,
        value_name = "DIR",
        help = "Override the directory to index"
    )]
    pub root: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Run one scan cycle and print its summary.
    Scan,
    /// Search descriptions and filenames.
    Search {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Print index statistics.
    Stats,
    /// Print every indexed entry.
    List,
    /// Drop one entry by its path relative to the root.
    Remove { relative_path: String },
    /// Watch the root and keep the index current until interrupted.
    Watch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_with_limit() {
        let args = CliArgs::try_parse_from(["mediadex", "--root", "/srv", "search", "red sunset", "-l", "3"])
            .unwrap();
        assert_eq!(args.root, Some(PathBuf::from("/srv")));
        assert_eq!(
            args.command,
            CliCommand::Search {
                query: "red sunset".to_string(),
                limit: Some(3)
            }
        );
    }

    #[test]
    fn requires_a_subcommand() {
        assert!(CliArgs::try_parse_from(["mediadex"]).is_err());
    }
}
