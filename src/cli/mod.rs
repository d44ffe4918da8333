pub mod session;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "zhaowen", about = "朝闻: AI-curated Weibo morning report")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the topics a report can cover.
    Topics,
    /// Generate today's report. Without `--topic` an interactive session starts.
    Generate {
        /// Topic slug, English name or Chinese label. Repeatable.
        #[arg(long = "topic", short = 't')]
        topics: Vec<String>,
        /// Save the rendered card as a PNG after generating.
        #[arg(long, default_value_t = false)]
        export: bool,
        /// Print the report as normalized markup instead of the terminal rendering.
        #[arg(long, default_value_t = false)]
        raw: bool,
    },
    /// Serve the local dashboard.
    Dashboard,
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    Doctor,
    Ai {
        #[command(subcommand)]
        command: AiCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[derive(Debug, Subcommand)]
pub enum AiCommands {
    Test {
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn parses_repeated_topics() {
        let cli = Cli::try_parse_from([
            "zhaowen", "generate", "--topic", "technology", "-t", "sports", "--export",
        ])
        .expect("parsed");

        match cli.command {
            Commands::Generate {
                topics,
                export,
                raw,
            } => {
                assert_eq!(topics, vec!["technology", "sports"]);
                assert!(export);
                assert!(!raw);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
