use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::model::{CloseOptions, StartOptions};

/// autopm - Route issue commands to GitHub or Azure DevOps
#[derive(Parser, Debug)]
#[command(name = "autopm")]
#[command(about = "Show, start and close issues across GitHub and Azure DevOps")]
#[command(version)]
pub struct Cli {
    /// Project root containing .claude/ (default: current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Show an issue or work item
    #[command(name = "issue:show")]
    IssueShow {
        /// Issue number or work item id
        id: String,
    },

    /// Close an issue or work item
    #[command(name = "issue:close")]
    IssueClose {
        /// Issue number or work item id
        id: String,

        /// Comment to add when closing
        #[arg(long)]
        comment: Option<String>,

        /// Resolution to record (e.g. fixed, duplicate, wontfix)
        #[arg(long)]
        resolution: Option<String>,

        /// Keep the feature branch
        #[arg(long)]
        no_branch_delete: bool,
    },

    /// Start work on an issue or work item
    #[command(name = "issue:start")]
    IssueStart {
        /// Issue number or work item id
        id: String,

        /// Comment to add (defaults to a standard note)
        #[arg(long)]
        comment: Option<String>,

        /// Assign to the current user even if already assigned
        #[arg(long)]
        assign: bool,

        /// Sprint / iteration to move the item into
        #[arg(long)]
        sprint: Option<String>,

        /// Do not create a feature branch
        #[arg(long)]
        no_branch: bool,
    },

    /// Print the resolved provider configuration
    #[command(name = "config:show")]
    ConfigShow,

    /// List recent start/close actions
    History {
        /// Number of entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

impl Commands {
    pub fn close_options(
        comment: Option<String>,
        resolution: Option<String>,
        no_branch_delete: bool,
    ) -> CloseOptions {
        CloseOptions {
            comment,
            resolution,
            skip_branch_delete: no_branch_delete,
        }
    }

    pub fn start_options(
        comment: Option<String>,
        assign: bool,
        sprint: Option<String>,
        no_branch: bool,
    ) -> StartOptions {
        StartOptions {
            comment,
            assign,
            sprint,
            create_branch: !no_branch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_issue_show_subcommand() {
        let cli = Cli::parse_from(["autopm", "issue:show", "123"]);
        assert_eq!(
            cli.command,
            Commands::IssueShow {
                id: "123".to_string()
            }
        );
        assert!(!cli.json);
    }

    #[test]
    fn test_issue_close_defaults() {
        let cli = Cli::parse_from(["autopm", "issue:close", "42"]);
        match cli.command {
            Commands::IssueClose {
                id,
                comment,
                resolution,
                no_branch_delete,
            } => {
                assert_eq!(id, "42");
                assert_eq!(comment, None);
                assert_eq!(resolution, None);
                assert!(!no_branch_delete);
            }
            _ => panic!("Expected IssueClose command"),
        }
    }

    #[test]
    fn test_issue_close_with_args() {
        let cli = Cli::parse_from([
            "autopm",
            "issue:close",
            "42",
            "--resolution",
            "duplicate",
            "--comment",
            "Dup of #41",
            "--no-branch-delete",
        ]);
        match cli.command {
            Commands::IssueClose {
                comment,
                resolution,
                no_branch_delete,
                ..
            } => {
                let options = Commands::close_options(comment, resolution, no_branch_delete);
                assert_eq!(options.resolution.as_deref(), Some("duplicate"));
                assert_eq!(options.comment.as_deref(), Some("Dup of #41"));
                assert!(options.skip_branch_delete);
            }
            _ => panic!("Expected IssueClose command"),
        }
    }

    #[test]
    fn test_issue_start_with_args() {
        let cli = Cli::parse_from([
            "autopm",
            "issue:start",
            "7",
            "--assign",
            "--sprint",
            "Sprint 3",
            "--no-branch",
        ]);
        match cli.command {
            Commands::IssueStart {
                id,
                comment,
                assign,
                sprint,
                no_branch,
            } => {
                assert_eq!(id, "7");
                let options = Commands::start_options(comment, assign, sprint, no_branch);
                assert!(options.assign);
                assert_eq!(options.sprint.as_deref(), Some("Sprint 3"));
                assert!(!options.create_branch);
            }
            _ => panic!("Expected IssueStart command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["autopm", "config:show", "--json", "--root", "/tmp/p", "-v"]);
        assert!(matches!(cli.command, Commands::ConfigShow));
        assert!(cli.json);
        assert!(cli.verbose);
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/p")));
    }

    #[test]
    fn test_history_default_limit() {
        let cli = Cli::parse_from(["autopm", "history"]);
        assert_eq!(cli.command, Commands::History { limit: 20 });
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["autopm", "history", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_missing_id_is_rejected() {
        assert!(Cli::try_parse_from(["autopm", "issue:show"]).is_err());
    }

    #[test]
    fn test_help_does_not_panic() {
        // --help exits early, which clap reports as an error
        let result = Cli::try_parse_from(["autopm", "--help"]);
        assert!(result.is_err());
    }
}
