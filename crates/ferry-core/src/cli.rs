use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::model::{NewTask, TaskPatch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ferry",
    version,
    about = "Ferry: offline-first task client",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    /// Treat the network as unreachable; every change is queued.
    #[arg(long = "offline")]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Save an API token for later runs.
    Login { token: String },
    /// Forget the token and discard the queue and cache.
    Logout,
    /// Replace the local cache with the server's data.
    Refresh,
    /// Show cached tasks.
    List {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        all: bool,
    },
    Projects,
    Labels,
    Sections,
    /// Create a task.
    Add(AddArgs),
    /// Change fields of a task.
    Modify(ModifyArgs),
    Done { id: String },
    Reopen { id: String },
    Delete { id: String },
    /// Show changes waiting to be synced.
    Pending,
    /// Replay waiting changes now.
    Sync,
    /// Stay running and sync whenever the connection comes back.
    Watch {
        #[arg(long, default_value_t = 30)]
        interval: u64,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub content: Vec<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub project: Option<String>,

    #[arg(long)]
    pub section: Option<String>,

    #[arg(long)]
    pub parent: Option<String>,

    #[arg(long = "label", action = ArgAction::Append)]
    pub labels: Vec<String>,

    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub priority: Option<u8>,

    #[arg(long)]
    pub due: Option<String>,
}

impl AddArgs {
    pub fn into_new_task(self) -> NewTask {
        NewTask {
            description: self.description,
            project_id: self.project,
            section_id: self.section,
            parent_id: self.parent,
            labels: self.labels,
            priority: self.priority,
            due_string: self.due,
            ..NewTask::new(self.content.join(" "))
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ModifyArgs {
    pub id: String,

    #[arg(long)]
    pub content: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Replaces the label set. Pass `--label ''` to clear it.
    #[arg(long = "label", action = ArgAction::Append)]
    pub labels: Option<Vec<String>>,

    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub priority: Option<u8>,

    #[arg(long)]
    pub due: Option<String>,
}

impl ModifyArgs {
    pub fn into_patch(self) -> (String, TaskPatch) {
        let labels = self
            .labels
            .map(|labels| labels.into_iter().filter(|l| !l.is_empty()).collect());
        let patch = TaskPatch {
            content: self.content,
            description: self.description,
            labels,
            priority: self.priority,
            due_string: self.due,
        };
        (self.id, patch)
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> GlobalCli {
        GlobalCli::try_parse_from(std::iter::once("ferry").chain(args.iter().copied()))
            .expect("parse")
    }

    #[test]
    fn global_flags_and_overrides() {
        let cli = parse(&["-vv", "--offline", "--rc", "color = off", "pending"]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.offline);
        assert_eq!(
            cli.rc_overrides,
            vec![KeyVal {
                key: "color".to_string(),
                value: "off".to_string()
            }]
        );
        assert_eq!(cli.command, Command::Pending);
    }

    #[test]
    fn add_joins_content_words() {
        let cli = parse(&["add", "buy", "milk", "--label", "errand", "--priority", "4"]);
        let Command::Add(args) = cli.command else {
            panic!("expected add");
        };
        let task = args.into_new_task();
        assert_eq!(task.content, "buy milk");
        assert_eq!(task.labels, vec!["errand".to_string()]);
        assert_eq!(task.priority, Some(4));
    }

    #[test]
    fn modify_with_empty_label_clears_labels() {
        let cli = parse(&["modify", "42", "--label", ""]);
        let Command::Modify(args) = cli.command else {
            panic!("expected modify");
        };
        let (id, patch) = args.into_patch();
        assert_eq!(id, "42");
        assert_eq!(patch.labels, Some(vec![]));
        assert!(patch.content.is_none());
    }

    #[test]
    fn priority_out_of_range_is_rejected() {
        let result = GlobalCli::try_parse_from(["ferry", "add", "x", "--priority", "9"]);
        assert!(result.is_err());
    }
}
