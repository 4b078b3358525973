use clap::{Parser, ValueEnum};
use smelt::{DEFAULT_TASK, TaskError, TaskRunner};
use std::ffi::OsString;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "smelt")]
#[command(about = "Runs registered build tasks and their dependencies")]
pub struct Cli {
    /// Task to run.
    #[arg(default_value = DEFAULT_TASK)]
    pub task: String,
    /// Minimum level to log. Without it (and without tags) `RUST_LOG` applies.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
    /// Only log events from this target. Repeatable.
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Print the registered tasks and exit.
    #[arg(long)]
    pub list: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Filter directives for the given level and tags. `None` defers to
/// `RUST_LOG`.
pub fn filter_directives(level: Option<LogLevel>, tags: &[String]) -> Option<String> {
    if level.is_none() && tags.is_empty() {
        return None;
    }
    let level = level.unwrap_or(LogLevel::Info).as_str();
    if tags.is_empty() {
        return Some(level.to_string());
    }
    Some(
        tags.iter()
            .map(|tag| format!("{tag}={level}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn init_tracing(cli: &Cli) -> Result<(), String> {
    let filter = match filter_directives(cli.log_level, &cli.tags) {
        Some(directives) => EnvFilter::try_new(&directives)
            .map_err(|error| format!("invalid log filter '{directives}': {error}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
    Ok(())
}

pub fn task_listing(runner: &TaskRunner) -> Vec<String> {
    runner
        .task_names()
        .into_iter()
        .map(|name| match runner.dependencies(name) {
            Some(dependencies) if !dependencies.is_empty() => {
                format!("{name}: {}", dependencies.join(", "))
            }
            _ => name.to_string(),
        })
        .collect()
}

/// Prints a parse failure, or the help/version text clap answered with,
/// and returns the exit status for it.
fn parse_error_status(error: &clap::Error) -> u8 {
    if let Err(io_error) = error.print() {
        eprintln!("error: failed to print usage: {io_error}");
    }
    if error.use_stderr() { 2 } else { 0 }
}

/// Parses `args`, then lists or runs tasks from `runner`.
pub fn run_cli<I, T>(mut runner: TaskRunner, args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => return ExitCode::from(parse_error_status(&error)),
    };

    if let Err(error) = init_tracing(&cli) {
        eprintln!("error: {error}");
        return ExitCode::from(1);
    }

    match execute(&mut runner, &cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(1)
        }
    }
}

/// Lists the tasks when asked to, otherwise runs the selected task.
pub fn execute(runner: &mut TaskRunner, cli: &Cli) -> Result<(), TaskError> {
    if cli.list {
        for line in task_listing(runner) {
            println!("{line}");
        }
        return Ok(());
    }
    runner.run_task(&cli.task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smelt::TaskHandler;

    #[test]
    fn parse_no_arguments_expected_default_task() {
        let cli = Cli::try_parse_from(["smelt"]).expect("parse should succeed");
        assert_eq!(cli.task, "default");
        assert_eq!(cli.log_level, None);
        assert!(cli.tags.is_empty());
        assert!(!cli.list);
    }

    #[test]
    fn parse_level_and_tags_expected_fields_set() {
        let cli = Cli::try_parse_from([
            "smelt",
            "build",
            "--log-level",
            "debug",
            "--tag",
            "smelt::source",
            "--tag",
            "smelt::sink",
        ])
        .expect("parse should succeed");
        assert_eq!(cli.task, "build");
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert_eq!(cli.tags, vec!["smelt::source", "smelt::sink"]);
    }

    #[test]
    fn parse_error_status_unknown_flag_expected_usage_status() {
        let error = Cli::try_parse_from(["smelt", "--bogus"]).expect_err("flag should be rejected");
        assert_eq!(parse_error_status(&error), 2);
    }

    #[test]
    fn parse_error_status_help_expected_success() {
        let error = Cli::try_parse_from(["smelt", "--help"]).expect_err("help should short-circuit");
        assert_eq!(parse_error_status(&error), 0);
    }

    #[test]
    fn filter_directives_expected_level_scoped_to_tags() {
        assert_eq!(filter_directives(None, &[]), None);
        assert_eq!(
            filter_directives(Some(LogLevel::Warn), &[]).as_deref(),
            Some("warn")
        );
        assert_eq!(
            filter_directives(None, &["smelt::tasks".to_string()]).as_deref(),
            Some("smelt::tasks=info")
        );
        assert_eq!(
            filter_directives(
                Some(LogLevel::Trace),
                &["smelt::source".to_string(), "smelt::engine".to_string()]
            )
            .as_deref(),
            Some("smelt::source=trace,smelt::engine=trace")
        );
    }

    #[test]
    fn task_listing_expected_dependencies_after_name() {
        let mut runner = TaskRunner::new();
        runner
            .task("hello", Vec::<String>::new(), TaskHandler::NoOp)
            .expect("register")
            .group("default", ["hello"])
            .expect("register");

        assert_eq!(task_listing(&runner), vec!["default: hello", "hello"]);
    }

    #[test]
    fn execute_unknown_task_expected_error() {
        let cli = Cli::try_parse_from(["smelt", "missing"]).expect("parse should succeed");
        let error = execute(&mut TaskRunner::new(), &cli).expect_err("unknown task should fail");
        assert_eq!(error.to_string(), "task 'missing' does not exist");
    }

    #[test]
    fn execute_list_expected_no_task_run() {
        let mut runner = TaskRunner::new();
        runner
            .task(
                "default",
                Vec::<String>::new(),
                TaskHandler::fallible(|| Err("must not run".into())),
            )
            .expect("register");
        let cli = Cli::try_parse_from(["smelt", "--list"]).expect("parse should succeed");

        execute(&mut runner, &cli).expect("listing should not run tasks");
    }
}
