use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ld_eval_logs::config::Config;
use ld_eval_logs::context::{self, Context, ContextKind};
use ld_eval_logs::emit::JsonLineWriter;
use ld_eval_logs::evaluation::{EvaluationRequest, FlagStore, LocalEvaluator};
use ld_eval_logs::run::run;

/// Evaluate one feature flag and log the evaluation to stdout as JSON lines.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project name, used to tag the summary record
    #[arg(long)]
    project: String,

    /// Flag key to evaluate
    #[arg(long)]
    flag_key: String,

    /// Key of the primary context kind
    #[arg(long, default_value = "demo-user-1")]
    context_key: String,

    /// Kind of the primary context
    #[arg(long, default_value = context::DEFAULT_KIND)]
    context_kind: String,

    /// Additional context kind, makes the context multi-kind
    #[arg(long = "context", value_name = "KIND=KEY", value_parser = parse_context_kind)]
    extra_contexts: Vec<ContextKind>,

    /// Value served when the flag cannot be evaluated
    #[arg(long = "default", default_value_t = false, action = ArgAction::Set)]
    default_value: bool,

    /// Behave as if the flag service were unreachable
    #[arg(long)]
    simulate_unreachable: bool,

    /// JSON file with flag definitions (overrides LD_FLAGS_FILE)
    #[arg(long)]
    flags_file: Option<PathBuf>,
}

// keys may contain '=' and ':', kinds may not
fn parse_context_kind(s: &str) -> Result<ContextKind, String> {
    match s.split_once('=') {
        Some((kind, key)) => Ok(ContextKind::new(kind, key)),
        None => Err(format!("expected KIND=KEY, got '{}'", s)),
    }
}

fn execute(cli: &Cli, config: &Config) -> ld_eval_logs::Result<()> {
    let mut kinds = vec![ContextKind::new(&cli.context_kind, &cli.context_key)];
    kinds.extend(cli.extra_contexts.iter().cloned());
    let context = Context::new(kinds)?;

    let request = EvaluationRequest::new(&cli.flag_key, context, cli.default_value);

    let store = match cli.flags_file.as_ref().or(config.flags_file.as_ref()) {
        Some(path) => {
            let store = FlagStore::from_path(path)?;
            if store.is_empty() {
                warn!(path = %path.display(), "flags file defines no flags");
            }
            info!(path = %path.display(), flags = store.len(), "flags loaded");
            store
        }
        None => {
            warn!("no flags file configured, every flag serves its default");
            FlagStore::default()
        }
    };

    let evaluator = LocalEvaluator::new(store).offline(cli.simulate_unreachable);
    let writer = JsonLineWriter::new(std::io::stdout());

    run(&request, &cli.project, &evaluator, &writer)?;
    Ok(())
}

fn main() {
    let config = Config::from_env();

    // stdout carries only the JSON records
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = execute(&cli, &config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_context_kind() {
        assert_eq!(
            parse_context_kind("organization=org:1=a").unwrap(),
            ContextKind::new("organization", "org:1=a")
        );
        assert!(parse_context_kind("organization").is_err());
    }

    #[test]
    fn test_cli_parses_invocation() {
        let cli = Cli::try_parse_from([
            "ld-eval-logs",
            "--project",
            "shop",
            "--flag-key",
            "demo-flag",
            "--default",
            "true",
            "--context",
            "organization=org-123",
            "--simulate-unreachable",
        ])
        .unwrap();

        assert_eq!(cli.project, "shop");
        assert_eq!(cli.context_key, "demo-user-1");
        assert_eq!(cli.context_kind, "user");
        assert!(cli.default_value);
        assert!(cli.simulate_unreachable);
        assert_eq!(cli.extra_contexts, vec![ContextKind::new("organization", "org-123")]);
    }

    #[test]
    fn test_every_flag_has_help() {
        use clap::CommandFactory;

        let command = Cli::command();
        for arg in command.get_arguments() {
            if arg.get_id() == "help" || arg.get_id() == "version" {
                continue;
            }
            assert!(arg.get_help().is_some(), "--{} has no help", arg.get_id());
        }
    }

    #[test]
    fn test_cli_requires_project_and_flag() {
        assert!(Cli::try_parse_from(["ld-eval-logs", "--flag-key", "f"]).is_err());
        assert!(Cli::try_parse_from(["ld-eval-logs", "--project", "p"]).is_err());
    }
}
