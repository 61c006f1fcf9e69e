use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "forms-audit", version, about = "Forms audit event service")]
struct Cli {
    /// Path to the YAML configuration file. Defaults apply when it is missing.
    #[arg(
        long,
        short,
        global = true,
        env = "FORMS_AUDIT_CONFIG",
        default_value = "forms-audit.yaml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the audit, cache and queue tables.
    Migrate,

    /// Consume audit events from the queue until interrupted.
    Consume {
        /// Process a single batch and exit.
        #[arg(long, default_value_t = false)]
        once: bool,
    },

    /// Enqueue audit message files.
    Publish {
        /// JSON files, one message body each.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Enqueue files even if they fail schema validation.
        #[arg(long, default_value_t = false)]
        skip_validation: bool,
    },

    /// Print an entity's audit trail as JSON.
    Events {
        /// Entity (form) ID.
        entity_id: String,

        /// Return the consolidated timeline instead of raw records.
        #[arg(long, default_value_t = false)]
        consolidated: bool,

        /// Restrict to one category (FORM or ENTITLEMENT).
        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        page: Option<u32>,

        #[arg(long)]
        per_page: Option<u32>,
    },

    /// Validate audit message files against the message schema.
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Migrate => commands::migrate::run(&cli.config).await?,

        Command::Consume { once } => commands::consume::run(&cli.config, once).await?,

        Command::Publish {
            files,
            skip_validation,
        } => commands::publish::run(&cli.config, &files, skip_validation).await?,

        Command::Events {
            entity_id,
            consolidated,
            category,
            page,
            per_page,
        } => {
            let args = commands::events::EventsArgs {
                entity_id,
                consolidated,
                category,
                page,
                per_page,
            };
            commands::events::run(&cli.config, args).await?
        }

        Command::Validate { files } => commands::validate::run(&files)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_events() {
        let cli = Cli::try_parse_from([
            "forms-audit",
            "events",
            "689b7ab1d0eeac9711a7fb33",
            "--consolidated",
            "--per-page",
            "50",
            "--config",
            "custom.yaml",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("custom.yaml"));
        match cli.cmd {
            Command::Events {
                entity_id,
                consolidated,
                category,
                page,
                per_page,
            } => {
                assert_eq!(entity_id, "689b7ab1d0eeac9711a7fb33");
                assert!(consolidated);
                assert_eq!(category, None);
                assert_eq!(page, None);
                assert_eq!(per_page, Some(50));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_publish_requires_files() {
        assert!(Cli::try_parse_from(["forms-audit", "publish"]).is_err());
    }
}
