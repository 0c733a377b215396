mod skill_commands;

use {
    clap::{Parser, Subcommand},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "skills", about = "Install agent skills from git, docs sites, and bundles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install skills from a source for one or more agents.
    Add(skill_commands::AddArgs),
    /// List installed skills.
    List(skill_commands::ListArgs),
    /// Remove a skill for an agent.
    Remove(skill_commands::RemoveArgs),
    /// Show known agents; detected ones are marked with `*`.
    Agents,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);
    debug!(version = env!("CARGO_PKG_VERSION"), "skills starting");

    let ctx = skill_commands::CliContext::load()?;
    match cli.command {
        Commands::Add(args) => skill_commands::handle_add(&ctx, args).await,
        Commands::List(args) => skill_commands::handle_list(&ctx, args),
        Commands::Remove(args) => skill_commands::handle_remove(&ctx, args).await,
        Commands::Agents => {
            skill_commands::handle_agents(&ctx);
            Ok(())
        },
    }
}
