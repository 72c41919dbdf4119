use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Continuous position monitoring and order execution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recover persisted sessions and monitor them until interrupted
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Start a session for a user and monitor it
    Start {
        /// User to open the session for
        #[arg(long)]
        user: String,
        /// Execution mode: live or paper
        #[arg(long, default_value = "paper")]
        mode: String,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Stop a user's session, closing every open position
    Stop {
        /// User whose session to stop
        #[arg(long)]
        user: String,
        /// Reason recorded on the completed session
        #[arg(long, default_value = "USER_REQUEST")]
        reason: String,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Print a user's session status as JSON
    Status {
        /// User to report on
        #[arg(long)]
        user: String,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Run { config } => commands::run::execute(&config).await,
        Commands::Start { user, mode, config } => {
            commands::start::execute(&config, &user, &mode).await
        }
        Commands::Stop {
            user,
            reason,
            config,
        } => commands::stop::execute(&config, &user, &reason).await,
        Commands::Status { user, config } => commands::status::execute(&config, &user).await,
    }
}
