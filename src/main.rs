use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agentpty::config::{Command, Config, Settings};
use agentpty::run;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_cli(&cli);
    settings.validate();

    match cli.command {
        Command::Run(args) => {
            let code = run::run_agent(settings, args).await?;
            std::process::exit(code);
        }
        Command::Agents { json } => run::print_agents(json),
    }
}

/// Logs go to stderr so they never mix with the proxied terminal output.
///
/// The default level is `warn`: anything chattier would draw over the
/// agent's screen. `RUST_LOG` overrides both defaults.
fn setup_logging(debug: bool) {
    let default = if debug {
        "agentpty=debug,agentpty_core=debug"
    } else {
        "agentpty=warn,agentpty_core=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
