use clap::Parser;
use transacti_stream::cli::{self, Cli, Commands, DlqCommands, TxCommands};
use transacti_stream::{config, server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::Config::from_env()?;

    telemetry::init(config.log_format)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => server::serve(config).await,
        Commands::Provision => cli::handle_provision(&config).await,
        Commands::Config => cli::handle_config_validate(&config).await,
        Commands::Tx(TxCommands::Unpublished) => cli::handle_tx_unpublished(&config).await,
        Commands::Tx(TxCommands::Republish { tx_id }) => cli::handle_tx_republish(&config, tx_id).await,
        Commands::Dlq(DlqCommands::List { limit }) => cli::handle_dlq_list(&config, limit).await,
        Commands::Dlq(DlqCommands::Requeue { id }) => cli::handle_dlq_requeue(&config, id).await,
        Commands::Dlq(DlqCommands::Discard { id }) => cli::handle_dlq_discard(&config, id).await,
        Commands::Simulate {
            failure_rate,
            min_delay_secs,
            max_delay_secs,
        } => {
            let settings = cli::simulator_settings(failure_rate, min_delay_secs, max_delay_secs);
            cli::handle_simulate(&config, settings).await
        }
    }
}
