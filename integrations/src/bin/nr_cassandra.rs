use clap::Parser;
use integration_sdk::{logging, DefaultArgs, Integration};
use integrations::cassandra::{self, CassandraArgs};
use tracing::error;

/// Cassandra integration: JMX node and table metrics, configuration inventory
#[derive(Parser, Debug)]
#[command(name = "nr-cassandra", version)]
struct Cli {
    #[command(flatten)]
    defaults: DefaultArgs,

    #[command(flatten)]
    cassandra: CassandraArgs,
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut integration = Integration::new(cassandra::NAME, cassandra::VERSION, &cli.defaults)?;
    cassandra::run(&mut integration, &cli.defaults, &cli.cassandra).await?;
    integration.publish()?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.defaults.verbose);

    if let Err(e) = run(&cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
