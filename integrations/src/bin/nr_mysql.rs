use clap::Parser;
use integration_sdk::{logging, DefaultArgs, Integration};
use integrations::mysql::{self, MysqlArgs};
use tracing::error;

/// MySQL integration: server status metrics and global variables inventory
#[derive(Parser, Debug)]
#[command(name = "nr-mysql", version)]
struct Cli {
    #[command(flatten)]
    defaults: DefaultArgs,

    #[command(flatten)]
    mysql: MysqlArgs,
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut integration = Integration::new(mysql::NAME, mysql::VERSION, &cli.defaults)?;
    mysql::run(&mut integration, &cli.defaults, &cli.mysql).await?;
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
