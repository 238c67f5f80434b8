use clap::Parser;
use integration_sdk::{logging, DefaultArgs, Integration};
use integrations::apache::{self, ApacheArgs};
use tracing::error;

/// Apache HTTP server integration: mod_status metrics and httpd inventory
#[derive(Parser, Debug)]
#[command(name = "nr-apache", version)]
struct Cli {
    #[command(flatten)]
    defaults: DefaultArgs,

    #[command(flatten)]
    apache: ApacheArgs,
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut integration = Integration::new(apache::NAME, apache::VERSION, &cli.defaults)?;
    apache::run(&mut integration, &cli.defaults, &cli.apache).await?;
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
