use clap::Parser;
use integration_sdk::{logging, DefaultArgs, Integration};
use integrations::nginx::{self, NginxArgs};
use tracing::error;

/// NGINX integration: stub_status and NGINX Plus status metrics
#[derive(Parser, Debug)]
#[command(name = "nr-nginx", version)]
struct Cli {
    #[command(flatten)]
    defaults: DefaultArgs,

    #[command(flatten)]
    nginx: NginxArgs,
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut integration = Integration::new(nginx::NAME, nginx::VERSION, &cli.defaults)?;
    nginx::run(&mut integration, &cli.defaults, &cli.nginx).await?;
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
