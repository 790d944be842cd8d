use clap::Parser;
use credstash_controller::{config::Config, crds};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
enum Args {
    /// Watch CredstashSecrets and keep their secrets in sync
    Run(Config),
    /// Print the CredstashSecret CustomResourceDefinition
    Crds,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args {
        Args::Crds => {
            println!("{}", serde_yaml::to_string(&crds::crd()?)?);
        }
        Args::Run(config) => {
            credstash_controller::run(config).await?;
        }
    };

    Ok(())
}
