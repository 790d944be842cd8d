use kube::{Client, config::KubeConfigOptions};
use tracing::info;

pub mod config;
pub mod credstash;
pub mod crds;
pub mod error;
pub mod ownership;
pub mod reconciler;
pub mod resolver;
pub mod store;
pub mod watch;

#[cfg(test)]
mod testing;

use config::Config;
use credstash::CredstashResolver;
use reconciler::Reconciler;
use store::{KubeEvents, KubeSecrets};
use watch::WatchLoop;

pub use error::{Error, Result};

pub async fn kube_client() -> anyhow::Result<Client> {
    let options = KubeConfigOptions::default();

    // Load kubeconfig if it's present otherwise fall back to cluster config
    let config = kube::Config::from_kubeconfig(&options)
        .await
        .or_else(|_| kube::Config::incluster())?;

    Ok(Client::try_from(config)?)
}

/// Runs the controller until the watch fails for good.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let client = kube_client().await?;
    let sdk_config = config.aws_sdk_config().await;

    let reconciler = Reconciler::new(
        KubeSecrets::new(client.clone()),
        CredstashResolver::new(&sdk_config),
        config.default_table.clone(),
        config.namespaces.clone(),
    );
    let watch_loop = WatchLoop::new(KubeEvents::new(client), reconciler);

    info!("Waiting for credstash secrets to be defined...");
    let Err(err) = watch_loop.run().await;

    Err(err.into())
}
