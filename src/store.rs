use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use k8s_openapi::api::core::v1::Secret;
use kube::{
    Api, Client,
    api::{DeleteParams, DynamicObject, PostParams, WatchEvent, WatchParams},
};
use tracing::debug;

use crate::{crds, error::Result};

pub type EventStream = BoxStream<'static, kube::Result<WatchEvent<DynamicObject>>>;

/// Reads and writes the `Secret`s derived from `CredstashSecret`s.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;
    async fn create(&self, namespace: &str, secret: &Secret) -> Result<Secret>;
    async fn replace(&self, namespace: &str, name: &str, secret: &Secret) -> Result<Secret>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Produces a fresh event stream over every `CredstashSecret` each time it's called.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(&self) -> Result<EventStream>;
}

#[derive(Clone)]
pub struct KubeSecrets {
    client: Client,
}

impl KubeSecrets {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SecretStore for KubeSecrets {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        Ok(self
            .api(namespace)
            .create(&PostParams::default(), secret)
            .await?)
    }

    async fn replace(&self, namespace: &str, name: &str, secret: &Secret) -> Result<Secret> {
        Ok(self
            .api(namespace)
            .replace(name, &PostParams::default(), secret)
            .await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct KubeEvents {
    api: Api<DynamicObject>,
}

impl KubeEvents {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all_with(client, &crds::api_resource()),
        }
    }
}

#[async_trait]
impl EventSource for KubeEvents {
    async fn subscribe(&self) -> Result<EventStream> {
        debug!("Opening watch on {}.{}", crds::PLURAL, crds::GROUP);

        // Version "0" replays every existing object as ADDED before live events.
        let stream = self.api.watch(&WatchParams::default(), "0").await?;
        Ok(stream.boxed())
    }
}
