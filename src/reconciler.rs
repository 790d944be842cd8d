use std::collections::BTreeMap;

use k8s_openapi::{ByteString, api::core::v1::Secret};
use kube::api::{DynamicObject, ObjectMeta};
use tracing::{error, info, warn};

use crate::{
    config::NamespaceFilter,
    crds::{CredstashSecret, SecretItem},
    error::{Error, Result},
    ownership::{Ownership, Revision},
    resolver::SecretResolver,
    store::SecretStore,
};

/// What a watch event asks of the reconciler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    Applied,
    Deleted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The declared resource lacked its identity or spec.
    Dropped,
    /// The namespace isn't in the allow list.
    Filtered,
    /// The secret already reflects this or a newer revision.
    Stale,
    Created,
    Replaced,
    Deleted,
    /// Delete requested for a secret the controller doesn't own.
    Retained,
    /// Delete requested but there was nothing to delete.
    Absent,
    /// The pass was abandoned without writing anything.
    Failed,
}

pub struct Reconciler<S, R> {
    secrets: S,
    resolver: R,
    default_table: String,
    namespaces: NamespaceFilter,
}

impl<S: SecretStore, R: SecretResolver> Reconciler<S, R> {
    pub fn new(
        secrets: S,
        resolver: R,
        default_table: impl Into<String>,
        namespaces: NamespaceFilter,
    ) -> Self {
        Self {
            secrets,
            resolver,
            default_table: default_table.into(),
            namespaces,
        }
    }

    /// Runs one event through the namespace filter and into `update` or `delete`.
    /// Failures end the pass here; the next event for the same object retries it.
    pub async fn handle(
        &self,
        change: Change,
        object: &DynamicObject,
        revision: Option<i64>,
    ) -> Outcome {
        let namespace = object.metadata.namespace.as_deref().unwrap_or_default();
        let name = object.metadata.name.as_deref().unwrap_or_default();

        if !self.namespaces.allows(namespace) {
            warn!(
                "CredstashSecret '{}/{}' is in an unauthorized namespace, skipping",
                namespace, name
            );
            return Outcome::Filtered;
        }

        info!("Handling {:?} on '{}/{}'", change, namespace, name);

        let result = match change {
            Change::Applied => self.update(object, revision).await,
            Change::Deleted => self.delete(object, revision).await,
        };

        result.unwrap_or_else(|e| {
            error!("Failed to reconcile '{}/{}': {}", namespace, name, e);
            Outcome::Failed
        })
    }

    /// Converges the secret named after `object` onto its spec. Nothing is written
    /// unless every item resolves.
    pub async fn update(&self, object: &DynamicObject, revision: Option<i64>) -> Result<Outcome> {
        let Some(declared) = CredstashSecret::from_object(object) else {
            warn!("CredstashSecret is missing its name, namespace or spec, dropping it");
            return Ok(Outcome::Dropped);
        };
        let CredstashSecret {
            namespace,
            name,
            items,
        } = declared;

        let (mut secret, ownership, exists) =
            match self.secrets.get(&namespace, &name).await? {
                None => {
                    let secret = Secret {
                        metadata: ObjectMeta {
                            name: Some(name.clone()),
                            namespace: Some(namespace.clone()),
                            ..ObjectMeta::default()
                        },
                        ..Secret::default()
                    };
                    (secret, Ownership::created(revision), false)
                }
                Some(existing) => {
                    let mut ownership = Ownership::read(&existing.metadata);
                    if ownership.check_revision(revision) == Revision::Stale {
                        info!(
                            "Secret '{}/{}' is already at revision {}, skipping",
                            namespace, name, ownership.last_revision
                        );
                        return Ok(Outcome::Stale);
                    }
                    ownership.advance(revision);
                    (existing, ownership, true)
                }
            };

        // Managed secrets mirror the spec exactly; unmanaged ones only gain keys.
        let mut data = if ownership.managed {
            BTreeMap::new()
        } else {
            secret.data.take().unwrap_or_default()
        };

        for (index, raw) in items.iter().enumerate() {
            let item = SecretItem::parse(index, raw)?;
            let table = item.table.as_deref().unwrap_or(&self.default_table);

            let value = self
                .resolver
                .resolve(&item.source_name, table, &item.version)
                .await
                .map_err(|source| Error::Resolve {
                    name: item.source_name.clone(),
                    version: item.version.clone(),
                    table: table.to_owned(),
                    source,
                })?;

            data.insert(item.target_key, ByteString(value));
        }

        let count = data.len();
        secret.data = Some(data);
        ownership.write(&mut secret.metadata);

        if exists {
            info!("Updating secret '{}/{}' with {} items", namespace, name, count);
            self.secrets.replace(&namespace, &name, &secret).await?;
            Ok(Outcome::Replaced)
        } else {
            info!("Creating new secret '{}/{}' with {} items", namespace, name, count);
            self.secrets.create(&namespace, &secret).await?;
            Ok(Outcome::Created)
        }
    }

    /// Removes the secret named after `object` if the controller owns it.
    pub async fn delete(&self, object: &DynamicObject, revision: Option<i64>) -> Result<Outcome> {
        let (Some(namespace), Some(name)) = (
            object.metadata.namespace.as_deref(),
            object.metadata.name.as_deref(),
        ) else {
            warn!("CredstashSecret is missing its name or namespace, dropping it");
            return Ok(Outcome::Dropped);
        };

        let Some(existing) = self.secrets.get(namespace, name).await? else {
            info!("Secret '{}/{}' is already gone", namespace, name);
            return Ok(Outcome::Absent);
        };

        let ownership = Ownership::read(&existing.metadata);
        if ownership.check_revision(revision) == Revision::Stale {
            info!(
                "Secret '{}/{}' is already at revision {}, skipping",
                namespace, name, ownership.last_revision
            );
            return Ok(Outcome::Stale);
        }

        if ownership.managed {
            info!("Secret '{}/{}' is managed by credstash, deleting it", namespace, name);
            self.secrets.delete(namespace, name).await?;
            Ok(Outcome::Deleted)
        } else {
            info!(
                "Secret '{}/{}' is NOT managed by credstash, NOT deleting it",
                namespace, name
            );
            Ok(Outcome::Retained)
        }
    }
}
