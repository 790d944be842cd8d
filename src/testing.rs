//! In-memory stand-ins for the kube and credstash clients.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use k8s_openapi::api::core::v1::Secret;
use kube::{
    ResourceExt,
    api::{DynamicObject, WatchEvent},
    core::ErrorResponse,
};

use crate::{
    error::{Error, Result},
    resolver::{ResolveError, SecretResolver},
    store::{EventSource, EventStream, SecretStore},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Get(String, String),
    Create(String, String),
    Replace(String, String),
    Delete(String, String),
}

pub fn api_error(code: u16, reason: &str) -> ErrorResponse {
    ErrorResponse {
        status: "Failure".to_owned(),
        message: reason.to_owned(),
        reason: reason.to_owned(),
        code,
    }
}

#[derive(Clone, Default)]
pub struct FakeSecrets {
    objects: Arc<Mutex<BTreeMap<(String, String), Secret>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    fail_writes: Arc<Mutex<bool>>,
    failing_reads: Arc<Mutex<usize>>,
}

impl FakeSecrets {
    pub fn insert(&self, secret: Secret) {
        let key = (secret.namespace().unwrap(), secret.name_any());
        self.objects.lock().unwrap().insert(key, secret);
    }

    pub fn stored(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.lock().unwrap() = true;
    }

    /// Fails the next `count` reads with a server error.
    pub fn fail_reads(&self, count: usize) {
        *self.failing_reads.lock().unwrap() = count;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Get(..)))
            .collect()
    }

    fn record(&self, call: Call) -> Result<()> {
        let is_write = !matches!(call, Call::Get(..));
        self.calls.lock().unwrap().push(call);

        if is_write && *self.fail_writes.lock().unwrap() {
            return Err(Error::Kube(kube::Error::Api(api_error(409, "Conflict"))));
        }
        if !is_write {
            let mut failing = self.failing_reads.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(Error::Kube(kube::Error::Api(api_error(500, "InternalError"))));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for FakeSecrets {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        self.record(Call::Get(namespace.to_owned(), name.to_owned()))?;
        Ok(self.stored(namespace, name))
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        self.record(Call::Create(namespace.to_owned(), secret.name_any()))?;
        self.insert(secret.clone());
        Ok(secret.clone())
    }

    async fn replace(&self, namespace: &str, name: &str, secret: &Secret) -> Result<Secret> {
        self.record(Call::Replace(namespace.to_owned(), name.to_owned()))?;
        self.insert(secret.clone());
        Ok(secret.clone())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(Call::Delete(namespace.to_owned(), name.to_owned()))?;
        self.objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_owned(), name.to_owned()));
        Ok(())
    }
}

/// Resolves from a fixed map; seeded failures win, anything else is `NotFound`.
#[derive(Clone, Default)]
pub struct FakeResolver {
    values: Arc<BTreeMap<String, Vec<u8>>>,
    failures: Arc<Mutex<BTreeMap<String, ResolveError>>>,
    calls: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl FakeResolver {
    pub fn with<const N: usize>(values: [(&str, &str); N]) -> Self {
        Self {
            values: Arc::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.to_owned(), v.as_bytes().to_vec()))
                    .collect(),
            ),
            failures: Arc::default(),
            calls: Arc::default(),
        }
    }

    /// Makes every lookup of `name` fail with `error`.
    pub fn failing(self, name: &str, error: ResolveError) -> Self {
        self.failures.lock().unwrap().insert(name.to_owned(), error);
        self
    }

    pub fn calls(&self) -> Vec<(String, String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecretResolver for FakeResolver {
    async fn resolve(
        &self,
        name: &str,
        table: &str,
        version: &str,
    ) -> Result<Vec<u8>, ResolveError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_owned(), table.to_owned(), version.to_owned()));

        if let Some(error) = self.failures.lock().unwrap().get(name) {
            return Err(error.clone());
        }

        self.values.get(name).cloned().ok_or(ResolveError::NotFound)
    }
}

/// Hands out one scripted stream per subscription and fails once they run out.
#[derive(Clone, Default)]
pub struct FakeEvents {
    streams: Arc<Mutex<VecDeque<Vec<WatchEvent<DynamicObject>>>>>,
    subscriptions: Arc<Mutex<usize>>,
}

impl FakeEvents {
    pub fn new(streams: Vec<Vec<WatchEvent<DynamicObject>>>) -> Self {
        Self {
            streams: Arc::new(Mutex::new(streams.into())),
            subscriptions: Arc::default(),
        }
    }

    pub fn subscriptions(&self) -> usize {
        *self.subscriptions.lock().unwrap()
    }
}

#[async_trait]
impl EventSource for FakeEvents {
    async fn subscribe(&self) -> Result<EventStream> {
        *self.subscriptions.lock().unwrap() += 1;

        let events = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Kube(kube::Error::Api(api_error(503, "ServiceUnavailable"))))?;

        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }
}
