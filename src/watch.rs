use std::convert::Infallible;

use futures::TryStreamExt;
use kube::api::{DynamicObject, WatchEvent};
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    reconciler::{Change, Outcome, Reconciler},
    resolver::SecretResolver,
    store::{EventSource, SecretStore},
};

/// HTTP status the API server uses when a watch cursor has expired.
const GONE: u16 = 410;

/// What the loop does after an event has been dispatched.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Resubscribe,
}

/// Feeds `CredstashSecret` events to the reconciler one at a time, for ever.
pub struct WatchLoop<E, S, R> {
    events: E,
    reconciler: Reconciler<S, R>,
}

impl<E, S, R> WatchLoop<E, S, R>
where
    E: EventSource,
    S: SecretStore,
    R: SecretResolver,
{
    pub fn new(events: E, reconciler: Reconciler<S, R>) -> Self {
        Self { events, reconciler }
    }

    /// Only returns when the watch can't be (re)established or the stream reports an
    /// error other than an expired cursor.
    pub async fn run(&self) -> Result<Infallible> {
        loop {
            let mut stream = self.events.subscribe().await?;
            info!("Watching for CredstashSecret changes");

            while let Some(event) = stream.try_next().await? {
                if self.dispatch(event).await? == Flow::Resubscribe {
                    break;
                }
            }

            debug!("Watch stream closed, resubscribing");
        }
    }

    async fn dispatch(&self, event: WatchEvent<DynamicObject>) -> Result<Flow> {
        match event {
            WatchEvent::Added(object) | WatchEvent::Modified(object) => {
                self.reconcile(Change::Applied, &object).await;
            }
            WatchEvent::Deleted(object) => {
                self.reconcile(Change::Deleted, &object).await;
            }
            WatchEvent::Bookmark(_) => {}
            WatchEvent::Error(e) if e.code == GONE => {
                info!("Watch cursor expired ({}), resubscribing", e.message);
                return Ok(Flow::Resubscribe);
            }
            WatchEvent::Error(e) => return Err(Error::Watch(e)),
        }

        Ok(Flow::Continue)
    }

    async fn reconcile(&self, change: Change, object: &DynamicObject) -> Outcome {
        self.reconciler
            .handle(change, object, revision_of(object))
            .await
    }
}

/// The object's resourceVersion as a number, when it is one.
pub fn revision_of(object: &DynamicObject) -> Option<i64> {
    let version = object.metadata.resource_version.as_deref()?;

    match version.parse() {
        Ok(revision) => Some(revision),
        Err(_) => {
            warn!("Ignoring non-numeric resourceVersion '{}'", version);
            None
        }
    }
}
