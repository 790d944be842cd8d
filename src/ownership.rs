use std::collections::BTreeMap;

use kube::api::ObjectMeta;

pub const MANAGED_ANNOTATION: &str = "credstash-fully-managed";
pub const LAST_REVISION_ANNOTATION: &str = "credstash-last-revision";

/// Stored when a secret was written without a revision marker.
pub const UNSET_REVISION: i64 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Revision {
    Fresh,
    Stale,
}

/// Typed view over the ownership annotations of a `Secret`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ownership {
    pub managed: bool,
    pub last_revision: i64,
}

impl Ownership {
    /// Ownership of a secret the controller is about to create.
    pub fn created(revision: Option<i64>) -> Self {
        Self {
            managed: true,
            last_revision: revision.unwrap_or(UNSET_REVISION),
        }
    }

    /// Anything other than a literal `"true"` counts as unmanaged.
    pub fn read(meta: &ObjectMeta) -> Self {
        let annotations = meta.annotations.as_ref();

        let managed = annotations
            .and_then(|a| a.get(MANAGED_ANNOTATION))
            .is_some_and(|v| v == "true");
        let last_revision = annotations
            .and_then(|a| a.get(LAST_REVISION_ANNOTATION))
            .and_then(|v| v.parse().ok())
            .unwrap_or(UNSET_REVISION);

        Self {
            managed,
            last_revision,
        }
    }

    /// An unmanaged secret keeps whatever ownership value its author gave it.
    pub fn write(&self, meta: &mut ObjectMeta) {
        let annotations = meta.annotations.get_or_insert_with(BTreeMap::new);
        if self.managed {
            annotations.insert(MANAGED_ANNOTATION.to_owned(), "true".to_owned());
        } else {
            annotations
                .entry(MANAGED_ANNOTATION.to_owned())
                .or_insert_with(|| "false".to_owned());
        }
        annotations.insert(
            LAST_REVISION_ANNOTATION.to_owned(),
            self.last_revision.to_string(),
        );
    }

    /// An unset incoming revision always passes; otherwise it has to be strictly newer
    /// than the one already applied.
    pub fn check_revision(&self, incoming: Option<i64>) -> Revision {
        match incoming {
            Some(revision) if revision <= self.last_revision => Revision::Stale,
            _ => Revision::Fresh,
        }
    }

    /// Records a revision that passed [`Ownership::check_revision`]. An unset revision
    /// keeps the stored one so replays never rewind the gate.
    pub fn advance(&mut self, incoming: Option<i64>) {
        if let Some(revision) = incoming {
            self.last_revision = revision;
        }
    }
}
