//! Normalized provider objects
//!
//! Every provider lists its objects as a text table in its own format.
//! The parsers in [`crate::parsing`] turn those tables into [`ObjectRecord`]s
//! collected in a [`Snapshot`]: one kind, one provider, one instant.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Kind of runtime object tracked by the harness
///
/// The declaration order is the teardown order: pods, then services, then
/// replication controllers. Docker containers are tracked on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Pod,
    Service,
    Controller,
    Container,
}

impl ObjectKind {
    /// Kinds tracked on Kubernetes-shaped providers, in teardown order
    pub const CLUSTER: [ObjectKind; 3] = [Self::Pod, Self::Service, Self::Controller];

    /// Kinds tracked on the plain Docker provider
    pub const DOCKER: [ObjectKind; 1] = [Self::Container];

    /// Label used in assertion messages (e.g. `Pod: wordpress exists.`)
    pub fn label(self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Service => "Service",
            Self::Controller => "RC",
            Self::Container => "Container",
        }
    }

    /// Columns of the listing, in order
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Pod => &["name", "ready", "status", "restarts", "age"],
            Self::Service => &["name", "labels", "selector", "ips", "ports"],
            Self::Controller => &["controller", "container", "image", "selector", "replicas"],
            Self::Container => &["id", "image", "command", "created", "status", "ports", "names"],
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pod => "pod",
            Self::Service => "service",
            Self::Controller => "rc",
            Self::Container => "container",
        };
        f.write_str(name)
    }
}

/// One row of `kubectl get pods`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodRecord {
    pub name: String,
    pub ready: String,
    pub status: String,
    pub restarts: String,
    pub age: String,
}

/// One row of `kubectl get services`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRecord {
    pub name: String,
    pub labels: String,
    pub selector: String,
    pub ips: String,
    pub ports: String,
}

/// One row of `kubectl get rc`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerRecord {
    pub controller: String,
    pub container: String,
    pub image: String,
    pub selector: String,
    pub replicas: String,
}

/// One row of `docker ps`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRecord {
    pub id: String,
    pub image: String,
    pub command: String,
    pub created: String,
    pub status: String,
    pub ports: String,
    pub names: String,
}

impl ContainerRecord {
    /// Docker reports running containers as `Up <duration>`
    pub fn is_running(&self) -> bool {
        self.status.starts_with("Up")
    }
}

/// A normalized provider object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ObjectRecord {
    Pod(PodRecord),
    Service(ServiceRecord),
    Controller(ControllerRecord),
    Container(ContainerRecord),
}

impl ObjectRecord {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Pod(_) => ObjectKind::Pod,
            Self::Service(_) => ObjectKind::Service,
            Self::Controller(_) => ObjectKind::Controller,
            Self::Container(_) => ObjectKind::Container,
        }
    }

    /// Field that identifies the record within a snapshot
    pub fn key(&self) -> &str {
        match self {
            Self::Pod(pod) => &pod.name,
            Self::Service(svc) => &svc.name,
            Self::Controller(rc) => &rc.controller,
            Self::Container(container) => &container.id,
        }
    }

    /// Status column, for the kinds that have one
    pub fn status(&self) -> Option<&str> {
        match self {
            Self::Pod(pod) => Some(&pod.status),
            Self::Container(container) => Some(&container.status),
            Self::Service(_) | Self::Controller(_) => None,
        }
    }

    /// Whether `name` refers to this record
    ///
    /// Containers answer to their id or their name; everything else only to
    /// its key.
    pub fn answers_to(&self, name: &str) -> bool {
        match self {
            Self::Container(container) => container.id == name || container.names == name,
            other => other.key() == name,
        }
    }
}

/// Objects of one kind observed at one instant, keyed by [`ObjectRecord::key`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    kind: ObjectKind,
    records: BTreeMap<String, ObjectRecord>,
}

impl Snapshot {
    /// Snapshot with no objects, which is also how absence is observed
    pub fn empty(kind: ObjectKind) -> Self {
        Self {
            kind,
            records: BTreeMap::new(),
        }
    }

    /// Build a snapshot of `kind` from already-normalized records
    pub fn from_records(kind: ObjectKind, records: impl IntoIterator<Item = ObjectRecord>) -> Self {
        let mut snapshot = Self::empty(kind);
        snapshot.extend(records);
        snapshot
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Insert a record, replacing any previous record with the same key
    pub(crate) fn insert(&mut self, record: ObjectRecord) {
        self.records.insert(record.key().to_string(), record);
    }

    pub fn get(&self, key: &str) -> Option<&ObjectRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Find a record by key, or for containers also by name
    pub fn find(&self, name: &str) -> Option<&ObjectRecord> {
        self.records
            .get(name)
            .or_else(|| self.records.values().find(|r| r.answers_to(name)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn records(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keys present in `self` but absent from `baseline`, in key order
    pub fn delta(&self, baseline: &Snapshot) -> Vec<String> {
        self.records
            .keys()
            .filter(|key| !baseline.contains(key))
            .cloned()
            .collect()
    }
}

impl Extend<ObjectRecord> for Snapshot {
    fn extend<I: IntoIterator<Item = ObjectRecord>>(&mut self, iter: I) {
        for record in iter {
            debug_assert_eq!(record.kind(), self.kind, "record kind must match snapshot");
            self.insert(record);
        }
    }
}
