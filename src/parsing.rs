//! Fixed-column parsers for provider listings
//!
//! Kubernetes and OpenShift print whitespace-separated tables with exactly
//! five columns per kind. `docker ps` pads its columns with runs of two or
//! more spaces and leaves the PORTS column blank for containers that publish
//! nothing, so a row has either six or seven cells.
//!
//! Any other cell count is a [`MalformedOutputError`]. A row is never
//! truncated, padded or shifted to make it fit.

use crate::record::{
    ContainerRecord, ControllerRecord, ObjectKind, ObjectRecord, PodRecord, ServiceRecord,
    Snapshot,
};

/// Message kubectl and oc print instead of a table when a listing is empty
const NO_RESOURCES: &str = "No resources found";

/// A listing row did not split into the expected number of fields
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed {kind} listing: expected {expected} fields, found {found} in {line:?}")]
pub struct MalformedOutputError {
    pub kind: ObjectKind,
    pub line: String,
    pub expected: &'static str,
    pub found: usize,
}

/// Parse a full listing (header line included) into a snapshot
///
/// The first non-empty line is the header and is discarded. Blank lines are
/// skipped. An empty listing, or kubectl's "No resources found" notice,
/// yields an empty snapshot.
pub fn parse_listing(kind: ObjectKind, output: &str) -> Result<Snapshot, MalformedOutputError> {
    let mut snapshot = Snapshot::empty(kind);
    let mut lines = output.lines().filter(|line| !line.trim().is_empty());

    match lines.next() {
        None => return Ok(snapshot),
        Some(first) if first.trim_start().starts_with(NO_RESOURCES) => return Ok(snapshot),
        Some(_header) => {}
    }

    for line in lines {
        snapshot.insert(parse_line(kind, line)?);
    }

    Ok(snapshot)
}

/// Parse one data row of a listing
pub fn parse_line(kind: ObjectKind, line: &str) -> Result<ObjectRecord, MalformedOutputError> {
    match kind {
        ObjectKind::Pod => {
            let [name, ready, status, restarts, age] = split_exact(kind, line)?;
            Ok(ObjectRecord::Pod(PodRecord {
                name,
                ready,
                status,
                restarts,
                age,
            }))
        }
        ObjectKind::Service => {
            let [name, labels, selector, ips, ports] = split_exact(kind, line)?;
            Ok(ObjectRecord::Service(ServiceRecord {
                name,
                labels,
                selector,
                ips,
                ports,
            }))
        }
        ObjectKind::Controller => {
            let [controller, container, image, selector, replicas] = split_exact(kind, line)?;
            Ok(ObjectRecord::Controller(ControllerRecord {
                controller,
                container,
                image,
                selector,
                replicas,
            }))
        }
        ObjectKind::Container => parse_container(line).map(ObjectRecord::Container),
    }
}

/// Split a whitespace-delimited row into exactly five fields
fn split_exact(kind: ObjectKind, line: &str) -> Result<[String; 5], MalformedOutputError> {
    let fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
    let found = fields.len();

    fields.try_into().map_err(|_| MalformedOutputError {
        kind,
        line: line.to_string(),
        expected: "5",
        found,
    })
}

/// Split a `docker ps` row on runs of two or more spaces
fn split_padded(line: &str) -> Vec<&str> {
    line.trim()
        .split("  ")
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .collect()
}

fn parse_container(line: &str) -> Result<ContainerRecord, MalformedOutputError> {
    let cells = split_padded(line);

    let (id, image, command, created, status, ports, names) = match cells.as_slice() {
        [id, image, command, created, status, names] => {
            (*id, *image, *command, *created, *status, "", *names)
        }
        [id, image, command, created, status, ports, names] => {
            (*id, *image, *command, *created, *status, *ports, *names)
        }
        _ => {
            return Err(MalformedOutputError {
                kind: ObjectKind::Container,
                line: line.to_string(),
                expected: "6 or 7",
                found: cells.len(),
            })
        }
    };

    Ok(ContainerRecord {
        id: id.to_string(),
        image: image.to_string(),
        command: command.to_string(),
        created: created.to_string(),
        status: status.to_string(),
        ports: ports.to_string(),
        names: names.to_string(),
    })
}
