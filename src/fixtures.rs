//! In-memory provider for tests
//!
//! [`FakeProvider`] is a [`CommandExecutor`] that interprets the provider
//! commands the harness issues (`kubectl`, `oc`, `docker`, `kind` and the
//! packaging tool) against an in-memory set of objects, and records every
//! invocation. No cluster or daemon required.
//!
//! # Example
//!
//! ```ignore
//! use nulecule_harness::fixtures::FakeProvider;
//!
//! let fake = Arc::new(
//!     FakeProvider::new()
//!         .with_pod("router", "Running")
//!         .deploys_pod("wordpress", "Running")
//!         .deploys_service("wordpress")
//!         .teardown_lag(2),
//! );
//!
//! let adapter = KubernetesAdapter::new(fake.clone());
//! // ...
//! assert!(fake.commands().contains(&"kubectl delete pod wordpress".to_string()));
//! ```
//!
//! Time in the fake is counted in reads: every `get` or `ps` served is one
//! observation. Scheduled changes ([`FakeProvider::status_after`],
//! [`FakeProvider::appear_after`], [`FakeProvider::teardown_lag`]) take
//! effect once enough reads have been served.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use crate::answers::Answers;
use crate::record::ObjectKind;
use crate::runner::{CommandExecutor, Invocation, RunResult, RunnerError};

const PACKAGING_TOOL: &str = "atomicapp";

/// An object held by the fake provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeObject {
    pub kind: ObjectKind,
    /// Name, or container id
    pub key: String,
    /// Container name (same as `key` for other kinds)
    pub names: String,
    pub status: String,
    pub ports: String,
}

impl FakeObject {
    pub fn pod(name: &str, status: &str) -> Self {
        Self::named(ObjectKind::Pod, name, status)
    }

    pub fn service(name: &str) -> Self {
        Self::named(ObjectKind::Service, name, "")
    }

    pub fn controller(name: &str) -> Self {
        Self::named(ObjectKind::Controller, name, "")
    }

    pub fn container(id: &str, names: &str, status: &str) -> Self {
        Self {
            kind: ObjectKind::Container,
            key: id.to_string(),
            names: names.to_string(),
            status: status.to_string(),
            ports: String::new(),
        }
    }

    /// Published ports (containers only)
    pub fn ports(mut self, ports: &str) -> Self {
        self.ports = ports.to_string();
        self
    }

    fn named(kind: ObjectKind, name: &str, status: &str) -> Self {
        Self {
            kind,
            key: name.to_string(),
            names: name.to_string(),
            status: status.to_string(),
            ports: String::new(),
        }
    }

    fn answers_to(&self, name: &str) -> bool {
        self.key == name || self.names == name
    }

    /// Listing row in the provider's own format
    fn row(&self) -> String {
        let name = &self.key;
        match self.kind {
            ObjectKind::Pod => format!("{name}   1/1   {}   0   1m", self.status),
            ObjectKind::Service => {
                format!("{name}   name={name}   name={name}   10.254.0.10   80/TCP")
            }
            ObjectKind::Controller => {
                format!("{name}   {name}   example/{name}   name={name}   1")
            }
            ObjectKind::Container => {
                let mut cells = vec![
                    name.as_str(),
                    "example/app",
                    "\"/run.sh\"",
                    "2 minutes ago",
                    self.status.as_str(),
                ];
                if !self.ports.is_empty() {
                    cells.push(self.ports.as_str());
                }
                cells.push(self.names.as_str());
                cells.join("   ")
            }
        }
    }
}

/// Header line printed before the rows of a listing
fn header(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Pod => "NAME   READY   STATUS   RESTARTS   AGE",
        ObjectKind::Service => "NAME   LABELS   SELECTOR   IP(S)   PORT(S)",
        ObjectKind::Controller => "CONTROLLER   CONTAINER(S)   IMAGE(S)   SELECTOR   REPLICAS",
        ObjectKind::Container => {
            "CONTAINER ID   IMAGE   COMMAND   CREATED   STATUS   PORTS   NAMES"
        }
    }
}

/// Render a full listing of `objects`, header included
pub fn listing<'a>(kind: ObjectKind, objects: impl IntoIterator<Item = &'a FakeObject>) -> String {
    let mut out = format!("{}\n", header(kind));
    for object in objects {
        out.push_str(&object.row());
        out.push('\n');
    }
    out
}

/// Kind named by a kubectl resource argument
fn resource_kind(resource: &str) -> Option<ObjectKind> {
    match resource {
        "pod" | "pods" | "po" => Some(ObjectKind::Pod),
        "service" | "services" | "svc" => Some(ObjectKind::Service),
        "rc" | "replicationcontroller" | "replicationcontrollers" => Some(ObjectKind::Controller),
        _ => None,
    }
}

#[derive(Debug, Clone)]
enum Change {
    Status { name: String, status: String },
    Appear(FakeObject),
    Remove { kind: ObjectKind, key: String },
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<(ObjectKind, String), FakeObject>,
    invocations: Vec<Invocation>,
    failures: Vec<(String, String)>,
    unready: u32,
    reads: u32,
    scheduled: Vec<(u32, Change)>,
    teardown_lag: u32,
    kind_clusters: BTreeSet<String>,
    deploys: Vec<FakeObject>,
    leaks: BTreeSet<(ObjectKind, String)>,
    answers: Vec<String>,
    next_id: u64,
}

impl State {
    fn insert(&mut self, object: FakeObject) {
        self.objects.insert((object.kind, object.key.clone()), object);
    }

    fn find(&self, kind: ObjectKind, name: &str) -> Option<&FakeObject> {
        self.objects
            .values()
            .find(|object| object.kind == kind && object.answers_to(name))
    }

    /// Serve one read: apply due changes, then advance the clock
    fn observe(&mut self) {
        let now = self.reads;
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        self.scheduled = pending;

        for (_, change) in due {
            match change {
                Change::Status { name, status } => {
                    for object in self.objects.values_mut() {
                        if object.answers_to(&name) {
                            object.status = status.clone();
                        }
                    }
                }
                Change::Appear(object) => self.insert(object),
                Change::Remove { kind, key } => {
                    self.objects.remove(&(kind, key));
                }
            }
        }

        self.reads += 1;
    }

    fn remove(&mut self, kind: ObjectKind, key: String) {
        if self.teardown_lag == 0 {
            self.objects.remove(&(kind, key));
        } else {
            let at = self.reads + self.teardown_lag;
            self.scheduled.push((at, Change::Remove { kind, key }));
        }
    }

    fn probe(&mut self) -> RunResult {
        if self.unready > 0 {
            self.unready -= 1;
            return RunResult::failure(1, "The connection to the server localhost:8443 was refused");
        }
        RunResult::success("ok\n")
    }
}

/// In-memory provider and packaging tool
#[derive(Debug, Default)]
pub struct FakeProvider {
    state: Mutex<State>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with(self, f: impl FnOnce(&mut State)) -> Self {
        f(&mut self.state());
        self
    }

    /// Add an object that exists from the start
    pub fn with_object(self, object: FakeObject) -> Self {
        self.with(|state| state.insert(object))
    }

    pub fn with_pod(self, name: &str, status: &str) -> Self {
        self.with_object(FakeObject::pod(name, status))
    }

    pub fn with_service(self, name: &str) -> Self {
        self.with_object(FakeObject::service(name))
    }

    pub fn with_controller(self, name: &str) -> Self {
        self.with_object(FakeObject::controller(name))
    }

    pub fn with_container(self, id: &str, names: &str, status: &str) -> Self {
        self.with_object(FakeObject::container(id, names, status))
    }

    /// Fail every command starting with `prefix`, printing `stderr`
    pub fn fail_on(self, prefix: &str, stderr: &str) -> Self {
        self.with(|state| {
            state
                .failures
                .push((prefix.to_string(), stderr.to_string()))
        })
    }

    /// Fail the next `probes` readiness probes (`cluster-info`, `whoami`, `info`)
    pub fn unready_for(self, probes: u32) -> Self {
        self.with(|state| state.unready = probes)
    }

    /// Change the status of `name` once `reads` reads have been served
    pub fn status_after(self, name: &str, status: &str, reads: u32) -> Self {
        let change = Change::Status {
            name: name.to_string(),
            status: status.to_string(),
        };
        self.with(|state| state.scheduled.push((reads, change)))
    }

    /// Create `name` once `reads` reads have been served
    pub fn appear_after(self, kind: ObjectKind, name: &str, reads: u32) -> Self {
        let object = match kind {
            ObjectKind::Pod => FakeObject::pod(name, "Running"),
            ObjectKind::Container => FakeObject::container(name, name, "Up 1 second"),
            _ => FakeObject::named(kind, name, ""),
        };
        self.with(|state| state.scheduled.push((reads, Change::Appear(object))))
    }

    /// Deleted objects stay visible for `reads` more reads
    pub fn teardown_lag(self, reads: u32) -> Self {
        self.with(|state| state.teardown_lag = reads)
    }

    /// Object the packaging tool creates on `run`
    pub fn deploys(self, object: FakeObject) -> Self {
        self.with(|state| state.deploys.push(object))
    }

    pub fn deploys_pod(self, name: &str, status: &str) -> Self {
        self.deploys(FakeObject::pod(name, status))
    }

    pub fn deploys_service(self, name: &str) -> Self {
        self.deploys(FakeObject::service(name))
    }

    pub fn deploys_controller(self, name: &str) -> Self {
        self.deploys(FakeObject::controller(name))
    }

    pub fn deploys_container(self, id: &str, names: &str, status: &str) -> Self {
        self.deploys(FakeObject::container(id, names, status))
    }

    /// Deployed object the packaging tool forgets on `stop`
    pub fn leaks(self, kind: ObjectKind, key: &str) -> Self {
        self.with(|state| {
            state.leaks.insert((kind, key.to_string()));
        })
    }

    /// Every command executed so far, rendered as strings
    pub fn commands(&self) -> Vec<String> {
        self.state()
            .invocations
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state().invocations.clone()
    }

    /// Whether an object answering to `name` currently exists
    pub fn contains(&self, kind: ObjectKind, name: &str) -> bool {
        self.state().find(kind, name).is_some()
    }

    /// Keys of every current object of `kind`
    pub fn keys(&self, kind: ObjectKind) -> Vec<String> {
        self.state()
            .objects
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn kind_clusters(&self) -> Vec<String> {
        self.state().kind_clusters.iter().cloned().collect()
    }

    /// Answers files handed to the packaging tool, parsed, in order
    pub fn deployed_answers(&self) -> Vec<Answers> {
        self.state()
            .answers
            .iter()
            .filter_map(|ini| Answers::parse_ini(ini).ok())
            .collect()
    }

    fn interpret(&self, program: &str, args: &[String]) -> Result<RunResult, RunnerError> {
        let mut state = self.state();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        match program {
            "kubectl" | "oc" => Ok(cluster_command(&mut state, &args)),
            "docker" => Ok(docker_command(&mut state, &args)),
            "kind" => Ok(kind_command(&mut state, &args)),
            PACKAGING_TOOL => Ok(packaging_command(&mut state, &args)),
            other => Err(RunnerError::CommandNotFound(other.to_string())),
        }
    }
}

fn cluster_command(state: &mut State, args: &[&str]) -> RunResult {
    // Namespaces are not modeled
    let args: Vec<&str> = match args.iter().position(|a| *a == "--namespace") {
        Some(i) => args[..i].iter().chain(args.iter().skip(i + 2)).copied().collect(),
        None => args.to_vec(),
    };

    match args.as_slice() {
        ["cluster-info"] | ["whoami"] => state.probe(),
        ["project", project] => RunResult::success(format!("Now using project \"{project}\"\n")),
        ["get", resource, rest @ ..] => {
            let Some(kind) = resource_kind(resource) else {
                return unknown_resource(resource);
            };
            state.observe();
            match rest {
                [] => {
                    let objects: Vec<&FakeObject> =
                        state.objects.values().filter(|o| o.kind == kind).collect();
                    if objects.is_empty() {
                        return RunResult {
                            exit_code: 0,
                            stdout: String::new(),
                            stderr: "No resources found.\n".to_string(),
                        };
                    }
                    RunResult::success(listing(kind, objects))
                }
                [name, ..] => match state.find(kind, name) {
                    Some(object) => RunResult::success(listing(kind, [object])),
                    None => not_found(resource, name),
                },
            }
        }
        ["delete", resource, name, ..] => {
            let Some(kind) = resource_kind(resource) else {
                return unknown_resource(resource);
            };
            match state.find(kind, name).map(|o| o.key.clone()) {
                Some(key) => {
                    state.remove(kind, key);
                    RunResult::success(format!("{resource} \"{name}\" deleted\n"))
                }
                None => not_found(resource, name),
            }
        }
        _ => RunResult::failure(1, format!("error: unknown command {:?}\n", args.join(" "))),
    }
}

fn not_found(resource: &str, name: &str) -> RunResult {
    RunResult::failure(
        1,
        format!("Error from server (NotFound): {resource} \"{name}\" not found\n"),
    )
}

fn unknown_resource(resource: &str) -> RunResult {
    RunResult::failure(
        1,
        format!("error: the server doesn't have a resource type \"{resource}\"\n"),
    )
}

fn docker_command(state: &mut State, args: &[&str]) -> RunResult {
    match args {
        ["info"] => state.probe(),
        ["ps", "-a", rest @ ..] => {
            state.observe();
            // Like docker: `name=` matches part of the name, `id=` a prefix of the id
            let filter = match rest {
                ["--filter", filter] => Some(*filter),
                _ => None,
            };
            let containers = state.objects.values().filter(|o| {
                o.kind == ObjectKind::Container
                    && filter.map_or(true, |filter| match filter.split_once('=') {
                        Some(("name", name)) => o.names.contains(name),
                        Some(("id", id)) => o.key.starts_with(id),
                        _ => false,
                    })
            });
            RunResult::success(listing(ObjectKind::Container, containers))
        }
        ["rm", "-f", name] => {
            match state
                .find(ObjectKind::Container, name)
                .map(|o| o.key.clone())
            {
                Some(key) => {
                    state.remove(ObjectKind::Container, key);
                    RunResult::success(format!("{name}\n"))
                }
                None => RunResult::failure(1, format!("Error: No such container: {name}\n")),
            }
        }
        ["run", rest @ ..] => {
            let mut name = None;
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                match *arg {
                    "--name" => name = iter.next().copied(),
                    "-v" | "-p" | "-e" => {
                        iter.next();
                    }
                    flag if flag.starts_with('-') => {}
                    _ => break,
                }
            }
            state.next_id += 1;
            let id = format!("{:012x}", state.next_id);
            let names = name.unwrap_or(id.as_str()).to_string();
            state.insert(FakeObject::container(&id, &names, "Up Less than a second"));
            RunResult::success(format!("{id}\n"))
        }
        _ => RunResult::failure(1, format!("docker: unknown command {:?}\n", args.join(" "))),
    }
}

fn kind_command(state: &mut State, args: &[&str]) -> RunResult {
    match args {
        ["get", "clusters"] => {
            let clusters: Vec<&str> = state.kind_clusters.iter().map(String::as_str).collect();
            RunResult::success(clusters.join("\n"))
        }
        ["create", "cluster", "--name", name] => {
            state.kind_clusters.insert(name.to_string());
            RunResult::success(format!("Creating cluster \"{name}\" ...\n"))
        }
        ["delete", "cluster", "--name", name] => {
            state.kind_clusters.remove(*name);
            RunResult::success(format!("Deleting cluster \"{name}\" ...\n"))
        }
        _ => RunResult::failure(1, format!("kind: unknown command {:?}\n", args.join(" "))),
    }
}

fn packaging_command(state: &mut State, args: &[&str]) -> RunResult {
    match args.first() {
        Some(&"run") => {
            if let Some(path) = args.iter().find_map(|a| a.strip_prefix("--answers=")) {
                if let Ok(ini) = std::fs::read_to_string(path) {
                    state.answers.push(ini);
                }
            }
            for object in state.deploys.clone() {
                state.insert(object);
            }
            RunResult::success("Your application resides in the destination directory\n")
        }
        Some(&"stop") => {
            let deployed: Vec<(ObjectKind, String)> = state
                .deploys
                .iter()
                .map(|o| (o.kind, o.key.clone()))
                .filter(|id| !state.leaks.contains(id))
                .collect();
            for (kind, key) in deployed {
                if state.objects.contains_key(&(kind, key.clone())) {
                    state.remove(kind, key);
                }
            }
            RunResult::success("Undeployed application\n")
        }
        _ => RunResult::failure(2, "usage: atomicapp {run,stop} ...\n"),
    }
}

#[async_trait]
impl CommandExecutor for FakeProvider {
    async fn execute(&self, invocation: &Invocation) -> Result<RunResult, RunnerError> {
        let rendered = invocation.to_string();
        {
            let mut state = self.state();
            state.invocations.push(invocation.clone());
            if let Some((_, stderr)) = state
                .failures
                .iter()
                .find(|(prefix, _)| rendered.starts_with(prefix.as_str()))
            {
                return Ok(RunResult::failure(1, stderr.clone()));
            }
        }

        // Commands run inside a container are interpreted like host commands
        match invocation.args.as_slice() {
            [exec, flag, _container, program, rest @ ..]
                if invocation.program == "docker" && exec == "exec" && flag == "-i" =>
            {
                self.interpret(program, rest)
            }
            args => self.interpret(&invocation.program, args),
        }
    }
}
