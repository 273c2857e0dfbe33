//! In-memory cluster used by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use kube::error::ErrorResponse;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tenant_operator::config::Config;
use tenant_operator::crd::{Tenant, TenantSpec, TenantStatus};
use tenant_operator::store::{ChildKind, ChildResource, ClusterStore, CreateOutcome};
use tenant_operator::{Error, Result};

/// How an injected fault behaves
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// 503 from the API server
    Transient,
    /// 403 from the API server
    Permanent,
    /// The call never returns
    Hang,
    /// 403 because the target namespace is still being deleted
    NamespaceTerminating,
}

/// A call made against the fake
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Get(String),
    Create(ChildKind, String),
    WriteStatus(String),
}

type CreateHook = Arc<dyn Fn(&FakeCluster, &ChildResource) + Send + Sync>;

#[derive(Default)]
struct Inner {
    tenants: BTreeMap<String, Tenant>,
    objects: BTreeMap<(ChildKind, Option<String>, String), ChildResource>,
    create_faults: HashMap<ChildKind, Fault>,
    get_fault: Option<Fault>,
    status_fault: Option<Fault>,
    calls: Vec<Call>,
    statuses: Vec<(String, TenantStatus)>,
    next_uid: u64,
}

#[derive(Default)]
pub struct FakeCluster {
    inner: Mutex<Inner>,
    create_hook: Mutex<Option<CreateHook>>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Create or update a Tenant. A changed spec bumps the generation.
    pub fn apply(&self, name: &str, spec: TenantSpec) -> Tenant {
        let mut inner = self.lock();
        let tenant = match inner.tenants.get(name).cloned() {
            Some(existing) if existing.spec == spec => existing,
            Some(mut updated) => {
                updated.spec = spec;
                updated.metadata.generation = Some(updated.generation() + 1);
                updated
            }
            None => {
                inner.next_uid += 1;
                let mut created = Tenant::new(name, spec);
                created.metadata.generation = Some(1);
                created.metadata.uid = Some(format!("uid-{}", inner.next_uid));
                created
            }
        };
        inner.tenants.insert(name.to_string(), tenant.clone());
        tenant
    }

    /// Delete a Tenant and garbage collect what it owns
    pub fn delete(&self, name: &str) {
        let mut inner = self.lock();
        inner.tenants.remove(name);
        inner.objects.retain(|(kind, namespace, object), _| {
            let owned = match kind {
                ChildKind::Namespace => object == name,
                _ => namespace.as_deref() == Some(name),
            };
            !owned
        });
    }

    /// Put an object in place as if someone else created it
    pub fn seed(&self, resource: ChildResource) {
        let key = object_key(&resource);
        self.lock().objects.insert(key, resource);
    }

    pub fn fail_creates(&self, kind: ChildKind, fault: Fault) {
        self.lock().create_faults.insert(kind, fault);
    }

    pub fn fail_gets(&self, fault: Fault) {
        self.lock().get_fault = Some(fault);
    }

    pub fn fail_status_writes(&self, fault: Fault) {
        self.lock().status_fault = Some(fault);
    }

    pub fn heal(&self) {
        let mut inner = self.lock();
        inner.create_faults.clear();
        inner.get_fault = None;
        inner.status_fault = None;
    }

    /// Run `hook` after every successful create
    pub fn on_create<F>(&self, hook: F)
    where
        F: Fn(&FakeCluster, &ChildResource) + Send + Sync + 'static,
    {
        *self.create_hook.lock().unwrap() = Some(Arc::new(hook));
    }

    pub fn tenant(&self, name: &str) -> Option<Tenant> {
        self.lock().tenants.get(name).cloned()
    }

    pub fn status(&self, name: &str) -> Option<TenantStatus> {
        self.tenant(name).and_then(|t| t.status)
    }

    pub fn object(&self, kind: ChildKind, namespace: Option<&str>, name: &str) -> Option<ChildResource> {
        self.lock()
            .objects
            .get(&(kind, namespace.map(str::to_string), name.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Kinds of every create call, in order
    pub fn create_calls(&self) -> Vec<ChildKind> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Create(kind, _) => Some(kind),
                _ => None,
            })
            .collect()
    }

    pub fn get_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Get(_)))
            .count()
    }

    /// Every status successfully written for `name`, oldest first
    pub fn status_history(&self, name: &str) -> Vec<TenantStatus> {
        self.lock()
            .statuses
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

fn object_key(resource: &ChildResource) -> (ChildKind, Option<String>, String) {
    (
        resource.kind(),
        resource.namespace().map(str::to_string),
        resource.name().to_string(),
    )
}

fn api_error(code: u16, reason: &str, message: &str) -> Error {
    Error::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: reason.to_string(),
        code,
    }))
}

async fn inject(fault: Option<Fault>) -> Result<()> {
    match fault {
        None => Ok(()),
        Some(Fault::Transient) => Err(api_error(503, "ServiceUnavailable", "injected outage")),
        Some(Fault::Permanent) => Err(api_error(403, "Forbidden", "injected denial")),
        Some(Fault::Hang) => std::future::pending().await,
        Some(Fault::NamespaceTerminating) => Err(api_error(
            403,
            "Forbidden",
            "unable to create new content in namespace candidate because it is being terminated",
        )),
    }
}

#[async_trait]
impl ClusterStore for FakeCluster {
    async fn get_tenant(&self, name: &str) -> Result<Option<Tenant>> {
        let fault = {
            let mut inner = self.lock();
            inner.calls.push(Call::Get(name.to_string()));
            inner.get_fault
        };
        inject(fault).await?;
        Ok(self.tenant(name))
    }

    async fn create(&self, resource: &ChildResource) -> Result<CreateOutcome> {
        let kind = resource.kind();
        let fault = {
            let mut inner = self.lock();
            inner
                .calls
                .push(Call::Create(kind, resource.name().to_string()));
            inner.create_faults.get(&kind).copied()
        };
        inject(fault).await?;

        let outcome = {
            let mut inner = self.lock();
            let key = object_key(resource);
            if inner.objects.contains_key(&key) {
                CreateOutcome::AlreadyExists
            } else {
                inner.objects.insert(key, resource.clone());
                CreateOutcome::Created
            }
        };

        let hook = self.create_hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(self, resource);
        }

        Ok(outcome)
    }

    async fn write_status(&self, name: &str, status: &TenantStatus) -> Result<()> {
        let fault = {
            let mut inner = self.lock();
            inner.calls.push(Call::WriteStatus(name.to_string()));
            inner.status_fault
        };
        inject(fault).await?;

        let mut inner = self.lock();
        let Some(tenant) = inner.tenants.get_mut(name) else {
            return Err(api_error(404, "NotFound", "tenant not found"));
        };
        tenant.status = Some(status.clone());
        inner.statuses.push((name.to_string(), status.clone()));
        Ok(())
    }
}

pub fn spec(owner: &str) -> TenantSpec {
    TenantSpec {
        owner: owner.to_string(),
        ..Default::default()
    }
}

/// Configuration with short intervals so delays stay readable
pub fn test_config() -> Config {
    Config {
        workers: 2,
        resync_interval: Duration::from_secs(60),
        retry_base_delay: Duration::from_millis(100),
        retry_max_delay: Duration::from_secs(5),
        call_timeout: Duration::from_secs(2),
        metrics_port: 0,
        ..Config::default()
    }
}
