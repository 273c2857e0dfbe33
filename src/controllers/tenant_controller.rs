//! Controller for Tenant resources
//!
//! A reflector-backed watch feeds `kube::runtime::Controller`, which runs at
//! most one pass per Tenant at a time and schedules the follow-up the pass
//! asks for.

use futures::StreamExt;
use kube::{
    runtime::{
        controller::{self, Action, Controller},
        reflector::{self, ObjectRef},
        watcher, WatchStreamExt,
    },
    Api, Client, ResourceExt,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::controllers::Context;
use crate::crd::Tenant;
use crate::metrics::prometheus::{
    forget_tenant, MANAGED_TENANTS, RECONCILE_DURATION, RECONCILIATIONS, RECONCILIATION_ERRORS,
    RETRIES_SCHEDULED,
};
use crate::reconcilers::status::{self, StatusReporter};
use crate::reconcilers::tenant::Synchronizer;
use crate::store::with_timeout;
use crate::{Error, Result};

const KIND: &str = "Tenant";

/// What a single reconciliation pass concluded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every child resource exists and Ready was published
    Converged,
    /// A transient failure; try again after backoff
    Retry,
    /// Nothing more can be done until the spec changes
    Terminal { generation: i64 },
    /// The Tenant changed underneath the pass; run again right away
    Rerun,
    /// The Tenant no longer exists
    Gone,
}

/// Run the Tenant controller until `shutdown` is cancelled.
///
/// In-flight passes are allowed to finish before this returns.
pub async fn run(client: Client, ctx: Arc<Context>, shutdown: CancellationToken) {
    let tenants: Api<Tenant> = Api::all(client);
    let (reader, writer) = reflector::store();

    let deletions = ctx.clone();
    let stream = watcher(tenants, watcher::Config::default().any_semantic())
        .default_backoff()
        .reflect(writer)
        .inspect(move |event| {
            if let Ok(watcher::Event::Delete(tenant)) = event {
                on_deleted(&deletions, &tenant.name_any());
            }
        })
        .applied_objects()
        .predicate_filter(spec_revision);

    let concurrency = u16::try_from(ctx.config.workers).unwrap_or(u16::MAX);
    info!(workers = concurrency, "Starting Tenant controller");

    Controller::for_stream(stream, reader)
        .with_config(controller::Config::default().concurrency(concurrency))
        .graceful_shutdown_on(async move { shutdown.cancelled().await })
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|res| {
            let ctx = ctx.clone();
            async move { log_result(&ctx, res) }
        })
        .await;

    info!("Tenant controller stopped");
}

/// Key under which watch events trigger a pass.
///
/// Status writes and label edits leave it unchanged. A Tenant recreated under
/// the same name gets a new UID, so it triggers even at an old generation.
pub fn spec_revision(tenant: &Tenant) -> Option<u64> {
    let mut hasher = DefaultHasher::new();
    tenant.uid().hash(&mut hasher);
    tenant.metadata.generation.hash(&mut hasher);
    Some(hasher.finish())
}

fn on_deleted(ctx: &Context, name: &str) {
    info!("Tenant {} deleted", name);
    ctx.forget(name);
    forget_tenant(name);
    MANAGED_TENANTS.set(ctx.tracked() as f64);
}

fn log_result(
    ctx: &Context,
    result: std::result::Result<(ObjectRef<Tenant>, Action), controller::Error<Error, watcher::Error>>,
) {
    match result {
        Ok((tenant, action)) => debug!("Reconciled tenant {}: {:?}", tenant.name, action),
        // A scheduled requeue fired after the Tenant was deleted
        Err(controller::Error::ObjectNotFound(tenant)) => on_deleted(ctx, &tenant.name),
        Err(e) => warn!("Tenant reconcile failed: {}", e),
    }
}

/// Reconcile a Tenant and turn the pass outcome into the next scheduling step
#[instrument(skip(tenant, ctx), fields(tenant = %tenant.name_any()))]
pub async fn reconcile(tenant: Arc<Tenant>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let name = tenant.name_any();
    RECONCILIATIONS.with_label_values(&[KIND]).inc();

    let result = run_pass(&ctx, &name).await;

    let duration = start.elapsed().as_secs_f64();
    RECONCILE_DURATION.with_label_values(&[KIND]).observe(duration);

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            RECONCILIATION_ERRORS
                .with_label_values(&[KIND, e.class()])
                .inc();
            error!("Reconciliation of tenant {} failed: {}", name, e);
            return Err(e);
        }
    };

    info!(
        "Reconciled tenant {} in {:.2}s: {:?}",
        name, duration, outcome
    );
    let action = next_action(&ctx, &name, outcome);
    MANAGED_TENANTS.set(ctx.tracked() as f64);
    Ok(action)
}

/// Scheduling for a pass that failed before it reached a verdict
pub fn error_policy(tenant: Arc<Tenant>, error: &Error, ctx: Arc<Context>) -> Action {
    let name = tenant.name_any();
    let delay = ctx.next_retry_delay(&name);
    RETRIES_SCHEDULED.inc();
    warn!("Retrying tenant {} in {:?} after: {}", name, delay, error);
    Action::requeue(delay)
}

fn next_action(ctx: &Context, name: &str, outcome: PassOutcome) -> Action {
    match outcome {
        PassOutcome::Converged => {
            ctx.succeeded(name);
            Action::requeue(ctx.config.resync_interval)
        }
        PassOutcome::Retry => {
            let delay = ctx.next_retry_delay(name);
            RETRIES_SCHEDULED.inc();
            info!("Retrying tenant {} in {:?}", name, delay);
            Action::requeue(delay)
        }
        PassOutcome::Terminal { generation } => {
            info!(
                "Tenant {} parked at generation {} until its spec changes",
                name, generation
            );
            ctx.park(name);
            Action::await_change()
        }
        PassOutcome::Rerun => Action::requeue(Duration::ZERO),
        PassOutcome::Gone => {
            ctx.forget(name);
            Action::await_change()
        }
    }
}

/// Run one reconciliation pass for the Tenant named `name`.
///
/// The Tenant is read fresh; errors returned here never reached a verdict
/// (the read or the final status write failed) and go to `error_policy`.
pub async fn run_pass(ctx: &Context, name: &str) -> Result<PassOutcome> {
    let timeout = ctx.config.call_timeout;
    let store = ctx.store.as_ref();

    let Some(tenant) = with_timeout(
        &format!("get tenant {}", name),
        timeout,
        store.get_tenant(name),
    )
    .await?
    else {
        info!("Tenant {} no longer exists", name);
        forget_tenant(name);
        return Ok(PassOutcome::Gone);
    };

    let generation = tenant.generation();
    let uid = tenant.uid();
    if ctx.observe(name, uid.as_deref(), generation) {
        debug!(
            "Tenant {} is parked at generation {}, skipping",
            name, generation
        );
        return Ok(PassOutcome::Terminal { generation });
    }

    let reporter = StatusReporter::new(store, timeout);
    let mut previous = tenant.status.clone();

    if status::needs_in_flight(previous.as_ref(), generation) {
        let announced = status::in_flight(previous.as_ref(), generation);
        match reporter.publish(name, &announced).await {
            Ok(()) => previous = Some(announced),
            // Best effort, the final write of this pass carries the result
            Err(e) => debug!("In-flight status for tenant {} not written: {}", name, e),
        }
    }

    let synchronizer = Synchronizer::new(store, timeout);
    let (computed, outcome) = match synchronizer.synchronize(&tenant).await {
        Ok(report) => {
            let computed = status::from_report(previous.as_ref(), generation, &report);
            let outcome = match report.failure() {
                None if report.is_complete() => PassOutcome::Converged,
                Some((kind, cause)) => {
                    let class = if cause.transient { "transient" } else { "permanent" };
                    RECONCILIATION_ERRORS
                        .with_label_values(&[KIND, class])
                        .inc();
                    warn!("Tenant {} stopped at {}: {}", name, kind, cause.message);
                    if cause.transient {
                        PassOutcome::Retry
                    } else {
                        PassOutcome::Terminal { generation }
                    }
                }
                None => PassOutcome::Retry,
            };
            (computed, outcome)
        }
        Err(e) => {
            RECONCILIATION_ERRORS
                .with_label_values(&[KIND, e.class()])
                .inc();
            warn!("Tenant {} is invalid: {}", name, e);
            let outcome = if e.is_transient() {
                PassOutcome::Retry
            } else {
                PassOutcome::Terminal { generation }
            };
            (
                status::from_validation_error(previous.as_ref(), generation, &e),
                outcome,
            )
        }
    };

    // Never publish a result for a Tenant that has since changed or been replaced
    let latest = with_timeout(
        &format!("get tenant {}", name),
        timeout,
        store.get_tenant(name),
    )
    .await?;
    match latest {
        None => {
            info!("Tenant {} was deleted during the pass", name);
            forget_tenant(name);
            return Ok(PassOutcome::Gone);
        }
        Some(latest) if status::is_superseded(&tenant, &latest) => {
            info!(
                "Discarding status of tenant {} for generation {}, it has changed since",
                name, generation
            );
            return Ok(PassOutcome::Rerun);
        }
        Some(_) => {}
    }

    reporter.publish(name, &computed).await?;
    Ok(outcome)
}
