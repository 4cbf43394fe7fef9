//! Flow context
//!
//! A [`FlowContext`] holds everything one reconcile or delete run of a
//! cluster's infrastructure needs: the desired configuration, the provider
//! capabilities of the selected backend and the whiteboard hydrated from the
//! persisted state. Graph tasks receive it as `Arc<FlowContext>`.

use crate::config::{ClusterInfo, InfrastructureConfig};
use crate::error::{ConfigError, Result};
use crate::keys;
use crate::settings::Settings;
use crate::status::InfrastructureStatus;
use async_trait::async_trait;
use infraflow_cloud::{Providers, StatePersister};
use infraflow_flow::{CancellationToken, FlowReport, PersistHook, RunOptions, Whiteboard};
use ipnet::IpNet;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Inputs of a [`FlowContext`]
pub struct FlowContextOptions {
    pub config: InfrastructureConfig,
    pub cluster: ClusterInfo,
    pub providers: Providers,
    pub settings: Settings,
    /// Flat state persisted by a previous run
    pub state: BTreeMap<String, String>,
    pub persister: Option<Arc<dyn StatePersister>>,
    pub cancel: CancellationToken,
}

impl FlowContextOptions {
    pub fn new(config: InfrastructureConfig, cluster: ClusterInfo, providers: Providers) -> Self {
        Self {
            config,
            cluster,
            providers,
            settings: Settings::default(),
            state: BTreeMap::new(),
            persister: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Apply the `INFRAFLOW_*` environment overrides to the current settings
    pub fn with_env_overrides(mut self) -> std::result::Result<Self, ConfigError> {
        self.settings.apply_env_overrides()?;
        Ok(self)
    }

    pub fn with_state(mut self, state: BTreeMap<String, String>) -> Self {
        self.state = state;
        self
    }

    pub fn with_persister(mut self, persister: Arc<dyn StatePersister>) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Whiteboard exported after the run, ready to be persisted
    pub state: BTreeMap<String, String>,
    pub status: InfrastructureStatus,
    pub report: FlowReport,
}

pub struct FlowContext {
    pub(crate) config: InfrastructureConfig,
    pub(crate) cluster: ClusterInfo,
    pub(crate) providers: Providers,
    pub(crate) settings: Settings,
    pub(crate) board: Whiteboard,
    pub(crate) workers: IpNet,
    pub(crate) pods: Option<IpNet>,
    persister: Option<Arc<dyn StatePersister>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowContext")
            .field("cluster", &self.cluster.technical_id)
            .field("backend", &self.providers.backend)
            .field("shared_network_area", &self.config.shared_network_area)
            .finish_non_exhaustive()
    }
}

impl FlowContext {
    /// Validate the configuration and hydrate the whiteboard
    pub fn new(options: FlowContextOptions) -> Result<Self> {
        let cluster = options.cluster.normalized();
        options.config.validate(&cluster)?;
        let workers = options.config.workers_cidr()?;
        let pods = cluster.pods_cidr()?;

        Ok(Self {
            board: Whiteboard::from_flat_map(&options.state),
            config: options.config,
            cluster,
            providers: options.providers,
            settings: options.settings,
            workers,
            pods,
            persister: options.persister,
            cancel: options.cancel,
        })
    }

    pub fn whiteboard(&self) -> &Whiteboard {
        &self.board
    }

    pub fn config(&self) -> &InfrastructureConfig {
        &self.config
    }

    pub fn cluster(&self) -> &ClusterInfo {
        &self.cluster
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn export_state(&self) -> BTreeMap<String, String> {
        self.board.export_as_flat_map()
    }

    pub fn status(&self) -> InfrastructureStatus {
        InfrastructureStatus::from_whiteboard(&self.board)
    }

    /// Converge the infrastructure to the configuration.
    ///
    /// On failure the whiteboard keeps everything learned so far; it has
    /// already been handed to the persister and can still be read through
    /// [`FlowContext::export_state`].
    pub async fn reconcile(self: &Arc<Self>) -> Result<RunResult> {
        tracing::info!(
            "Reconciling infrastructure of {} ({})",
            self.cluster.technical_id,
            self.providers.backend
        );
        self.board.set(keys::RESOURCES_EXIST, "true");

        let flow = self.reconcile_graph().compile()?;
        let report = flow.run(Arc::clone(self), self.run_options()).await?;

        tracing::info!(
            "Reconciled infrastructure of {} in {:?}",
            self.cluster.technical_id,
            report.duration
        );
        Ok(self.run_result(report))
    }

    /// Tear the infrastructure down; a no-op without prior state
    pub async fn delete(self: &Arc<Self>) -> Result<RunResult> {
        if self.board.is_empty() {
            tracing::info!(
                "No infrastructure state for {}, nothing to delete",
                self.cluster.technical_id
            );
            return Ok(self.run_result(FlowReport::default()));
        }

        tracing::info!(
            "Deleting infrastructure of {} ({})",
            self.cluster.technical_id,
            self.providers.backend
        );
        let flow = self.delete_graph().compile()?;
        let report = flow.run(Arc::clone(self), self.run_options()).await?;

        tracing::info!(
            "Deleted infrastructure of {} in {:?}",
            self.cluster.technical_id,
            report.duration
        );
        Ok(self.run_result(report))
    }

    fn run_options(&self) -> RunOptions<FlowContext> {
        let options = RunOptions::new().with_cancel(self.cancel.clone());
        match &self.persister {
            Some(persister) => options.with_persist(Arc::new(ThrottledPersist::new(
                Arc::clone(persister),
                self.settings.persist_interval,
            ))),
            None => options,
        }
    }

    fn run_result(&self, report: FlowReport) -> RunResult {
        RunResult {
            state: self.export_state(),
            status: self.status(),
            report,
        }
    }
}

/// Writes the exported whiteboard through a [`StatePersister`], at most once
/// per interval unless forced
struct ThrottledPersist {
    persister: Arc<dyn StatePersister>,
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl ThrottledPersist {
    fn new(persister: Arc<dyn StatePersister>, interval: Duration) -> Self {
        Self {
            persister,
            interval,
            last: Mutex::new(None),
        }
    }

    fn due(&self, force: bool) -> bool {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let due = force || last.is_none_or(|at| at.elapsed() >= self.interval);
        if due {
            *last = Some(Instant::now());
        }
        due
    }
}

#[async_trait]
impl PersistHook<FlowContext> for ThrottledPersist {
    async fn persist(&self, context: &FlowContext, force: bool) -> anyhow::Result<()> {
        if !self.due(force) {
            return Ok(());
        }
        let state = context.export_state();
        tracing::debug!("Persisting {} state entries (force: {})", state.len(), force);
        self.persister.persist(&state).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infraflow_cloud_openstack::InMemoryOpenStack;

    #[derive(Default)]
    struct CountingPersister {
        writes: Mutex<Vec<BTreeMap<String, String>>>,
    }

    #[async_trait]
    impl StatePersister for CountingPersister {
        async fn persist(&self, state: &BTreeMap<String, String>) -> infraflow_cloud::Result<()> {
            self.writes.lock().unwrap().push(state.clone());
            Ok(())
        }
    }

    fn context(state: BTreeMap<String, String>) -> FlowContext {
        let config = InfrastructureConfig::from_yaml_str(
            "floatingPoolName: public\nnetworks:\n  workers: 10.250.0.0/16\n",
        )
        .unwrap();
        let providers = infraflow_cloud_openstack::providers(Arc::new(InMemoryOpenStack::new()));
        FlowContext::new(
            FlowContextOptions::new(config, ClusterInfo::new("shoot--dev--a"), providers)
                .with_state(state),
        )
        .unwrap()
    }

    #[test]
    fn test_new_hydrates_whiteboard() {
        let ctx = context(BTreeMap::from([(
            keys::NETWORK.to_string(),
            "net-1".to_string(),
        )]));
        assert_eq!(ctx.whiteboard().get(keys::NETWORK).as_deref(), Some("net-1"));
        assert_eq!(ctx.status().network.unwrap().id, "net-1");
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = InfrastructureConfig::from_yaml_str(
            "floatingPoolName: public\nnetworks:\n  workers: not-a-cidr\n",
        )
        .unwrap();
        let providers = infraflow_cloud_openstack::providers(Arc::new(InMemoryOpenStack::new()));
        let err = FlowContext::new(FlowContextOptions::new(
            config,
            ClusterInfo::new("shoot--dev--a"),
            providers,
        ))
        .unwrap_err();
        assert!(matches!(err, crate::ReconcileError::Config(_)));
    }

    #[test]
    fn test_env_overrides_reach_context() {
        temp_env::with_vars(
            [
                ("INFRAFLOW_TASK_TIMEOUT_SECS", Some("30")),
                ("INFRAFLOW_RETRY_MAX_ATTEMPTS", Some("2")),
            ],
            || {
                let config = InfrastructureConfig::from_yaml_str(
                    "floatingPoolName: public\nnetworks:\n  workers: 10.250.0.0/16\n",
                )
                .unwrap();
                let providers =
                    infraflow_cloud_openstack::providers(Arc::new(InMemoryOpenStack::new()));
                let options =
                    FlowContextOptions::new(config, ClusterInfo::new("shoot--dev--a"), providers)
                        .with_env_overrides()
                        .unwrap();
                let ctx = FlowContext::new(options).unwrap();
                assert_eq!(ctx.settings().task_timeout, Duration::from_secs(30));
                assert_eq!(ctx.settings().retry.max_attempts, 2);
                assert_eq!(ctx.settings().long_task_timeout, Duration::from_secs(180));
            },
        );
    }

    #[test]
    fn test_invalid_env_override_is_a_config_error() {
        temp_env::with_var("INFRAFLOW_PERSIST_INTERVAL_SECS", Some("often"), || {
            let config = InfrastructureConfig::from_yaml_str(
                "floatingPoolName: public\nnetworks:\n  workers: 10.250.0.0/16\n",
            )
            .unwrap();
            let providers =
                infraflow_cloud_openstack::providers(Arc::new(InMemoryOpenStack::new()));
            let err = FlowContextOptions::new(config, ClusterInfo::new("shoot--dev--a"), providers)
                .with_env_overrides()
                .err()
                .unwrap();
            assert!(matches!(err, ConfigError::Env { .. }));
        });
    }

    #[tokio::test]
    async fn test_delete_without_state_is_noop() {
        let ctx = Arc::new(context(BTreeMap::new()));
        let result = ctx.delete().await.unwrap();
        assert!(result.state.is_empty());
        assert!(result.report.succeeded.is_empty());
    }

    #[tokio::test]
    async fn test_throttled_persist() {
        let ctx = context(BTreeMap::new());
        let persister = Arc::new(CountingPersister::default());
        let hook = ThrottledPersist::new(persister.clone(), Duration::from_secs(3600));

        hook.persist(&ctx, false).await.unwrap();
        hook.persist(&ctx, false).await.unwrap();
        assert_eq!(persister.writes.lock().unwrap().len(), 1);

        hook.persist(&ctx, true).await.unwrap();
        assert_eq!(persister.writes.lock().unwrap().len(), 2);
    }
}
