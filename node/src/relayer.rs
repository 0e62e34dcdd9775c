//! The relayer node: builds every scheduler and pipeline service over one
//! shared store and runs them until shutdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use xrelay_chain::{ChainClientFactory, ChainClientPool, PluginRegistry, PluginServerMonitor};
use xrelay_store::RelayerStore;
use xrelay_types::{TaskCategory, TaskType};
use xrelay_utils::{Clock, Shuffler, SystemClock, ThreadRngShuffler};

use crate::activator::Activator;
use crate::anchor::AnchorService;
use crate::archive::ArchiveService;
use crate::cleaner::Cleaner;
use crate::committer::Committer;
use crate::confirm::ConfirmService;
use crate::deploy::DeployService;
use crate::dispatcher::Dispatcher;
use crate::duty::Duty;
use crate::engine::DistributedTaskEngine;
use crate::executor::{BlockchainTask, TaskExecutor, TaskExecutors};
use crate::identity::NodeIdentity;
use crate::process::{ProcessService, SdpExtractor};
use crate::receiver::Receiver;
use crate::validator::{DomainRegistryVerifier, MessageValidator};
use crate::shutdown::{StopReason, StopSignal};
use crate::{NodeConfig, NodeError, PipelineContext, RelayerMetrics};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// External collaborators of a relayer node.
pub struct RelayerDeps {
    pub store: Arc<dyn RelayerStore>,
    pub client_factory: Arc<dyn ChainClientFactory>,
    pub plugins: Arc<dyn PluginRegistry>,
    pub clock: Arc<dyn Clock>,
    pub shuffler: Arc<dyn Shuffler>,
    /// Heartbeat driver for `plugins`, when it is a monitor.
    pub plugin_monitor: Option<Arc<PluginServerMonitor>>,
}

impl RelayerDeps {
    /// Production defaults: wall clock and thread-rng shuffling.
    pub fn new(
        store: Arc<dyn RelayerStore>,
        client_factory: Arc<dyn ChainClientFactory>,
        plugins: Arc<dyn PluginRegistry>,
    ) -> Self {
        Self {
            store,
            client_factory,
            plugins,
            clock: Arc::new(SystemClock),
            shuffler: Arc::new(ThreadRngShuffler),
            plugin_monitor: None,
        }
    }

    /// Use `monitor` as the plugin registry and drive its heartbeats.
    pub fn with_plugin_monitor(mut self, monitor: Arc<PluginServerMonitor>) -> Self {
        self.plugins = monitor.clone();
        self.plugin_monitor = Some(monitor);
        self
    }
}

pub struct Relayer {
    identity: NodeIdentity,
    ctx: PipelineContext,
    receiver: Arc<Receiver>,
    executors: Arc<TaskExecutors>,
    engine: Arc<DistributedTaskEngine>,
    stop: StopSignal,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Relayer {
    pub fn new(config: NodeConfig, identity: NodeIdentity, deps: RelayerDeps) -> Result<Self, NodeError> {
        config.validate()?;
        let metrics = Arc::new(RelayerMetrics::new());
        let ctx = PipelineContext {
            store: deps.store.clone(),
            clients: Arc::new(ChainClientPool::new(deps.client_factory)),
            clock: deps.clock.clone(),
            metrics: metrics.clone(),
            config: config.pipeline.clone(),
        };

        let verifier = Arc::new(DomainRegistryVerifier::new(
            deps.store.clone(),
            &config.pipeline.trusted_remote_domains,
        )?);
        let validator = Arc::new(MessageValidator::new(
            deps.store.clone(),
            verifier,
            SdpExtractor::new(deps.store.clone(), metrics.clone()),
            deps.clock.clone(),
        ));
        let receiver = Arc::new(Receiver::new(ctx.clone(), validator.clone()));

        let pools = &config.executors;
        let handlers: [(TaskType, Arc<dyn BlockchainTask>, usize); 6] = [
            (
                TaskType::Anchor,
                Arc::new(AnchorService::new(ctx.clone(), receiver.clone())),
                pools.anchor,
            ),
            (TaskType::Commit, Arc::new(Committer::new(ctx.clone())), pools.commit),
            (
                TaskType::Process,
                Arc::new(ProcessService::new(ctx.clone(), validator)),
                pools.process,
            ),
            (TaskType::Confirm, Arc::new(ConfirmService::new(ctx.clone())), pools.confirm),
            (TaskType::Archive, Arc::new(ArchiveService::new(ctx.clone())), pools.archive),
            (TaskType::Deploy, Arc::new(DeployService::new(ctx.clone())), pools.deploy),
        ];
        let executors = Arc::new(TaskExecutors::new(handlers.into_iter().map(
            |(task_type, handler, pool_size)| {
                TaskExecutor::new(task_type, handler, pool_size, deps.clock.clone(), metrics.clone())
            },
        )));

        let node_id = identity.node_id.clone();
        let engine = Arc::new(DistributedTaskEngine::new(
            Activator::new(deps.store.clone(), deps.clock.clone(), identity.clone()),
            Dispatcher::new(
                deps.store.clone(),
                deps.plugins.clone(),
                deps.clock.clone(),
                deps.shuffler,
                node_id.clone(),
                config.schedule.clone(),
                metrics,
            ),
            Duty::new(TaskCategory::Blockchain, deps.store.clone(), node_id.clone(), executors.clone()),
            Duty::new(TaskCategory::Biz, deps.store.clone(), node_id, executors.clone()),
            Cleaner::new(deps.store, ctx.clients.clone(), deps.plugins),
            deps.plugin_monitor,
            deps.clock,
            &config,
        ));

        Ok(Self {
            identity,
            ctx,
            receiver,
            executors,
            engine,
            stop: StopSignal::new(),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Start the timer loops. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        if !handles.is_empty() {
            return;
        }
        tracing::info!(node_id = %self.identity.node_id, "relayer starting");
        self.stop.rearm();
        *handles = self.engine.start(&self.stop);
    }

    /// Stop the timer loops and abort in-flight task runs. Leases are left
    /// to expire so another node picks them up.
    pub async fn stop(&self) -> Result<(), NodeError> {
        tracing::info!(node_id = %self.identity.node_id, "relayer stopping");
        self.stop.trigger(StopReason::Requested);
        self.executors.abort_all();

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all).await.is_err() {
            tracing::warn!(timeout = ?SHUTDOWN_TIMEOUT, "some timer loops did not stop");
            return Err(NodeError::ShutdownTimeout);
        }
        tracing::info!("relayer stopped");
        Ok(())
    }

    /// Run until SIGINT/SIGTERM, then stop.
    pub async fn run_until_signal(&self) -> Result<(), NodeError> {
        self.start();
        self.stop.trigger_on_os_signal().await;
        self.stop().await
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn receiver(&self) -> &Arc<Receiver> {
        &self.receiver
    }

    pub fn metrics(&self) -> &Arc<RelayerMetrics> {
        &self.ctx.metrics
    }

    pub fn clients(&self) -> &Arc<ChainClientPool> {
        &self.ctx.clients
    }

    pub fn engine(&self) -> &Arc<DistributedTaskEngine> {
        &self.engine
    }

    pub fn executors(&self) -> &Arc<TaskExecutors> {
        &self.executors
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }
}
