//! The distributed task engine: independent fixed-delay timer loops for
//! Activator, Dispatcher, Duty, BizDuty and Cleaner, plus the plugin-server
//! heartbeat when a monitor is configured.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use xrelay_chain::PluginServerMonitor;
use xrelay_utils::{format_duration, Clock};

use crate::activator::Activator;
use crate::cleaner::Cleaner;
use crate::config::{NodeConfig, ScheduleConfig};
use crate::dispatcher::Dispatcher;
use crate::duty::Duty;
use crate::supervisor::supervise;
use crate::shutdown::{StopListener, StopSignal};
use crate::NodeError;

pub struct DistributedTaskEngine {
    pub activator: Activator,
    pub dispatcher: Dispatcher,
    pub duty: Duty,
    pub biz_duty: Duty,
    pub cleaner: Cleaner,
    pub plugin_monitor: Option<Arc<PluginServerMonitor>>,
    clock: Arc<dyn Clock>,
    schedule: ScheduleConfig,
    plugin_heartbeat_interval_ms: u64,
}

impl DistributedTaskEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        activator: Activator,
        dispatcher: Dispatcher,
        duty: Duty,
        biz_duty: Duty,
        cleaner: Cleaner,
        plugin_monitor: Option<Arc<PluginServerMonitor>>,
        clock: Arc<dyn Clock>,
        config: &NodeConfig,
    ) -> Self {
        Self {
            activator,
            dispatcher,
            duty,
            biz_duty,
            cleaner,
            plugin_monitor,
            clock,
            schedule: config.schedule.clone(),
            plugin_heartbeat_interval_ms: config.plugin_heartbeat_interval_ms,
        }
    }

    /// Spawn every timer loop. Each stops when `stop` is triggered.
    pub fn start(self: &Arc<Self>, stop: &StopSignal) -> Vec<JoinHandle<()>> {
        let s = &self.schedule;
        let mut handles = vec![
            self.spawn_tick("activate", s.activate_interval_ms, stop, |e| async move {
                e.activator.activate()
            }),
            self.spawn_tick("dispatch", s.dispatch_interval_ms, stop, |e| async move {
                e.dispatcher.dispatch().map(|_| ())
            }),
            self.spawn_tick("duty", s.duty_interval_ms, stop, |e| async move {
                e.duty.run_once().map(|_| ())
            }),
            self.spawn_tick("biz_duty", s.biz_duty_interval_ms, stop, |e| async move {
                e.biz_duty.run_once().map(|_| ())
            }),
            self.spawn_tick("cleaner", s.cleaner_interval_ms, stop, |e| async move {
                e.cleaner.clean().await.map(|_| ())
            }),
        ];
        if self.plugin_monitor.is_some() {
            handles.push(self.spawn_tick(
                "plugin_heartbeat",
                self.plugin_heartbeat_interval_ms,
                stop,
                |e| async move {
                    if let Some(monitor) = &e.plugin_monitor {
                        monitor.heartbeat_round(e.clock.now()).await;
                    }
                    Ok(())
                },
            ));
        }
        info!(
            loops = handles.len(),
            time_slice = %format_duration(s.time_slice_ms),
            node_ttl = %format_duration(s.node_ttl_ms),
            "task engine started"
        );
        handles
    }

    fn spawn_tick<F, Fut>(
        self: &Arc<Self>,
        name: &'static str,
        period_ms: u64,
        stop: &StopSignal,
        tick: F,
    ) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), NodeError>> + Send + 'static,
    {
        let engine = Arc::clone(self);
        spawn_loop(name, period_ms, stop.listener(), move || tick(Arc::clone(&engine)))
    }
}

/// Run `tick` every `period_ms` until `stop` fires. A slow tick delays
/// the following ones instead of bursting to catch up.
pub fn spawn_loop<F, Fut>(
    name: &'static str,
    period_ms: u64,
    mut stop: StopListener,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), NodeError>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = interval.tick() => {
                    supervise(name, tick()).await;
                }
            }
        }
        debug!(timer = name, "timer loop stopped");
    })
}
