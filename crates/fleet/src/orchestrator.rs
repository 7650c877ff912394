use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use relayprobe_daemon::{Daemon, DaemonError, DaemonState, SpawnConfig, daemon_for};
use relayprobe_node_api::{NodeControl, PeerIdentity};
use relayprobe_node_config::{NodeConfig, NodePorts};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::{NodeSpec, ProvisionError};

/// Creates the daemon handle for a generated config.
pub type DaemonFactory = Arc<dyn Fn(NodeConfig) -> Box<dyn Daemon> + Send + Sync>;

/// Fleet tunables.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Pause before each individual stop during teardown.
    pub stop_stagger: Duration,
    /// Bound on a single node's start.
    pub startup_timeout: Duration,
    /// Create fresh repositories instead of requiring existing ones.
    pub initialize_storage: bool,
    /// How external daemons are launched.
    pub spawn: SpawnConfig,
}

impl FleetConfig {
    pub fn new(spawn: SpawnConfig) -> Self {
        Self {
            stop_stagger: Duration::from_millis(100),
            startup_timeout: Duration::from_secs(20),
            initialize_storage: true,
            spawn,
        }
    }

    pub fn with_stop_stagger(mut self, stagger: Duration) -> Self {
        self.stop_stagger = stagger;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }
}

/// Outcome of [`FleetOrchestrator::teardown_all`].
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Handles that released everything cleanly, in stop order.
    pub stopped: Vec<NodeSpec>,
    /// Handles whose stop reported an error. Their cleanup still ran.
    pub failed: Vec<(NodeSpec, DaemonError)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of handles a stop was issued to.
    pub fn attempted(&self) -> usize {
        self.stopped.len() + self.failed.len()
    }
}

struct Member {
    spec: NodeSpec,
    daemon: Box<dyn Daemon>,
}

/// Sole owner of the daemon handles of one run.
///
/// Every handle created by [`provision`](Self::provision) is tracked until
/// [`teardown_all`](Self::teardown_all), including handles whose start
/// failed or timed out.
pub struct FleetOrchestrator {
    config: FleetConfig,
    factory: DaemonFactory,
    members: Vec<Member>,
}

impl FleetOrchestrator {
    /// Orchestrator creating embedded or spawned handles by family.
    pub fn new(config: FleetConfig) -> Self {
        let spawn = config.spawn.clone();
        let factory: DaemonFactory = Arc::new(move |node: NodeConfig| daemon_for(node, &spawn));
        Self::with_factory(config, factory)
    }

    pub fn with_factory(config: FleetConfig, factory: DaemonFactory) -> Self {
        Self {
            config,
            factory,
            members: Vec::new(),
        }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Start one handle per spec, all concurrently.
    ///
    /// Returns once every launched start has finished or timed out. Specs
    /// whose ports collide with an earlier spec, or with a node already in
    /// the fleet, are never launched. On failure the error of the first
    /// failing spec (in `specs` order) is returned; every launched handle
    /// stays tracked regardless.
    pub async fn provision(&mut self, specs: &[NodeSpec]) -> Result<(), ProvisionError> {
        let mut failures = Vec::new();
        let mut claimed: Vec<(NodeSpec, NodePorts)> = self
            .members
            .iter()
            .map(|member| (member.spec, member.spec.ports()))
            .collect();
        let mut launching = Vec::with_capacity(specs.len());

        for (position, spec) in specs.iter().enumerate() {
            let ports = spec.ports();
            let conflict = claimed.iter().find_map(|(other, theirs)| {
                ports.conflict_with(theirs).map(|port| (*other, port))
            });
            if let Some((other, port)) = conflict {
                failures.push((
                    position,
                    ProvisionError::AddressConflict {
                        spec: *spec,
                        other,
                        port,
                    },
                ));
                continue;
            }
            claimed.push((*spec, ports));
            launching.push((
                position,
                Member {
                    spec: *spec,
                    daemon: (self.factory)(spec.config()),
                },
            ));
        }

        info!(nodes = launching.len(), "Provisioning fleet");
        let timeout = self.config.startup_timeout;
        let initialize_storage = self.config.initialize_storage;

        let outcomes = join_all(launching.iter_mut().map(|(position, member)| async move {
            let started = time::timeout(timeout, member.daemon.start(initialize_storage)).await;
            let result = match started {
                Ok(Ok(())) => {
                    debug!(spec = %member.spec, "Node running");
                    Ok(())
                }
                Ok(Err(source)) => Err(ProvisionError::Start {
                    spec: member.spec,
                    source,
                }),
                Err(_) => Err(ProvisionError::Timeout {
                    spec: member.spec,
                    timeout,
                }),
            };
            (*position, result)
        }))
        .await;

        failures.extend(
            outcomes
                .into_iter()
                .filter_map(|(position, result)| result.err().map(|e| (position, e))),
        );
        self.members
            .extend(launching.into_iter().map(|(_, member)| member));

        failures.sort_by_key(|(position, _)| *position);
        for (_, e) in &failures {
            error!(spec = %e.spec(), error = %e, "Provisioning failed");
        }
        match failures.into_iter().next() {
            Some((_, e)) => Err(e),
            None => {
                info!(nodes = self.members.len(), "Fleet running");
                Ok(())
            }
        }
    }

    /// Stop every tracked handle, one at a time, pausing `stop_stagger`
    /// before each stop.
    ///
    /// Handles are stopped in reverse provisioning order and released from
    /// the fleet. Stop errors are logged and reported, never returned early.
    /// A second call finds nothing to stop.
    pub async fn teardown_all(&mut self) -> TeardownReport {
        let members = std::mem::take(&mut self.members);
        let mut report = TeardownReport::default();
        if members.is_empty() {
            return report;
        }

        info!(nodes = members.len(), "Tearing down fleet");
        for Member { spec, mut daemon } in members.into_iter().rev() {
            time::sleep(self.config.stop_stagger).await;
            match daemon.stop().await {
                Ok(()) => report.stopped.push(spec),
                Err(e) => {
                    warn!(%spec, error = %e, "Stop failed");
                    report.failed.push((spec, e));
                }
            }
        }
        report
    }

    /// Number of tracked handles.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Lifecycle state of every tracked handle, in provisioning order.
    pub fn states(&self) -> Vec<(NodeSpec, DaemonState)> {
        self.members
            .iter()
            .map(|member| (member.spec, member.daemon.state()))
            .collect()
    }

    /// Control surface of the running node provisioned as `spec`.
    ///
    /// Nodes are looked up by their full spec, since one index may run in
    /// each family.
    pub fn control(&self, spec: &NodeSpec) -> Option<Arc<dyn NodeControl>> {
        self.member(spec)?.daemon.control()
    }

    /// Identity of the node provisioned as `spec`, cached by its handle.
    pub async fn identity(&mut self, spec: &NodeSpec) -> Result<PeerIdentity, DaemonError> {
        let member = self
            .members
            .iter_mut()
            .find(|member| member.spec == *spec)
            .ok_or(DaemonError::NotRunning)?;
        member.daemon.identity().await
    }

    fn member(&self, spec: &NodeSpec) -> Option<&Member> {
        self.members.iter().find(|member| member.spec == *spec)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use libp2p::PeerId;
    use parking_lot::Mutex;
    use relayprobe_node_config::NodeFamily;
    use tokio::time::Instant;

    use super::*;

    #[derive(Clone, Copy)]
    enum Outcome {
        Succeed,
        Fail,
        Hang,
    }

    type StopLog = Arc<Mutex<Vec<(u16, Instant)>>>;

    struct MockDaemon {
        config: NodeConfig,
        outcome: Outcome,
        state: DaemonState,
        stops: StopLog,
    }

    #[async_trait]
    impl Daemon for MockDaemon {
        fn config(&self) -> &NodeConfig {
            &self.config
        }

        fn state(&self) -> DaemonState {
            self.state
        }

        async fn start(&mut self, _initialize_storage: bool) -> Result<(), DaemonError> {
            self.state = DaemonState::Starting;
            match self.outcome {
                Outcome::Succeed => {
                    self.state = DaemonState::Running;
                    Ok(())
                }
                Outcome::Fail => Err(DaemonError::Start(eyre::eyre!("readiness never signalled"))),
                Outcome::Hang => std::future::pending().await,
            }
        }

        async fn identity(&mut self) -> Result<PeerIdentity, DaemonError> {
            if self.state != DaemonState::Running {
                return Err(DaemonError::NotRunning);
            }
            Ok(PeerIdentity::new(
                PeerId::random(),
                self.config.addresses.swarm.clone(),
            ))
        }

        fn control(&self) -> Option<Arc<dyn NodeControl>> {
            None
        }

        async fn stop(&mut self) -> Result<(), DaemonError> {
            self.stops
                .lock()
                .push((self.config.index.get(), Instant::now()));
            self.state = DaemonState::Stopped;
            match self.outcome {
                Outcome::Fail => Err(DaemonError::Stop("listener still open".into())),
                _ => Ok(()),
            }
        }
    }

    fn fleet(outcomes: Vec<(u16, Outcome)>, stops: StopLog) -> FleetOrchestrator {
        let config = FleetConfig::new(SpawnConfig::new("relayprobe"))
            .with_startup_timeout(Duration::from_secs(5));
        let factory: DaemonFactory = Arc::new(move |config: NodeConfig| {
            let outcome = outcomes
                .iter()
                .find(|(index, _)| *index == config.index.get())
                .map_or(Outcome::Succeed, |(_, outcome)| *outcome);
            Box::new(MockDaemon {
                config,
                outcome,
                state: DaemonState::Stopped,
                stops: stops.clone(),
            })
        });
        FleetOrchestrator::with_factory(config, factory)
    }

    fn leaves(indices: &[u16]) -> Vec<NodeSpec> {
        indices
            .iter()
            .map(|index| NodeSpec::leaf(*index, NodeFamily::Embedded))
            .collect()
    }

    #[tokio::test]
    async fn test_all_succeed() {
        let stops = StopLog::default();
        let mut fleet = fleet(vec![], stops.clone());

        fleet.provision(&leaves(&[1, 2, 3])).await.unwrap();
        assert_eq!(fleet.len(), 3);
        assert!(
            fleet
                .states()
                .iter()
                .all(|(_, state)| *state == DaemonState::Running)
        );
    }

    #[tokio::test]
    async fn test_same_index_in_both_families() {
        let stops = StopLog::default();
        let mut fleet = fleet(vec![], stops.clone());

        let leaf = NodeSpec::leaf(12, NodeFamily::Embedded);
        let relay = NodeSpec::relay(12, NodeFamily::External);
        fleet.provision(&[leaf, relay]).await.unwrap();
        assert_eq!(fleet.len(), 2);

        for spec in [leaf, relay] {
            let identity = fleet.identity(&spec).await.unwrap();
            assert_eq!(identity.addresses, spec.config().addresses.swarm);
        }
        assert_matches!(
            fleet
                .identity(&NodeSpec::leaf(12, NodeFamily::External))
                .await,
            Err(DaemonError::NotRunning)
        );
    }

    #[tokio::test]
    async fn test_conflicting_spec_is_not_launched() {
        let stops = StopLog::default();
        let mut fleet = fleet(vec![], stops.clone());

        let err = fleet.provision(&leaves(&[1, 2, 1])).await.unwrap_err();
        assert_matches!(
            err,
            ProvisionError::AddressConflict { spec, other, port }
                if spec.index.get() == 1 && other.index.get() == 1 && port == 10001
        );
        assert_eq!(fleet.len(), 2);

        // Conflicts are also checked against nodes already in the fleet.
        let err = fleet.provision(&leaves(&[2])).await.unwrap_err();
        assert_matches!(err, ProvisionError::AddressConflict { .. });
        assert_eq!(fleet.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_start_keeps_siblings_tracked() {
        let stops = StopLog::default();
        let mut fleet = fleet(vec![(2, Outcome::Fail)], stops.clone());

        let err = fleet.provision(&leaves(&[1, 2, 3])).await.unwrap_err();
        assert_matches!(err, ProvisionError::Start { spec, .. } if spec.index.get() == 2);
        assert_eq!(fleet.len(), 3);

        let running = fleet
            .states()
            .into_iter()
            .filter(|(_, state)| *state == DaemonState::Running)
            .count();
        assert_eq!(running, 2);

        let report = fleet.teardown_all().await;
        assert_eq!(report.attempted(), 3);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_start_times_out() {
        let stops = StopLog::default();
        let mut fleet = fleet(vec![(2, Outcome::Hang)], stops.clone());

        let err = fleet.provision(&leaves(&[1, 2])).await.unwrap_err();
        assert_matches!(
            err,
            ProvisionError::Timeout { spec, timeout }
                if spec.index.get() == 2 && timeout == Duration::from_secs(5)
        );

        // The abandoned handle is still torn down.
        let report = fleet.teardown_all().await;
        assert_eq!(report.stopped.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_is_staggered_and_idempotent() {
        let stops = StopLog::default();
        let mut fleet = fleet(vec![], stops.clone());
        fleet.provision(&leaves(&[1, 2, 3])).await.unwrap();

        let began = Instant::now();
        let report = fleet.teardown_all().await;
        assert!(report.is_clean());
        assert_eq!(
            report.stopped.iter().map(|s| s.index.get()).collect::<Vec<_>>(),
            [3, 2, 1]
        );
        assert!(fleet.is_empty());

        let log = stops.lock().clone();
        assert_eq!(log.len(), 3);
        let mut previous = began;
        for (_, at) in &log {
            assert!(*at - previous >= Duration::from_millis(100));
            previous = *at;
        }

        let again = fleet.teardown_all().await;
        assert_eq!(again.attempted(), 0);
        assert_eq!(stops.lock().len(), 3);
    }
}
