use relayprobe_node_api::PeerIdentity;

use crate::DaemonError;

/// Lifecycle state of a daemon handle.
///
/// `Stopped → Starting → Running → Stopping → Stopped`, traversed once per
/// handle. A failed or abandoned start stays in `Starting` until stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DaemonState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    state: DaemonState,
    launched: bool,
    identity: Option<PeerIdentity>,
}

impl Lifecycle {
    pub(crate) fn state(&self) -> DaemonState {
        self.state
    }

    /// Enter `Starting`. A handle starts at most once.
    pub(crate) fn begin_start(&mut self) -> Result<(), DaemonError> {
        if self.launched {
            return Err(DaemonError::AlreadyStarted);
        }
        self.launched = true;
        self.state = DaemonState::Starting;
        Ok(())
    }

    pub(crate) fn set_running(&mut self) {
        self.state = DaemonState::Running;
    }

    pub(crate) fn begin_stop(&mut self) {
        self.state = DaemonState::Stopping;
    }

    pub(crate) fn set_stopped(&mut self) {
        self.state = DaemonState::Stopped;
        self.identity = None;
    }

    pub(crate) fn ensure_running(&self) -> Result<(), DaemonError> {
        if self.state == DaemonState::Running {
            Ok(())
        } else {
            Err(DaemonError::NotRunning)
        }
    }

    pub(crate) fn cached_identity(&self) -> Option<&PeerIdentity> {
        self.identity.as_ref()
    }

    pub(crate) fn cache_identity(&mut self, identity: PeerIdentity) {
        self.identity = Some(identity);
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_single_start() {
        let mut lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.state(), DaemonState::Stopped);

        lifecycle.begin_start().unwrap();
        assert_eq!(lifecycle.state(), DaemonState::Starting);
        assert_matches!(lifecycle.ensure_running(), Err(DaemonError::NotRunning));

        lifecycle.set_running();
        lifecycle.ensure_running().unwrap();

        lifecycle.begin_stop();
        lifecycle.set_stopped();
        assert_matches!(lifecycle.begin_start(), Err(DaemonError::AlreadyStarted));
    }

    #[test]
    fn test_display() {
        assert_eq!(DaemonState::Running.to_string(), "running");
    }
}
