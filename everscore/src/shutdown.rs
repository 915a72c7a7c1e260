use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use log::*;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// Time allowed between a shutdown request and every thread having stopped
pub const FAILSAFE_TIMEOUT: Duration = Duration::from_millis(500);

/// Exit code used when the watchdog has to end the process. Teardown was
/// requested by the operator, so this still counts as a normal exit.
const FORCED_EXIT_CODE: i32 = 0;

/// Cooperative cancellation flag shared by every worker thread.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

type FailsafeAction = Box<dyn FnOnce() + Send>;

struct Watchdog {
    disarm_tx: Sender<()>,
    join: JoinHandle<()>,
}

/// Owns the shutdown flag and the failsafe watchdog.
///
/// The console reader blocks on the serial port with no way to interrupt it,
/// so once [`begin`](Self::begin) is called the watchdog ends the process if
/// [`complete`](Self::complete) isn't reached within the timeout.
pub struct ShutdownCoordinator {
    signal: ShutdownSignal,
    timeout: Duration,
    action: Option<FailsafeAction>,
    watchdog: Option<Watchdog>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::with_failsafe(
            FAILSAFE_TIMEOUT,
            Box::new(|| {
                warn!("Shutdown did not finish within {FAILSAFE_TIMEOUT:?}, forcing exit");
                log::logger().flush();
                std::process::exit(FORCED_EXIT_CODE);
            }),
        )
    }

    pub fn with_failsafe(timeout: Duration, action: FailsafeAction) -> Self {
        Self {
            signal: ShutdownSignal::new(),
            timeout,
            action: Some(action),
            watchdog: None,
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Raises the flag and arms the watchdog. Later calls only raise the flag.
    pub fn begin(&mut self) {
        self.signal.request();

        let Some(action) = self.action.take() else {
            return;
        };

        let (disarm_tx, disarm_rx) = bounded(1);
        let timeout = self.timeout;
        let spawned = thread::Builder::new()
            .name("shutdown-watchdog".to_string())
            .spawn(move || match disarm_rx.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => action(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    debug!("Shutdown watchdog disarmed")
                }
            });

        match spawned {
            Ok(join) => {
                debug!("Shutdown watchdog armed for {timeout:?}");
                self.watchdog = Some(Watchdog { disarm_tx, join });
            }
            Err(e) => error!("Failed to start the shutdown watchdog: {e}"),
        }
    }

    /// Disarms the watchdog once every thread has stopped
    pub fn complete(mut self) {
        if let Some(Watchdog { disarm_tx, join }) = self.watchdog.take() {
            let _ = disarm_tx.send(());
            if join.join().is_err() {
                error!("Shutdown watchdog panicked");
            }
        }
        info!("Shutdown complete");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crossbeam_channel::unbounded;
    use more_asserts::*;
    use std::time::Instant;

    const TEST_TIMEOUT: Duration = Duration::from_millis(100);

    fn coordinator() -> (ShutdownCoordinator, crossbeam_channel::Receiver<Instant>) {
        let (tx, rx) = unbounded();
        let coordinator = ShutdownCoordinator::with_failsafe(
            TEST_TIMEOUT,
            Box::new(move || tx.send(Instant::now()).unwrap()),
        );
        (coordinator, rx)
    }

    #[test]
    fn test_signal_is_shared() {
        let (mut coordinator, _rx) = coordinator();
        let signal = coordinator.signal();
        let other = signal.clone();
        assert!(!signal.is_requested());

        coordinator.begin();
        assert!(signal.is_requested());
        assert!(other.is_requested());
        coordinator.complete();
    }

    #[test]
    fn test_watchdog_fires_when_shutdown_stalls() {
        let (mut coordinator, rx) = coordinator();
        let start = Instant::now();
        coordinator.begin();

        let fired_at = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_ge!(fired_at - start, TEST_TIMEOUT);
        assert_lt!(fired_at - start, TEST_TIMEOUT * 5);
        coordinator.complete();
    }

    #[test]
    fn test_watchdog_disarmed_by_clean_shutdown() {
        let (mut coordinator, rx) = coordinator();
        coordinator.begin();
        coordinator.complete();
        assert!(rx.recv_timeout(TEST_TIMEOUT * 3).is_err());
    }

    #[test]
    fn test_begin_arms_once() {
        let (mut coordinator, rx) = coordinator();
        coordinator.begin();
        coordinator.begin();
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        assert!(rx.recv_timeout(TEST_TIMEOUT * 3).is_err());
        coordinator.complete();
    }

    #[test]
    fn test_watchdog_not_armed_without_request() {
        let (coordinator, rx) = coordinator();
        assert!(!coordinator.signal().is_requested());
        coordinator.complete();
        assert!(rx.recv_timeout(TEST_TIMEOUT * 3).is_err());
    }
}
