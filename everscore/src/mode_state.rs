use scoreboard_common::config::Modes;
use std::{
    fmt,
    net::IpAddr,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// One consistent reading of the operator's choices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModeSnapshot {
    pub auto: bool,
    pub send: bool,
    pub peer_filter: Option<String>,
}

impl ModeSnapshot {
    pub fn from_config(modes: &Modes, peer_filter: &str) -> Self {
        Self {
            auto: modes.auto,
            send: modes.send,
            peer_filter: clean_filter(peer_filter),
        }
    }

    /// Exact match of the sender's textual address against the filter. No
    /// filter accepts everyone.
    pub fn accepts_peer(&self, sender: IpAddr) -> bool {
        match self.peer_filter {
            Some(ref filter) => sender.to_string() == *filter,
            None => true,
        }
    }
}

impl fmt::Display for ModeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {}, peers: {}",
            if self.auto { "auto" } else { "manual" },
            if self.send { "send" } else { "receive" },
            self.peer_filter.as_deref().unwrap_or("any")
        )
    }
}

fn clean_filter(filter: &str) -> Option<String> {
    let filter = filter.trim();
    if filter.is_empty() {
        None
    } else {
        Some(filter.to_string())
    }
}

/// Shared holder for the operator modes.
///
/// Only the main loop writes; the hardware and network threads read a whole
/// [`ModeSnapshot`] per event so they never see one axis updated without the
/// other.
#[derive(Debug, Default)]
pub struct ModeState {
    inner: Mutex<ModeSnapshot>,
}

impl ModeState {
    pub fn new(initial: ModeSnapshot) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        self.lock().clone()
    }

    pub fn set_auto(&self, auto: bool) {
        self.lock().auto = auto;
    }

    pub fn set_send(&self, send: bool) {
        self.lock().send = send;
    }

    /// Blank filters are stored as no filter
    pub fn set_peer_filter(&self, filter: Option<&str>) {
        self.lock().peer_filter = filter.and_then(clean_filter);
    }

    // The snapshot is plain data, so a panic while holding the lock can't
    // leave it half written
    fn lock(&self) -> MutexGuard<'_, ModeSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn test_from_config() {
        let snapshot = ModeSnapshot::from_config(
            &Modes {
                auto: false,
                send: true,
            },
            "  ",
        );
        assert_eq!(
            snapshot,
            ModeSnapshot {
                auto: false,
                send: true,
                peer_filter: None,
            }
        );

        let snapshot = ModeSnapshot::from_config(&Default::default(), " 10.0.0.5 ");
        assert_eq!(snapshot.peer_filter.as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn test_peer_filter() {
        let mut snapshot = ModeSnapshot {
            peer_filter: Some("10.0.0.5".to_string()),
            ..Default::default()
        };
        assert!(snapshot.accepts_peer("10.0.0.5".parse().unwrap()));
        assert!(!snapshot.accepts_peer("10.0.0.9".parse().unwrap()));

        snapshot.peer_filter = None;
        assert!(snapshot.accepts_peer("10.0.0.9".parse().unwrap()));
    }

    #[test]
    fn test_setters() {
        let modes = ModeState::default();
        modes.set_auto(true);
        modes.set_send(true);
        modes.set_peer_filter(Some("192.168.0.2"));
        assert_eq!(
            modes.snapshot(),
            ModeSnapshot {
                auto: true,
                send: true,
                peer_filter: Some("192.168.0.2".to_string()),
            }
        );

        modes.set_peer_filter(Some(""));
        assert_eq!(modes.snapshot().peer_filter, None);
        modes.set_peer_filter(Some("192.168.0.2"));
        modes.set_peer_filter(None);
        assert_eq!(modes.snapshot().peer_filter, None);
    }

    #[test]
    fn test_display() {
        let snapshot = ModeSnapshot {
            auto: false,
            send: true,
            peer_filter: Some("10.1.1.1".to_string()),
        };
        assert_eq!(snapshot.to_string(), "manual / send, peers: 10.1.1.1");
        assert_eq!(
            ModeSnapshot::default().to_string(),
            "manual / receive, peers: any"
        );
    }

    #[test]
    fn test_readers_see_whole_snapshots() {
        let modes = Arc::new(ModeState::default());

        // The writer always flips both axes together
        let writer = {
            let modes = modes.clone();
            thread::spawn(move || {
                for i in 0..10_000 {
                    let value = i % 2 == 0;
                    let mut guard = modes.lock();
                    guard.auto = value;
                    guard.send = value;
                }
            })
        };

        for _ in 0..10_000 {
            let snapshot = modes.snapshot();
            assert_eq!(snapshot.auto, snapshot.send);
        }
        writer.join().unwrap();
    }
}
