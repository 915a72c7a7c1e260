use crate::{publisher::Transmit, shutdown::ShutdownSignal};
use log::*;
use scoreboard_common::{
    config::Network,
    game_state::{GameState, RawState},
    wire::{self, EncodingError, MAX_PACKET_LEN},
};
use std::{
    io::{self, ErrorKind},
    net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket},
    time::Duration,
};
use thiserror::Error;

/// How long a receive may block before the loop looks at the shutdown flag.
/// Must stay well inside the shutdown failsafe.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Failed to bind UDP socket to {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error("Invalid network address {0:?}")]
    InvalidAddress(String),
    #[error("Only {sent} of {len} bytes were sent")]
    ShortSend { sent: usize, len: usize },
    #[error(transparent)]
    EncodingError(#[from] EncodingError),
    #[error(transparent)]
    IoError(#[from] io::Error),
}

/// The single UDP socket used both to listen for peers and to send to them.
#[derive(Debug)]
pub struct NetworkChannel {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl NetworkChannel {
    pub fn bind(config: &Network) -> Result<Self, NetworkError> {
        let ip: IpAddr = config
            .bind_address
            .trim()
            .parse()
            .map_err(|_| NetworkError::InvalidAddress(config.bind_address.clone()))?;
        let addr = SocketAddr::new(ip, config.port);

        let socket = bind_reusable(addr).map_err(|source| NetworkError::Bind { addr, source })?;
        socket.set_broadcast(true)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;

        let destination = resolve_destination(config.destination.as_deref(), config.port)?;

        info!(
            "Network channel bound to {}, sending to {destination}",
            socket.local_addr()?
        );

        Ok(Self {
            socket,
            destination,
        })
    }

    #[cfg(test)]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receives packets until shutdown is requested or the socket fails.
    ///
    /// Malformed payloads are logged and dropped without reaching `on_packet`.
    pub fn receive_loop<F>(&self, shutdown: &ShutdownSignal, mut on_packet: F)
    where
        F: FnMut(RawState, IpAddr),
    {
        let mut buf = vec![0u8; MAX_PACKET_LEN];

        while !shutdown.is_requested() {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => match wire::decode(&buf[..len]) {
                    Ok(raw) => {
                        trace!("Packet from {from}: {raw:?}");
                        on_packet(raw, from.ip());
                    }
                    Err(e) => warn!("Dropped malformed packet from {from}: {e}"),
                },
                Err(e) if is_transient(&e) => {}
                Err(e) => {
                    if !shutdown.is_requested() {
                        error!("Network receive failed, no longer listening for peers: {e}");
                    }
                    break;
                }
            }
        }

        info!("Network receive loop stopped");
    }
}

impl Transmit for NetworkChannel {
    fn transmit(&self, state: &GameState) -> Result<(), NetworkError> {
        let bytes = wire::encode(state)?;
        let sent = self.socket.send_to(&bytes, self.destination)?;
        if sent != bytes.len() {
            return Err(NetworkError::ShortSend {
                sent,
                len: bytes.len(),
            });
        }
        trace!("Sent {sent} bytes to {}", self.destination);
        Ok(())
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        // A read timeout shows up as either of the first two depending on the OS
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
        // Windows reports an ICMP port unreachable from an earlier send here
        | ErrorKind::ConnectionReset
    )
}

/// `None` is the subnet broadcast address on our own port. Otherwise accepts
/// `ip:port`, a bare IP, or a host name with or without a port.
pub fn resolve_destination(
    destination: Option<&str>,
    port: u16,
) -> Result<SocketAddr, NetworkError> {
    let Some(destination) = destination.map(str::trim) else {
        return Ok(SocketAddr::new(Ipv4Addr::BROADCAST.into(), port));
    };

    if let Ok(addr) = destination.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = destination.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let resolved = if destination.contains(':') {
        destination.to_socket_addrs()
    } else {
        (destination, port).to_socket_addrs()
    };
    resolved
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| NetworkError::InvalidAddress(destination.to_string()))
}

/// Binds with address reuse so several instances (or a restarted one) can
/// share the port, and with broadcast reception enabled.
#[cfg(unix)]
fn bind_reusable(addr: SocketAddr) -> io::Result<UdpSocket> {
    use rustix::net::{AddressFamily, SocketType, bind, ipproto, socket, sockopt};

    let family = match addr {
        SocketAddr::V4(_) => AddressFamily::INET,
        SocketAddr::V6(_) => AddressFamily::INET6,
    };
    let fd = socket(family, SocketType::DGRAM, Some(ipproto::UDP))?;
    sockopt::set_socket_reuseaddr(&fd, true)?;
    sockopt::set_socket_broadcast(&fd, true)?;
    bind(&fd, &addr)?;
    Ok(UdpSocket::from(fd))
}

#[cfg(not(unix))]
fn bind_reusable(addr: SocketAddr) -> io::Result<UdpSocket> {
    UdpSocket::bind(addr)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::shutdown::{FAILSAFE_TIMEOUT, ShutdownCoordinator};
    use crossbeam_channel::unbounded;
    use more_asserts::*;
    use scoreboard_common::clock::ClockRepresentation;
    use std::{thread, time::Instant};

    const RECV_WAIT: Duration = Duration::from_secs(2);

    fn loopback(destination: Option<String>) -> NetworkChannel {
        NetworkChannel::bind(&Network {
            port: 0,
            bind_address: "127.0.0.1".to_string(),
            destination,
            peer_filter: String::new(),
        })
        .unwrap()
    }

    #[test]
    fn test_resolve_destination() {
        assert_eq!(
            resolve_destination(None, 54545).unwrap(),
            "255.255.255.255:54545".parse().unwrap()
        );
        assert_eq!(
            resolve_destination(Some("10.0.0.7"), 54545).unwrap(),
            "10.0.0.7:54545".parse().unwrap()
        );
        assert_eq!(
            resolve_destination(Some(" 10.0.0.7:6000 "), 54545).unwrap(),
            "10.0.0.7:6000".parse().unwrap()
        );
        assert!(matches!(
            resolve_destination(Some("definitely not a host:port:"), 54545),
            Err(NetworkError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_bind_rejects_bad_address() {
        let result = NetworkChannel::bind(&Network {
            bind_address: "nowhere".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(NetworkError::InvalidAddress(_))));
    }

    #[test]
    fn test_transmit_reaches_peer() {
        let receiver = loopback(Some("127.0.0.1:9".to_string()));
        let sender = loopback(Some(receiver.local_addr().unwrap().to_string()));

        let shutdown = ShutdownSignal::new();
        let (tx, rx) = unbounded();
        let listener = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                receiver.receive_loop(&shutdown, |raw, from| tx.send((raw, from)).unwrap())
            })
        };

        let state = GameState {
            home_score: 88,
            visitor_score: 101,
            shot_clock: 30,
            home_fouls: 4,
            visitor_fouls: 6,
            period: 2,
            clock: ClockRepresentation::decode("11:08"),
        };
        sender.transmit(&state).unwrap();

        let (raw, from) = rx.recv_timeout(RECV_WAIT).unwrap();
        assert_eq!(from, IpAddr::from(Ipv4Addr::LOCALHOST));
        assert_eq!(GameState::normalize(&raw), state);

        shutdown.request();
        listener.join().unwrap();
    }

    #[test]
    fn test_malformed_packets_are_dropped() {
        let receiver = loopback(None);
        let target = receiver.local_addr().unwrap();
        let raw_sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        let shutdown = ShutdownSignal::new();
        let (tx, rx) = unbounded();
        let listener = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                receiver.receive_loop(&shutdown, |raw, _| tx.send(raw).unwrap())
            })
        };

        raw_sender.send_to(b"{not json", target).unwrap();
        raw_sender.send_to(b"[1, 2, 3]", target).unwrap();
        raw_sender
            .send_to(br#"{"home_score": 3, "clock": "1:00"}"#, target)
            .unwrap();

        // Only the object makes it through, and the loop is still running
        let raw = rx.recv_timeout(RECV_WAIT).unwrap();
        assert_eq!(GameState::normalize(&raw).home_score, 3);
        assert!(!listener.is_finished());

        raw_sender.send_to(b"{not json", target).unwrap();
        raw_sender.send_to(br#"{"home_score": 4}"#, target).unwrap();
        let raw = rx.recv_timeout(RECV_WAIT).unwrap();
        assert_eq!(GameState::normalize(&raw).home_score, 4);

        shutdown.request();
        listener.join().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_receive_loop_honors_shutdown() {
        let receiver = loopback(None);
        let shutdown = ShutdownSignal::new();
        let listener = {
            let shutdown = shutdown.clone();
            thread::spawn(move || receiver.receive_loop(&shutdown, |_, _| {}))
        };

        // Let the loop settle into a blocking receive
        thread::sleep(Duration::from_millis(100));
        let start = Instant::now();
        shutdown.request();
        listener.join().unwrap();
        assert_le!(start.elapsed(), POLL_INTERVAL + Duration::from_millis(250));
    }

    #[test]
    fn test_receive_loop_stops_inside_failsafe() {
        assert_le!(POLL_INTERVAL * 4, FAILSAFE_TIMEOUT);
    }

    #[test]
    fn test_clean_shutdown_disarms_watchdog() {
        let (fired_tx, fired_rx) = unbounded();
        let mut shutdown = ShutdownCoordinator::with_failsafe(
            FAILSAFE_TIMEOUT,
            Box::new(move || fired_tx.send(()).unwrap()),
        );

        let receiver = loopback(None);
        let listener = {
            let signal = shutdown.signal();
            thread::spawn(move || receiver.receive_loop(&signal, |_, _| {}))
        };
        thread::sleep(Duration::from_millis(50));

        shutdown.begin();
        listener.join().unwrap();
        shutdown.complete();
        assert!(fired_rx.recv_timeout(FAILSAFE_TIMEOUT).is_err());
    }
}
