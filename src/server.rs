//! Message dispatcher and the background worker serving the DHCP socket.
//!
//! The dispatcher is a pure per-message state machine: frame check, options
//! parse, a typed handler per DHCP message kind, reply fill, serialize. The
//! worker thread owns the pool outright and is the only thing that ever
//! mutates it, so requests are handled strictly in arrival order and the
//! lease state machine needs no locking. A stop flag, writable by any
//! thread, is observed at each 100 ms poll cycle.
//!
//! Replies always go to the limited-broadcast address on the client port,
//! regardless of the request's unicast source, because the client typically
//! has no IP yet.

use crate::binding::{BindingStatus, KindFilter};
use crate::options::{self, DhcpOption, OptionCode, OptionList};
use crate::pool::Pool;
use crate::wire::{
    BootpHeader, BootpOp, MessageKind, DHCP_CLIENT_PORT, DHCP_HEADER_SIZE, DHCP_SERVER_PORT,
    MIN_REQUEST_SIZE, OPTIONS_CAPACITY,
};
use crate::{ByteArray, IpV4Addr};

use byte_struct::*;
use log::{debug, error, info};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// How long a blocked receive waits before re-checking the stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors returned by [`Server::start`].
#[derive(Debug, Error)]
pub enum StartError {
    /// The worker is already running
    #[error("server already running")]
    AlreadyRunning,
    /// The pool has no server identifier configured
    #[error("server identifier not configured")]
    MissingServerId,
    /// The configured interface index is not usable
    #[error("invalid interface index")]
    InvalidInterface,
    /// Socket create/bind failure at startup
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Control surface around the background worker thread.
///
/// `start` takes ownership of a configured [`Pool`], binds the DHCP server
/// socket and spawns the worker; `stop` raises the stop flag and joins.
pub struct Server {
    worker: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl Server {
    /// New stopped server
    pub fn new() -> Self {
        Server {
            worker: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind UDP 0.0.0.0:67, fill in pool defaults, and spawn the dispatch
    /// worker. `interface`, when given, overrides the pool's configured
    /// device index.
    pub fn start(&mut self, mut pool: Pool, interface: Option<u32>) -> Result<(), StartError> {
        if self.worker.is_some() {
            return Err(StartError::AlreadyRunning);
        }
        if let Some(index) = interface {
            pool.device_index = Some(index);
        }
        // Interface existence is the transport's concern; index zero is
        // never a valid identifier though.
        if pool.device_index == Some(0) {
            return Err(StartError::InvalidInterface);
        }
        pool.apply_defaults()
            .map_err(|_| StartError::MissingServerId)?;

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, DHCP_SERVER_PORT))?;
        socket.set_broadcast(true)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;

        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let worker = thread::Builder::new()
            .name("dhcpd".into())
            .spawn(move || run_worker(socket, pool, stop))?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Raise the stop flag and join the worker
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    /// True while the worker thread is running
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(socket: UdpSocket, mut pool: Pool, stop: Arc<AtomicBool>) {
    info!("dhcp server listening on port {}", DHCP_SERVER_PORT);

    let mut buf = [0_u8; DHCP_HEADER_SIZE + OPTIONS_CAPACITY];
    while !stop.load(Ordering::SeqCst) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                continue
            }
            Err(err) => {
                error!("receive error: {}", err);
                continue;
            }
        };

        let now = unix_now();
        if let Some(reply) = dispatch(&mut pool, &buf[..len], peer, now) {
            let destination = SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT);
            if let Err(err) = socket.send_to(&reply, destination) {
                error!("failed to send reply for {}: {}", peer, err);
            }
        }
    }

    info!("dhcp server stopped");
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Interpret one request datagram against the pool, producing the serialized
/// reply datagram when the protocol calls for one.
///
/// Malformed input is dropped silently per RFC 2131; range exhaustion on
/// DISCOVER is a normal no-reply outcome, not an error.
pub fn dispatch(pool: &mut Pool, datagram: &[u8], peer: SocketAddr, now: u64) -> Option<Vec<u8>> {
    if datagram.len() < MIN_REQUEST_SIZE {
        debug!("{}: dropping undersized frame ({} bytes)", peer, datagram.len());
        return None;
    }
    let request = BootpHeader::read_bytes(&datagram[..DHCP_HEADER_SIZE]);
    if request.op != BootpOp::BootRequest {
        debug!("{}: dropping frame with op {:?}", peer, request.op);
        return None;
    }
    if request.hlen < 1 || request.hlen > 16 {
        debug!(
            "{}: dropping frame with hardware address length {}",
            peer, request.hlen
        );
        return None;
    }

    let opts = match options::parse_wire(&datagram[DHCP_HEADER_SIZE..]) {
        Ok(opts) => opts,
        Err(err) => {
            debug!("{}: invalid request received: {}", peer, err);
            return None;
        }
    };
    let kind = match opts
        .search(OptionCode::DhcpMessageType)
        .and_then(|opt| opt.data().first().copied())
    {
        Some(value) => MessageKind::from(value),
        None => {
            debug!("{}: request without a DHCP message type", peer);
            return None;
        }
    };

    let outcome = match kind {
        MessageKind::Discover => serve_discover(pool, &request, &opts, now),
        MessageKind::Request => serve_request(pool, &request, &opts, now),
        MessageKind::Decline => serve_decline(pool, &request),
        MessageKind::Release => serve_release(pool, &request),
        MessageKind::Inform => serve_inform(&request),
        other => {
            debug!(
                "{}: request with invalid DHCP message type option {:?}",
                peer, other
            );
            None
        }
    };
    let (reply_kind, yiaddr) = outcome?;

    let mut reply = BootpHeader::reply_to(&request);
    if let Some(address) = yiaddr {
        reply.yiaddr = address;
    }
    let reply_opts = fill_reply_options(pool, &opts, reply_kind);

    let mut out = vec![0_u8; DHCP_HEADER_SIZE + OPTIONS_CAPACITY];
    reply.write_bytes(&mut out[..DHCP_HEADER_SIZE]);
    match options::serialize(&reply_opts, &mut out[DHCP_HEADER_SIZE..]) {
        Ok(written) => {
            out.truncate(DHCP_HEADER_SIZE + written);
            Some(out)
        }
        Err(err) => {
            error!("{}: dropping reply: {}", peer, err);
            None
        }
    }
}

/// Serve DHCPDISCOVER: offer from a static reservation, from the client's
/// existing dynamic binding, or from a fresh allocation; silence when the
/// range is exhausted.
fn serve_discover(
    pool: &mut Pool,
    request: &BootpHeader,
    opts: &OptionList,
    now: u64,
) -> Option<(MessageKind, Option<IpV4Addr>)> {
    let hw = request.hw_addr();
    let pending_time = pool.pending_time;

    // A static binding configured for this client wins over the pool
    if let Some(binding) = pool.bindings.search(&hw, KindFilter::Static, None) {
        info!(
            "Offer {} to {} (static), {} status {}expired",
            binding.address,
            hw,
            binding.status,
            if binding.expired(now) { "" } else { "not " }
        );
        if binding.expired(now) {
            binding.make_pending(now, pending_time);
        }
        return Some((MessageKind::Offer, Some(binding.address)));
    }

    // The client's current or previous dynamic binding, if any
    if let Some(binding) = pool.bindings.search(&hw, KindFilter::Dynamic, None) {
        info!(
            "Offer {} to {}, {} status {}expired",
            binding.address,
            hw,
            binding.status,
            if binding.expired(now) { "" } else { "not " }
        );
        if binding.expired(now) {
            binding.make_pending(now, pending_time);
        }
        return Some((MessageKind::Offer, Some(binding.address)));
    }

    // Fresh allocation, honoring the requested address when possible
    let requested = opts
        .search(OptionCode::RequestedIpAddress)
        .and_then(|opt| <[u8; 4]>::try_from(opt.data()).ok())
        .map(ByteArray);
    match pool.bindings.new_dynamic(&mut pool.range, requested, &hw, now) {
        Some(binding) => {
            info!(
                "Offer {} to {}, {} status {}expired",
                binding.address,
                hw,
                binding.status,
                if binding.expired(now) { "" } else { "not " }
            );
            if binding.expired(now) {
                binding.make_pending(now, pending_time);
            }
            Some((MessageKind::Offer, Some(binding.address)))
        }
        None => {
            info!("Can not offer an address to {}, no address available.", hw);
            None
        }
    }
}

/// Serve DHCPREQUEST: ack a pending binding when the client answered our
/// offer, nak when we have nothing pending for it, and silently clear the
/// pending binding when the client accepted another server's offer.
fn serve_request(
    pool: &mut Pool,
    request: &BootpHeader,
    opts: &OptionList,
    now: u64,
) -> Option<(MessageKind, Option<IpV4Addr>)> {
    let hw = request.hw_addr();
    let lease_time = pool.lease_time;

    let server_id = opts
        .search(OptionCode::ServerIdentifier)
        .and_then(|opt| <[u8; 4]>::try_from(opt.data()).ok())
        .map(ByteArray)
        .unwrap_or(IpV4Addr::ANY);

    if server_id == pool.server_id {
        // This request is an answer to our offer
        match pool
            .bindings
            .search(&hw, KindFilter::Any, Some(BindingStatus::Pending))
        {
            Some(binding) => {
                info!("Ack {} to {}, associated", binding.address, hw);
                binding.associate(now, lease_time);
                Some((MessageKind::Ack, Some(binding.address)))
            }
            None => {
                info!("Nak to {}, not associated", hw);
                Some((MessageKind::Nak, None))
            }
        }
    } else if server_id != IpV4Addr::ANY {
        // Answer to the offer of another server; no reply either way
        if let Some(binding) = pool
            .bindings
            .search(&hw, KindFilter::Any, Some(BindingStatus::Pending))
        {
            info!(
                "Clearing {} of {}, accepted another server offer",
                binding.address, hw
            );
            binding.status = BindingStatus::Empty;
            binding.lease_time = 0;
        }
        None
    } else {
        // No server identifier at all; nothing of ours to confirm
        None
    }
}

/// Serve DHCPDECLINE: the client found the pending address already in use
fn serve_decline(pool: &mut Pool, request: &BootpHeader) -> Option<(MessageKind, Option<IpV4Addr>)> {
    let hw = request.hw_addr();
    if let Some(binding) = pool
        .bindings
        .search(&hw, KindFilter::Any, Some(BindingStatus::Pending))
    {
        info!("Declined {} by {}", binding.address, hw);
        binding.status = BindingStatus::Empty;
    }
    None
}

/// Serve DHCPRELEASE: the client relinquishes its lease early
fn serve_release(pool: &mut Pool, request: &BootpHeader) -> Option<(MessageKind, Option<IpV4Addr>)> {
    let hw = request.hw_addr();
    if let Some(binding) = pool
        .bindings
        .search(&hw, KindFilter::Any, Some(BindingStatus::Associated))
    {
        info!("Released {} by {}", binding.address, hw);
        binding.status = BindingStatus::Released;
    }
    None
}

/// Serve DHCPINFORM: configuration parameters only, no address assignment
fn serve_inform(request: &BootpHeader) -> Option<(MessageKind, Option<IpV4Addr>)> {
    info!("Info to {}", request.hw_addr());
    Some((MessageKind::Ack, None))
}

/// Assemble the reply's option list: the message type and our server
/// identifier first, then, for anything but a NAK, the configured options
/// the client asked for in its parameter request list, in request order.
/// Unknown or unconfigured ids are silently skipped.
fn fill_reply_options(pool: &Pool, request_opts: &OptionList, kind: MessageKind) -> OptionList {
    let mut reply_opts = OptionList::new();
    reply_opts.append(&DhcpOption::new(
        OptionCode::DhcpMessageType,
        vec![u8::from(kind)],
    ));
    reply_opts.append(&DhcpOption::new(
        OptionCode::ServerIdentifier,
        pool.server_id.0.to_vec(),
    ));

    if kind != MessageKind::Nak {
        if let Some(requested) = request_opts.search(OptionCode::ParameterRequestList) {
            for &id in requested.data() {
                let code = OptionCode::from(id);
                if code == OptionCode::Pad {
                    continue;
                }
                if let Some(option) = pool.options.search(code) {
                    reply_opts.append(option);
                }
            }
        }
    }
    reply_opts
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::BootpFlags;
    use crate::HwAddr;

    const NOW: u64 = 1_700_000_000;

    fn test_pool() -> Pool {
        let mut pool = Pool::new();
        pool.set_server_id("192.168.2.1").unwrap();
        pool.set_range("192.168.2.2", "192.168.2.254").unwrap();
        pool.set_pending_time(60);
        pool.apply_defaults().unwrap();
        pool
    }

    fn peer() -> SocketAddr {
        SocketAddr::from(([192, 168, 2, 30], 68))
    }

    fn frame(kind: MessageKind, mac: [u8; 6], extra: &[DhcpOption]) -> Vec<u8> {
        let mut chaddr = [0_u8; 16];
        chaddr[..6].copy_from_slice(&mac);
        let header = BootpHeader {
            op: BootpOp::BootRequest,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 0x12345,
            secs: 0,
            flags: BootpFlags::default(),
            ciaddr: IpV4Addr::ANY,
            yiaddr: IpV4Addr::ANY,
            siaddr: IpV4Addr::ANY,
            giaddr: IpV4Addr::ANY,
            chaddr: ByteArray(chaddr),
            sname: [0; 4],
            file: [0; 8],
        };

        let mut opts = OptionList::new();
        opts.append(&DhcpOption::new(
            OptionCode::DhcpMessageType,
            vec![u8::from(kind)],
        ));
        for option in extra {
            opts.append(option);
        }

        let mut out = vec![0_u8; DHCP_HEADER_SIZE + OPTIONS_CAPACITY];
        header.write_bytes(&mut out[..DHCP_HEADER_SIZE]);
        let written = options::serialize(&opts, &mut out[DHCP_HEADER_SIZE..]).unwrap();
        out.truncate(DHCP_HEADER_SIZE + written);
        out
    }

    const MAC: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01];

    #[test]
    fn test_short_frame_dropped() -> () {
        let mut pool = test_pool();
        let datagram = frame(MessageKind::Discover, MAC, &[]);
        assert!(dispatch(&mut pool, &datagram[..200], peer(), NOW).is_none());
        assert!(pool.bindings.is_empty());
    }

    #[test]
    fn test_reply_op_dropped() -> () {
        let mut pool = test_pool();
        let mut datagram = frame(MessageKind::Discover, MAC, &[]);
        datagram[0] = 2; // BOOTREPLY
        assert!(dispatch(&mut pool, &datagram, peer(), NOW).is_none());
    }

    #[test]
    fn test_bad_hlen_dropped() -> () {
        let mut pool = test_pool();
        for hlen in [0_u8, 17] {
            let mut datagram = frame(MessageKind::Discover, MAC, &[]);
            datagram[2] = hlen;
            assert!(dispatch(&mut pool, &datagram, peer(), NOW).is_none());
        }
    }

    #[test]
    fn test_missing_cookie_dropped() -> () {
        let mut pool = test_pool();
        let mut datagram = frame(MessageKind::Discover, MAC, &[]);
        datagram[DHCP_HEADER_SIZE] = 0;
        assert!(dispatch(&mut pool, &datagram, peer(), NOW).is_none());
    }

    #[test]
    fn test_missing_message_type_dropped() -> () {
        let mut pool = test_pool();
        let mut datagram = frame(MessageKind::Discover, MAC, &[]);
        // Overwrite the type option with a same-size unknown one
        datagram[DHCP_HEADER_SIZE + 4] = 224;
        assert!(dispatch(&mut pool, &datagram, peer(), NOW).is_none());
    }

    #[test]
    fn test_server_message_kind_dropped() -> () {
        let mut pool = test_pool();
        let datagram = frame(MessageKind::Offer, MAC, &[]);
        assert!(dispatch(&mut pool, &datagram, peer(), NOW).is_none());
        assert!(pool.bindings.is_empty());
    }

    #[test]
    fn test_discover_prefers_static_binding() -> () {
        let mut pool = test_pool();
        pool.add_static_binding("aa:bb:cc:dd:ee:01", "192.168.2.50").unwrap();

        let reply = dispatch(&mut pool, &frame(MessageKind::Discover, MAC, &[]), peer(), NOW)
            .expect("offer expected");
        let header = BootpHeader::read_bytes(&reply[..DHCP_HEADER_SIZE]);
        assert_eq!(header.yiaddr, IpV4Addr::new([192, 168, 2, 50]));
    }

    #[test]
    fn test_repeat_discover_reoffers_same_address() -> () {
        let mut pool = test_pool();
        let first = dispatch(&mut pool, &frame(MessageKind::Discover, MAC, &[]), peer(), NOW).unwrap();
        let second =
            dispatch(&mut pool, &frame(MessageKind::Discover, MAC, &[]), peer(), NOW + 5).unwrap();
        let first = BootpHeader::read_bytes(&first[..DHCP_HEADER_SIZE]);
        let second = BootpHeader::read_bytes(&second[..DHCP_HEADER_SIZE]);
        assert_eq!(first.yiaddr, second.yiaddr);
        assert_eq!(pool.bindings.len(), 1);
    }

    /// A discover while the lease is still running re-offers the address
    /// without touching the record's status or times.
    #[test]
    fn test_discover_leaves_live_association_untouched() -> () {
        let mut pool = test_pool();
        dispatch(&mut pool, &frame(MessageKind::Discover, MAC, &[]), peer(), NOW).unwrap();
        let server_id = DhcpOption::new(OptionCode::ServerIdentifier, vec![192, 168, 2, 1]);
        dispatch(&mut pool, &frame(MessageKind::Request, MAC, &[server_id]), peer(), NOW).unwrap();

        dispatch(&mut pool, &frame(MessageKind::Discover, MAC, &[]), peer(), NOW + 10).unwrap();
        let binding = pool
            .bindings
            .search(&HwAddr::new(&MAC), KindFilter::Any, None)
            .unwrap();
        assert_eq!(binding.status, BindingStatus::Associated);
        assert_eq!(binding.lease_time, 3600);
        assert_eq!(binding.binding_time, NOW);
    }

    #[test]
    fn test_request_without_pending_binding_naks() -> () {
        let mut pool = test_pool();
        let server_id = DhcpOption::new(OptionCode::ServerIdentifier, vec![192, 168, 2, 1]);
        let prl = DhcpOption::new(OptionCode::ParameterRequestList, vec![1, 28]);
        let reply = dispatch(
            &mut pool,
            &frame(MessageKind::Request, MAC, &[server_id, prl]),
            peer(),
            NOW,
        )
        .expect("nak expected");

        let header = BootpHeader::read_bytes(&reply[..DHCP_HEADER_SIZE]);
        assert_eq!(header.yiaddr, IpV4Addr::ANY);

        let opts = options::parse_wire(&reply[DHCP_HEADER_SIZE..]).unwrap();
        assert_eq!(
            opts.search(OptionCode::DhcpMessageType).unwrap().data(),
            &[u8::from(MessageKind::Nak)]
        );
        // A nak carries no requested options
        assert!(opts.search(OptionCode::SubnetMask).is_none());
        assert_eq!(opts.len(), 2);
    }

    #[test]
    fn test_request_without_server_id_dropped() -> () {
        let mut pool = test_pool();
        dispatch(&mut pool, &frame(MessageKind::Discover, MAC, &[]), peer(), NOW).unwrap();
        assert!(dispatch(&mut pool, &frame(MessageKind::Request, MAC, &[]), peer(), NOW).is_none());
        // The offer stays pending
        let binding = pool
            .bindings
            .search(&HwAddr::new(&MAC), KindFilter::Any, None)
            .unwrap();
        assert_eq!(binding.status, BindingStatus::Pending);
    }

    #[test]
    fn test_release_requires_association() -> () {
        let mut pool = test_pool();
        dispatch(&mut pool, &frame(MessageKind::Discover, MAC, &[]), peer(), NOW).unwrap();

        // Pending, not associated: release does nothing
        assert!(dispatch(&mut pool, &frame(MessageKind::Release, MAC, &[]), peer(), NOW).is_none());
        let binding = pool
            .bindings
            .search(&HwAddr::new(&MAC), KindFilter::Any, None)
            .unwrap();
        assert_eq!(binding.status, BindingStatus::Pending);

        let server_id = DhcpOption::new(OptionCode::ServerIdentifier, vec![192, 168, 2, 1]);
        dispatch(&mut pool, &frame(MessageKind::Request, MAC, &[server_id]), peer(), NOW).unwrap();
        assert!(dispatch(&mut pool, &frame(MessageKind::Release, MAC, &[]), peer(), NOW).is_none());
        let binding = pool
            .bindings
            .search(&HwAddr::new(&MAC), KindFilter::Any, None)
            .unwrap();
        assert_eq!(binding.status, BindingStatus::Released);
    }

    #[test]
    fn test_requested_address_honored_for_new_client() -> () {
        let mut pool = test_pool();
        let requested = DhcpOption::new(OptionCode::RequestedIpAddress, vec![192, 168, 2, 77]);
        let reply = dispatch(
            &mut pool,
            &frame(MessageKind::Discover, MAC, &[requested]),
            peer(),
            NOW,
        )
        .unwrap();
        let header = BootpHeader::read_bytes(&reply[..DHCP_HEADER_SIZE]);
        assert_eq!(header.yiaddr, IpV4Addr::new([192, 168, 2, 77]));
    }

    #[test]
    fn test_reply_echoes_request_identity() -> () {
        let mut pool = test_pool();
        let mut datagram = frame(MessageKind::Discover, MAC, &[]);
        // giaddr, as a relay would set it
        datagram[24..28].copy_from_slice(&[192, 168, 9, 1]);
        let reply = dispatch(&mut pool, &datagram, peer(), NOW).unwrap();

        let header = BootpHeader::read_bytes(&reply[..DHCP_HEADER_SIZE]);
        assert_eq!(header.op, BootpOp::BootReply);
        assert_eq!(header.xid, 0x12345);
        assert_eq!(header.giaddr, IpV4Addr::new([192, 168, 9, 1]));
        assert_eq!(&header.chaddr.0[..6], &MAC);
    }
}
