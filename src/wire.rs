//! Wire message framing: the fixed BOOTP header per IETF-RFC-2131 section 2.
//!
//! The header is a fixed 236-byte prefix followed by the options area, which
//! is handled separately by the option codec. Fields are stored in network
//! byte order on the wire; the [`ByteStruct`] boundary is where the swap
//! happens, so everything behind it reads in host order.

use crate::{enum_with_unknown, ByteArray, HwAddr, IpV4Addr};

use byte_struct::*;
use static_assertions::const_assert;

/// Length of the fixed BOOTP prefix
pub const DHCP_HEADER_SIZE: usize = 236;

/// Capacity of the options area in an outgoing reply: a full message is the
/// classic 548-byte minimum-MTU DHCP datagram (576 minus IP and UDP headers).
pub const OPTIONS_CAPACITY: usize = 312;

/// Smallest frame worth parsing: the fixed header, the magic cookie and an
/// END byte.
pub const MIN_REQUEST_SIZE: usize = DHCP_HEADER_SIZE + 5;

/// Server-side UDP port
pub const DHCP_SERVER_PORT: u16 = 67;
/// Client-side UDP port, destination of broadcast replies
pub const DHCP_CLIENT_PORT: u16 = 68;

const_assert!(BootpHeader::BYTE_LEN == DHCP_HEADER_SIZE);

enum_with_unknown! {
    /// Message op code / message type. 1 = BOOTREQUEST, 2 = BOOTREPLY
    /// Legacy operation type field from BOOTP.
    /// Still has to match and change value depending on message type even though
    /// there is only one valid combination of message type and operation.
    pub enum BootpOp(u8) {
        /// Anything coming from the client
        BootRequest = 1,
        /// Anything coming from the server
        BootReply = 2
    }
}

impl ByteStructLen for BootpOp {
    const BYTE_LEN: usize = 1;
}

impl ByteStruct for BootpOp {
    fn read_bytes(bytes: &[u8]) -> Self {
        Self::from(bytes[0])
    }

    fn write_bytes(&self, bytes: &mut [u8]) {
        bytes[0] = u8::from(*self);
    }
}

enum_with_unknown! {
    /// Contents of option field kind 53, which drives the dispatcher
    pub enum MessageKind(u8) {
        /// Client broadcast to locate available servers.
        Discover = 1,
        /// Server to client in response to DHCPDISCOVER with offer of configuration parameters.
        Offer = 2,
        /// Client message to servers either (a) requesting
        /// offered parameters from one server and implicitly
        /// declining offers from all others, (b) confirming
        /// correctness of previously allocated address after,
        /// e.g., system reboot, or (c) extending the lease on a
        /// particular network address.
        Request = 3,
        /// Client to server indicating network address is already in use.
        Decline = 4,
        /// Server to client with configuration parameters, including committed network address.
        Ack = 5, // Acknowledge
        /// Server to client indicating client's notion of network address is incorrect
        /// (e.g., client has moved to new subnet) or client's lease as expired
        Nak = 6, // Negative-acknowledge
        /// Client to server relinquishing network address and cancelling remaining lease.
        Release = 7,
        /// Client to server, asking only for local configuration parameters.
        /// Client already has externally configured network address.
        Inform = 8
    }
}

bitfields!(
    /// BOOTP flags word. Only the top bit is assigned: the client sets it to
    /// ask for a broadcast reply; the rest must be zero. Bits are declared
    /// low to high, so `broadcast` lands in bit 15 of the wire word.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub BootpFlags: u16 {
        /// Reserved bits; must be zero.
        pub unused: 15,
        /// Client requests a broadcast reply when set.
        pub broadcast: 1
    }
);

/// The fixed-length part of a BOOTP/DHCP message.
/// The options section can vary in length, and is handled separately
/// by the option codec.
#[derive(ByteStruct, Debug, Clone, Copy, PartialEq, Eq)]
#[byte_struct_be]
pub struct BootpHeader {
    /// Message op code / message type. 1 = BOOTREQUEST, 2 = BOOTREPLY
    pub op: BootpOp,
    /// Hardware type, 1 for ethernet
    pub htype: u8,
    /// Hardware address length, 1-16; 6 for a standard mac address
    pub hlen: u8,
    /// Legacy relay hop count, always 0 here
    pub hops: u8,
    /// Transaction ID; chosen by the client and echoed by the server
    pub xid: u32,
    /// Seconds elapsed since client started transaction
    pub secs: u16,
    /// Broadcast flag word
    pub flags: BootpFlags,
    /// Client IP Address
    pub ciaddr: IpV4Addr,
    /// Your IP Address, the address the server assigns the client
    pub yiaddr: IpV4Addr,
    /// Server IP Address
    pub siaddr: IpV4Addr,
    /// Gateway (relay) IP Address; non-zero when the request was forwarded
    pub giaddr: IpV4Addr,
    /// Client hardware address field; only the first `hlen` bytes matter
    pub chaddr: ByteArray<16>,
    /// Server host name, unused by this server
    pub sname: [u128; 4],
    /// Boot file name, unused by this server
    pub file: [u128; 8],
}

impl BootpHeader {
    /// Initialize a reply from a request: a zeroed BOOTREPLY header with
    /// `htype`, `hlen`, `xid`, `flags`, `giaddr` and `chaddr` carried over.
    pub fn reply_to(request: &BootpHeader) -> Self {
        BootpHeader {
            op: BootpOp::BootReply,
            htype: request.htype,
            hlen: request.hlen,
            hops: 0,
            xid: request.xid,
            secs: 0,
            flags: request.flags,
            ciaddr: IpV4Addr::ANY,
            yiaddr: IpV4Addr::ANY,
            siaddr: IpV4Addr::ANY,
            giaddr: request.giaddr,
            chaddr: request.chaddr,
            sname: [0; 4],
            file: [0; 8],
        }
    }

    /// The significant `hlen` bytes of `chaddr`
    pub fn hw_addr(&self) -> HwAddr {
        HwAddr::new(&self.chaddr.0[..(self.hlen as usize).min(16)])
    }

    /// Pack into big-endian (network) byte array
    pub fn to_be_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut bytes = [0_u8; Self::BYTE_LEN];
        self.write_bytes(&mut bytes);
        bytes
    }
}
