//! Option codec: bidirectional translation between the DHCP options wire
//! format (IETF-RFC-2132 TLV encoding behind the magic cookie) and structured
//! option lists, plus the named textual parsers used by configuration.
//!
//! Each recognized option has a string-constant name and a value kind that
//! dictates its textual parser. The original 256-entry table of function
//! pointers is re-expressed as a static mapping from option code to a tagged
//! [`OptionKind`]; [`parse_value`] switches exhaustively on the tag.

use crate::enum_with_unknown;

use std::fmt;
use thiserror::Error;

/// The 4-byte sentinel marking the start of the DHCP options area inside a
/// BOOTP message.
pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

enum_with_unknown! {
    /// Option codes of the DHCP and BOOTP vendor extensions
    /// as defined in RFC 2132.
    #[allow(missing_docs)]
    pub enum OptionCode(u8) {
        Pad = 0,
        SubnetMask = 1,
        TimeOffset = 2,
        Router = 3,
        TimeServer = 4,
        NameServer = 5,
        DomainNameServer = 6,
        LogServer = 7,
        CookieServer = 8,
        LprServer = 9,
        ImpressServer = 10,
        ResourceLocationServer = 11,
        HostName = 12,
        BootFileSize = 13,
        MeritDumpFile = 14,
        DomainName = 15,
        SwapServer = 16,
        RootPath = 17,
        ExtensionsPath = 18,

        // IP layer parameters
        IpForwarding = 19,
        NonLocalSourceRouting = 20,
        PolicyFilter = 21,
        MaximumDatagramReassemblySize = 22,
        DefaultIpTimeToLive = 23,
        PathMtuAgingTimeout = 24,
        PathMtuPlateauTable = 25,
        InterfaceMtu = 26,
        AllSubnetsAreLocal = 27,
        BroadcastAddress = 28,
        PerformMaskDiscovery = 29,
        MaskSupplier = 30,
        PerformRouterDiscovery = 31,
        RouterSolicitationAddress = 32,
        StaticRoute = 33,

        // Link layer parameters
        TrailerEncapsulation = 34,
        ArpCacheTimeout = 35,
        EthernetEncapsulation = 36,

        // TCP parameters
        TcpDefaultTtl = 37,
        TcpKeepaliveInterval = 38,
        TcpKeepaliveGarbage = 39,

        // Application and service parameters
        NetworkInformationServiceDomain = 40,
        NetworkInformationServers = 41,
        NetworkTimeProtocolServers = 42,
        VendorSpecificInformation = 43,
        NetbiosNameServer = 44,
        NetbiosDatagramDistributionServer = 45,
        NetbiosNodeType = 46,
        NetbiosScope = 47,
        XWindowFontServer = 48,
        XWindowDisplayManager = 49,

        // DHCP extensions (these are the load-bearing ones)
        RequestedIpAddress = 50,
        IpAddressLeaseTime = 51,
        OptionOverload = 52,
        /// This option's contents decide how the rest of the message is handled
        DhcpMessageType = 53,
        ServerIdentifier = 54,
        ParameterRequestList = 55,
        Message = 56,
        MaximumDhcpMessageSize = 57,
        RenewalTimeValue = 58,
        RebindingTimeValue = 59,
        VendorClassIdentifier = 60,
        ClientIdentifier = 61,

        // More application stuff
        NisPlusDomain = 64,
        NisPlusServers = 65,
        TftpServerName = 66,
        BootfileName = 67,
        MobileIpHomeAgent = 68,
        SmtpServer = 69,
        Pop3Server = 70,
        NntpServer = 71,
        DefaultWwwServer = 72,
        DefaultFingerServer = 73,
        DefaultIrcServer = 74,
        StreettalkServer = 75,
        StreettalkDirectoryAssistanceServer = 76,

        End = 255,
    }
}

/// Value kind dictating an option's textual parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionKind {
    /// Single octet
    Byte,
    /// Octets, comma- or space-separated in text
    ByteList,
    /// 16-bit big-endian value
    Short,
    /// 16-bit big-endian values, comma- or space-separated in text
    ShortList,
    /// 32-bit big-endian value
    Long,
    /// Raw text
    Str,
    /// Dotted-decimal IPv4 address
    Ip,
    /// Dotted-decimal IPv4 addresses, comma- or space-separated in text
    IpList,
    /// Hardware address, six hex octets separated by colons
    Mac,
}

struct OptionInfo {
    code: OptionCode,
    name: &'static str,
    kind: Option<OptionKind>,
}

/// Mapping table between DHCP options and the parsers for their values.
/// Entries with no kind are understood on the wire but cannot be configured
/// from the textual front-end.
static OPTION_TABLE: &[OptionInfo] = &[
    OptionInfo { code: OptionCode::Pad, name: "PAD", kind: None },
    OptionInfo { code: OptionCode::End, name: "END", kind: None },
    OptionInfo { code: OptionCode::SubnetMask, name: "SUBNET_MASK", kind: Some(OptionKind::Ip) },
    OptionInfo { code: OptionCode::TimeOffset, name: "TIME_OFFSET", kind: Some(OptionKind::Long) },
    OptionInfo { code: OptionCode::Router, name: "ROUTER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::TimeServer, name: "TIME_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::NameServer, name: "NAME_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::DomainNameServer, name: "DOMAIN_NAME_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::LogServer, name: "LOG_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::CookieServer, name: "COOKIE_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::LprServer, name: "LPR_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::ImpressServer, name: "IMPRESS_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::ResourceLocationServer, name: "RESOURCE_LOCATION_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::HostName, name: "HOST_NAME", kind: Some(OptionKind::Str) },
    OptionInfo { code: OptionCode::BootFileSize, name: "BOOT_FILE_SIZE", kind: Some(OptionKind::Short) },
    OptionInfo { code: OptionCode::MeritDumpFile, name: "MERIT_DUMP_FILE", kind: Some(OptionKind::Str) },
    OptionInfo { code: OptionCode::DomainName, name: "DOMAIN_NAME", kind: Some(OptionKind::Str) },
    OptionInfo { code: OptionCode::SwapServer, name: "SWAP_SERVER", kind: Some(OptionKind::Ip) },
    OptionInfo { code: OptionCode::RootPath, name: "ROOT_PATH", kind: Some(OptionKind::Str) },
    OptionInfo { code: OptionCode::ExtensionsPath, name: "EXTENSIONS_PATH", kind: Some(OptionKind::Str) },
    OptionInfo { code: OptionCode::IpForwarding, name: "IP_FORWARDING", kind: Some(OptionKind::Byte) },
    OptionInfo { code: OptionCode::NonLocalSourceRouting, name: "NON_LOCAL_SOURCE_ROUTING", kind: Some(OptionKind::Byte) },
    OptionInfo { code: OptionCode::PolicyFilter, name: "POLICY_FILTER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::MaximumDatagramReassemblySize, name: "MAXIMUM_DATAGRAM_REASSEMBLY_SIZE", kind: Some(OptionKind::Short) },
    OptionInfo { code: OptionCode::DefaultIpTimeToLive, name: "DEFAULT_IP_TIME_TO_LIVE", kind: Some(OptionKind::Byte) },
    OptionInfo { code: OptionCode::PathMtuAgingTimeout, name: "PATH_MTU_AGING_TIMEOUT", kind: Some(OptionKind::Long) },
    OptionInfo { code: OptionCode::PathMtuPlateauTable, name: "PATH_MTU_PLATEAU_TABLE", kind: Some(OptionKind::ShortList) },
    OptionInfo { code: OptionCode::InterfaceMtu, name: "INTERFACE_MTU", kind: Some(OptionKind::Short) },
    OptionInfo { code: OptionCode::AllSubnetsAreLocal, name: "ALL_SUBNETS_ARE_LOCAL", kind: Some(OptionKind::Byte) },
    OptionInfo { code: OptionCode::BroadcastAddress, name: "BROADCAST_ADDRESS", kind: Some(OptionKind::Ip) },
    OptionInfo { code: OptionCode::PerformMaskDiscovery, name: "PERFORM_MASK_DISCOVERY", kind: Some(OptionKind::Byte) },
    OptionInfo { code: OptionCode::MaskSupplier, name: "MASK_SUPPLIER", kind: Some(OptionKind::Byte) },
    OptionInfo { code: OptionCode::PerformRouterDiscovery, name: "PERFORM_ROUTER_DISCOVERY", kind: Some(OptionKind::Byte) },
    OptionInfo { code: OptionCode::RouterSolicitationAddress, name: "ROUTER_SOLICITATION_ADDRESS", kind: Some(OptionKind::Ip) },
    OptionInfo { code: OptionCode::StaticRoute, name: "STATIC_ROUTE", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::TrailerEncapsulation, name: "TRAILER_ENCAPSULATION", kind: Some(OptionKind::Byte) },
    OptionInfo { code: OptionCode::ArpCacheTimeout, name: "ARP_CACHE_TIMEOUT", kind: Some(OptionKind::Long) },
    OptionInfo { code: OptionCode::EthernetEncapsulation, name: "ETHERNET_ENCAPSULATION", kind: Some(OptionKind::Byte) },
    OptionInfo { code: OptionCode::TcpDefaultTtl, name: "TCP_DEFAULT_TTL", kind: Some(OptionKind::Byte) },
    OptionInfo { code: OptionCode::TcpKeepaliveInterval, name: "TCP_KEEPALIVE_INTERVAL", kind: Some(OptionKind::Long) },
    OptionInfo { code: OptionCode::TcpKeepaliveGarbage, name: "TCP_KEEPALIVE_GARBAGE", kind: Some(OptionKind::Byte) },
    OptionInfo { code: OptionCode::NetworkInformationServiceDomain, name: "NETWORK_INFORMATION_SERVICE_DOMAIN", kind: Some(OptionKind::Str) },
    OptionInfo { code: OptionCode::NetworkInformationServers, name: "NETWORK_INFORMATION_SERVERS", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::NetworkTimeProtocolServers, name: "NETWORK_TIME_PROTOCOL_SERVERS", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::VendorSpecificInformation, name: "VENDOR_SPECIFIC_INFORMATION", kind: Some(OptionKind::ByteList) },
    OptionInfo { code: OptionCode::NetbiosNameServer, name: "NETBIOS_OVER_TCP_IP_NAME_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::NetbiosDatagramDistributionServer, name: "NETBIOS_OVER_TCP_IP_DATAGRAM_DISTRIBUTION_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::NetbiosNodeType, name: "NETBIOS_OVER_TCP_IP_NODE_TYPE", kind: Some(OptionKind::Byte) },
    OptionInfo { code: OptionCode::NetbiosScope, name: "NETBIOS_OVER_TCP_IP_SCOPE", kind: Some(OptionKind::Str) },
    OptionInfo { code: OptionCode::XWindowFontServer, name: "X_WINDOW_SYSTEM_FONT_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::XWindowDisplayManager, name: "X_WINDOW_SYSTEM_DISPLAY_MANAGER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::RequestedIpAddress, name: "REQUESTED_IP_ADDRESS", kind: None },
    OptionInfo { code: OptionCode::IpAddressLeaseTime, name: "IP_ADDRESS_LEASE_TIME", kind: Some(OptionKind::Long) },
    OptionInfo { code: OptionCode::OptionOverload, name: "OPTION_OVERLOAD", kind: Some(OptionKind::Byte) },
    OptionInfo { code: OptionCode::DhcpMessageType, name: "DHCP_MESSAGE_TYPE", kind: None },
    OptionInfo { code: OptionCode::ServerIdentifier, name: "SERVER_IDENTIFIER", kind: Some(OptionKind::Ip) },
    OptionInfo { code: OptionCode::ParameterRequestList, name: "PARAMETER_REQUEST_LIST", kind: None },
    OptionInfo { code: OptionCode::Message, name: "MESSAGE", kind: None },
    OptionInfo { code: OptionCode::MaximumDhcpMessageSize, name: "MAXIMUM_DHCP_MESSAGE_SIZE", kind: None },
    OptionInfo { code: OptionCode::RenewalTimeValue, name: "RENEWAL_T1_TIME_VALUE", kind: Some(OptionKind::Long) },
    OptionInfo { code: OptionCode::RebindingTimeValue, name: "REBINDING_T2_TIME_VALUE", kind: Some(OptionKind::Long) },
    OptionInfo { code: OptionCode::VendorClassIdentifier, name: "VENDOR_CLASS_IDENTIFIER", kind: None },
    OptionInfo { code: OptionCode::ClientIdentifier, name: "CLIENT_IDENTIFIER", kind: None },
    OptionInfo { code: OptionCode::NisPlusDomain, name: "NETWORK_INFORMATION_SERVICE_PLUS_DOMAIN", kind: Some(OptionKind::Str) },
    OptionInfo { code: OptionCode::NisPlusServers, name: "NETWORK_INFORMATION_SERVICE_PLUS_SERVERS", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::TftpServerName, name: "TFTP_SERVER_NAME", kind: Some(OptionKind::Str) },
    OptionInfo { code: OptionCode::BootfileName, name: "BOOTFILE_NAME", kind: Some(OptionKind::Str) },
    OptionInfo { code: OptionCode::MobileIpHomeAgent, name: "MOBILE_IP_HOME_AGENT", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::SmtpServer, name: "SMTP_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::Pop3Server, name: "POP3_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::NntpServer, name: "NNTP_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::DefaultWwwServer, name: "DEFAULT_WWW_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::DefaultFingerServer, name: "DEFAULT_FINGER_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::DefaultIrcServer, name: "DEFAULT_IRC_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::StreettalkServer, name: "STREETTALK_SERVER", kind: Some(OptionKind::IpList) },
    OptionInfo { code: OptionCode::StreettalkDirectoryAssistanceServer, name: "STREETTALK_DIRECTORY_ASSISTANCE_SERVER", kind: Some(OptionKind::IpList) },
];

/// The table name of an option, when it has one
pub fn option_name(code: OptionCode) -> Option<&'static str> {
    OPTION_TABLE.iter().find(|e| e.code == code).map(|e| e.name)
}

/// Errors from the textual option parsers, reported synchronously to the
/// caller of configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionParseError {
    /// The name is unrecognized or the option has no textual parser
    #[error("unsupported DHCP option '{0}'")]
    UnknownOption(String),
    /// The value does not parse as the option's declared kind
    #[error("invalid {kind:?} value '{value}'")]
    InvalidValue {
        /// Declared kind of the option being configured
        kind: OptionKind,
        /// The offending input
        value: String,
    },
}

/// Errors from the TLV wire codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The options area does not begin with the magic cookie
    #[error("options area does not begin with the DHCP magic cookie")]
    MissingCookie,
    /// An option's declared length overruns the buffer
    #[error("option length overruns the options area")]
    Truncated,
    /// The buffer ended without an END option
    #[error("options area is not terminated by an END option")]
    MissingEnd,
    /// The serialized form would not fit the destination buffer
    #[error("serialized options exceed the options area capacity")]
    BufferFull,
}

/// A single DHCP option, self-describing on the wire as `code | len | data[len]`.
///
/// Codes received on the wire that have no table entry are retained as opaque
/// byte arrays so they can still be searched and logged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DhcpOption {
    code: OptionCode,
    data: Vec<u8>,
}

impl DhcpOption {
    /// New option around already-encoded payload bytes.
    /// A payload longer than 255 bytes cannot be represented on the wire.
    pub fn new(code: OptionCode, data: Vec<u8>) -> Self {
        debug_assert!(data.len() <= u8::MAX as usize);
        DhcpOption { code, data }
    }

    /// Option code
    pub fn code(&self) -> OptionCode {
        self.code
    }

    /// Payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload length; always equals the byte length of the payload
    pub fn len(&self) -> u8 {
        self.data.len() as u8
    }

    /// True for a zero-length payload
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Display for DhcpOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match option_name(self.code) {
            Some(name) => write!(f, "{} ({}), {} bytes", name, u8::from(self.code), self.len()),
            None => write!(f, "option {}, {} bytes", u8::from(self.code), self.len()),
        }
    }
}

/// Ordered list of options.
///
/// Entries with code PAD or END are structural sentinels on the wire and are
/// never carried in the list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionList {
    entries: Vec<DhcpOption>,
}

impl OptionList {
    /// New empty list
    pub fn new() -> Self {
        OptionList { entries: Vec::new() }
    }

    /// First-match lookup by option code
    pub fn search(&self, code: OptionCode) -> Option<&DhcpOption> {
        self.entries.iter().find(|opt| opt.code == code)
    }

    /// Append a deep copy of the option
    pub fn append(&mut self, option: &DhcpOption) {
        self.entries.push(option.clone());
    }

    /// Drop all options, leaving the list empty
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of options in the list
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no options are present
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate the options in order
    pub fn iter(&self) -> std::slice::Iter<'_, DhcpOption> {
        self.entries.iter()
    }
}

/// Parse the options contained in a DHCP message's options area into a list.
///
/// The area must begin with the magic cookie; PAD bytes are skipped and the
/// walk stops at the END option. A length field that overruns the buffer or
/// a missing END option is an error.
pub fn parse_wire(bytes: &[u8]) -> Result<OptionList, WireError> {
    if bytes.len() < MAGIC_COOKIE.len() || bytes[..MAGIC_COOKIE.len()] != MAGIC_COOKIE {
        return Err(WireError::MissingCookie);
    }

    let mut list = OptionList::new();
    let mut at = MAGIC_COOKIE.len();

    while at < bytes.len() {
        let code = OptionCode::from(bytes[at]);
        if code == OptionCode::End {
            return Ok(list);
        }
        if code == OptionCode::Pad {
            at += 1;
            continue;
        }
        if at + 2 > bytes.len() {
            return Err(WireError::Truncated);
        }
        let len = bytes[at + 1] as usize;
        if at + 2 + len > bytes.len() {
            return Err(WireError::Truncated);
        }
        list.entries.push(DhcpOption {
            code,
            data: bytes[at + 2..at + 2 + len].to_vec(),
        });
        at += 2 + len;
    }

    Err(WireError::MissingEnd)
}

/// Serialize a list of options into the options area of a DHCP message:
/// the magic cookie, each option as `code | len | data`, then a single END
/// byte.
///
/// Returns the number of bytes written. If the total would exceed the buffer,
/// returns [`WireError::BufferFull`] and emits nothing.
pub fn serialize(list: &OptionList, buf: &mut [u8]) -> Result<usize, WireError> {
    let total = MAGIC_COOKIE.len()
        + list.iter().map(|opt| 2 + opt.data.len()).sum::<usize>()
        + 1;
    if total > buf.len() {
        return Err(WireError::BufferFull);
    }

    buf[..MAGIC_COOKIE.len()].copy_from_slice(&MAGIC_COOKIE);
    let mut at = MAGIC_COOKIE.len();
    for opt in list.iter() {
        buf[at] = u8::from(opt.code);
        buf[at + 1] = opt.len();
        buf[at + 2..at + 2 + opt.data.len()].copy_from_slice(&opt.data);
        at += 2 + opt.data.len();
    }
    buf[at] = u8::from(OptionCode::End);

    Ok(at + 1)
}

/// Given the name of an option and its value as text, produce a fully-formed
/// option by applying the parser for the option's declared kind.
pub fn parse_named_option(name: &str, value: &str) -> Result<DhcpOption, OptionParseError> {
    let info = OPTION_TABLE
        .iter()
        .find(|entry| entry.name == name)
        .ok_or_else(|| OptionParseError::UnknownOption(name.to_string()))?;
    let kind = info
        .kind
        .ok_or_else(|| OptionParseError::UnknownOption(name.to_string()))?;

    Ok(DhcpOption::new(info.code, parse_value(kind, value)?))
}

/// Produce the wire-payload bytes for a textual value of the given kind.
///
/// Lists accept comma- or space-separated tokens. Numeric kinds accept
/// decimal, `0x`-prefixed hex, and `0`-prefixed octal.
pub fn parse_value(kind: OptionKind, text: &str) -> Result<Vec<u8>, OptionParseError> {
    let bytes = match kind {
        OptionKind::Byte => {
            let n = number(text, u8::MAX as u64).ok_or_else(|| invalid(kind, text))?;
            vec![n as u8]
        }
        OptionKind::ByteList => {
            let mut out = Vec::new();
            for token in tokens(text) {
                let n = number(token, u8::MAX as u64).ok_or_else(|| invalid(kind, text))?;
                out.push(n as u8);
            }
            out
        }
        OptionKind::Short => {
            let n = number(text, u16::MAX as u64).ok_or_else(|| invalid(kind, text))?;
            (n as u16).to_be_bytes().to_vec()
        }
        OptionKind::ShortList => {
            let mut out = Vec::new();
            for token in tokens(text) {
                let n = number(token, u16::MAX as u64).ok_or_else(|| invalid(kind, text))?;
                out.extend_from_slice(&(n as u16).to_be_bytes());
            }
            out
        }
        OptionKind::Long => {
            let n = number(text, u32::MAX as u64).ok_or_else(|| invalid(kind, text))?;
            (n as u32).to_be_bytes().to_vec()
        }
        OptionKind::Str => text.as_bytes().to_vec(),
        OptionKind::Ip => {
            let octets = dotted_quad(text).ok_or_else(|| invalid(kind, text))?;
            octets.to_vec()
        }
        OptionKind::IpList => {
            let mut out = Vec::new();
            for token in tokens(text) {
                let octets = dotted_quad(token).ok_or_else(|| invalid(kind, text))?;
                out.extend_from_slice(&octets);
            }
            out
        }
        OptionKind::Mac => {
            let octets = colon_hex(text).ok_or_else(|| invalid(kind, text))?;
            octets.to_vec()
        }
    };

    if bytes.is_empty() || bytes.len() > u8::MAX as usize {
        return Err(invalid(kind, text));
    }
    Ok(bytes)
}

fn invalid(kind: OptionKind, text: &str) -> OptionParseError {
    OptionParseError::InvalidValue {
        kind,
        value: text.to_string(),
    }
}

fn tokens(text: &str) -> impl Iterator<Item = &str> + '_ {
    text.split(|c| c == ',' || c == ' ').filter(|t| !t.is_empty())
}

// strtol-style base detection: 0x.. hex, 0.. octal, decimal otherwise
fn number(token: &str, max: u64) -> Option<u64> {
    let t = token.trim();
    let n = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()?
    } else if t.len() > 1 && t.starts_with('0') {
        u64::from_str_radix(&t[1..], 8).ok()?
    } else {
        t.parse().ok()?
    };
    (n <= max).then_some(n)
}

fn dotted_quad(text: &str) -> Option<[u8; 4]> {
    let mut out = [0_u8; 4];
    let mut parts = text.split('.');
    for slot in out.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|c| c.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

// Exactly 17 characters: six hex octets with colons between them
fn colon_hex(text: &str) -> Option<[u8; 6]> {
    let raw = text.as_bytes();
    if raw.len() != 17 {
        return None;
    }
    let mut out = [0_u8; 6];
    for (i, slot) in out.iter_mut().enumerate() {
        let at = 3 * i;
        if i < 5 && raw[at + 2] != b':' {
            return None;
        }
        if !raw[at].is_ascii_hexdigit() || !raw[at + 1].is_ascii_hexdigit() {
            return None;
        }
        *slot = u8::from_str_radix(&text[at..at + 2], 16).ok()?;
    }
    Some(out)
}
