//! The address pool: process-wide configuration plus the mutable lease state.
//!
//! A pool is created empty, populated through the configuration surface
//! consumed by the front-end, then handed to the worker; once the worker is
//! running nothing else touches it. Configuration errors are reported
//! synchronously to the caller and the worker does not start.

use crate::binding::{AddressRange, BindingList};
use crate::options::{self, OptionCode, OptionKind, OptionList, OptionParseError};
use crate::{HwAddr, IpV4Addr};

use thiserror::Error;

/// Default lease duration for fresh associations, seconds
pub const DEFAULT_LEASE_TIME: u64 = 3600;
/// Default duration of a binding in the pending state, seconds
pub const DEFAULT_PENDING_TIME: u64 = 30;

/// Errors reported synchronously by the configuration surface.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No server identifier was configured
    #[error("server identifier not configured")]
    MissingServerId,
    /// Malformed IPv4 address
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    /// Malformed hardware address in a static binding
    #[error("invalid hardware address '{0}'")]
    InvalidHwAddr(String),
    /// Range bounds out of order
    #[error("invalid address range: {0} is above {1}")]
    InvalidRange(IpV4Addr, IpV4Addr),
    /// Unknown option name or malformed option value
    #[error(transparent)]
    Option(#[from] OptionParseError),
}

/// Process-wide configuration and mutable state of the server.
#[derive(Debug)]
pub struct Pool {
    /// This server's identity; required before the worker starts
    pub server_id: IpV4Addr,
    /// Dynamic allocation range
    pub range: AddressRange,
    /// Default lease duration for fresh associations, seconds
    pub lease_time: u64,
    /// Duration a binding stays pending after an offer, seconds
    pub pending_time: u64,
    /// Outbound interface identifier, when pinned
    pub device_index: Option<u32>,
    /// Options offered to clients, in configuration order
    pub options: OptionList,
    /// The lease table
    pub bindings: BindingList,
}

impl Pool {
    /// New empty pool with default timers
    pub fn new() -> Self {
        Pool {
            server_id: IpV4Addr::ANY,
            range: AddressRange::default(),
            lease_time: DEFAULT_LEASE_TIME,
            pending_time: DEFAULT_PENDING_TIME,
            device_index: None,
            options: OptionList::new(),
            bindings: BindingList::new(),
        }
    }

    /// Set this server's identity from dotted-decimal text
    pub fn set_server_id(&mut self, address: &str) -> Result<(), ConfigError> {
        self.server_id = parse_addr(address)?;
        Ok(())
    }

    /// Set the dynamic allocation range; the cursor resets to `first`
    pub fn set_range(&mut self, first: &str, last: &str) -> Result<(), ConfigError> {
        let first = parse_addr(first)?;
        let last = parse_addr(last)?;
        if first.to_u32() > last.to_u32() {
            return Err(ConfigError::InvalidRange(first, last));
        }
        self.range = AddressRange::new(first, last);
        Ok(())
    }

    /// Pin the outbound interface
    pub fn set_device_index(&mut self, index: u32) {
        self.device_index = Some(index);
    }

    /// Set the duration of the pending state between OFFER and REQUEST
    pub fn set_pending_time(&mut self, seconds: u64) {
        self.pending_time = seconds;
    }

    /// Append a named option with a textual value to the configured set.
    ///
    /// Configuring IP_ADDRESS_LEASE_TIME also adopts the option's numeric
    /// value as the pool's default lease duration.
    pub fn add_option(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        let option = options::parse_named_option(name, value)?;
        if option.code() == OptionCode::IpAddressLeaseTime {
            if let Ok(seconds) = <[u8; 4]>::try_from(option.data()) {
                self.lease_time = u32::from_be_bytes(seconds) as u64;
            }
        }
        self.options.append(&option);
        Ok(())
    }

    /// Add a static `(mac, ip)` reservation
    pub fn add_static_binding(&mut self, mac: &str, address: &str) -> Result<(), ConfigError> {
        let hw = options::parse_value(OptionKind::Mac, mac)
            .map_err(|_| ConfigError::InvalidHwAddr(mac.to_string()))?;
        let address = parse_addr(address)?;
        self.bindings.add_static(address, HwAddr::new(&hw));
        Ok(())
    }

    /// Fill in whatever configuration was left out: a /24 subnet mask and
    /// broadcast address when no options were supplied, and the `.2`-`.254`
    /// slice of the server's /24 when no range was supplied.
    pub fn apply_defaults(&mut self) -> Result<(), ConfigError> {
        if self.server_id == IpV4Addr::ANY {
            return Err(ConfigError::MissingServerId);
        }
        let subnet = self.server_id.to_u32() & 0xFFFF_FF00;

        if self.options.is_empty() {
            self.add_option("SUBNET_MASK", "255.255.255.0")?;
            self.add_option(
                "BROADCAST_ADDRESS",
                &IpV4Addr::from_u32(subnet | 255).to_string(),
            )?;
        }

        if self.range.first == 0 && self.range.last == 0 {
            self.range = AddressRange::new(
                IpV4Addr::from_u32(subnet | 2),
                IpV4Addr::from_u32(subnet | 254),
            );
        }
        Ok(())
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_addr(text: &str) -> Result<IpV4Addr, ConfigError> {
    let bytes = options::parse_value(OptionKind::Ip, text)
        .map_err(|_| ConfigError::InvalidAddress(text.to_string()))?;
    let octets: [u8; 4] = bytes
        .try_into()
        .map_err(|_| ConfigError::InvalidAddress(text.to_string()))?;
    Ok(IpV4Addr::new(octets))
}
