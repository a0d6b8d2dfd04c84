pub const DEFAULT_HOST: &str = "192.168.1.8";
pub const DEFAULT_PORT: u16 = 7;
/// Serial number 0 addresses every unit on the link.
pub const BROADCAST_SERIAL_NUMBER: u8 = 0;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("port must be between 1 and 65535")]
    InvalidPort,
}

/// Where a device lives and which unit on its link is addressed.
///
/// Two addresses are equal when host, port and serial number all match;
/// any difference means the connection has to be re-established.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "UncheckedAddress")]
pub struct DeviceAddress {
    host: String,
    port: u16,
    serial_number: u8,
}

impl DeviceAddress {
    pub fn new(host: impl Into<String>, port: u16, serial_number: u8) -> Result<Self, AddressError> {
        if port == 0 {
            return Err(AddressError::InvalidPort);
        }

        Ok(Self {
            host: host.into(),
            port,
            serial_number,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn serial_number(&self) -> u8 {
        self.serial_number
    }

    /// An empty host means the device has not been configured yet.
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty()
    }
}

/// Wire shape of [`DeviceAddress`]; goes through [`DeviceAddress::new`]
/// when deserialized.
#[derive(serde::Deserialize)]
struct UncheckedAddress {
    host: String,
    port: u16,
    serial_number: u8,
}

impl std::convert::TryFrom<UncheckedAddress> for DeviceAddress {
    type Error = AddressError;

    fn try_from(raw: UncheckedAddress) -> Result<Self, Self::Error> {
        Self::new(raw.host, raw.port, raw.serial_number)
    }
}

impl Default for DeviceAddress {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            serial_number: BROADCAST_SERIAL_NUMBER,
        }
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} (sn {})", self.host, self.port, self.serial_number)
    }
}
