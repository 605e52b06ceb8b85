//! Driver configuration

/// USB full / high speed setting.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Speed {
    /// Full speed.
    ///
    /// Non-control endpoints support max packet sizes up to 1023 bytes.
    #[default]
    Full,
    /// High speed.
    ///
    /// Non-control endpoints support max packet sizes up to 1024 bytes.
    High,
}

impl Speed {
    /// The largest max packet size a non-control endpoint may use
    pub const fn max_packet_size(self) -> u16 {
        match self {
            Speed::Full => 1023,
            Speed::High => 1024,
        }
    }
}

/// The largest number of bidirectional endpoints the driver tracks.
pub const MAX_ENDPOINT_PAIRS: u8 = 16;

/// Static driver configuration
///
/// ```
/// use usbd_dispatch::{Config, Speed};
///
/// let config = Config::new()
///     .with_speed(Speed::High)
///     .with_endpoint_pairs(6);
/// assert_eq!(config.endpoint_pairs, 6);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Config {
    /// The bus speed the controller runs at.
    pub speed: Speed,
    /// Number of bidirectional endpoints, including endpoint 0.
    ///
    /// Clamped to `1..=MAX_ENDPOINT_PAIRS`.
    pub endpoint_pairs: u8,
    /// Max packet size of the two control endpoints.
    pub control_max_packet_size: u16,
    /// The largest control OUT data stage the driver allocates a buffer for.
    ///
    /// A setup packet requesting more data is answered with a
    /// [`NoMemory`](crate::Error::NoMemory) error on the setup buffer.
    pub max_control_data: usize,
}

impl Config {
    /// The default configuration: full speed, eight endpoint pairs, 64 byte
    /// control packets.
    pub const fn new() -> Self {
        Config {
            speed: Speed::Full,
            endpoint_pairs: 8,
            control_max_packet_size: 64,
            max_control_data: 1024,
        }
    }

    pub const fn with_speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }

    pub const fn with_endpoint_pairs(mut self, pairs: u8) -> Self {
        self.endpoint_pairs = pairs;
        self
    }

    pub const fn with_control_max_packet_size(mut self, max_packet_size: u16) -> Self {
        self.control_max_packet_size = max_packet_size;
        self
    }

    pub const fn with_max_control_data(mut self, max_control_data: usize) -> Self {
        self.max_control_data = max_control_data;
        self
    }

    /// Number of endpoint pairs, after clamping.
    pub(crate) fn pairs(&self) -> usize {
        self.endpoint_pairs.clamp(1, MAX_ENDPOINT_PAIRS) as usize
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
