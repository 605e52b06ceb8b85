//! Per-endpoint transfer state

use alloc::collections::VecDeque;
use usb_device::{
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection,
};

use crate::buffer::TransferBuffer;

/// Direct index to the OUT control endpoint
pub(crate) fn ctrl_ep0_out() -> EndpointAddress {
    // Constructor not currently const. Otherwise, this would
    // be a const.
    EndpointAddress::from_parts(0, UsbDirection::Out)
}

/// Direct index to the IN control endpoint
pub(crate) fn ctrl_ep0_in() -> EndpointAddress {
    EndpointAddress::from_parts(0, UsbDirection::In)
}

/// Indicates if `addr` is one of the two control endpoints
pub(crate) fn is_control(addr: EndpointAddress) -> bool {
    addr.index() == 0
}

/// A generic endpoint descriptor, as supplied to
/// [`Driver::enable`](crate::Driver::enable)
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EndpointConfig {
    pub address: EndpointAddress,
    pub ep_type: EndpointType,
    pub max_packet_size: u16,
    pub interval: u8,
}

impl EndpointConfig {
    pub const fn new(
        address: EndpointAddress,
        ep_type: EndpointType,
        max_packet_size: u16,
        interval: u8,
    ) -> Self {
        EndpointConfig {
            address,
            ep_type,
            max_packet_size,
            interval,
        }
    }
}

/// What an endpoint supports
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Capabilities {
    pub control: bool,
    pub bulk: bool,
    pub interrupt: bool,
    pub isochronous: bool,
    pub max_packet_size: u16,
}

impl Capabilities {
    pub(crate) const fn control(max_packet_size: u16) -> Self {
        Capabilities {
            control: true,
            bulk: false,
            interrupt: false,
            isochronous: false,
            max_packet_size,
        }
    }

    pub(crate) const fn data(max_packet_size: u16) -> Self {
        Capabilities {
            control: false,
            bulk: true,
            interrupt: true,
            isochronous: true,
            max_packet_size,
        }
    }

    /// Indicates if an endpoint with these capabilities can be configured as `config`
    pub fn supports(&self, config: &EndpointConfig) -> bool {
        let kind = match config.ep_type {
            EndpointType::Control => self.control,
            EndpointType::Bulk => self.bulk,
            EndpointType::Interrupt => self.interrupt,
            EndpointType::Isochronous { .. } => self.isochronous,
        };
        kind && config.max_packet_size <= self.max_packet_size
    }
}

/// A read-only view of an endpoint, observed under the device lock
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EndpointStatus {
    pub address: EndpointAddress,
    pub enabled: bool,
    pub halted: bool,
    pub busy: bool,
    pub queued: usize,
}

/// A USB endpoint
///
/// `busy` is set if, and only if, the hardware has a transfer outstanding
/// for the buffer at the head of `fifo`.
pub(crate) struct Endpoint {
    address: EndpointAddress,
    caps: Capabilities,
    config: Option<EndpointConfig>,
    enabled: bool,
    halted: bool,
    busy: bool,
    fifo: VecDeque<TransferBuffer>,
}

impl Endpoint {
    pub fn new(address: EndpointAddress, caps: Capabilities) -> Self {
        Endpoint {
            address,
            caps,
            config: None,
            enabled: false,
            halted: false,
            busy: false,
            fifo: VecDeque::new(),
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Returns the maximum packet length of the enabled endpoint
    ///
    /// Before the endpoint is configured, this is the capability limit.
    pub fn max_packet_len(&self) -> u16 {
        self.config
            .map(|config| config.max_packet_size)
            .unwrap_or(self.caps.max_packet_size)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, config: Option<EndpointConfig>) {
        self.enabled = config.is_some();
        self.config = config;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub fn push(&mut self, buffer: TransferBuffer) {
        self.fifo.push_back(buffer);
    }

    pub fn peek_mut(&mut self) -> Option<&mut TransferBuffer> {
        self.fifo.front_mut()
    }

    pub fn pop(&mut self) -> Option<TransferBuffer> {
        self.fifo.pop_front()
    }

    /// Remove every queued buffer, in queue order
    pub fn take_all(&mut self) -> VecDeque<TransferBuffer> {
        core::mem::take(&mut self.fifo)
    }

    pub fn status(&self) -> EndpointStatus {
        EndpointStatus {
            address: self.address,
            enabled: self.enabled,
            halted: self.halted,
            busy: self.busy,
            queued: self.fifo.len(),
        }
    }
}
