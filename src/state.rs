//! The endpoint table

use alloc::vec::Vec;
use usb_device::{endpoint::EndpointAddress, UsbDirection};

use crate::{
    config::Config,
    endpoint::{Capabilities, Endpoint, EndpointStatus},
};

/// Produces an index into the endpoint table
///
/// All even entries are OUT endpoints, and all odd entries are IN endpoints.
fn index(ep_addr: EndpointAddress) -> usize {
    (ep_addr.index() * 2) + (UsbDirection::In == ep_addr.direction()) as usize
}

/// Every endpoint the controller exposes, created once from the [`Config`]
///
/// Endpoint 0 holds the two control endpoints. All others are data
/// endpoints.
pub struct EndpointTable {
    endpoints: Vec<Endpoint>,
}

impl EndpointTable {
    pub(crate) fn new(config: &Config) -> Self {
        let pairs = config.pairs();
        let mut endpoints = Vec::with_capacity(pairs * 2);
        for number in 0..pairs {
            let caps = if number == 0 {
                Capabilities::control(config.control_max_packet_size)
            } else {
                Capabilities::data(config.speed.max_packet_size())
            };
            for dir in [UsbDirection::Out, UsbDirection::In] {
                let addr = EndpointAddress::from_parts(number, dir);
                debug_assert_eq!(index(addr), endpoints.len());
                endpoints.push(Endpoint::new(addr, caps));
            }
        }
        EndpointTable { endpoints }
    }

    pub(crate) fn endpoint(&self, addr: EndpointAddress) -> Option<&Endpoint> {
        self.endpoints.get(index(addr))
    }

    pub(crate) fn endpoint_mut(&mut self, addr: EndpointAddress) -> Option<&mut Endpoint> {
        self.endpoints.get_mut(index(addr))
    }

    /// Returns the status of the endpoint, or `None` if the address is out of range
    pub fn status(&self, addr: EndpointAddress) -> Option<EndpointStatus> {
        self.endpoint(addr).map(Endpoint::status)
    }

    /// Iterate over the status of every endpoint
    pub fn iter(&self) -> impl Iterator<Item = EndpointStatus> + '_ {
        self.endpoints.iter().map(Endpoint::status)
    }

    /// Returns the total number of endpoints
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
