//! Transfer scheduling and control-pipe core for USB device controllers
//!
//! `usbd-dispatch` sits between a USB device controller's interrupt
//! handler and a USB device stack. It turns the controller's asynchronous
//! notifications into ordered, per-endpoint buffer completions, and it
//! drives the setup / data / status stages of control transfers.
//!
//! The controller itself is abstracted by [`HardwareOps`]. The device
//! stack that consumes completions implements [`Upstream`].
//!
//! # Design
//!
//! There are two execution contexts.
//!
//! - The interrupt handler calls [`Driver::on_hardware_event`]. Bus events
//!   go straight to [`Upstream::bus_event`]. Everything else is posted to a
//!   bounded event channel. Posting never blocks; if the channel is full,
//!   the event is dropped and counted (see [`Driver::dropped_events`]).
//! - A single [`Worker`] drains the channel in order. It's the only
//!   context that starts transfers and the only owner of the control
//!   transfer state.
//!
//! Application calls like [`Driver::enqueue`] and [`Driver::dequeue_all`]
//! may come from any context. They share one critical section with the
//! worker's completion handling, so a buffer is either cancelled or
//! completed, never both. Upstream callbacks always run outside of that
//! critical section, so they may call back into the driver.
//!
//! Each endpoint has at most one transfer in flight. The worker starts the
//! next queued buffer once the previous one completes.
//!
//! # Example
//!
//! ```no_run
//! use usbd_dispatch::{
//!     BusEvent, Config, Driver, EndpointConfig, Error, HardwareOps, HwError, TransferBuffer,
//!     Upstream,
//! };
//! use usb_device::endpoint::{EndpointAddress, EndpointType};
//!
//! struct Controller;
//!
//! unsafe impl HardwareOps for Controller {
//!     fn start_transfer(&mut self, _: EndpointAddress, _: *mut u8, _: usize) -> Result<(), HwError> { Ok(()) }
//!     fn abort_transfer(&mut self, _: EndpointAddress) -> Result<(), HwError> { Ok(()) }
//!     fn open_endpoint(&mut self, _: &EndpointConfig) -> Result<(), HwError> { Ok(()) }
//!     fn close_endpoint(&mut self, _: EndpointAddress) -> Result<(), HwError> { Ok(()) }
//!     fn stall(&mut self, _: EndpointAddress) -> Result<(), HwError> { Ok(()) }
//!     fn clear_stall(&mut self, _: EndpointAddress) -> Result<(), HwError> { Ok(()) }
//!     fn connect(&mut self) -> Result<(), HwError> { Ok(()) }
//!     fn disconnect(&mut self) -> Result<(), HwError> { Ok(()) }
//!     fn remote_wakeup(&mut self) -> Result<(), HwError> { Ok(()) }
//! }
//!
//! struct Stack;
//!
//! impl Upstream for Stack {
//!     fn bus_event(&self, _: BusEvent) {}
//!     fn control_request(&self, _: TransferBuffer, _: Option<TransferBuffer>) {}
//!     fn transfer_complete(&self, _: EndpointAddress, _: TransferBuffer, _: Result<(), Error>) {}
//!     fn control_status(&self, _: TransferBuffer) {}
//! }
//!
//! let driver: Driver<_, _> = Driver::new(Controller, Stack, Config::new());
//! driver.init().unwrap();
//!
//! let bulk_in = EndpointAddress::from(0x81);
//! driver
//!     .enable(&EndpointConfig::new(bulk_in, EndpointType::Bulk, 64, 0))
//!     .unwrap();
//! driver.connect().unwrap();
//!
//! // Call driver.on_hardware_event() from the USB interrupt handler,
//! // and run the worker in its own thread of execution:
//! let worker = driver.worker().unwrap();
//! worker.run(|| { /* wait for an interrupt */ });
//! ```

#![no_std]

extern crate alloc;

// Links the single-core critical section implementation.
#[cfg(feature = "single-core")]
use cortex_m as _;

#[macro_use]
mod log;

mod buffer;
mod config;
mod control;
mod driver;
mod endpoint;
mod error;
mod event;
mod setup;
mod state;
mod worker;

#[cfg(test)]
mod mock;

pub use buffer::{zlp_required, BufferFlags, TransferBuffer};
pub use config::{Config, Speed, MAX_ENDPOINT_PAIRS};
pub use control::ControlStage;
pub use driver::{Driver, Rejected};
pub use endpoint::{Capabilities, EndpointConfig, EndpointStatus};
pub use error::{Error, HwError, Result};
pub use event::{BusEvent, HardwareEvent, XferResult, DEFAULT_QUEUE_DEPTH};
pub use setup::{SetupPacket, SETUP_PACKET_SIZE};
pub use state::EndpointTable;
pub use worker::Worker;

use usb_device::endpoint::EndpointAddress;

/// Transfer and endpoint primitives of a USB device controller
///
/// The driver calls these from the worker, and from application calls,
/// always within a critical section. Implementations should program the
/// controller and return; they must not call back into the driver.
/// Transfer outcomes are reported later, from the interrupt handler,
/// through [`Driver::on_hardware_event`].
///
/// # Safety
///
/// [`start_transfer`](HardwareOps::start_transfer) hands the controller a
/// raw pointer into a driver-owned buffer. The driver keeps that buffer
/// alive until the controller reports the transfer complete, or until
/// [`abort_transfer`](HardwareOps::abort_transfer) returns for that
/// endpoint. An implementation must not access the memory outside of that
/// window, and must never access more than `len` bytes.
pub unsafe trait HardwareOps {
    /// Open the controller. Called by [`Driver::init`].
    fn open(&mut self) -> core::result::Result<(), HwError> {
        Ok(())
    }
    /// Close the controller. Called by [`Driver::shutdown`].
    fn close(&mut self) -> core::result::Result<(), HwError> {
        Ok(())
    }
    /// Start a transfer of `len` bytes at `data`
    ///
    /// For IN endpoints, `len` is the number of bytes to send. For OUT
    /// endpoints, it's the buffer capacity; the controller reports the
    /// received length on completion. A zero-length packet has a `len` of
    /// zero, and `data` may be null.
    fn start_transfer(
        &mut self,
        ep: EndpointAddress,
        data: *mut u8,
        len: usize,
    ) -> core::result::Result<(), HwError>;
    /// Abort the transfer outstanding on `ep`, if any
    ///
    /// Once this returns, the controller must not report a completion for
    /// the aborted transfer. The driver can only tell a late completion
    /// apart while the endpoint is idle; after the next transfer starts, a
    /// late completion would finish the wrong buffer.
    fn abort_transfer(&mut self, ep: EndpointAddress) -> core::result::Result<(), HwError>;
    fn open_endpoint(&mut self, config: &EndpointConfig) -> core::result::Result<(), HwError>;
    fn close_endpoint(&mut self, ep: EndpointAddress) -> core::result::Result<(), HwError>;
    fn stall(&mut self, ep: EndpointAddress) -> core::result::Result<(), HwError>;
    fn clear_stall(&mut self, ep: EndpointAddress) -> core::result::Result<(), HwError>;
    /// Attach to the bus
    fn connect(&mut self) -> core::result::Result<(), HwError>;
    /// Detach from the bus
    fn disconnect(&mut self) -> core::result::Result<(), HwError>;
    /// Signal remote wakeup to the host
    fn remote_wakeup(&mut self) -> core::result::Result<(), HwError>;
}

/// The USB device stack above the driver
///
/// Every buffer handed to the driver comes back through exactly one of
/// these callbacks. Callbacks run outside of the driver's critical
/// section, and may call back into the [`Driver`].
pub trait Upstream {
    /// A bus-level notification
    ///
    /// Called from the interrupt handler's context.
    fn bus_event(&self, event: BusEvent);
    /// A control transfer's setup packet, and for host-to-device
    /// transfers, its data stage
    ///
    /// `setup` is flagged as a setup buffer, and holds the
    /// [`SETUP_PACKET_SIZE`] bytes of the packet.
    ///
    /// - For a device-to-host transfer, the driver expects a data buffer
    ///   enqueued on the control IN endpoint.
    /// - For a transfer without data, the driver expects a zero-length
    ///   buffer enqueued on the control IN endpoint to perform the status
    ///   stage.
    /// - For a host-to-device transfer, `data` holds the received bytes,
    ///   and the driver performs the status stage itself.
    fn control_request(&self, setup: TransferBuffer, data: Option<TransferBuffer>);
    /// A buffer enqueued on `ep` is complete, or failed
    fn transfer_complete(
        &self,
        ep: EndpointAddress,
        buffer: TransferBuffer,
        result: core::result::Result<(), Error>,
    );
    /// The status stage of a control transfer is complete
    fn control_status(&self, buffer: TransferBuffer);
}
