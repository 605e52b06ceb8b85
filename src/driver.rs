//! The USB device driver
//!
//! [`Driver`] is shared between the interrupt handler, the application,
//! and the [`Worker`]. All endpoint state and the hardware live behind a
//! single critical section.

use alloc::collections::VecDeque;
use core::cell::{Cell, RefCell};

use critical_section::Mutex;
use usb_device::endpoint::{EndpointAddress, EndpointType};

use crate::{
    buffer::TransferBuffer,
    config::{Config, Speed},
    endpoint::{ctrl_ep0_in, ctrl_ep0_out, is_control, EndpointConfig},
    error::{Error, HwError, Result},
    event::{Event, EventChannel, HardwareEvent, DEFAULT_QUEUE_DEPTH},
    state::EndpointTable,
    worker::Worker,
    HardwareOps, Upstream,
};

/// State guarded by the driver's critical section
pub(crate) struct Inner<H> {
    pub hw: H,
    pub endpoints: EndpointTable,
}

/// A buffer that [`Driver::enqueue`] didn't accept
///
/// The buffer goes back to the caller, along with the reason.
#[derive(Debug)]
pub struct Rejected {
    pub error: Error,
    pub buffer: TransferBuffer,
}

impl core::fmt::Display for Rejected {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "buffer rejected: {}", self.error)
    }
}

/// A USB device driver
///
/// `H` is the controller, and `U` is the device stack that receives
/// completions. `N` is the depth of the event channel between the
/// interrupt handler and the worker.
///
/// After you create a `Driver` with [`new()`](Driver::new), you must
///
/// - call [`init()`](Driver::init) once
/// - take the [`Worker`] with [`worker()`](Driver::worker), and run it
/// - forward controller interrupts to [`on_hardware_event()`](Driver::on_hardware_event)
pub struct Driver<H, U, const N: usize = DEFAULT_QUEUE_DEPTH> {
    inner: Mutex<RefCell<Inner<H>>>,
    events: EventChannel<N>,
    upstream: U,
    config: Config,
    worker_taken: Mutex<Cell<bool>>,
}

/// Control endpoint descriptor, derived from the driver configuration
fn control_config(address: EndpointAddress, config: &Config) -> EndpointConfig {
    EndpointConfig::new(
        address,
        EndpointType::Control,
        config.control_max_packet_size,
        0,
    )
}

impl<H: HardwareOps, U: Upstream, const N: usize> Driver<H, U, N> {
    /// Create a driver for the controller `hw`
    pub fn new(hw: H, upstream: U, config: Config) -> Self {
        Driver {
            inner: Mutex::new(RefCell::new(Inner {
                hw,
                endpoints: EndpointTable::new(&config),
            })),
            events: EventChannel::new(),
            upstream,
            config,
            worker_taken: Mutex::new(Cell::new(false)),
        }
    }

    /// Take the driver's one worker
    ///
    /// Returns `None` if the worker was already taken.
    pub fn worker(&self) -> Option<Worker<'_, H, U, N>> {
        let taken = critical_section::with(|cs| self.worker_taken.borrow(cs).replace(true));
        if taken {
            None
        } else {
            Some(Worker::new(self))
        }
    }

    /// Interrupt-safe, mutable access to the driver state
    pub(crate) fn with_inner<R>(&self, func: impl FnOnce(&mut Inner<H>) -> R) -> R {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            func(&mut inner)
        })
    }

    pub(crate) fn next_event(&self) -> Option<Event> {
        self.events.recv()
    }

    pub(crate) fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Remove every buffer queued on `ep`, and abort its hardware transfer
    ///
    /// The endpoint is idle once this returns. The caller decides what
    /// happens to the buffers.
    pub(crate) fn flush(
        &self,
        ep: EndpointAddress,
    ) -> Result<(VecDeque<TransferBuffer>, core::result::Result<(), HwError>)> {
        self.with_inner(|inner| {
            let endpoint = inner
                .endpoints
                .endpoint_mut(ep)
                .ok_or(Error::InvalidEndpoint)?;
            let buffers = endpoint.take_all();
            endpoint.set_busy(false);
            let aborted = inner.hw.abort_transfer(ep);
            Ok((buffers, aborted))
        })
    }

    /// Handle a notification from the controller's interrupt handler
    ///
    /// Bus events go to [`Upstream::bus_event`] before this returns.
    /// Everything else is queued for the worker; if the queue is full,
    /// the event is lost.
    pub fn on_hardware_event(&self, event: HardwareEvent) {
        match event {
            HardwareEvent::Bus(bus) => self.upstream.bus_event(bus),
            event => {
                self.events.post(Event::Hardware(event));
            }
        }
    }

    /// Queue `buffer` for transfer on `ep`
    ///
    /// The buffer comes back through [`Upstream`] once the transfer is
    /// over. On the control IN endpoint, a zero-length buffer performs
    /// the status stage of the active control transfer.
    ///
    /// Fails if `ep` isn't an endpoint of this controller, or if it's not
    /// enabled. The control OUT endpoint only receives driver buffers, so
    /// it's rejected too. The buffer is handed back in [`Rejected`].
    pub fn enqueue(
        &self,
        ep: EndpointAddress,
        buffer: TransferBuffer,
    ) -> core::result::Result<(), Rejected> {
        if ep == ctrl_ep0_out() {
            return Err(Rejected {
                error: Error::InvalidEndpoint,
                buffer,
            });
        }
        let status_stage = ep == ctrl_ep0_in() && buffer.is_empty();
        let halted = self.with_inner(|inner| match inner.endpoints.endpoint_mut(ep) {
            None => Err(Rejected {
                error: Error::InvalidEndpoint,
                buffer,
            }),
            Some(endpoint) if !endpoint.is_enabled() => Err(Rejected {
                error: Error::Disabled,
                buffer,
            }),
            Some(endpoint) => {
                endpoint.push(buffer);
                Ok(endpoint.is_halted())
            }
        })?;

        if halted {
            debug!("ENQUEUE EP{}, endpoint halted", ep.index());
        }

        let event = if status_stage {
            Event::Status
        } else {
            Event::Transfer(ep)
        };
        self.events.post(event);
        Ok(())
    }

    /// Cancel every buffer queued on `ep`, including the one in flight
    ///
    /// Each buffer is reported as [`Error::Cancelled`] exactly once. If
    /// the controller fails to abort the transfer, the buffers are still
    /// cancelled, and this returns [`Error::Io`].
    pub fn dequeue_all(&self, ep: EndpointAddress) -> Result<()> {
        let (cancelled, aborted) = self.flush(ep)?;
        debug!("DEQUEUE EP{} cancelled {}", ep.index(), cancelled.len());
        for buffer in cancelled {
            self.upstream
                .transfer_complete(ep, buffer, Err(Error::Cancelled));
        }
        aborted.map_err(|err| {
            error!("DEQUEUE EP{} abort failed {}", ep.index(), err.0);
            Error::from(err)
        })
    }

    /// Enable the endpoint described by `config`
    ///
    /// The control endpoints are always enabled by [`init()`](Driver::init),
    /// so this does nothing for them.
    pub fn enable(&self, config: &EndpointConfig) -> Result<()> {
        let ep = config.address;
        if is_control(ep) {
            return Ok(());
        }
        self.with_inner(|inner| -> Result<()> {
            let endpoint = inner
                .endpoints
                .endpoint_mut(ep)
                .ok_or(Error::InvalidEndpoint)?;
            if !endpoint.capabilities().supports(config) {
                return Err(Error::InvalidEndpoint);
            }
            inner.hw.open_endpoint(config)?;
            endpoint.set_enabled(Some(*config));
            Ok(())
        })
        .map_err(|err| {
            warn!("ENABLE EP{} failed", ep.index());
            err
        })?;
        debug!("ENABLED EP{} MPS {}", ep.index(), config.max_packet_size);
        Ok(())
    }

    /// Disable `ep`
    ///
    /// Does nothing for the control endpoints. Queued buffers stay queued;
    /// use [`dequeue_all()`](Driver::dequeue_all) to cancel them.
    pub fn disable(&self, ep: EndpointAddress) -> Result<()> {
        if is_control(ep) {
            return Ok(());
        }
        self.with_inner(|inner| -> Result<()> {
            let endpoint = inner
                .endpoints
                .endpoint_mut(ep)
                .ok_or(Error::InvalidEndpoint)?;
            inner.hw.close_endpoint(ep)?;
            endpoint.set_enabled(None);
            Ok(())
        })?;
        debug!("DISABLED EP{}", ep.index());
        Ok(())
    }

    /// Stall `ep`
    pub fn set_halt(&self, ep: EndpointAddress) -> Result<()> {
        self.with_inner(|inner| -> Result<()> {
            let endpoint = inner
                .endpoints
                .endpoint_mut(ep)
                .ok_or(Error::InvalidEndpoint)?;
            inner.hw.stall(ep)?;
            endpoint.set_halted(true);
            Ok(())
        })?;
        debug!("STALL EP{}", ep.index());
        Ok(())
    }

    /// Clear the stall on `ep`
    pub fn clear_halt(&self, ep: EndpointAddress) -> Result<()> {
        self.with_inner(|inner| -> Result<()> {
            let endpoint = inner
                .endpoints
                .endpoint_mut(ep)
                .ok_or(Error::InvalidEndpoint)?;
            inner.hw.clear_stall(ep)?;
            endpoint.set_halted(false);
            Ok(())
        })?;
        debug!("UNSTALL EP{}", ep.index());
        Ok(())
    }

    /// Open the controller, and enable the control endpoints
    pub fn init(&self) -> Result<()> {
        let config = self.config;
        self.with_inner(|inner| {
            inner.hw.open()?;
            for ep in [ctrl_ep0_out(), ctrl_ep0_in()] {
                if let Some(endpoint) = inner.endpoints.endpoint_mut(ep) {
                    endpoint.set_enabled(Some(control_config(ep, &config)));
                }
            }
            Ok::<_, HwError>(())
        })
        .map_err(|err| {
            error!("INIT failed {}", err.0);
            Error::from(err)
        })?;
        info!("INIT {} endpoints", self.config.pairs() * 2);
        Ok(())
    }

    /// Disable the control endpoints, and close the controller
    pub fn shutdown(&self) -> Result<()> {
        self.with_inner(|inner| {
            for ep in [ctrl_ep0_out(), ctrl_ep0_in()] {
                if let Some(endpoint) = inner.endpoints.endpoint_mut(ep) {
                    endpoint.set_enabled(None);
                }
            }
            inner.hw.close()
        })?;
        info!("SHUTDOWN");
        Ok(())
    }

    /// Attach to the bus
    pub fn connect(&self) -> Result<()> {
        self.with_inner(|inner| inner.hw.connect())?;
        debug!("CONNECT");
        Ok(())
    }

    /// Detach from the bus
    pub fn disconnect(&self) -> Result<()> {
        self.with_inner(|inner| inner.hw.disconnect())?;
        debug!("DISCONNECT");
        Ok(())
    }

    /// Signal remote wakeup to the host
    pub fn host_wakeup(&self) -> Result<()> {
        self.with_inner(|inner| inner.hw.remote_wakeup())?;
        debug!("WAKEUP");
        Ok(())
    }

    /// Note the device address assigned by the host
    ///
    /// The controller answers SET_ADDRESS on its own; there's nothing to
    /// program.
    pub fn set_address(&self, address: u8) {
        debug!("ADDRESS = {}", address);
    }

    /// The configured bus speed
    pub fn speed(&self) -> Speed {
        self.config.speed
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Observe every endpoint at once
    ///
    /// `func` runs within the driver's critical section, so keep it short.
    pub fn lock<R>(&self, func: impl FnOnce(&EndpointTable) -> R) -> R {
        self.with_inner(|inner| func(&inner.endpoints))
    }

    /// Number of hardware events lost to a full event channel
    pub fn dropped_events(&self) -> u32 {
        self.events.dropped()
    }

    /// Interrupt-safe, mutable access to the controller
    pub fn hardware<R>(&self, func: impl FnOnce(&mut H) -> R) -> R {
        self.with_inner(|inner| func(&mut inner.hw))
    }
}
