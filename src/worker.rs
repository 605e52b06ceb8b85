//! The event-processing worker
//!
//! The worker is the only context that starts hardware transfers, and the
//! only owner of the control transfer state. It handles one event at a
//! time, in the order the events were posted.

use core::ptr;

use usb_device::{endpoint::EndpointAddress, UsbDirection};

use crate::{
    buffer::{zlp_required, TransferBuffer},
    control::{ControlPipe, ControlStage, InComplete, OutComplete, SetupKind},
    driver::{Driver, Inner},
    endpoint::{ctrl_ep0_in, ctrl_ep0_out, is_control},
    error::{Error, Result},
    event::{Event, HardwareEvent, XferResult, DEFAULT_QUEUE_DEPTH},
    setup::SetupPacket,
    HardwareOps, Upstream,
};

/// Outcome of trying to start the head of an endpoint's queue
enum Start {
    /// The transfer is in flight
    Started,
    /// The endpoint is busy, or has nothing queued
    Idle,
    /// The hardware refused the transfer; the buffer left the queue
    Failed(TransferBuffer),
}

/// What a hardware completion did to the endpoint's queue
enum Completion {
    /// Nothing was in flight; the transfer was already cancelled
    Stale,
    /// A trailing zero-length packet is now in flight for the same buffer
    TrailingZlp,
    Done(TransferBuffer),
    Failed(TransferBuffer),
}

/// Processes the driver's events
///
/// Take the worker from [`Driver::worker`]. Either dedicate a thread of
/// execution to [`run()`](Worker::run), or call [`poll()`](Worker::poll)
/// from your own loop.
pub struct Worker<'d, H, U, const N: usize = DEFAULT_QUEUE_DEPTH> {
    driver: &'d Driver<H, U, N>,
    control: ControlPipe,
}

impl<'d, H: HardwareOps, U: Upstream, const N: usize> Worker<'d, H, U, N> {
    pub(crate) fn new(driver: &'d Driver<H, U, N>) -> Self {
        Worker {
            driver,
            control: ControlPipe::new(),
        }
    }

    /// The stage of the active control transfer
    pub fn stage(&self) -> ControlStage {
        self.control.stage()
    }

    /// Handle the next event, if any
    ///
    /// Returns `false` if there was nothing to do.
    pub fn step(&mut self) -> bool {
        match self.driver.next_event() {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    /// Handle the events queued at the time of the call
    ///
    /// Events posted while polling wait for the next call. Returns the
    /// number of events handled.
    pub fn poll(&mut self) -> usize {
        let pending = self.driver.pending_events();
        let mut handled = 0;
        while handled < pending && self.step() {
            handled += 1;
        }
        handled
    }

    /// Handle events forever
    ///
    /// Calls `idle` whenever there are no events. `idle` may wait for an
    /// interrupt, or yield to other work.
    pub fn run(mut self, mut idle: impl FnMut()) -> ! {
        loop {
            if !self.step() {
                idle();
            }
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Hardware(HardwareEvent::SetupReceived(setup)) => self.on_setup(&setup),
            Event::Hardware(HardwareEvent::TransferComplete { ep, result, len }) => {
                self.on_complete(ep, result, len)
            }
            Event::Hardware(HardwareEvent::Bus(bus)) => self.driver.upstream().bus_event(bus),
            Event::Transfer(ep) => self.run_next(ep),
            Event::Status => self.status_in(),
        }
    }

    /// Start the buffer at the head of the queue, unless a transfer is
    /// already in flight
    fn start_head(&mut self, ep: EndpointAddress) -> Start {
        let data_in_requested = if ep == ctrl_ep0_in() {
            self.control.data_in_requested()
        } else {
            None
        };

        self.driver.with_inner(|inner| {
            let Inner { hw, endpoints } = inner;
            let Some(endpoint) = endpoints.endpoint_mut(ep) else {
                return Start::Idle;
            };
            if endpoint.is_busy() {
                return Start::Idle;
            }
            let max_packet_len = endpoint.max_packet_len();
            let Some(buffer) = endpoint.peek_mut() else {
                return Start::Idle;
            };

            let len = match ep.direction() {
                UsbDirection::In => {
                    if let Some(requested) = data_in_requested {
                        if zlp_required(buffer.len(), max_packet_len, requested) {
                            buffer.set_zlp();
                        }
                    }
                    buffer.len()
                }
                UsbDirection::Out => buffer.capacity(),
            };

            match hw.start_transfer(ep, buffer.as_mut_ptr(), len) {
                Ok(()) => {
                    endpoint.set_busy(true);
                    Start::Started
                }
                Err(_) => endpoint.pop().map_or(Start::Idle, Start::Failed),
            }
        })
    }

    /// Start the next queued transfer for `ep`
    ///
    /// A refused buffer leaves the queue, and the next one is tried, until
    /// a transfer is in flight or the queue is empty.
    fn run_next(&mut self, ep: EndpointAddress) {
        loop {
            match self.start_head(ep) {
                Start::Started => {
                    trace!("START EP{}", ep.index());
                    return;
                }
                Start::Idle => return,
                Start::Failed(buffer) => {
                    warn!("START EP{} refused", ep.index());
                    self.driver
                        .upstream()
                        .transfer_complete(ep, buffer, Err(Error::Refused));
                    if is_control(ep) {
                        self.control.reset();
                        return;
                    }
                }
            }
        }
    }

    fn on_complete(&mut self, ep: EndpointAddress, result: XferResult, len: usize) {
        let completion = self.driver.with_inner(|inner| {
            let Inner { hw, endpoints } = inner;
            let Some(endpoint) = endpoints.endpoint_mut(ep) else {
                return Completion::Stale;
            };
            if !endpoint.is_busy() {
                return Completion::Stale;
            }
            endpoint.set_busy(false);

            if result != XferResult::Success {
                return endpoint.pop().map_or(Completion::Stale, Completion::Failed);
            }

            let is_in = ep.direction() == UsbDirection::In;
            if is_in {
                if let Some(buffer) = endpoint.peek_mut() {
                    if buffer.has_zlp() {
                        buffer.clear_zlp();
                        return match hw.start_transfer(ep, ptr::null_mut(), 0) {
                            Ok(()) => {
                                endpoint.set_busy(true);
                                Completion::TrailingZlp
                            }
                            Err(_) => endpoint.pop().map_or(Completion::Stale, Completion::Failed),
                        };
                    }
                }
            }

            match endpoint.pop() {
                Some(mut buffer) => {
                    if !is_in {
                        buffer.set_received(len);
                    }
                    Completion::Done(buffer)
                }
                None => Completion::Stale,
            }
        });

        match completion {
            Completion::Stale => {
                trace!("COMPLETE EP{} stale", ep.index());
            }
            Completion::TrailingZlp => {
                trace!("ZLP EP{}", ep.index());
            }
            Completion::Failed(buffer) => {
                warn!("COMPLETE EP{} failed", ep.index());
                self.driver
                    .upstream()
                    .transfer_complete(ep, buffer, Err(Error::Io));
                if is_control(ep) {
                    self.control.reset();
                } else {
                    self.run_next(ep);
                }
            }
            Completion::Done(buffer) => {
                trace!("COMPLETE EP{} LEN {}", ep.index(), buffer.len());
                if ep == ctrl_ep0_out() {
                    self.ctrl_out(buffer);
                } else if ep == ctrl_ep0_in() {
                    self.ctrl_in(buffer);
                } else {
                    self.driver.upstream().transfer_complete(ep, buffer, Ok(()));
                    self.run_next(ep);
                }
            }
        }
    }

    fn on_setup(&mut self, packet: &SetupPacket) {
        if let Some(previous) = self.control.begin() {
            warn!("SETUP interrupted a transfer in {}", previous.name());
            self.abort_control(previous);
        }

        let Some(mut setup) = TransferBuffer::try_from_slice(&packet.to_bytes()) else {
            error!("SETUP no memory");
            self.control.reset();
            return;
        };
        setup.set_setup();

        match self.control.classify(packet) {
            SetupKind::NoData => {
                debug!("SETUP no data");
                self.driver.upstream().control_request(setup, None);
            }
            SetupKind::DataIn => {
                debug!("SETUP IN {}", packet.data_length());
                self.driver.upstream().control_request(setup, None);
            }
            SetupKind::DataOut(len) => match self.feed_dout(len) {
                Ok(()) => {
                    debug!("SETUP OUT {}", len);
                    self.control.hold_setup(setup);
                }
                Err(err) => {
                    error!("SETUP OUT {} failed", len);
                    self.control.reset();
                    self.driver
                        .upstream()
                        .transfer_complete(ctrl_ep0_out(), setup, Err(err));
                }
            },
        }
    }

    /// Flush both control endpoints after a transfer was interrupted
    ///
    /// OUT buffers, and the IN status buffer, belong to the driver and are
    /// dropped. Callers can't queue on the control OUT endpoint, so only
    /// IN buffers are cancelled.
    fn abort_control(&mut self, previous: ControlStage) {
        for ep in [ctrl_ep0_out(), ctrl_ep0_in()] {
            let Ok((buffers, aborted)) = self.driver.flush(ep) else {
                continue;
            };
            if let Err(err) = aborted {
                error!("ABORT EP{} failed {}", ep.index(), err.0);
            }
            let owned_by_driver = ep == ctrl_ep0_out() || previous == ControlStage::StatusIn;
            if owned_by_driver {
                continue;
            }
            for buffer in buffers {
                self.driver
                    .upstream()
                    .transfer_complete(ep, buffer, Err(Error::Cancelled));
            }
        }
    }

    /// Queue a receive buffer on the control OUT endpoint, and start it
    fn feed_dout(&mut self, len: usize) -> Result<()> {
        if len > self.driver.config().max_control_data {
            return Err(Error::NoMemory);
        }
        let buffer = TransferBuffer::try_with_capacity(len).ok_or(Error::NoMemory)?;
        self.driver.with_inner(|inner| {
            if let Some(endpoint) = inner.endpoints.endpoint_mut(ctrl_ep0_out()) {
                endpoint.push(buffer);
            }
        });
        match self.start_head(ctrl_ep0_out()) {
            Start::Failed(_) => Err(Error::Io),
            Start::Started | Start::Idle => Ok(()),
        }
    }

    /// Start the status IN stage, already queued on the control IN endpoint
    fn status_in(&mut self) {
        debug!("STATUS IN in {}", self.control.stage().name());
        self.run_next(ctrl_ep0_in());
    }

    fn ctrl_out(&mut self, buffer: TransferBuffer) {
        match self.control.out_complete() {
            OutComplete::Data => {
                match self.control.take_setup() {
                    Some(setup) => self.driver.upstream().control_request(setup, Some(buffer)),
                    None => {
                        error!("DATA OUT without a setup packet");
                    }
                }
                self.driver.with_inner(|inner| {
                    if let Some(endpoint) = inner.endpoints.endpoint_mut(ctrl_ep0_in()) {
                        endpoint.push(TransferBuffer::empty());
                    }
                });
                self.status_in();
            }
            OutComplete::Status => {
                debug!("STATUS OUT complete");
                self.driver.upstream().control_status(buffer);
            }
            OutComplete::Unexpected(stage) => {
                warn!("CONTROL OUT complete in {}", stage.name());
                self.driver
                    .upstream()
                    .transfer_complete(ctrl_ep0_out(), buffer, Err(Error::Io));
            }
        }
    }

    fn ctrl_in(&mut self, buffer: TransferBuffer) {
        match self.control.in_complete() {
            InComplete::Status => {
                debug!("STATUS IN complete");
                self.driver.upstream().control_status(buffer);
            }
            InComplete::Data => {
                if self.feed_dout(0).is_err() {
                    error!("STATUS OUT failed");
                    self.control.reset();
                }
                self.driver
                    .upstream()
                    .transfer_complete(ctrl_ep0_in(), buffer, Ok(()));
            }
            InComplete::Unexpected(stage) => {
                warn!("CONTROL IN complete in {}", stage.name());
                self.driver
                    .upstream()
                    .transfer_complete(ctrl_ep0_in(), buffer, Err(Error::Io));
            }
        }
    }
}
