//! Hardware notifications and the driver's event channel

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;
use usb_device::endpoint::EndpointAddress;

use crate::setup::SetupPacket;

/// Bus-level notifications
///
/// These never wait in the event channel. The driver forwards them to
/// [`Upstream::bus_event`](crate::Upstream::bus_event) as soon as the
/// hardware reports them.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BusEvent {
    Reset,
    VbusReady,
    VbusRemoved,
    Suspend,
    Resume,
    StartOfFrame,
}

/// Outcome of a hardware transfer
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum XferResult {
    Success,
    Failed,
    Stalled,
    Timeout,
}

/// A notification produced by the controller's interrupt handler
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HardwareEvent {
    Bus(BusEvent),
    /// A setup packet arrived on the control OUT endpoint
    SetupReceived(SetupPacket),
    /// A transfer started with [`HardwareOps::start_transfer`](crate::HardwareOps::start_transfer)
    /// is over
    ///
    /// `len` counts the bytes actually moved.
    TransferComplete {
        ep: EndpointAddress,
        result: XferResult,
        len: usize,
    },
}

/// A unit of work for the [`Worker`](crate::Worker)
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Event {
    Hardware(HardwareEvent),
    /// Start the next queued transfer for the endpoint
    Transfer(EndpointAddress),
    /// Perform the status IN stage of the active control transfer
    Status,
}

/// The default event channel depth
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

/// Bounded, interrupt-safe FIFO of events
///
/// Any context may post without blocking. If the channel is full, the
/// event is dropped and counted.
pub(crate) struct EventChannel<const N: usize> {
    events: Mutex<RefCell<Deque<Event, N>>>,
    dropped: Mutex<RefCell<u32>>,
}

impl<const N: usize> EventChannel<N> {
    pub const fn new() -> Self {
        EventChannel {
            events: Mutex::new(RefCell::new(Deque::new())),
            dropped: Mutex::new(RefCell::new(0)),
        }
    }

    /// Returns `false` if the channel was full, and the event was dropped.
    pub fn post(&self, event: Event) -> bool {
        let posted = critical_section::with(|cs| {
            let accepted = self.events.borrow_ref_mut(cs).push_back(event).is_ok();
            if !accepted {
                let mut dropped = self.dropped.borrow_ref_mut(cs);
                *dropped = dropped.saturating_add(1);
            }
            accepted
        });
        if !posted {
            warn!("event channel full, dropped an event");
        }
        posted
    }

    pub fn recv(&self) -> Option<Event> {
        critical_section::with(|cs| self.events.borrow_ref_mut(cs).pop_front())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.events.borrow_ref(cs).len())
    }

    pub fn dropped(&self) -> u32 {
        critical_section::with(|cs| *self.dropped.borrow_ref(cs))
    }
}

#[cfg(test)]
mod test {
    use super::{BusEvent, Event, EventChannel, HardwareEvent};
    use usb_device::{endpoint::EndpointAddress, UsbDirection};

    #[test]
    fn fifo_order() {
        let channel: EventChannel<4> = EventChannel::new();
        let ep = EndpointAddress::from_parts(1, UsbDirection::In);
        assert!(channel.post(Event::Transfer(ep)));
        assert!(channel.post(Event::Status));
        assert!(channel.post(Event::Hardware(HardwareEvent::Bus(BusEvent::Reset))));
        assert_eq!(channel.len(), 3);

        assert_eq!(channel.recv(), Some(Event::Transfer(ep)));
        assert_eq!(channel.recv(), Some(Event::Status));
        assert_eq!(
            channel.recv(),
            Some(Event::Hardware(HardwareEvent::Bus(BusEvent::Reset)))
        );
        assert_eq!(channel.recv(), None);
    }

    #[test]
    fn drop_when_full() {
        let channel: EventChannel<2> = EventChannel::new();
        assert!(channel.post(Event::Status));
        assert!(channel.post(Event::Status));
        assert!(!channel.post(Event::Status));
        assert!(!channel.post(Event::Status));
        assert_eq!(channel.dropped(), 2);
        assert_eq!(channel.len(), 2);

        channel.recv();
        assert!(channel.post(Event::Status));
        assert_eq!(channel.dropped(), 2);
    }
}
