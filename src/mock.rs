//! Recording test doubles for the controller and the device stack

use alloc::vec::Vec;
use core::cell::RefCell;

use usb_device::endpoint::{EndpointAddress, EndpointType};

use crate::{
    BusEvent, Config, Driver, EndpointConfig, Error, HardwareEvent, HardwareOps, HwError,
    SetupPacket, TransferBuffer, Upstream, XferResult,
};

/// A call into [`MockHardware`]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Call {
    Open,
    Close,
    Start { ep: EndpointAddress, len: usize },
    Abort(EndpointAddress),
    OpenEndpoint(EndpointAddress),
    CloseEndpoint(EndpointAddress),
    Stall(EndpointAddress),
    ClearStall(EndpointAddress),
    Connect,
    Disconnect,
    RemoteWakeup,
}

const FAILURE: HwError = HwError(0xDEAD);

/// A controller that records every call, and fails on request
#[derive(Default)]
pub struct MockHardware {
    pub calls: Vec<Call>,
    pub fail_start: bool,
    /// Refuse this many starts, then accept again
    pub refuse_next: usize,
    /// Fail only zero-length starts
    pub fail_zero_length: bool,
    pub fail_abort: bool,
    pub fail_open_endpoint: bool,
    pub fail_connect: bool,
}

impl MockHardware {
    fn record(&mut self, call: Call, fail: bool) -> Result<(), HwError> {
        self.calls.push(call);
        if fail {
            Err(FAILURE)
        } else {
            Ok(())
        }
    }
}

unsafe impl HardwareOps for MockHardware {
    fn open(&mut self) -> Result<(), HwError> {
        self.record(Call::Open, false)
    }
    fn close(&mut self) -> Result<(), HwError> {
        self.record(Call::Close, false)
    }
    fn start_transfer(&mut self, ep: EndpointAddress, _: *mut u8, len: usize) -> Result<(), HwError> {
        let refuse = self.refuse_next > 0;
        self.refuse_next = self.refuse_next.saturating_sub(1);
        let fail = self.fail_start || refuse || (self.fail_zero_length && len == 0);
        self.record(Call::Start { ep, len }, fail)
    }
    fn abort_transfer(&mut self, ep: EndpointAddress) -> Result<(), HwError> {
        let fail = self.fail_abort;
        self.record(Call::Abort(ep), fail)
    }
    fn open_endpoint(&mut self, config: &EndpointConfig) -> Result<(), HwError> {
        let fail = self.fail_open_endpoint;
        self.record(Call::OpenEndpoint(config.address), fail)
    }
    fn close_endpoint(&mut self, ep: EndpointAddress) -> Result<(), HwError> {
        self.record(Call::CloseEndpoint(ep), false)
    }
    fn stall(&mut self, ep: EndpointAddress) -> Result<(), HwError> {
        self.record(Call::Stall(ep), false)
    }
    fn clear_stall(&mut self, ep: EndpointAddress) -> Result<(), HwError> {
        self.record(Call::ClearStall(ep), false)
    }
    fn connect(&mut self) -> Result<(), HwError> {
        let fail = self.fail_connect;
        self.record(Call::Connect, fail)
    }
    fn disconnect(&mut self) -> Result<(), HwError> {
        self.record(Call::Disconnect, false)
    }
    fn remote_wakeup(&mut self) -> Result<(), HwError> {
        self.record(Call::RemoteWakeup, false)
    }
}

/// A callback into [`Recorder`]
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Record {
    Bus(BusEvent),
    Request {
        setup: Vec<u8>,
        data: Option<Vec<u8>>,
    },
    Complete {
        ep: EndpointAddress,
        data: Vec<u8>,
        result: Result<(), Error>,
    },
    Status,
}

/// A device stack that records every callback
#[derive(Default)]
pub struct Recorder {
    records: RefCell<Vec<Record>>,
}

impl Recorder {
    /// Take every record made so far
    pub fn take(&self) -> Vec<Record> {
        core::mem::take(&mut *self.records.borrow_mut())
    }
}

impl Upstream for Recorder {
    fn bus_event(&self, event: BusEvent) {
        self.records.borrow_mut().push(Record::Bus(event));
    }
    fn control_request(&self, setup: TransferBuffer, data: Option<TransferBuffer>) {
        assert!(setup.is_setup());
        self.records.borrow_mut().push(Record::Request {
            setup: setup.data().to_vec(),
            data: data.map(|data| data.data().to_vec()),
        });
    }
    fn transfer_complete(
        &self,
        ep: EndpointAddress,
        buffer: TransferBuffer,
        result: Result<(), Error>,
    ) {
        self.records.borrow_mut().push(Record::Complete {
            ep,
            data: buffer.data().to_vec(),
            result,
        });
    }
    fn control_status(&self, buffer: TransferBuffer) {
        assert!(buffer.is_empty());
        self.records.borrow_mut().push(Record::Status);
    }
}

pub type TestDriver = Driver<MockHardware, Recorder>;

pub const EP1_IN: u8 = 0x81;
pub const EP1_OUT: u8 = 0x01;

pub fn ep(addr: u8) -> EndpointAddress {
    EndpointAddress::from(addr)
}

/// An initialized driver, with bulk endpoints 1 IN and 1 OUT enabled
pub fn driver() -> TestDriver {
    let driver = TestDriver::new(MockHardware::default(), Recorder::default(), Config::new());
    driver.init().unwrap();
    for addr in [EP1_IN, EP1_OUT] {
        driver
            .enable(&EndpointConfig::new(ep(addr), EndpointType::Bulk, 64, 0))
            .unwrap();
    }
    driver.hardware(|hw| hw.calls.clear());
    driver
}

/// Take every hardware call made so far
pub fn calls(driver: &TestDriver) -> Vec<Call> {
    driver.hardware(|hw| core::mem::take(&mut hw.calls))
}

pub fn start(addr: u8, len: usize) -> Call {
    Call::Start { ep: ep(addr), len }
}

pub fn complete(driver: &TestDriver, addr: u8, len: usize) {
    driver.on_hardware_event(HardwareEvent::TransferComplete {
        ep: ep(addr),
        result: XferResult::Success,
        len,
    });
}

pub fn fail(driver: &TestDriver, addr: u8) {
    driver.on_hardware_event(HardwareEvent::TransferComplete {
        ep: ep(addr),
        result: XferResult::Failed,
        len: 0,
    });
}

pub fn setup(driver: &TestDriver, request_type: u8, length: u16) -> SetupPacket {
    let packet = SetupPacket {
        request_type,
        request: 6,
        value: 0x0100,
        index: 0,
        length,
    };
    driver.on_hardware_event(HardwareEvent::SetupReceived(packet));
    packet
}

/// `len` bytes counting up from zero
pub fn bytes(len: usize) -> Vec<u8> {
    (0..len).map(|byte| byte as u8).collect()
}

/// A full IN buffer holding [`bytes(len)`](bytes)
pub fn filled(len: usize) -> TransferBuffer {
    TransferBuffer::try_from_slice(&bytes(len)).unwrap()
}

pub fn complete_ok(addr: u8, data: Vec<u8>) -> Record {
    Record::Complete {
        ep: ep(addr),
        data,
        result: Ok(()),
    }
}
