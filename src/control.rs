//! Control transfer state machine
//!
//! A control transfer runs through a setup stage, an optional data stage,
//! and a status stage that moves in the opposite direction of the data:
//!
//! ```text
//! no data:         SETUP -> NO_DATA  -> (status IN)  -> IDLE
//! device-to-host:  SETUP -> DATA_IN  -> STATUS_OUT   -> IDLE
//! host-to-device:  SETUP -> DATA_OUT -> STATUS_IN    -> IDLE
//! ```
//!
//! [`ControlPipe`] only decides the next stage. The worker performs the
//! I/O that each transition calls for.

use usb_device::UsbDirection;

use crate::{buffer::TransferBuffer, setup::SetupPacket};

/// The stage of the active control transfer
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ControlStage {
    /// No control transfer in progress
    #[default]
    Idle,
    /// A setup packet is being classified
    Setup,
    /// Receiving the host-to-device data stage
    DataOut,
    /// Waiting for, or sending, the device-to-host data stage
    DataIn,
    /// Receiving the zero-length status packet of a device-to-host transfer
    StatusOut,
    /// Sending the zero-length status packet of a host-to-device transfer
    StatusIn,
    /// A transfer without a data stage; waiting on the status IN stage
    NoData,
}

impl ControlStage {
    /// A short name, for logging
    pub const fn name(self) -> &'static str {
        match self {
            ControlStage::Idle => "IDLE",
            ControlStage::Setup => "SETUP",
            ControlStage::DataOut => "DATA_OUT",
            ControlStage::DataIn => "DATA_IN",
            ControlStage::StatusOut => "STATUS_OUT",
            ControlStage::StatusIn => "STATUS_IN",
            ControlStage::NoData => "NO_DATA",
        }
    }
}

/// What a new setup packet asks for
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum SetupKind {
    /// No data stage
    NoData,
    /// The caller supplies IN data
    DataIn,
    /// The driver receives this many bytes of OUT data
    DataOut(usize),
}

/// What finished on the control OUT endpoint
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum OutComplete {
    /// The data stage; perform the status IN stage next
    Data,
    /// The status stage; the transfer is done
    Status,
    Unexpected(ControlStage),
}

/// What finished on the control IN endpoint
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum InComplete {
    /// The data stage; perform the status OUT stage next
    Data,
    /// The status stage; the transfer is done
    Status,
    Unexpected(ControlStage),
}

/// The device's one control pipe
#[derive(Default)]
pub(crate) struct ControlPipe {
    stage: ControlStage,
    /// `wLength` of the active setup packet
    requested: usize,
    /// Setup buffer held until the OUT data stage completes
    setup: Option<TransferBuffer>,
}

impl ControlPipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> ControlStage {
        self.stage
    }

    /// Begin a new control transfer
    ///
    /// Returns the stage of the previous transfer if it never finished.
    /// A held setup buffer from that transfer is dropped.
    pub fn begin(&mut self) -> Option<ControlStage> {
        let previous = self.stage;
        self.setup = None;
        self.requested = 0;
        self.stage = ControlStage::Setup;
        (previous != ControlStage::Idle).then_some(previous)
    }

    /// Classify the setup packet, and move to the matching stage
    pub fn classify(&mut self, setup: &SetupPacket) -> SetupKind {
        self.requested = setup.data_length();
        let kind = match (setup.data_length(), setup.direction()) {
            (0, _) => SetupKind::NoData,
            (_, UsbDirection::In) => SetupKind::DataIn,
            (len, UsbDirection::Out) => SetupKind::DataOut(len),
        };
        self.stage = match kind {
            SetupKind::NoData => ControlStage::NoData,
            SetupKind::DataIn => ControlStage::DataIn,
            SetupKind::DataOut(_) => ControlStage::DataOut,
        };
        kind
    }

    /// Keep the setup buffer until the OUT data arrives
    pub fn hold_setup(&mut self, setup: TransferBuffer) {
        self.setup = Some(setup);
    }

    pub fn take_setup(&mut self) -> Option<TransferBuffer> {
        self.setup.take()
    }

    /// If the IN data stage is active, the number of bytes the host asked for
    ///
    /// Used to decide if the data stage needs a trailing zero-length packet.
    pub fn data_in_requested(&self) -> Option<usize> {
        (self.stage == ControlStage::DataIn).then_some(self.requested)
    }

    /// A transfer on the control OUT endpoint completed
    pub fn out_complete(&mut self) -> OutComplete {
        match self.stage {
            ControlStage::DataOut => {
                self.stage = ControlStage::StatusIn;
                OutComplete::Data
            }
            ControlStage::StatusOut => {
                self.reset();
                OutComplete::Status
            }
            stage => {
                self.reset();
                OutComplete::Unexpected(stage)
            }
        }
    }

    /// A transfer on the control IN endpoint completed
    pub fn in_complete(&mut self) -> InComplete {
        match self.stage {
            ControlStage::StatusIn | ControlStage::NoData => {
                self.reset();
                InComplete::Status
            }
            ControlStage::DataIn => {
                self.stage = ControlStage::StatusOut;
                InComplete::Data
            }
            stage => {
                self.reset();
                InComplete::Unexpected(stage)
            }
        }
    }

    /// Abandon the active transfer
    pub fn reset(&mut self) {
        self.stage = ControlStage::Idle;
        self.requested = 0;
        self.setup = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{ControlPipe, ControlStage, InComplete, OutComplete, SetupKind};
    use crate::{buffer::TransferBuffer, setup::SetupPacket};

    fn setup(request_type: u8, length: u16) -> SetupPacket {
        SetupPacket {
            request_type,
            request: 0,
            value: 0,
            index: 0,
            length,
        }
    }

    #[test]
    fn no_data() {
        let mut pipe = ControlPipe::new();
        assert_eq!(pipe.stage(), ControlStage::Idle);
        assert_eq!(pipe.begin(), None);
        assert_eq!(pipe.stage(), ControlStage::Setup);
        assert_eq!(pipe.classify(&setup(0x80, 0)), SetupKind::NoData);
        assert_eq!(pipe.stage(), ControlStage::NoData);
        assert_eq!(pipe.data_in_requested(), None);
        assert_eq!(pipe.in_complete(), InComplete::Status);
        assert_eq!(pipe.stage(), ControlStage::Idle);
    }

    #[test]
    fn device_to_host() {
        let mut pipe = ControlPipe::new();
        pipe.begin();
        assert_eq!(pipe.classify(&setup(0x80, 18)), SetupKind::DataIn);
        assert_eq!(pipe.data_in_requested(), Some(18));
        assert_eq!(pipe.in_complete(), InComplete::Data);
        assert_eq!(pipe.stage(), ControlStage::StatusOut);
        assert_eq!(pipe.out_complete(), OutComplete::Status);
        assert_eq!(pipe.stage(), ControlStage::Idle);
    }

    #[test]
    fn host_to_device() {
        let mut pipe = ControlPipe::new();
        pipe.begin();
        assert_eq!(pipe.classify(&setup(0x21, 7)), SetupKind::DataOut(7));
        pipe.hold_setup(TransferBuffer::empty());
        assert_eq!(pipe.out_complete(), OutComplete::Data);
        assert_eq!(pipe.stage(), ControlStage::StatusIn);
        assert!(pipe.take_setup().is_some());
        assert_eq!(pipe.in_complete(), InComplete::Status);
        assert_eq!(pipe.stage(), ControlStage::Idle);
    }

    #[test]
    fn unexpected_completions_reset() {
        let mut pipe = ControlPipe::new();
        assert_eq!(
            pipe.out_complete(),
            OutComplete::Unexpected(ControlStage::Idle)
        );

        pipe.begin();
        pipe.classify(&setup(0x80, 8));
        assert_eq!(
            pipe.out_complete(),
            OutComplete::Unexpected(ControlStage::DataIn)
        );
        assert_eq!(pipe.stage(), ControlStage::Idle);
    }

    #[test]
    fn interrupted_transfer() {
        let mut pipe = ControlPipe::new();
        pipe.begin();
        pipe.classify(&setup(0x00, 4));
        pipe.hold_setup(TransferBuffer::empty());
        assert_eq!(pipe.begin(), Some(ControlStage::DataOut));
        assert!(pipe.take_setup().is_none());
    }
}
