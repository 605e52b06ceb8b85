//! Transfer buffers

use alloc::{boxed::Box, vec::Vec};

bitflags::bitflags! {
    /// Per-buffer transfer flags
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct BufferFlags: u8 {
        /// The buffer holds an 8 byte setup packet
        const SETUP = 1 << 0;
        /// The IN transfer must be terminated with a zero-length packet
        const ZLP = 1 << 1;
    }
}

/// A byte buffer that moves through an endpoint queue
///
/// The driver owns a buffer from the moment it's enqueued until it's
/// handed back through [`Upstream`](crate::Upstream). The storage never
/// moves while the buffer is queued, so the hardware may DMA into it.
///
/// For IN endpoints, the hardware sends [`len()`](TransferBuffer::len)
/// bytes. For OUT endpoints, the hardware may receive up to
/// [`capacity()`](TransferBuffer::capacity) bytes, and the driver sets
/// the length once the transfer completes.
pub struct TransferBuffer {
    storage: Box<[u8]>,
    len: usize,
    flags: BufferFlags,
}

impl TransferBuffer {
    /// Allocate a zeroed, empty buffer that can hold `capacity` bytes
    ///
    /// Returns `None` if the allocation fails.
    pub fn try_with_capacity(capacity: usize) -> Option<Self> {
        let mut storage = Vec::new();
        storage.try_reserve_exact(capacity).ok()?;
        storage.resize(capacity, 0);
        Some(TransferBuffer {
            storage: storage.into_boxed_slice(),
            len: 0,
            flags: BufferFlags::empty(),
        })
    }

    /// A buffer with no storage, for zero-length packets
    pub fn empty() -> Self {
        TransferBuffer {
            storage: Box::default(),
            len: 0,
            flags: BufferFlags::empty(),
        }
    }

    /// Create a full buffer holding a copy of `data`
    ///
    /// Returns `None` if the allocation fails.
    pub fn try_from_slice(data: &[u8]) -> Option<Self> {
        let mut buffer = Self::try_with_capacity(data.len())?;
        buffer.storage.copy_from_slice(data);
        buffer.len = data.len();
        Some(buffer)
    }

    /// Number of valid bytes in the buffer
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bytes the buffer can hold
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// The valid bytes
    pub fn data(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    /// Copy `data` to the end of the valid bytes
    ///
    /// Returns the number of bytes copied, which is constrained by the
    /// remaining capacity.
    pub fn extend_from_slice(&mut self, data: &[u8]) -> usize {
        let size = data.len().min(self.capacity() - self.len);
        self.storage[self.len..self.len + size].copy_from_slice(&data[..size]);
        self.len += size;
        size
    }

    /// Mark `len` bytes, received by the hardware, as valid
    ///
    /// Constrained by the capacity.
    pub(crate) fn set_received(&mut self, len: usize) {
        self.len = len.min(self.capacity());
    }

    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    /// Indicates if this buffer holds a setup packet
    pub fn is_setup(&self) -> bool {
        self.flags.contains(BufferFlags::SETUP)
    }

    pub(crate) fn set_setup(&mut self) {
        self.flags.insert(BufferFlags::SETUP);
    }

    /// Request a trailing zero-length packet after this IN transfer
    ///
    /// See [`zlp_required`] for when the host expects one.
    pub fn set_zlp(&mut self) {
        self.flags.insert(BufferFlags::ZLP);
    }

    pub fn has_zlp(&self) -> bool {
        self.flags.contains(BufferFlags::ZLP)
    }

    pub(crate) fn clear_zlp(&mut self) {
        self.flags.remove(BufferFlags::ZLP);
    }

    /// Pointer handed to the hardware. Valid until the buffer is dropped.
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.storage.as_mut_ptr()
    }
}

impl core::fmt::Debug for TransferBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransferBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("flags", &self.flags)
            .finish()
    }
}

/// Indicates if an IN transfer of `len` bytes needs a trailing zero-length packet
///
/// The host stops reading a transfer after a short packet, or once it
/// has all of the `requested` bytes. If the last packet is full and the
/// host expects more, only a zero-length packet tells it that the transfer
/// is over.
pub fn zlp_required(len: usize, max_packet_size: u16, requested: usize) -> bool {
    let mps = max_packet_size as usize;
    mps != 0 && len != 0 && len % mps == 0 && len < requested
}
