//! Buffer descriptors and the rings that hold them.
//!
//! A [`Ring`] pairs a slice of descriptors with a slice of equally sized data
//! buffers. Descriptor `i` always points at buffer `i`; the ring never reallocates
//! or re-points a buffer after construction. The ring's [`advance`](Ring::advance)
//! is the only place that knows where the ring wraps.
//!
//! The bit-level meaning of a descriptor, and especially of its ownership bit,
//! belongs to the layout modules. See [`gmac`] and [`enet`].

pub mod enet;
pub mod gmac;

use core::{cell::UnsafeCell, marker::PhantomData, mem::MaybeUninit, ptr::NonNull};

use crate::ConfigError;

/// A descriptor that the DMA engine walks.
///
/// Descriptors are shared with hardware, so every method takes `&self` and
/// implementations use atomics for their fields.
pub trait Descriptor {
    /// Required alignment, in bytes, of each buffer size.
    const BUFFER_ALIGN: usize;
    /// Largest buffer the descriptor can describe.
    const MAX_BUFFER_SIZE: usize;
    /// Smallest usable buffer.
    ///
    /// Layouts that can't mark where a frame starts need a whole frame per buffer.
    const MIN_BUFFER_SIZE: usize = 1;

    /// Point the descriptor at `buffer` and put it in its idle state.
    ///
    /// Idle transmit descriptors belong to software. Idle receive descriptors
    /// belong to hardware, ready to be filled. `wrap` marks the last descriptor.
    fn reset(&self, buffer: *mut u8, wrap: bool);

    /// Indicates if software may touch the descriptor and its buffer.
    fn is_software_owned(&self) -> bool;

    /// Indicates if the DMA engine returns to the first descriptor after this one.
    fn wraps(&self) -> bool;
}

/// A transmit descriptor.
pub trait TxDescriptor: Descriptor {
    /// Describe a `len` byte frame and hand the descriptor to hardware.
    ///
    /// The ownership change must be the last write the DMA engine can observe.
    fn submit(&self, len: usize, wrap: bool);
}

/// A receive descriptor.
pub trait RxDescriptor: Descriptor {
    /// Read the status hardware wrote before it released the descriptor.
    fn status(&self) -> RxStatus;

    /// Hand the descriptor back to hardware.
    fn release(&self, wrap: bool);
}

/// Decoded receive descriptor status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxStatus {
    /// First descriptor of a frame.
    pub start_of_frame: bool,
    /// Last descriptor of a frame.
    pub end_of_frame: bool,
    /// On the last descriptor, the length of the whole frame.
    pub length: usize,
    /// Layout-specific error bits. Zero when the descriptor is clean.
    pub errors: u32,
}

/// A fixed-capacity circular sequence of descriptors and their buffers.
///
/// The DMA engine writes the buffers behind the ring's back, so the ring only
/// keeps their address. Slices are formed after a descriptor's ownership bit says
/// software may touch that buffer.
pub struct Ring<'a, D> {
    descriptors: &'a mut [D],
    buffers: NonNull<u8>,
    buffer_size: usize,
    cursor: usize,
    _buffers: PhantomData<&'a mut [u8]>,
}

// Safety: the ring is the only software handle to its buffers.
unsafe impl<D: Send> Send for Ring<'_, D> {}

impl<'a, D: Descriptor> Ring<'a, D> {
    /// Build a ring over caller-provided descriptors and buffer storage.
    ///
    /// `buffers` is split into `descriptors.len()` chunks of `buffer_size` bytes.
    /// Every descriptor is reset to its idle state and the last one wraps.
    pub fn new(
        descriptors: &'a mut [D],
        buffers: &'a mut [u8],
        buffer_size: usize,
    ) -> Result<Self, ConfigError> {
        if descriptors.is_empty() {
            return Err(ConfigError::EmptyRing);
        }
        if buffer_size == 0
            || buffer_size % D::BUFFER_ALIGN != 0
            || buffer_size < D::MIN_BUFFER_SIZE
            || buffer_size > D::MAX_BUFFER_SIZE
        {
            return Err(ConfigError::BufferSize { size: buffer_size });
        }
        let required = descriptors.len() * buffer_size;
        if buffers.len() < required {
            return Err(ConfigError::BufferStorage {
                required,
                provided: buffers.len(),
            });
        }
        Ok(Self::from_parts(descriptors, buffers, buffer_size))
    }

    /// `buffers` must hold at least `descriptors.len() * buffer_size` bytes.
    fn from_parts(descriptors: &'a mut [D], buffers: &'a mut [u8], buffer_size: usize) -> Self {
        let mut ring = Self {
            descriptors,
            buffers: NonNull::from(buffers).cast(),
            buffer_size,
            cursor: 0,
            _buffers: PhantomData,
        };
        ring.reset();
        ring
    }

    /// Return every descriptor to its idle state and rewind the cursor.
    ///
    /// Frames still in flight are lost. Use this when the DMA engine itself has
    /// been rewound to the first descriptor.
    pub fn reset(&mut self) {
        let last = self.capacity() - 1;
        for (index, descriptor) in self.descriptors.iter().enumerate() {
            descriptor.reset(self.buffer_ptr(index), index == last);
        }
        self.cursor = 0;
    }
}

impl<'a, D> Ring<'a, D> {
    /// Number of descriptors.
    pub fn capacity(&self) -> usize {
        self.descriptors.len()
    }

    /// Size of each data buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Next index software will touch.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The index after `index`, wrapping to zero past the last descriptor.
    pub fn advance(&self, index: usize) -> usize {
        (index + 1) % self.capacity()
    }

    pub fn is_last(&self, index: usize) -> bool {
        index + 1 == self.capacity()
    }

    pub fn descriptor(&self, index: usize) -> &D {
        &self.descriptors[index]
    }

    /// The first descriptor. Hardware is programmed with this address.
    pub fn as_ptr(&self) -> *const D {
        self.descriptors.as_ptr()
    }

    pub(crate) fn step(&mut self) {
        self.cursor = self.advance(self.cursor);
    }

    fn buffer_ptr(&self, index: usize) -> *mut u8 {
        assert!(index < self.capacity());
        // Safety: construction checked that the storage holds a buffer for
        // every descriptor.
        unsafe { self.buffers.as_ptr().add(index * self.buffer_size) }
    }

    /// The buffer behind `index`.
    ///
    /// Only read it while the descriptor is software owned.
    pub(crate) fn buffer(&self, index: usize) -> &[u8] {
        let ptr = self.buffer_ptr(index);
        // Safety: the buffer lies within the ring's storage, and the borrow of
        // the ring keeps software from mutating it meanwhile.
        unsafe { core::slice::from_raw_parts(ptr, self.buffer_size) }
    }

    /// The buffer behind `index`.
    ///
    /// Only write it while the descriptor is software owned.
    pub(crate) fn buffer_mut(&mut self, index: usize) -> &mut [u8] {
        let ptr = self.buffer_ptr(index);
        // Safety: as above, and the exclusive borrow of the ring makes this the
        // only software reference to the buffer.
        unsafe { core::slice::from_raw_parts_mut(ptr, self.buffer_size) }
    }
}

#[repr(align(64))]
struct DescriptorRing<D, const N: usize>(UnsafeCell<MaybeUninit<[D; N]>>);
unsafe impl<D, const N: usize> Sync for DescriptorRing<D, N> {}

impl<D, const N: usize> DescriptorRing<D, N> {
    const fn new() -> Self {
        Self(UnsafeCell::new(MaybeUninit::uninit()))
    }

    /// # Safety
    ///
    /// Can only be called once. Multiple calls will release multiple mutable references
    /// to the same memory.
    unsafe fn init(&mut self) -> &mut [D] {
        let ring: *mut MaybeUninit<[D; N]> = self.0.get();
        // Transparent elements let us treat each element as uninitialized.
        let ring: *mut [MaybeUninit<D>; N] = ring.cast();
        // Array pointer == pointer to first element.
        let ring: *mut MaybeUninit<D> = ring.cast();

        for descriptor in 0..N {
            // Safety: every layout is a set of integer fields, so a zero
            // bitpattern is valid. This pointer is valid for all descriptor offsets.
            unsafe { ring.add(descriptor).write(MaybeUninit::zeroed()) };
        }

        // Safety: all descriptors are initialized to zero.
        unsafe { core::slice::from_raw_parts_mut(ring.cast(), N) }
    }
}

/// Buffers stay contiguous so that buffer `i` starts at `i * MTU`.
#[repr(align(64))]
struct DataBuffers<const COUNT: usize, const MTU: usize>([[u8; MTU]; COUNT]);

/// Statically allocated, DMA-aligned storage for one ring.
///
/// Place this in memory the DMA engine can reach, then [`take`](IoBuffers::take)
/// it once to build the [`Ring`].
pub struct IoBuffers<D, const COUNT: usize, const MTU: usize> {
    ring: DescriptorRing<D, COUNT>,
    buffers: UnsafeCell<DataBuffers<COUNT, MTU>>,
}
unsafe impl<D, const COUNT: usize, const MTU: usize> Sync for IoBuffers<D, COUNT, MTU> {}

impl<D: Descriptor, const COUNT: usize, const MTU: usize> Default for IoBuffers<D, COUNT, MTU> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Descriptor, const COUNT: usize, const MTU: usize> IoBuffers<D, COUNT, MTU> {
    const LAYOUT_IS_VALID: () = {
        assert!(COUNT > 0);
        assert!(MTU > 0 && MTU % D::BUFFER_ALIGN == 0);
        assert!(MTU >= D::MIN_BUFFER_SIZE);
        assert!(MTU <= D::MAX_BUFFER_SIZE);
    };

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)] // Force evaluation.
        let _: () = Self::LAYOUT_IS_VALID;
        Self {
            ring: DescriptorRing::new(),
            buffers: UnsafeCell::new(DataBuffers([[0; MTU]; COUNT])),
        }
    }

    pub fn take(&'static mut self) -> Ring<'static, D> {
        // Safety: by taking 'static mut reference, we
        // ensure that we can only be called once.
        let ring = unsafe { self.ring.init() };
        // Safety: since this is only called once, we're taking the only
        // mutable reference available to the program.
        let buffers = unsafe { &mut *self.buffers.get() };
        let buffers = buffers.0.as_flattened_mut();
        Ring::from_parts(ring, buffers, MTU)
    }
}
