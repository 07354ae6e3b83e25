//! Machine-level type definitions
//!
//! Defines the C-ABI view of values: the machine type of each call slot and
//! the untagged 8-byte argument union the dispatcher reads and writes.

use core::ffi::c_void;
use core::ptr::NonNull;

/// C-ABI type of one call slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MachineType {
    Void,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Pointer,
}

impl MachineType {
    /// Get size of type in bytes
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::Void => 0,
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
            Self::Pointer => core::mem::size_of::<*const c_void>(),
        }
    }

    /// Get alignment requirement
    #[inline]
    pub const fn align(self) -> usize {
        self.size()
    }

    /// Check if type is integral
    #[inline]
    pub const fn is_integral(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64 |
                      Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    /// Check if type is floating point
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

/// One argument/return slot (untagged union)
///
/// Every member starts at offset 0, so a pointer to the union is also a
/// pointer to whichever member the slot's type selects.
#[repr(C)]
pub union Argument {
    pub boolean: i32,
    pub i8: i8,
    pub u8: u8,
    pub i16: i16,
    pub u16: u16,
    pub i32: i32,
    pub u32: u32,
    pub i64: i64,
    pub u64: u64,
    pub f32: f32,
    pub f64: f64,
    pub size: usize,
    pub ptr: *mut c_void,
}

impl Argument {
    /// All-zero slot
    #[inline]
    pub const fn zeroed() -> Self {
        Self { u64: 0 }
    }

    /// Create from pointer
    #[inline]
    pub const fn from_ptr(ptr: *mut c_void) -> Self {
        // Clear the upper half on 32-bit targets before storing the pointer.
        let mut arg = Self::zeroed();
        arg.ptr = ptr;
        arg
    }
}

impl Default for Argument {
    #[inline]
    fn default() -> Self {
        Self::zeroed()
    }
}

// Manual implementations for Copy, Clone, and Debug since union doesn't auto-derive
impl Copy for Argument {}
impl Clone for Argument {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl core::fmt::Debug for Argument {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // SAFETY: every bit pattern is a valid u64
        write!(f, "Argument({:#018x})", unsafe { self.u64 })
    }
}

/// Untyped location of one native value
///
/// A slot may point into an [`Argument`], into a struct's field area or into
/// an array element, so every access is unaligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(NonNull<u8>);

impl Slot {
    /// Slot backed by a call argument
    #[inline]
    pub fn of(arg: &mut Argument) -> Self {
        Self(NonNull::from(arg).cast())
    }

    /// Slot at a raw address; `None` for null
    #[inline]
    pub fn from_raw(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    #[inline]
    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    /// Slot `bytes` further into the same allocation
    ///
    /// # Safety
    /// The result must stay inside the allocation the slot points into.
    #[inline]
    pub unsafe fn offset(self, bytes: usize) -> Self {
        Self(NonNull::new_unchecked(self.0.as_ptr().add(bytes)))
    }

    /// # Safety
    /// The slot must point to at least `size_of::<T>()` readable bytes holding a valid `T`.
    #[inline]
    pub unsafe fn read<T: Copy>(self) -> T {
        core::ptr::read_unaligned(self.0.as_ptr() as *const T)
    }

    /// # Safety
    /// The slot must point to at least `size_of::<T>()` writable bytes.
    #[inline]
    pub unsafe fn write<T>(self, value: T) {
        core::ptr::write_unaligned(self.0.as_ptr() as *mut T, value)
    }

    /// Zero `len` bytes starting at the slot
    ///
    /// # Safety
    /// The slot must point to at least `len` writable bytes.
    #[inline]
    pub unsafe fn clear(self, len: usize) {
        core::ptr::write_bytes(self.0.as_ptr(), 0, len)
    }

    /// Check whether `len` bytes at the slot are all zero
    ///
    /// # Safety
    /// The slot must point to at least `len` readable bytes.
    #[inline]
    pub unsafe fn is_zero(self, len: usize) -> bool {
        core::slice::from_raw_parts(self.0.as_ptr(), len).iter().all(|&b| b == 0)
    }
}
