//! ABI (Application Binary Interface) handling
//!
//! Calling conventions a prepared call may carry. Dispatchers reject the ones
//! they cannot honour.

use std::fmt;

/// Calling convention specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CallingConvention {
    /// C calling convention (platform default)
    C,
    /// System V AMD64 ABI (Unix x86-64)
    SysV,
    /// Microsoft x64 calling convention (Windows)
    Win64,
    /// ARM AAPCS (ARM 32-bit)
    Aapcs,
    /// ARM64 calling convention
    Aarch64,
}

impl CallingConvention {
    /// Convention used by C functions on the build target
    #[inline]
    pub const fn platform() -> Self {
        #[cfg(all(target_arch = "x86_64", target_os = "windows"))]
        return Self::Win64;

        #[cfg(all(target_arch = "x86_64", not(target_os = "windows")))]
        return Self::SysV;

        #[cfg(target_arch = "aarch64")]
        return Self::Aarch64;

        #[cfg(target_arch = "arm")]
        return Self::Aapcs;

        #[cfg(not(any(
            target_arch = "x86_64",
            target_arch = "aarch64",
            target_arch = "arm"
        )))]
        return Self::C;
    }

    /// True when this convention is what plain C functions use on this target
    #[inline]
    pub fn is_native(self) -> bool {
        self == Self::C || self == Self::platform()
    }
}

impl Default for CallingConvention {
    #[inline]
    fn default() -> Self {
        Self::platform()
    }
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::C => "C",
            Self::SysV => "sysv64",
            Self::Win64 => "win64",
            Self::Aapcs => "aapcs",
            Self::Aarch64 => "aarch64",
        };
        f.write_str(name)
    }
}
