//! The on-disk COFF section header and its characteristics flags.

use scroll::{Pread, Pwrite, SizeWith};

/// A single 40-byte COFF section header, as written into the PE section
/// table by the caller's envelope writer. This crate only fills in the
/// fields it owns (`virtual_size`, `virtual_address`, `size_of_raw_data`,
/// `pointer_to_raw_data`, `characteristics`); `name` is truncated/padded to
/// eight bytes by [`crate::pe::section::Section::raw_name`].
#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct SectionTable {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

pub const SIZEOF_SECTION_TABLE: usize = 40;

/// Section contains executable code.
pub const IMAGE_SCN_CNT_CODE: u32 = 0x0000_0020;
/// Section contains initialized data.
pub const IMAGE_SCN_CNT_INITIALIZED_DATA: u32 = 0x0000_0040;
/// Section contains uninitialized data.
pub const IMAGE_SCN_CNT_UNINITIALIZED_DATA: u32 = 0x0000_0080;
/// Section contains extended relocations (unused by this crate's encoder,
/// which always uses the default block-per-4096-bytes scheme).
pub const IMAGE_SCN_LNK_NRELOC_OVFL: u32 = 0x0100_0000;
/// Section can be discarded as needed.
pub const IMAGE_SCN_MEM_DISCARDABLE: u32 = 0x0200_0000;
/// Section can be shared in memory.
pub const IMAGE_SCN_MEM_SHARED: u32 = 0x1000_0000;
/// Section can be executed as code.
pub const IMAGE_SCN_MEM_EXECUTE: u32 = 0x2000_0000;
/// Section can be read.
pub const IMAGE_SCN_MEM_READ: u32 = 0x4000_0000;
/// Section can be written to.
pub const IMAGE_SCN_MEM_WRITE: u32 = 0x8000_0000;
