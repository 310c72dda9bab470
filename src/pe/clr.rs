//! The COR20 (CLR/managed-native) header, patched in place for Ready-to-Run
//! images.
//!
//! Field layout grounded in goblin's `pe::clr::Cor20Header`; this crate only
//! needs the writer side, so the metadata/storage-stream parsing machinery
//! (`ClrData`, `StorageSignature`, `StorageHeader`, `ClrSectionIterator`)
//! that goblin builds around it is not carried — this crate never reads an
//! existing metadata blob, it only patches the fixed-layout header fields.

use scroll::{Pread, Pwrite, SizeWith};

use crate::pe::data_directories::DataDirectory;

/// Represents the .NET COR20 header embedded in the COM descriptor data
/// directory of a managed PE image.
#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct Cor20Header {
    /// The size of this structure in bytes; always `size_of::<Cor20Header>()`.
    pub cb: u32,
    pub major_runtime_version: u16,
    pub minor_runtime_version: u16,
    pub metadata: DataDirectory,
    pub flags: u32,
    pub entry_point_token_or_rva: u32,
    pub resources: DataDirectory,
    pub strong_name_signature: DataDirectory,
    pub code_manager_table: DataDirectory,
    pub vtable_fixups: DataDirectory,
    pub export_address_table_jumps: DataDirectory,
    pub managed_native_header: DataDirectory,
}

/// Indicates that the assembly contains only IL (Intermediate Language) code.
pub const COMIMAGE_FLAGS_ILONLY: u32 = 0x0000_0001;
/// Indicates that the assembly requires a 32-bit environment to run.
pub const COMIMAGE_FLAGS_32BITREQUIRED: u32 = 0x0000_0002;
/// Indicates that the assembly is a library, not a standalone executable.
pub const COMIMAGE_FLAGS_IL_LIBRARY: u32 = 0x0000_0004;
/// Indicates that the assembly is signed with a strong name.
pub const COMIMAGE_FLAGS_STRONGNAMESIGNED: u32 = 0x0000_0008;
/// Indicates that the entry point for the assembly is a native method.
pub const COMIMAGE_FLAGS_NATIVE_ENTRYPOINT: u32 = 0x0000_0010;
/// Indicates that debug information is tracked for the assembly.
pub const COMIMAGE_FLAGS_TRACKDEBUGDATA: u32 = 0x0001_0000;
/// Indicates that the assembly prefers a 32-bit environment if available.
pub const COMIMAGE_FLAGS_32BITPREFERRED: u32 = 0x0002_0000;

/// Major runtime version written by this crate, matching goblin's
/// `COR_VERSION_MAJOR_V2`/`COR_VERSION_MAJOR`.
pub const COR_VERSION_MAJOR: u16 = 2;
/// Minor runtime version written by this crate.
pub const COR_VERSION_MINOR: u16 = 5;

impl Cor20Header {
    /// Builds the header for a Ready-to-Run image: `ILONLY` cleared,
    /// `IL_LIBRARY` set (a R2R image is always loaded as a library, even
    /// when it is the startup assembly), the managed native header
    /// directory pointed at the R2R header's resolved RVA/size, and the
    /// rest zeroed — PDB, strong-name and native-entrypoint concerns are
    /// out of scope here.
    pub fn for_ready_to_run(
        entry_point_token_or_rva: u32,
        metadata: DataDirectory,
        managed_native_header: DataDirectory,
    ) -> Self {
        let mut header = Cor20Header {
            cb: std::mem::size_of::<Cor20Header>() as u32,
            major_runtime_version: COR_VERSION_MAJOR,
            minor_runtime_version: COR_VERSION_MINOR,
            metadata,
            flags: 0,
            entry_point_token_or_rva,
            resources: DataDirectory::zeroed(),
            strong_name_signature: DataDirectory::zeroed(),
            code_manager_table: DataDirectory::zeroed(),
            vtable_fixups: DataDirectory::zeroed(),
            export_address_table_jumps: DataDirectory::zeroed(),
            managed_native_header,
        };
        header.flags &= !COMIMAGE_FLAGS_ILONLY;
        header.flags |= COMIMAGE_FLAGS_IL_LIBRARY;
        header
    }

    pub fn is_cb_correct(&self) -> bool {
        self.cb as usize == std::mem::size_of::<Cor20Header>()
    }

    pub fn is_il_only(&self) -> bool {
        self.flags & COMIMAGE_FLAGS_ILONLY != 0
    }

    pub fn is_il_library(&self) -> bool {
        self.flags & COMIMAGE_FLAGS_IL_LIBRARY != 0
    }
}
