//! The 8-byte RVA/size pair used throughout the optional header's data
//! directories, and by [`crate::pe::clr::Cor20Header`]'s internal
//! directories.

use scroll::{Pread, Pwrite, SizeWith};

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

pub const SIZEOF_DATA_DIRECTORY: usize = 8;

impl DataDirectory {
    pub const fn zeroed() -> Self {
        DataDirectory {
            virtual_address: 0,
            size: 0,
        }
    }

    pub fn new(virtual_address: u32, size: u32) -> Self {
        DataDirectory {
            virtual_address,
            size,
        }
    }
}
