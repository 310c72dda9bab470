//! Export directory (`.edata`) encoding.
//!
//! Field layout grounded in goblin's `pe::export::ExportDirectoryTable`; the
//! byte-wise (not culture-sensitive) name-pointer-table ordering is required
//! by the PE/COFF spec so the loader can binary-search exports by name.

use scroll::{Pread, Pwrite, SizeWith};

use crate::error::Result;
use crate::pe::options::ExportPolicy;
use crate::pe::symbol::SymbolId;
use crate::pe::utils::align_to;

/// One exported symbol, as recorded by
/// [`crate::pe::builder::SectionBuilder::add_export_symbol`] before layout
/// has resolved `symbol` to an RVA. The caller assigns the ordinal
/// explicitly; this crate does not invent one, and (per spec) does not
/// enforce name/ordinal uniqueness across the export list.
#[derive(Debug, Clone)]
pub struct ExportSymbol {
    pub name: String,
    pub ordinal: u16,
    pub symbol: SymbolId,
}

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct ExportDirectoryTable {
    pub export_flags: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub name_rva: u32,
    pub ordinal_base: u32,
    pub address_table_entries: u32,
    pub number_of_name_pointers: u32,
    pub export_address_table_rva: u32,
    pub name_pointer_rva: u32,
    pub ordinal_table_rva: u32,
}

pub const SIZEOF_EXPORT_DIRECTORY_TABLE: usize = 40;

/// A resolved export: name, caller-assigned ordinal, plus the RVA of the
/// symbol it names.
#[derive(Debug, Clone)]
pub struct ResolvedExport {
    pub name: String,
    pub ordinal: u16,
    pub rva: u32,
}

/// The address table may not index past this many ordinals — a build with
/// this many (or a sparser ordinal spread) past the minimum ordinal is
/// almost certainly a caller bug, and the resulting table would otherwise
/// balloon silently.
const MAX_ADDRESS_TABLE_LEN: usize = 4096;

/// Builds the bit-exact `.edata` section content from a resolved export
/// list. The address table is indexed by `ordinal - min_ordinal` and sized
/// `max_ordinal - min_ordinal + 1`; gaps default to zero. The name pointer
/// table is emitted in byte-wise ascending name order, with the parallel
/// ordinal table mapping each sorted name back to its address-table index.
pub struct ExportSectionEncoder;

impl ExportSectionEncoder {
    /// `section_rva` is the RVA the `.edata` section itself will be placed
    /// at — every RVA this encoder writes (name strings, name pointer
    /// table, ordinal table, address table, DLL name, directory table
    /// itself) is relative to the image base, computed as
    /// `section_rva + local_offset`.
    pub fn encode(
        dll_name: &str,
        exports: &[ResolvedExport],
        section_rva: u32,
        policy: ExportPolicy,
    ) -> Result<Vec<u8>> {
        let n = exports.len();
        let min_ordinal = exports.iter().map(|e| e.ordinal).min().unwrap_or(0);
        let max_ordinal = exports.iter().map(|e| e.ordinal).max().unwrap_or(0);
        let address_table_len = max_ordinal as usize - min_ordinal as usize + 1;
        if address_table_len > MAX_ADDRESS_TABLE_LEN {
            return Err(crate::error::Error::Malformed(format!(
                "export address table would need {address_table_len} entries (ordinals {min_ordinal}..={max_ordinal}), exceeding the {MAX_ADDRESS_TABLE_LEN} limit"
            )));
        }

        // Sort indices by name, byte-wise (not culture sensitive).
        let mut sorted_indices: Vec<usize> = (0..n).collect();
        sorted_indices.sort_by(|&a, &b| exports[a].name.as_bytes().cmp(exports[b].name.as_bytes()));

        // Layout, in emission order:
        //   [0]                  export directory table (40 bytes)
        //   [dir_end]            export address table (4 bytes * address_table_len)
        //   [addr_end]           name pointer table (4 bytes * n)
        //   [name_ptr_end]       ordinal table (2 bytes * n)
        //   [ord_end]            dll name (nul-terminated)
        //   [dll_end]            name strings, one per export (nul-terminated)
        let dir_start = 0u32;
        let dir_size = SIZEOF_EXPORT_DIRECTORY_TABLE as u32;
        let addr_table_start = dir_start + dir_size;
        let addr_table_size = 4 * address_table_len as u32;
        let name_ptr_start = addr_table_start + addr_table_size;
        let name_ptr_size = 4 * n as u32;
        let ordinal_table_start = name_ptr_start + name_ptr_size;
        let ordinal_table_size = 2 * n as u32;
        let dll_name_start = ordinal_table_start + ordinal_table_size;
        let dll_name_size = dll_name.len() as u32 + 1;
        let mut name_rvas = vec![0u32; n];
        let mut cursor = dll_name_start + dll_name_size;
        for &idx in &sorted_indices {
            name_rvas[idx] = section_rva + cursor;
            cursor += exports[idx].name.len() as u32 + 1;
        }
        let total_size = cursor;

        let mut out = vec![0u8; total_size as usize];

        // Export address table, indexed by ordinal - min_ordinal; entries
        // for ordinals no export claims stay zero.
        let addr_table_off = addr_table_start as usize;
        for export in exports {
            let slot = (export.ordinal - min_ordinal) as usize;
            out.pwrite_with(export.rva, addr_table_off + 4 * slot, scroll::LE)?;
        }

        // Name pointer table + ordinal table, in sorted-name order.
        let mut name_ptr_off = name_ptr_start as usize;
        let mut ordinal_off = ordinal_table_start as usize;
        for &idx in &sorted_indices {
            out.pwrite_with(name_rvas[idx], name_ptr_off, scroll::LE)?;
            name_ptr_off += 4;
            out.pwrite_with(exports[idx].ordinal - min_ordinal, ordinal_off, scroll::LE)?;
            ordinal_off += 2;
        }

        // DLL name string.
        let dll_bytes = dll_name.as_bytes();
        out[dll_name_start as usize..dll_name_start as usize + dll_bytes.len()]
            .copy_from_slice(dll_bytes);

        // Name strings, at the offsets already computed above.
        let mut cursor = dll_name_start + dll_name_size;
        for &idx in &sorted_indices {
            let name_bytes = exports[idx].name.as_bytes();
            let start = cursor as usize;
            out[start..start + name_bytes.len()].copy_from_slice(name_bytes);
            cursor += name_bytes.len() as u32 + 1;
        }

        let table = ExportDirectoryTable {
            export_flags: 0,
            time_date_stamp: policy.time_date_stamp,
            major_version: policy.major_version,
            minor_version: policy.minor_version,
            name_rva: section_rva + dll_name_start,
            ordinal_base: min_ordinal as u32,
            address_table_entries: address_table_len as u32,
            number_of_name_pointers: n as u32,
            export_address_table_rva: section_rva + addr_table_start,
            name_pointer_rva: section_rva + name_ptr_start,
            ordinal_table_rva: section_rva + ordinal_table_start,
        };
        out.pwrite_with(table, 0, scroll::LE)?;

        Ok(out)
    }

    /// The alignment export directory content is conventionally padded to
    /// within its own section; exposed so the layouter can reserve the
    /// section at the same alignment every other section uses.
    pub fn alignment() -> u32 {
        align_to(1, 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_pointer_table_is_sorted_byte_wise_uppercase_before_lowercase() {
        let exports = vec![
            ResolvedExport {
                name: "Zeta".to_string(),
                ordinal: 2,
                rva: 0x3000,
            },
            ResolvedExport {
                name: "alpha".to_string(),
                ordinal: 1,
                rva: 0x1000,
            },
            ResolvedExport {
                name: "Beta".to_string(),
                ordinal: 3,
                rva: 0x2000,
            },
        ];
        let bytes =
            ExportSectionEncoder::encode("test.dll", &exports, 0x4000, ExportPolicy::default())
                .unwrap();
        let table: ExportDirectoryTable = bytes.pread_with(0, scroll::LE).unwrap();
        assert_eq!(table.ordinal_base, 1);
        assert_eq!(table.address_table_entries, 3);
        assert_eq!(table.number_of_name_pointers, 3);

        let addr_table_off = (table.export_address_table_rva - 0x4000) as usize;
        // ordinal - ordinal_base: alpha(1)->0, Zeta(2)->1, Beta(3)->2.
        let addr0: u32 = bytes.pread_with(addr_table_off, scroll::LE).unwrap();
        let addr1: u32 = bytes.pread_with(addr_table_off + 4, scroll::LE).unwrap();
        let addr2: u32 = bytes.pread_with(addr_table_off + 8, scroll::LE).unwrap();
        assert_eq!((addr0, addr1, addr2), (0x1000, 0x3000, 0x2000));

        // Name pointer table, in byte-wise sorted name order: Beta, Zeta, alpha.
        let name_ptr_off = (table.name_pointer_rva - 0x4000) as usize;
        let mut names = Vec::new();
        for i in 0..3 {
            let name_rva: u32 = bytes.pread_with(name_ptr_off + i * 4, scroll::LE).unwrap();
            let str_off = (name_rva - 0x4000) as usize;
            let end = bytes[str_off..].iter().position(|&b| b == 0).unwrap();
            names.push(String::from_utf8(bytes[str_off..str_off + end].to_vec()).unwrap());
        }
        assert_eq!(names, vec!["Beta", "Zeta", "alpha"]);

        // Ordinal table, same sorted order, biased by ordinal_base: Beta(2) Zeta(1) alpha(0).
        let ordinal_table_off = (table.ordinal_table_rva - 0x4000) as usize;
        let ord0: u16 = bytes.pread_with(ordinal_table_off, scroll::LE).unwrap();
        let ord1: u16 = bytes.pread_with(ordinal_table_off + 2, scroll::LE).unwrap();
        let ord2: u16 = bytes.pread_with(ordinal_table_off + 4, scroll::LE).unwrap();
        assert_eq!((ord0, ord1, ord2), (2, 1, 0));
    }

    #[test]
    fn sparse_ordinals_leave_unclaimed_address_table_slots_zero() {
        let exports = vec![
            ResolvedExport {
                name: "first".to_string(),
                ordinal: 10,
                rva: 0x1000,
            },
            ResolvedExport {
                name: "second".to_string(),
                ordinal: 12,
                rva: 0x2000,
            },
        ];
        let bytes =
            ExportSectionEncoder::encode("test.dll", &exports, 0x5000, ExportPolicy::default())
                .unwrap();
        let table: ExportDirectoryTable = bytes.pread_with(0, scroll::LE).unwrap();
        assert_eq!(table.ordinal_base, 10);
        assert_eq!(table.address_table_entries, 3);
        let addr_table_off = (table.export_address_table_rva - 0x5000) as usize;
        let slot0: u32 = bytes.pread_with(addr_table_off, scroll::LE).unwrap();
        let slot1: u32 = bytes.pread_with(addr_table_off + 4, scroll::LE).unwrap();
        let slot2: u32 = bytes.pread_with(addr_table_off + 8, scroll::LE).unwrap();
        assert_eq!((slot0, slot1, slot2), (0x1000, 0, 0x2000));
    }
}
