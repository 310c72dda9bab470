//! [`Layouter`]: assigns final RVAs/file offsets to every section, then
//! resolves every relocation and export symbol now that the whole section
//! graph is addressable.
//!
//! Sections are walked in first-appearance order (the order
//! [`crate::pe::builder::SectionBuilder::add_section`] first registered each
//! name in); `.reloc` and `.edata` are synthesized last because encoding
//! their content requires every other section's placement to already be
//! known.

use crate::error::{Error, Result};
use crate::pe::builder::{BuilderState, SectionBuilder};
use crate::pe::data_directories::DataDirectory;
use crate::pe::export::{ExportSectionEncoder, ResolvedExport};
use crate::pe::reloc::{RelocSectionEncoder, RelocationKind};
use crate::pe::section::{SectionIndex, SectionPlacement};
use crate::pe::section_table::{
    IMAGE_SCN_CNT_INITIALIZED_DATA, IMAGE_SCN_MEM_DISCARDABLE, IMAGE_SCN_MEM_READ,
};
use crate::pe::utils::{align_to, round_up};

/// A single byte-level patch [`crate::pe::patch::Patcher`] must apply to the
/// already-assembled image: "at `file_offset`, where the site's own RVA is
/// `site_rva`, encode a reference to `target_rva` using `kind`."
#[derive(Debug, Clone, Copy)]
pub struct PatchSite {
    pub file_offset: u32,
    pub site_rva: u32,
    pub kind: RelocationKind,
    pub target_rva: u32,
}

/// The result of [`Layouter::layout`]: every section's final placement, the
/// fully resolved patch list the [`crate::pe::patch::Patcher`] will stream
/// over, and the directory entries the caller writes back into the
/// optional header's data directories table.
#[derive(Debug)]
pub struct Layout {
    pub placements: Vec<Option<SectionPlacement>>,
    pub patch_sites: Vec<PatchSite>,
    pub size_of_image: u32,
    pub entry_point_rva: u32,
    pub cor_header: Option<crate::pe::clr::Cor20Header>,
    /// File offset of the Cor20Header-sized placeholder registered via
    /// [`crate::pe::builder::SectionBuilder::set_cor_header_symbol`], if any.
    pub cor_header_file_offset: Option<u32>,
    /// `DataDirectory[IMAGE_DIRECTORY_ENTRY_EXPORT]`: the `.edata` section's
    /// RVA/size, or zeroed if no exports were added.
    pub export_directory: DataDirectory,
    /// `DataDirectory[IMAGE_DIRECTORY_ENTRY_BASERELOC]`: the `.reloc`
    /// section's RVA/size. Always present, even if empty (zero relocations
    /// still produce a zero-size `.reloc` at a valid RVA).
    pub base_relocation_directory: DataDirectory,
}

impl Layout {
    pub fn placement(&self, section: SectionIndex) -> Option<SectionPlacement> {
        self.placements[section.index() as usize]
    }
}

pub struct Layouter;

impl Layouter {
    /// `headers_size` is the byte size the caller's envelope writer already
    /// reserved for the DOS/COFF/optional headers and the section table —
    /// the first RVA/file offset a section may occupy. Alignments must be
    /// powers of two.
    pub fn layout(
        builder: &mut SectionBuilder,
        section_alignment: u32,
        file_alignment: u32,
        headers_size: u32,
    ) -> Result<Layout> {
        if builder.state != BuilderState::Configuring {
            return Err(Error::AlreadyLaidOut);
        }
        if !section_alignment.is_power_of_two() {
            return Err(Error::Malformed(format!(
                "section alignment {section_alignment} is not a power of two"
            )));
        }
        if !file_alignment.is_power_of_two() {
            return Err(Error::Malformed(format!(
                "file alignment {file_alignment} is not a power of two"
            )));
        }

        Self::synthesize_edata(builder)?;
        Self::synthesize_reloc(builder)?;

        let mut placements: Vec<Option<SectionPlacement>> = vec![None; builder.sections.len()];
        let mut rva_cursor = align_to(headers_size, section_alignment);
        let mut file_cursor = round_up(headers_size as u64, file_alignment as u64) as u32;

        let reloc_index = builder
            .find_section(".reloc")
            .expect("synthesize_reloc always creates or finds .reloc");

        for i in 0..builder.sections.len() {
            let idx = SectionIndex(i as u32);

            if idx == reloc_index {
                // Encode last: every other section's placement (and thus
                // every relocation site's final rva) is already known.
                let patch_sites = Self::resolve_relocations(builder, &placements)?;
                let mut encoder = RelocSectionEncoder::new();
                let mut sites_sorted = patch_sites.clone();
                sites_sorted.sort_by_key(|s| s.site_rva);
                for site in &sites_sorted {
                    if let Some(typ) = site.kind.base_relocation_type() {
                        encoder.add_reloc(site.site_rva, typ)?;
                    }
                }
                let reloc_rva = rva_cursor;
                let bytes = encoder.encode();
                builder.sections[i].replace_content(bytes);

                let virtual_size = builder.sections[i].store.len();
                let raw_size = round_up(virtual_size as u64, file_alignment as u64) as u32;
                placements[i] = Some(SectionPlacement {
                    rva: reloc_rva,
                    file_pos: file_cursor,
                    virtual_size,
                    raw_size,
                });
                rva_cursor += align_to(virtual_size.max(1), section_alignment);
                file_cursor += raw_size;

                let size_of_image = align_to(rva_cursor, section_alignment);
                let (entry_point_rva, cor_header, cor_header_file_offset) =
                    Self::resolve_headers(builder, &placements)?;
                let export_directory = Self::export_directory(builder, &placements);
                let base_relocation_directory = DataDirectory::new(reloc_rva, virtual_size);
                #[cfg(feature = "log")]
                log::debug!(
                    "layout complete: {} sections, size_of_image={:#x}",
                    builder.sections.len(),
                    size_of_image
                );
                builder.state = BuilderState::LaidOut;
                return Ok(Layout {
                    placements,
                    patch_sites,
                    size_of_image,
                    entry_point_rva,
                    cor_header,
                    cor_header_file_offset,
                    export_directory,
                    base_relocation_directory,
                });
            }

            if idx == builder.find_section(".edata").unwrap_or(SectionIndex(u32::MAX)) {
                if !builder.export_symbols.is_empty() {
                    let edata_rva = rva_cursor;
                    let bytes = Self::encode_edata(builder, &placements, edata_rva)?;
                    builder.sections[i].replace_content(bytes);
                }
            }

            let virtual_size = builder.sections[i].store.len();
            let raw_size = round_up(virtual_size as u64, file_alignment as u64) as u32;
            placements[i] = Some(SectionPlacement {
                rva: rva_cursor,
                file_pos: file_cursor,
                virtual_size,
                raw_size,
            });
            rva_cursor += align_to(virtual_size.max(1), section_alignment);
            file_cursor += raw_size;
        }

        unreachable!(".reloc is always present and is visited in the loop above")
    }

    fn synthesize_edata(builder: &mut SectionBuilder) -> Result<()> {
        if builder.export_symbols.is_empty() {
            return Ok(());
        }
        if builder.find_section(".edata").is_some() {
            return Ok(());
        }
        builder.add_section(
            ".edata",
            IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ,
            4,
        )?;
        Ok(())
    }

    fn synthesize_reloc(builder: &mut SectionBuilder) -> Result<()> {
        if let Some(idx) = builder.find_section(".reloc") {
            if idx.index() as usize != builder.sections.len() - 1 {
                return Err(Error::Malformed(
                    ".reloc section must be the last section in the image".to_string(),
                ));
            }
            return Ok(());
        }
        builder.add_section(
            ".reloc",
            IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_DISCARDABLE | IMAGE_SCN_MEM_READ,
            4,
        )?;
        Ok(())
    }

    fn resolve_relocations(
        builder: &SectionBuilder,
        placements: &[Option<SectionPlacement>],
    ) -> Result<Vec<PatchSite>> {
        let mut sites = Vec::new();
        for (i, section) in builder.sections.iter().enumerate() {
            let placement = match placements[i] {
                Some(p) => p,
                None => continue,
            };
            for reloc in &section.store.relocations {
                let target = builder.symbols.target(reloc.symbol)?;
                let target_placement = placements[target.section.index() as usize]
                    .ok_or_else(|| {
                        Error::Malformed(format!(
                            "relocation target section {:?} has no placement yet",
                            target.section
                        ))
                    })?;
                sites.push(PatchSite {
                    file_offset: placement.file_pos + reloc.offset,
                    site_rva: placement.rva + reloc.offset,
                    kind: reloc.kind,
                    target_rva: target_placement.rva + target.offset,
                });
            }
        }
        Ok(sites)
    }

    fn encode_edata(
        builder: &SectionBuilder,
        placements: &[Option<SectionPlacement>],
        edata_rva: u32,
    ) -> Result<Vec<u8>> {
        let mut resolved = Vec::with_capacity(builder.export_symbols.len());
        for export in &builder.export_symbols {
            let target = builder.symbols.target(export.symbol)?;
            let placement = placements[target.section.index() as usize].ok_or_else(|| {
                Error::Malformed(format!(
                    "export symbol {} has no placement yet",
                    export.name
                ))
            })?;
            resolved.push(ResolvedExport {
                name: export.name.clone(),
                ordinal: export.ordinal,
                rva: placement.rva + target.offset,
            });
        }
        let dll_name = builder.dll_name.clone().unwrap_or_default();
        ExportSectionEncoder::encode(&dll_name, &resolved, edata_rva, builder.export_policy)
    }

    fn resolve_headers(
        builder: &SectionBuilder,
        placements: &[Option<SectionPlacement>],
    ) -> Result<(u32, Option<crate::pe::clr::Cor20Header>, Option<u32>)> {
        let entry_point_rva = match builder.entry_point {
            Some(symbol) => {
                let target = builder.symbols.target(symbol)?;
                let placement = placements[target.section.index() as usize]
                    .expect("entry point section was laid out");
                placement.rva + target.offset
            }
            None => 0,
        };

        let cor_header = match builder.ready_to_run_header {
            Some((symbol, size)) => {
                let target = builder.symbols.target(symbol)?;
                let placement = placements[target.section.index() as usize]
                    .expect("R2R header section was laid out");
                let rva = placement.rva + target.offset;
                Some(crate::pe::clr::Cor20Header::for_ready_to_run(
                    entry_point_rva,
                    crate::pe::data_directories::DataDirectory::zeroed(),
                    crate::pe::data_directories::DataDirectory::new(rva, size),
                ))
            }
            None => None,
        };

        let cor_header_file_offset = match builder.cor_header_symbol {
            Some(symbol) => {
                let target = builder.symbols.target(symbol)?;
                let placement = placements[target.section.index() as usize]
                    .expect("cor header section was laid out");
                Some(placement.file_pos + target.offset)
            }
            None => None,
        };

        Ok((entry_point_rva, cor_header, cor_header_file_offset))
    }

    fn export_directory(
        builder: &SectionBuilder,
        placements: &[Option<SectionPlacement>],
    ) -> DataDirectory {
        match builder.find_section(".edata") {
            Some(idx) => match placements[idx.index() as usize] {
                Some(p) if p.virtual_size > 0 => DataDirectory::new(p.rva, p.virtual_size),
                _ => DataDirectory::zeroed(),
            },
            None => DataDirectory::zeroed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::object_data::ObjectData;
    use crate::pe::section_table::{
        IMAGE_SCN_CNT_CODE, IMAGE_SCN_CNT_INITIALIZED_DATA, IMAGE_SCN_MEM_EXECUTE,
    };

    #[test]
    fn two_sections_one_cross_reference_resolves_to_the_right_rva() {
        let mut builder = SectionBuilder::new();
        let text = builder
            .add_section(".text", IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE, 16)
            .unwrap();
        let rdata = builder
            .add_section(".rdata", IMAGE_SCN_CNT_INITIALIZED_DATA, 8)
            .unwrap();

        let target = builder.intern_symbol("table");
        builder
            .add_object_data(
                text,
                ObjectData::new(vec![0u8; 16]).relocate(4, target, RelocationKind::Dir64),
            )
            .unwrap();
        builder
            .add_object_data(rdata, ObjectData::new(vec![0u8; 8]).define("table", 0))
            .unwrap();

        let layout = Layouter::layout(&mut builder, 0x1000, 0x200, 0x400).unwrap();

        let text_placement = layout.placement(text).unwrap();
        let rdata_placement = layout.placement(rdata).unwrap();
        assert_eq!(text_placement.rva, 0x1000);
        assert_eq!(rdata_placement.rva, 0x2000);

        let site = layout
            .patch_sites
            .iter()
            .find(|s| s.kind == RelocationKind::Dir64)
            .unwrap();
        assert_eq!(site.site_rva, text_placement.rva + 4);
        assert_eq!(site.target_rva, rdata_placement.rva);
        assert_eq!(site.file_offset, text_placement.file_pos + 4);
    }

    #[test]
    fn rel32_relocation_needs_no_base_relocation_entry() {
        let mut builder = SectionBuilder::new();
        let text = builder
            .add_section(".text", IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE, 16)
            .unwrap();
        let callee = builder.intern_symbol("callee");
        builder
            .add_object_data(
                text,
                ObjectData::new(vec![0u8; 16])
                    .define("callee", 8)
                    .relocate(1, callee, RelocationKind::Rel32),
            )
            .unwrap();

        let layout = Layouter::layout(&mut builder, 0x1000, 0x200, 0x400).unwrap();
        let reloc_idx = builder.find_section(".reloc").unwrap();
        let reloc_placement = layout.placement(reloc_idx).unwrap();
        // Rel32 is position-independent: the synthesized .reloc section carries no entries.
        assert_eq!(reloc_placement.virtual_size, 0);
    }

    #[test]
    fn undefined_symbol_fails_layout() {
        let mut builder = SectionBuilder::new();
        let text = builder.add_section(".text", IMAGE_SCN_CNT_CODE, 16).unwrap();
        let missing = builder.intern_symbol("missing");
        builder
            .add_object_data(
                text,
                ObjectData::new(vec![0u8; 8]).relocate(0, missing, RelocationKind::HighLow),
            )
            .unwrap();
        assert!(Layouter::layout(&mut builder, 0x1000, 0x200, 0x400).is_err());
    }

    #[test]
    fn preexisting_reloc_section_must_already_be_last() {
        let mut builder = SectionBuilder::new();
        builder.add_section(".reloc", IMAGE_SCN_CNT_INITIALIZED_DATA, 4).unwrap();
        builder.add_section(".text", IMAGE_SCN_CNT_CODE, 16).unwrap();
        assert!(Layouter::layout(&mut builder, 0x1000, 0x200, 0x400).is_err());
    }

    #[test]
    fn export_symbols_synthesize_an_edata_section() {
        let mut builder = SectionBuilder::new();
        let text = builder
            .add_section(".text", IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE, 16)
            .unwrap();
        builder
            .add_object_data(text, ObjectData::new(vec![0u8; 16]).define("exported_fn", 0))
            .unwrap();
        let exported = builder.intern_symbol("exported_fn");
        builder.add_export_symbol("exported_fn", 1, exported).unwrap();
        builder.set_dll_name("test.dll").unwrap();

        let layout = Layouter::layout(&mut builder, 0x1000, 0x200, 0x400).unwrap();
        let edata_idx = builder.find_section(".edata").unwrap();
        let edata_placement = layout.placement(edata_idx).unwrap();
        assert!(edata_placement.virtual_size > 0);
    }
}
