//! Section layout, symbol resolution and relocation patching for PE images.
//!
//! The pipeline runs in three stages: accumulate sections and object data via
//! [`builder::SectionBuilder`] while `Configuring`; freeze placement and
//! resolve every symbol/relocation/export via [`layout::Layouter::layout`];
//! then stream the resolved patches over an already-assembled image via
//! [`patch::Patcher::relocate_output_file`]. This crate never assembles the
//! PE envelope itself (DOS/COFF/optional headers, section table) — that
//! remains the caller's job, using [`section_table::SectionTable`] and
//! [`data_directories::DataDirectory`] to describe what it wrote.

pub mod builder;
pub mod clr;
pub mod data_directories;
pub mod export;
pub mod layout;
pub mod object_data;
pub mod options;
pub mod patch;
pub mod reloc;
pub mod section;
pub mod section_table;
pub mod symbol;
pub mod utils;

pub use builder::{BuilderState, SectionBuilder};
pub use export::{ExportSectionEncoder, ExportSymbol, ResolvedExport};
pub use layout::{Layout, Layouter, PatchSite};
pub use object_data::ObjectData;
pub use options::ExportPolicy;
pub use patch::Patcher;
pub use reloc::{RelocSectionEncoder, RelocationKind};
pub use section::{Section, SectionIndex, SectionPlacement};
pub use symbol::{SymbolId, SymbolTable, SymbolTarget};
