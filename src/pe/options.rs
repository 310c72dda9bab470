//! Configuration knobs exposed to callers, as opposed to data.

/// Controls the `time_date_stamp`/version fields written into the export
/// directory table by [`crate::pe::export::ExportSectionEncoder`].
///
/// The export directory format carries a build timestamp and a major/minor
/// version, neither of which this crate can derive on its own. Left
/// unspecified by the distilled requirements; resolved here as a policy the
/// caller opts into rather than a silent default baked into the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportPolicy {
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
}

impl Default for ExportPolicy {
    /// Zeroed fields, documented as the deterministic-build default: two
    /// builds from identical input produce byte-identical `.edata` content.
    fn default() -> Self {
        ExportPolicy {
            time_date_stamp: 0,
            major_version: 0,
            minor_version: 0,
        }
    }
}
