/// Viral genome binning pipeline definition
pub mod viral_binning;

/// Metagenomic coassembly pipeline definition
pub mod coassembly;
