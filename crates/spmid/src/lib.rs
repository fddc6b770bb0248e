//! Top-level orchestration of the SPMID analysis pipeline: binary
//! decoding (C1) through note filtering (C2), time alignment (C3), note
//! matching (C4), metrics (C5), curve alignment (C6), the algorithm
//! dataset/registry (C7/C8), the persistence store (C9), and the track
//! comparator (C10).
//!
//! CLI entry points, report rendering, and the interactive UI are
//! explicitly out of scope (§1) — this crate is a library other
//! front ends wire into.

pub mod logging;
pub mod pipeline;

pub use pipeline::{
    analyze, build_dataset, compare_against_baseline, decode_tracks, registry_from_config, AnalysisOutcome,
    PipelineOptions,
};

pub use spmid_config::SpmidConfig;
pub use spmid_dataset::{AlgorithmDataset, AlgorithmRegistry};
pub use spmid_store::PersistenceStore;
