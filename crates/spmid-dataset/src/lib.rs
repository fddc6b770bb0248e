//! Algorithm Dataset, Multi-Algorithm Registry, and Track Comparator
//! (C7/C8/C9, §4.7, §4.9), grounded on the original `multi_algorithm_manager.py`
//! (`AlgorithmDataset`/`MultiAlgorithmManager`) and on the shared
//! grade-threshold classifier in `spmid-match`.

pub mod comparator;
pub mod dataset;
pub mod registry;

pub use comparator::{compare_tracks, ComparisonPair, ComparisonResult, ComparisonRow, GradeCount, UnmatchedNote};
pub use dataset::{generate_algorithm_name, AlgorithmDataset, AlgorithmMetadata, AlgorithmStatisticsSnapshot, AlgorithmStatus};
pub use registry::{AlgorithmRegistry, RegistryConfig, RegistryError};
