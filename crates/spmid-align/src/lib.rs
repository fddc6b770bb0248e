//! Diagnostic time alignment (C3, §4.3) and after-touch curve alignment
//! (C6, §4.6), both built on a shared generic DTW implementation.

pub mod curve_aligner;
pub mod dtw;
pub mod time_aligner;

pub use curve_aligner::{align, CurveAlignError, CurveAlignerConfig, CurveAlignmentResult};
pub use dtw::{dtw, dtw_banded, DistanceMetric, DtwError, DtwResult};
pub use time_aligner::{compute_global_time_offset, TimeAlignmentDiagnostics};
