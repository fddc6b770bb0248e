//! Delay metrics over matched note pairs (C5, §4.5): aggregate and
//! per-key descriptive statistics plus an opt-in inferential report.

pub mod descriptive;
pub mod inferential;

pub use descriptive::{descriptive_stats, per_key_stats, DelayMetrics, DescriptiveStats};
pub use inferential::{
    compute_inferential_report, AnomalyKey, AnomalySign, AnovaResult, CorrelationResult,
    CorrelationStrength, InferentialReport, LinearRegression, QuadraticRegression, TukeyHsdPair,
};
