#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Self-contained analytic primitives consumed by the serving layer.
//!
//! Both entry points are pure, synchronous, single-pass transforms:
//! [`select_top_k`] keeps the K largest records by a caller-supplied key
//! in O(K) auxiliary memory, and [`detect_anomalies`] flags m-sigma
//! deviations from a running mean in one forward pass. Neither buffers
//! its full input, and both are order-dependent, so they must not be
//! parallelized.

pub mod anomaly;
pub mod top_k;

pub use anomaly::{AnomalyFlag, RunningMoments, detect_anomalies};
pub use top_k::select_top_k;
