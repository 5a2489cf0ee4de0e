pub mod metrics;
pub mod tail;
pub mod weights;
