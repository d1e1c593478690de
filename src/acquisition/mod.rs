pub mod history;
pub mod rotation;
pub mod scheduler;
pub mod snapshot;

pub use history::HistoryRingBuffer;
pub use rotation::{RotationPollerTask, RotationRateEstimator, WindGauge};
pub use scheduler::AcquisitionScheduler;
pub use snapshot::SharedSnapshot;
