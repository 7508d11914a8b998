pub mod channels;
mod fetcher;
mod normalize;
pub mod sample;
pub mod timestamp;

pub use fetcher::{SampleFetcher, SampleStore};
pub use normalize::{normalize, normalize_raw, NormalizeContext};
pub use sample::{RawSample, Reading, SensorSample, SENTINEL};
pub use timestamp::SampleTime;
