pub mod acquisition;
pub mod backend;
pub mod constraints;
pub mod frames;
pub mod mic;
pub mod sources;

pub use acquisition::{AcquisitionOutcome, MediaAcquisition, MediaStreamHandle};
pub use backend::DeviceBackend;
pub use constraints::{AudioConstraints, MediaConstraints, VideoConstraints};
pub use frames::FramePipe;
pub use mic::MicLevelSource;
pub use sources::{AudioChunk, AudioLevelSource, CapturedFrame, FrameSource, MediaBackend, MediaError};
