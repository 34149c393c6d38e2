mod orchestrator;

pub use orchestrator::{MotionConfig, MotionOrchestrator};
