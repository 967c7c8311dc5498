mod heartbeat;

pub use heartbeat::{HeartbeatConfig, HeartbeatExit, HeartbeatMonitor, LivenessState};
