/// Encode bridge: state machine, worker thread and counters.
pub mod bridge;
/// `ffmpeg`-backed MP4 session.
pub mod ffmpeg;
/// Encoder session contract and the in-memory session.
pub mod session;
