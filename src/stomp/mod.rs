// STOMP 1.2 framing spoken over the broker transport

pub mod frame;
pub mod protocol;

pub use frame::{Command, Frame, FrameDecoder, FrameError, Incoming};
pub use protocol::{Channel, HeartBeat, Subscription};
