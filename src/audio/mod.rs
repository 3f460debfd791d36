//! Audio primitives shared by capture and playback

mod bus;
mod clock;
pub mod codec;
mod session;
mod wav;

pub use bus::{AudioBus, BusLevel};
pub use clock::{AudioClock, FrameClock, ManualClock};
pub use codec::{AudioChunk, EncodedBlob, decode, encode, encode_with_rate, render_to_audio_buffer};
pub use session::AudioSession;
pub use wav::pcm_to_wav;
