pub mod scheduler;

pub use scheduler::{EffectPlayback, EffectScheduler, PlaybackId};
