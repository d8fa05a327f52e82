pub mod controller;

pub use controller::{MusicController, MusicSession, MusicSettings};
