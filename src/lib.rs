pub mod config;
pub mod error;
pub mod events;
pub mod playback;
pub mod scan;
pub mod stream;
pub mod tasks {
    pub mod batch;
    pub mod scanner;
    pub mod sequencer;
}
