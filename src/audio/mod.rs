pub mod mixer;

pub use mixer::{AudioMixGraph, AudioMixer, MixInput, MixReport, MixerConfig};
