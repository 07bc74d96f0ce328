//! media-normalizer
//!
//! Probes a source media file, resolves encoding parameters from presets,
//! caller overrides and an optional recommender, runs ffmpeg and validates
//! the result.

pub mod cli;
pub mod codec;
pub mod config;
pub mod encode_spec;
pub mod error;
pub mod executor;
pub mod media;
pub mod quality;
pub mod recommend;
pub mod resolve;
pub mod workflow;
