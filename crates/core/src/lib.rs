//! Domain logic shared by the fleet center, transcode worker and device agent.
//!
//! Nothing in here touches the database or the network; everything is a
//! pure function of its inputs so the policies can be unit-tested directly.

pub mod config;
pub mod device;
pub mod error;
pub mod ffmpeg;
pub mod task;
pub mod transcode;
pub mod types;
