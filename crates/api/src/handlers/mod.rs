pub mod accounts;
pub mod devices;
pub mod materials;
pub mod messages;
pub mod tasks;
pub mod transcode;
