pub mod client;
pub mod journal;
pub mod normalize;

pub use client::{UpstreamClient, UpstreamCredentials};
