//! HTTP plumbing shared by the release provider, repository client, and
//! updating edition provider.

mod client;

pub use client::{HttpClient, HttpError};
