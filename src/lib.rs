pub mod archive;
pub mod edition;
pub mod engine;
pub mod error;
pub mod http;
pub mod library;
pub mod locking;
pub mod paths;
pub mod requests;
pub mod runtime;
pub mod version;
