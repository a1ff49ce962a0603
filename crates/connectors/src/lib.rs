pub mod chat;
pub mod error;
pub mod file;
pub mod gcp;
pub mod hash;
pub mod http;
pub mod object_store;
pub mod source;
pub mod warehouse;
