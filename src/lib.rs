pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod grpc;
pub mod keys;
pub mod model;
pub mod name;
pub mod pagination;
pub mod revision;
pub mod service;
pub mod storage;

pub mod proto {
    tonic::include_proto!("registry.v1");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/registry_descriptor.bin"));
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
