//! Backend discovery: detect which serving protocol is reachable and list its models.

mod catalog;
mod detect;

pub use catalog::{human_size, infer_family, ModelCatalog, ModelInfo};
pub use detect::{
    BackendConnector, BackendDescriptor, BackendFlavor, BackendRegistry, DetectOptions,
    HostedProvider, UnknownFlavor,
};
