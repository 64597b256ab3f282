//! Session Registry

mod registry;

pub use registry::SessionRegistry;
