//! Applications and their process-wide registry.

mod application;
mod registry;

pub use application::{Application, DeployContext, LifecycleState};
pub use registry::AppRegistry;
