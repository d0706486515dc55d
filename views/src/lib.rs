pub mod config;
pub mod registry;
pub mod source;
pub mod supervisor;

pub use config::ViewsConfig;
pub use registry::{Parsed, Rendered, Views};
pub use source::ViewSource;
pub use supervisor::ViewSupervisor;
