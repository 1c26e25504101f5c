pub mod clientset;
pub mod resource;
pub mod transport;

pub use clientset::{NetattachClient, NetworksGetter};
pub use resource::ResourceClient;
