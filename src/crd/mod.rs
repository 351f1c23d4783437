mod hosted_cluster;
mod hosted_control_plane;
mod node_pool;

pub use hosted_cluster::*;
pub use hosted_control_plane::*;
pub use node_pool::*;
