pub mod autoscaler;
pub mod capi;
pub mod common;
pub mod control_plane_operator;
pub mod hosted_control_plane;
pub mod mirror;
pub mod namespace;
pub mod node_pool;
pub mod operand;

pub use common::{
    API_VERSION, FIELD_MANAGER, FINALIZER, HOSTED_CLUSTER_ANNOTATION, KIND, owner_reference,
    standard_labels,
};
