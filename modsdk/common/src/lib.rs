pub use api::{HostFault, ObjectRef, Placement, Quat, Value, Vec3};

mod config;
mod retry;

pub use config::{load_config, LoaderConfig, ResolverConfig, SdkConfig, SDK_VERSION};
pub use retry::{Attempt, Finished, RetryPolicy, RetryScheduler};
