pub mod wire;
pub mod size;
pub mod encoder;
pub mod decoder;
pub mod instance;

pub use decoder::{
    decode, decode_with, instance_info, load, load_size, load_with, prepare, InstanceInfo,
    PreparedLoad,
};
pub use encoder::store;
pub use instance::{InstanceRef, LoadedInstance};
pub use size::measure;
