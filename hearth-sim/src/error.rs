use hearth_core::DeviceId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid band for {parameter}: min {min} is greater than max {max}")]
    InvalidBand {
        parameter: String,
        min: f64,
        max: f64,
    },
    #[error("device {0} is not registered with the simulator")]
    DeviceNotRegistered(DeviceId),
    #[error("device {0} is not known to the registry")]
    UnknownDevice(DeviceId),
}
