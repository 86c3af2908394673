pub mod api;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod error;
pub mod notification;
pub mod physics;
pub mod processor;
pub mod registry;
pub mod services;
pub mod simulator;
pub mod threshold;

pub use calibration::CalibrationService;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, DeviceConfig, NotificationsConfig, ServerConfig, SimulatorConfig};
pub use error::{Error, Result};
pub use notification::{
    AlertOutcome, ChannelSink, NotificationManager, NotificationSink, RecipientChannel, TracingSink,
};
pub use processor::{Ambient, DataProcessor, ProcessOutcome};
pub use registry::{DeviceRegistry, InMemoryDeviceRegistry};
pub use services::Services;
pub use simulator::{Simulator, SimulatorEvent};
pub use threshold::ThresholdManager;
