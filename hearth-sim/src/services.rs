use std::sync::Arc;

use crate::calibration::CalibrationService;
use crate::clock::Clock;
use crate::config::Config;
use crate::notification::{NotificationManager, NotificationSink, RecipientChannel};
use crate::processor::DataProcessor;
use crate::threshold::ThresholdManager;

/// The pipeline services, constructed once and shared by the simulator and
/// the query surface.
#[derive(Clone)]
pub struct Services {
    pub clock: Arc<dyn Clock>,
    pub calibration: Arc<CalibrationService>,
    pub thresholds: Arc<ThresholdManager>,
    pub notifications: Arc<NotificationManager>,
    pub processor: Arc<DataProcessor>,
}

impl Services {
    pub fn new(
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
        recipients: Arc<dyn RecipientChannel>,
    ) -> Self {
        let notifications = NotificationManager::new(clock.clone(), sink, recipients);
        Self::assemble(clock, notifications)
    }

    /// Services with the notification and calibration settings of `config`
    /// applied.
    pub fn from_config(
        config: &Config,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
        recipients: Arc<dyn RecipientChannel>,
    ) -> Self {
        let notifications = NotificationManager::new(clock.clone(), sink, recipients)
            .with_history_limit(config.notifications.history_limit)
            .with_defaults(config.notifications.device_defaults());
        let services = Self::assemble(clock, notifications);

        for (kind, calibration) in &config.calibration {
            services.calibration.set_config(*kind, calibration.clone());
        }

        services
    }

    fn assemble(clock: Arc<dyn Clock>, notifications: NotificationManager) -> Self {
        let notifications = Arc::new(notifications);
        let thresholds = Arc::new(ThresholdManager::new());
        let calibration = Arc::new(CalibrationService::new(clock.clone()));
        let processor = Arc::new(DataProcessor::new(
            thresholds.clone(),
            notifications.clone(),
            clock.clone(),
        ));

        Self {
            clock,
            calibration,
            thresholds,
            notifications,
            processor,
        }
    }
}
