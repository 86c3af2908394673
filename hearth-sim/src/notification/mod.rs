pub mod sink;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use hearth_core::{
    AlertId, AlertLevel, AlertRecord, AlertThreshold, Band, DeviceId, Notification,
    NotificationConfig,
};
use tracing::{debug, info};
use ulid::Ulid;

use crate::clock::{self, Clock};

pub use sink::{ChannelSink, NotificationSink, RecipientChannel, TracingSink};

pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const FIRST_NOTIFICATION_ID: u32 = 1000;

/// Result of offering an alert to the notification manager.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    /// The device has no notification config, or notifications are off.
    Disabled,
    /// The cooldown policy held the alert back.
    Suppressed { level: AlertLevel },
    /// The alert was recorded and handed to the sink.
    Dispatched(AlertRecord),
}

impl AlertOutcome {
    pub fn level(&self) -> Option<AlertLevel> {
        match self {
            AlertOutcome::Disabled => None,
            AlertOutcome::Suppressed { level } => Some(*level),
            AlertOutcome::Dispatched(record) => Some(record.level),
        }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self, AlertOutcome::Dispatched(_))
    }
}

/// Rate-limits alerts per device, keeps a bounded history and fans
/// dispatched alerts out to the platform sink and configured recipients.
pub struct NotificationManager {
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    recipients: Arc<dyn RecipientChannel>,
    configs: DashMap<DeviceId, NotificationConfig>,
    defaults: NotificationConfig,
    history: DashMap<DeviceId, VecDeque<AlertRecord>>,
    history_limit: usize,
    next_id: AtomicU32,
}

impl NotificationManager {
    pub fn new(
        clock: Arc<dyn Clock>,
        sink: Arc<dyn NotificationSink>,
        recipients: Arc<dyn RecipientChannel>,
    ) -> Self {
        Self {
            clock,
            sink,
            recipients,
            configs: DashMap::new(),
            defaults: NotificationConfig::default(),
            history: DashMap::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            next_id: AtomicU32::new(FIRST_NOTIFICATION_ID),
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Config handed out to devices that have not been configured explicitly.
    pub fn with_defaults(mut self, defaults: NotificationConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Classify `value` against `band` and dispatch the alert unless the
    /// device's cooldown holds it back. Critical alerts bypass the cooldown.
    pub fn send_alert(
        &self,
        device_id: &DeviceId,
        parameter: &str,
        value: f64,
        unit: &str,
        band: Band,
    ) -> AlertOutcome {
        let Some(config) = self.configs.get(device_id).map(|config| config.clone()) else {
            debug!(device_id = %device_id, parameter, "No notification config, skipping alert");
            return AlertOutcome::Disabled;
        };
        if !config.enabled {
            debug!(device_id = %device_id, parameter, "Notifications disabled, skipping alert");
            return AlertOutcome::Disabled;
        }

        let level = AlertLevel::from(band.classify(value));
        let now = self.clock.now();

        let record = {
            let mut history = self.history.entry(device_id.clone()).or_default();

            let permitted = match history.back() {
                None => true,
                Some(last) => {
                    level == AlertLevel::Critical
                        || clock::has_elapsed(last.timestamp, now, config.cooldown)
                }
            };
            if !permitted {
                debug!(
                    device_id = %device_id,
                    parameter,
                    level = %level,
                    "Alert suppressed by cooldown"
                );
                return AlertOutcome::Suppressed { level };
            }

            let record = AlertRecord {
                id: AlertId(Ulid::new()),
                device_id: device_id.clone(),
                parameter: parameter.into(),
                value,
                unit: unit.into(),
                level,
                timestamp: now,
            };
            history.push_back(record.clone());
            while history.len() > self.history_limit {
                history.pop_front();
            }
            record
        };

        info!(
            device_id = %device_id,
            parameter,
            value,
            level = %level,
            "Dispatching alert"
        );

        self.notify(&config, &record);
        self.notify_recipients(&config, &record);

        AlertOutcome::Dispatched(record)
    }

    fn notify(&self, config: &NotificationConfig, record: &AlertRecord) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sink.dispatch(Notification {
            id,
            title: format!("Alert: {} sensor", record.parameter),
            message: format!(
                "Value: {:.2} {} - Level: {}",
                record.value, record.unit, record.level
            ),
            priority: config.priority,
            vibration: config.vibration,
            sound: config.sound,
        });
    }

    fn notify_recipients(&self, config: &NotificationConfig, record: &AlertRecord) {
        if config.recipients.is_empty() {
            return;
        }

        let message = format!(
            "Sensor Alert:\nDevice: {}\nParameter: {}\nValue: {:.2} {}\nLevel: {}",
            record.device_id, record.parameter, record.value, record.unit, record.level
        );
        for recipient in &config.recipients {
            self.recipients.deliver(recipient, &message);
        }
    }

    pub fn set_config(&self, device_id: &DeviceId, config: NotificationConfig) {
        self.configs.insert(device_id.clone(), config);
    }

    /// The device's config, or the defaults if none has been stored.
    pub fn config(&self, device_id: &DeviceId) -> NotificationConfig {
        self.configs
            .get(device_id)
            .map(|config| config.clone())
            .unwrap_or_else(|| self.defaults.clone())
    }

    pub fn has_config(&self, device_id: &DeviceId) -> bool {
        self.configs.contains_key(device_id)
    }

    /// Store the default config unless one already exists.
    pub fn ensure_config(&self, device_id: &DeviceId) {
        self.configs
            .entry(device_id.clone())
            .or_insert_with(|| self.defaults.clone());
    }

    /// Mutate the device's config in place, creating it with defaults first.
    pub fn update_config(&self, device_id: &DeviceId, f: impl FnOnce(&mut NotificationConfig)) {
        let mut config = self
            .configs
            .entry(device_id.clone())
            .or_insert_with(|| self.defaults.clone());
        f(config.value_mut());
    }

    pub fn add_recipient(&self, device_id: &DeviceId, recipient: &str) {
        self.update_config(device_id, |config| config.recipients.push(recipient.to_owned()));
    }

    pub fn remove_recipient(&self, device_id: &DeviceId, recipient: &str) {
        if let Some(mut config) = self.configs.get_mut(device_id) {
            config.recipients.retain(|r| r != recipient);
        }
    }

    pub fn set_alert_threshold(
        &self,
        device_id: &DeviceId,
        parameter: &str,
        threshold: AlertThreshold,
    ) {
        self.update_config(device_id, |config| {
            config.thresholds.insert(parameter.to_owned(), threshold);
        });
    }

    pub fn alert_threshold(&self, device_id: &DeviceId, parameter: &str) -> Option<AlertThreshold> {
        self.configs.get(device_id)?.thresholds.get(parameter).cloned()
    }

    /// Dispatched alerts for the device, oldest first.
    pub fn alert_history(&self, device_id: &DeviceId) -> Vec<AlertRecord> {
        self.history
            .get(device_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear_history(&self, device_id: &DeviceId) {
        self.history.remove(device_id);
    }

    pub fn clear_all_history(&self) {
        self.history.clear();
    }
}
