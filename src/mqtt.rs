use crate::sensor::{DeviceClass, EntityCategory, SensorDescriptor, StateClass};
use rumqttc::v5::mqttbytes::QoS;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not serialize the discovery config for `{1}`")]
    SerializeConfig(#[source] serde_json::Error, String),
    #[error("could not publish to the MQTT broker")]
    Publish(#[source] rumqttc::v5::ClientError),
}

/// Home Assistant MQTT discovery record for one sensor.
///
/// Fields follow the `homeassistant/sensor/.../config` schema; absent
/// attributes are omitted from the payload entirely.
#[derive(serde::Serialize)]
pub struct DiscoveryConfig<'a> {
    pub name: &'a str,
    pub unique_id: String,
    pub state_topic: String,
    pub availability_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<DeviceClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<StateClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_display_precision: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<EntityCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<&'a [&'static str]>,
    pub device: DeviceInfo<'a>,
}

#[derive(serde::Serialize)]
pub struct DeviceInfo<'a> {
    pub identifiers: [&'a str; 1],
    pub name: &'a str,
    pub manufacturer: &'static str,
}

/// Registers sensors with the hub over MQTT discovery and keeps their states
/// published.
pub struct Bridge {
    mqtt: rumqttc::v5::AsyncClient,
    discovery_prefix: String,
    device_id: String,
}

impl Bridge {
    pub fn new(
        mqtt: rumqttc::v5::AsyncClient,
        discovery_prefix: String,
        device_id: String,
    ) -> Self {
        Self { mqtt, discovery_prefix, device_id }
    }

    fn state_topic(&self, slug: &str) -> String {
        format!("sessy/{}/{slug}/state", self.device_id)
    }

    fn availability_topic(&self, slug: &str) -> String {
        format!("sessy/{}/{slug}/availability", self.device_id)
    }

    fn config_topic(&self, slug: &str) -> String {
        format!("{}/sensor/{}/{slug}/config", self.discovery_prefix, self.device_id)
    }

    pub fn discovery_config<'a>(&'a self, sensor: &'a SensorDescriptor) -> DiscoveryConfig<'a> {
        let slug = sensor.slug();
        DiscoveryConfig {
            name: sensor.name(),
            unique_id: format!("{}_{slug}", self.device_id),
            state_topic: self.state_topic(&slug),
            availability_topic: self.availability_topic(&slug),
            device_class: sensor.device_class(),
            state_class: sensor.state_class(),
            unit_of_measurement: sensor.unit(),
            suggested_display_precision: sensor.precision(),
            entity_category: sensor.entity_category(),
            options: sensor.options(),
            device: DeviceInfo {
                identifiers: [&self.device_id],
                name: &self.device_id,
                manufacturer: "Charged B.V.",
            },
        }
    }

    /// Registers the full sensor set with the hub.
    ///
    /// Called exactly once per bridge session, before any states are
    /// published. Configs are retained so the hub rediscovers the sensors
    /// after its own restarts.
    pub async fn announce(&self, sensors: &[SensorDescriptor]) -> Result<(), Error> {
        for sensor in sensors {
            let config = self.discovery_config(sensor);
            let payload = serde_json::to_vec(&config)
                .map_err(|e| Error::SerializeConfig(e, sensor.name().to_string()))?;
            self.mqtt
                .publish(self.config_topic(&sensor.slug()), QoS::AtLeastOnce, true, payload)
                .await
                .map_err(Error::Publish)?;
            tracing::debug!(sensor = sensor.name(), "announced sensor");
        }
        tracing::info!(count = sensors.len(), "sensor set registered with the hub");
        Ok(())
    }

    /// Refreshes every sensor from the cache and publishes availability plus,
    /// when available, the current value.
    pub async fn publish_states(&self, sensors: &[SensorDescriptor]) -> Result<(), Error> {
        for sensor in sensors {
            let state = sensor.refresh();
            let slug = sensor.slug();
            let availability = if state.available { "online" } else { "offline" };
            self.mqtt
                .publish(self.availability_topic(&slug), QoS::AtLeastOnce, true, availability)
                .await
                .map_err(Error::Publish)?;
            if let Some(value) = &state.value {
                self.mqtt
                    .publish(self.state_topic(&slug), QoS::AtLeastOnce, false, value.to_string())
                    .await
                    .map_err(Error::Publish)?;
            }
        }
        Ok(())
    }
}
