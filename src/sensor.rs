use crate::api::ApiCommand;
use crate::cache::{CacheHandle, PayloadCache};
use crate::states;
use crate::transform;
use std::time::Duration;

/// How often payloads are fetched unless a sensor needs them faster.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);
/// Power readings feed control decisions elsewhere in the home, so they are
/// polled on a much shorter leash.
pub const SCAN_INTERVAL_POWER: Duration = Duration::from_secs(5);

pub const UNIT_WATT: &str = "W";
pub const UNIT_KILOWATT: &str = "kW";
pub const UNIT_PERCENTAGE: &str = "%";
pub const UNIT_MILLIVOLT: &str = "mV";
pub const UNIT_MILLIAMPERE: &str = "mA";
pub const UNIT_HERTZ: &str = "Hz";
pub const UNIT_DECIBEL_MILLIWATT: &str = "dBm";

/// The device family, determined once during setup by probing the API.
#[derive(Clone, Copy, PartialEq, Eq, Debug, clap::ValueEnum)]
pub enum DeviceCapability {
    /// A battery/inverter unit.
    Battery,
    /// A P1 utility meter reader dongle.
    MeterReader,
    /// Neither of the above; only base diagnostics apply.
    Unknown,
}

impl DeviceCapability {
    pub fn is_battery(self) -> bool {
        self == Self::Battery
    }

    pub fn is_meter_reader(self) -> bool {
        self == Self::MeterReader
    }
}

/// Semantic category of a sensor, in the hub's vocabulary.
#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize)]
#[derive(strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceClass {
    Battery,
    Current,
    Enum,
    Frequency,
    Power,
    SignalStrength,
    Voltage,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize)]
#[derive(strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StateClass {
    Measurement,
    Total,
    TotalIncreasing,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize)]
#[derive(strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityCategory {
    Diagnostic,
}

/// A published sensor value.
#[derive(Clone, Debug, PartialEq)]
pub enum StateValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl StateValue {
    /// Identity conversion for sensors without a transform.
    pub fn from_json(raw: &serde_json::Value) -> Option<Self> {
        match raw {
            serde_json::Value::Number(number) => number
                .as_i64()
                .map(Self::Int)
                .or_else(|| number.as_f64().map(Self::Float)),
            serde_json::Value::String(text) => Some(Self::Text(text.clone())),
            serde_json::Value::Bool(value) => Some(Self::Text(value.to_string())),
            _ => None,
        }
    }

    /// Renders the value for humans, honoring the sensor's display precision.
    ///
    /// Rounding happens only here; the published value keeps its full
    /// precision.
    pub fn display(&self, precision: Option<u8>) -> String {
        match (self, precision) {
            (Self::Float(value), Some(digits)) => {
                format!("{value:.prec$}", prec = usize::from(digits))
            }
            _ => self.to_string(),
        }
    }
}

impl std::fmt::Display for StateValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(value) => f.write_fmt(format_args!("{}", value)),
            Self::Float(value) => f.write_fmt(format_args!("{}", value)),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl serde::Serialize for StateValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::Text(value) => serializer.serialize_str(value),
        }
    }
}

/// Walks a dot-separated key/index path into a JSON payload.
pub fn lookup_path<'p>(
    payload: &'p serde_json::Value,
    path: &str,
) -> Option<&'p serde_json::Value> {
    let mut current = payload;
    for segment in path.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub type TransformFn = fn(&serde_json::Value) -> Option<StateValue>;

/// One exposed readable value: where it comes from, what it means and how to
/// present it.
///
/// Descriptors are constructed once during setup and never change afterwards.
pub struct SensorDescriptor {
    name: String,
    command: ApiCommand,
    path: String,
    device_class: Option<DeviceClass>,
    state_class: Option<StateClass>,
    unit: Option<&'static str>,
    transform: Option<TransformFn>,
    translation_key: Option<&'static str>,
    options: Option<Vec<&'static str>>,
    entity_category: Option<EntityCategory>,
    precision: Option<u8>,
    cache: CacheHandle,
}

/// Current reading of one sensor.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorState {
    pub available: bool,
    pub value: Option<StateValue>,
}

impl SensorState {
    fn unavailable() -> Self {
        Self { available: false, value: None }
    }
}

impl SensorDescriptor {
    pub fn builder(
        name: impl Into<String>,
        command: ApiCommand,
        path: impl Into<String>,
    ) -> SensorDescriptorBuilder {
        SensorDescriptorBuilder {
            name: name.into(),
            command,
            path: path.into(),
            device_class: None,
            state_class: None,
            unit: None,
            transform: None,
            translation_key: None,
            options: None,
            entity_category: None,
            precision: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> ApiCommand {
        self.command
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn device_class(&self) -> Option<DeviceClass> {
        self.device_class
    }

    pub fn state_class(&self) -> Option<StateClass> {
        self.state_class
    }

    pub fn unit(&self) -> Option<&'static str> {
        self.unit
    }

    pub fn translation_key(&self) -> Option<&'static str> {
        self.translation_key
    }

    pub fn options(&self) -> Option<&[&'static str]> {
        self.options.as_deref()
    }

    pub fn entity_category(&self) -> Option<EntityCategory> {
        self.entity_category
    }

    pub fn precision(&self) -> Option<u8> {
        self.precision
    }

    /// Topic/id-safe rendition of the sensor name.
    pub fn slug(&self) -> String {
        self.name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect()
    }

    /// When the payload backing this sensor was last fetched.
    pub fn data_fetched_at(&self) -> Option<jiff::Timestamp> {
        self.cache.fetched_at(self.command)
    }

    /// Produces the current reading from the cached payload.
    ///
    /// Synchronous and side-effect free: a missing payload, an unresolvable
    /// field path, a JSON null or a transform miss all read as unavailable,
    /// never as an error.
    pub fn refresh(&self) -> SensorState {
        let Some(payload) = self.cache.get_cached(self.command) else {
            return SensorState::unavailable();
        };
        let Some(raw) = lookup_path(&payload, &self.path) else {
            return SensorState::unavailable();
        };
        if raw.is_null() {
            return SensorState::unavailable();
        }
        let value = match self.transform {
            Some(transform) => transform(raw),
            None => StateValue::from_json(raw),
        };
        SensorState { available: value.is_some(), value }
    }
}

/// Builder for [`SensorDescriptor`]. Every optional attribute defaults to
/// absent.
pub struct SensorDescriptorBuilder {
    name: String,
    command: ApiCommand,
    path: String,
    device_class: Option<DeviceClass>,
    state_class: Option<StateClass>,
    unit: Option<&'static str>,
    transform: Option<TransformFn>,
    translation_key: Option<&'static str>,
    options: Option<Vec<&'static str>>,
    entity_category: Option<EntityCategory>,
    precision: Option<u8>,
}

impl SensorDescriptorBuilder {
    pub fn device_class(mut self, device_class: DeviceClass) -> Self {
        self.device_class = Some(device_class);
        self
    }

    pub fn state_class(mut self, state_class: StateClass) -> Self {
        self.state_class = Some(state_class);
        self
    }

    pub fn unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn transform(mut self, transform: TransformFn) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn translation_key(mut self, key: &'static str) -> Self {
        self.translation_key = Some(key);
        self
    }

    pub fn options(mut self, options: Vec<&'static str>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn diagnostic(mut self) -> Self {
        self.entity_category = Some(EntityCategory::Diagnostic);
        self
    }

    /// Display precision in decimal places. A rounding hint for presentation,
    /// not applied to the published value.
    pub fn precision(mut self, digits: u8) -> Self {
        self.precision = Some(digits);
        self
    }

    pub fn build(self, cache: CacheHandle) -> SensorDescriptor {
        SensorDescriptor {
            name: self.name,
            command: self.command,
            path: self.path,
            device_class: self.device_class,
            state_class: self.state_class,
            unit: self.unit,
            transform: self.transform,
            translation_key: self.translation_key,
            options: self.options,
            entity_category: self.entity_category,
            precision: self.precision,
            cache,
        }
    }
}

/// Declares the sensor set for a device family.
///
/// Pure: no scheduling happens here. [`assemble`] is the entry point that
/// also configures polling.
pub fn descriptors_for(capability: DeviceCapability, cache: CacheHandle) -> Vec<SensorDescriptor> {
    let mut sensors = Vec::new();

    sensors.push(
        SensorDescriptor::builder("WiFi RSSI", ApiCommand::NetworkStatus, "wifi_sta.rssi")
            .device_class(DeviceClass::SignalStrength)
            .state_class(StateClass::Measurement)
            .unit(UNIT_DECIBEL_MILLIWATT)
            .diagnostic()
            .build(cache.clone()),
    );

    match capability {
        DeviceCapability::Battery => {
            sensors.push(
                SensorDescriptor::builder(
                    "System State",
                    ApiCommand::PowerStatus,
                    "sessy.system_state",
                )
                .device_class(DeviceClass::Enum)
                .translation_key("battery_system_state")
                .transform(states::status_string_system_state)
                .options(states::system_state_options())
                .build(cache.clone()),
            );
            sensors.push(
                SensorDescriptor::builder(
                    "System State Details",
                    ApiCommand::PowerStatus,
                    "sessy.system_state_details",
                )
                .diagnostic()
                .build(cache.clone()),
            );
            sensors.push(
                SensorDescriptor::builder(
                    "State of Charge",
                    ApiCommand::PowerStatus,
                    "sessy.state_of_charge",
                )
                .device_class(DeviceClass::Battery)
                .state_class(StateClass::Measurement)
                .unit(UNIT_PERCENTAGE)
                .transform(transform::percentage_from_unit_interval)
                .precision(1)
                .build(cache.clone()),
            );
            sensors.push(
                SensorDescriptor::builder("Power", ApiCommand::PowerStatus, "sessy.power")
                    .device_class(DeviceClass::Power)
                    .state_class(StateClass::Measurement)
                    .unit(UNIT_WATT)
                    .build(cache.clone()),
            );
            sensors.push(
                SensorDescriptor::builder("Frequency", ApiCommand::PowerStatus, "sessy.frequency")
                    .device_class(DeviceClass::Frequency)
                    .state_class(StateClass::Measurement)
                    .unit(UNIT_HERTZ)
                    .transform(transform::base_unit_from_milli)
                    .precision(3)
                    .build(cache.clone()),
            );
            for phase in 1..=3 {
                sensors.push(
                    SensorDescriptor::builder(
                        format!("Renewable Energy Phase {phase} Voltage"),
                        ApiCommand::PowerStatus,
                        format!("renewable_energy_phase{phase}.voltage_rms"),
                    )
                    .device_class(DeviceClass::Voltage)
                    .state_class(StateClass::Measurement)
                    .unit(UNIT_MILLIVOLT)
                    .build(cache.clone()),
                );
                sensors.push(
                    SensorDescriptor::builder(
                        format!("Renewable Energy Phase {phase} Current"),
                        ApiCommand::PowerStatus,
                        format!("renewable_energy_phase{phase}.current_rms"),
                    )
                    .device_class(DeviceClass::Current)
                    .state_class(StateClass::Measurement)
                    .unit(UNIT_MILLIAMPERE)
                    .build(cache.clone()),
                );
                sensors.push(
                    SensorDescriptor::builder(
                        format!("Renewable Energy Phase {phase} Power"),
                        ApiCommand::PowerStatus,
                        format!("renewable_energy_phase{phase}.power"),
                    )
                    .device_class(DeviceClass::Power)
                    .state_class(StateClass::Measurement)
                    .unit(UNIT_WATT)
                    .build(cache.clone()),
                );
            }
        }
        DeviceCapability::MeterReader => {
            sensors.push(
                SensorDescriptor::builder("P1 Power", ApiCommand::P1Status, "net_power_delivered")
                    .device_class(DeviceClass::Power)
                    .state_class(StateClass::Measurement)
                    .unit(UNIT_KILOWATT)
                    .precision(3)
                    .build(cache.clone()),
            );
            sensors.push(
                SensorDescriptor::builder("P1 Status", ApiCommand::P1Status, "state")
                    .device_class(DeviceClass::Enum)
                    .translation_key("p1_state")
                    .transform(states::status_string_p1)
                    .options(states::p1_state_options())
                    .build(cache.clone()),
            );
        }
        DeviceCapability::Unknown => {}
    }

    sensors
}

/// Builds the full sensor set for a device and makes sure every payload the
/// set reads from is being polled.
///
/// Polling is configured before the dependent descriptors are constructed.
pub async fn assemble(
    capability: DeviceCapability,
    cache: &PayloadCache,
) -> Vec<SensorDescriptor> {
    cache
        .ensure_scheduled(ApiCommand::NetworkStatus, DEFAULT_SCAN_INTERVAL)
        .await;
    match capability {
        DeviceCapability::Battery => {
            cache
                .ensure_scheduled(ApiCommand::PowerStatus, SCAN_INTERVAL_POWER)
                .await;
        }
        DeviceCapability::MeterReader => {
            cache
                .ensure_scheduled(ApiCommand::P1Status, SCAN_INTERVAL_POWER)
                .await;
        }
        DeviceCapability::Unknown => {}
    }
    descriptors_for(capability, cache.handle())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache;
    use serde_json::json;

    fn battery_payload() -> serde_json::Value {
        json!({
            "sessy": {
                "system_state": "SYSTEM_STATE_RUNNING_SAFE",
                "system_state_details": "",
                "state_of_charge": 0.873,
                "power": -1500,
                "frequency": 49987
            },
            "renewable_energy_phase1": { "voltage_rms": 230123, "current_rms": 1520, "power": 350 },
            "renewable_energy_phase2": { "voltage_rms": 229845, "current_rms": 0, "power": 0 },
            "renewable_energy_phase3": { "voltage_rms": 230512, "current_rms": 880, "power": 202 }
        })
    }

    fn sensor_by_name<'s>(sensors: &'s [SensorDescriptor], name: &str) -> &'s SensorDescriptor {
        sensors
            .iter()
            .find(|sensor| sensor.name() == name)
            .unwrap_or_else(|| panic!("no sensor named {name:?}"))
    }

    #[test]
    fn capability_predicates() {
        assert!(DeviceCapability::Battery.is_battery());
        assert!(!DeviceCapability::Battery.is_meter_reader());
        assert!(DeviceCapability::MeterReader.is_meter_reader());
        assert!(!DeviceCapability::Unknown.is_battery());
        assert!(!DeviceCapability::Unknown.is_meter_reader());
    }

    #[test]
    fn path_lookup() {
        let payload = json!({"wifi_sta": {"rssi": -61}, "phases": [{"power": 12}]});
        assert_eq!(lookup_path(&payload, "wifi_sta.rssi"), Some(&json!(-61)));
        assert_eq!(lookup_path(&payload, "phases.0.power"), Some(&json!(12)));
        assert_eq!(lookup_path(&payload, "wifi_sta.ssid"), None);
        assert_eq!(lookup_path(&payload, "wifi_sta.rssi.deeper"), None);
        assert_eq!(lookup_path(&payload, "phases.7.power"), None);
    }

    #[test]
    fn battery_sensor_set() {
        let sensors = descriptors_for(DeviceCapability::Battery, CacheHandle::detached());
        assert_eq!(sensors.len(), 15);
        let names = sensors.iter().map(|s| s.name().to_string()).collect::<Vec<_>>();
        for expected in ["WiFi RSSI", "System State", "State of Charge", "Power", "Frequency"] {
            assert!(names.iter().any(|name| name == expected), "missing {expected}");
        }
        for suffix in ["Voltage", "Current"] {
            let count = names.iter().filter(|name| name.ends_with(suffix)).count();
            assert_eq!(count, 3, "expected three phase {suffix} sensors");
        }
        for phase in 1..=3 {
            assert!(names.contains(&format!("Renewable Energy Phase {phase} Power")));
        }
    }

    #[test]
    fn meter_sensor_set() {
        let sensors = descriptors_for(DeviceCapability::MeterReader, CacheHandle::detached());
        let names = sensors.iter().map(|s| s.name()).collect::<Vec<_>>();
        assert_eq!(names, vec!["WiFi RSSI", "P1 Power", "P1 Status"]);
    }

    #[test]
    fn unknown_capability_gets_base_diagnostics_only() {
        let sensors = descriptors_for(DeviceCapability::Unknown, CacheHandle::detached());
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].name(), "WiFi RSSI");
        assert_eq!(sensors[0].entity_category(), Some(EntityCategory::Diagnostic));
    }

    #[test]
    fn refresh_without_payload_is_unavailable() {
        let sensors = descriptors_for(DeviceCapability::Battery, CacheHandle::detached());
        let state = sensor_by_name(&sensors, "State of Charge").refresh();
        assert_eq!(state, SensorState { available: false, value: None });
    }

    #[test]
    fn refresh_with_unresolvable_path_is_unavailable() {
        let handle = cache::test_handle(&[(ApiCommand::PowerStatus, json!({"sessy": {}}))]);
        let sensors = descriptors_for(DeviceCapability::Battery, handle);
        let state = sensor_by_name(&sensors, "Power").refresh();
        assert!(!state.available);
        assert_eq!(state.value, None);
    }

    #[test]
    fn refresh_with_null_field_is_unavailable() {
        let handle = cache::test_handle(&[(
            ApiCommand::PowerStatus,
            json!({"sessy": {"power": null}}),
        )]);
        let sensors = descriptors_for(DeviceCapability::Battery, handle);
        assert!(!sensor_by_name(&sensors, "Power").refresh().available);
    }

    #[test]
    fn state_of_charge_rounds_for_display_only() {
        let handle = cache::test_handle(&[(ApiCommand::PowerStatus, battery_payload())]);
        let sensors = descriptors_for(DeviceCapability::Battery, handle);
        let sensor = sensor_by_name(&sensors, "State of Charge");
        let state = sensor.refresh();
        assert!(state.available);
        let value = state.value.expect("state of charge should have a value");
        let StateValue::Float(number) = &value else {
            panic!("state of charge should be a float");
        };
        assert!((number - 87.3).abs() < 1e-9);
        assert_eq!(value.display(sensor.precision()), "87.3");
    }

    #[test]
    fn power_and_frequency_readings() {
        let handle = cache::test_handle(&[(ApiCommand::PowerStatus, battery_payload())]);
        let sensors = descriptors_for(DeviceCapability::Battery, handle);
        let state = sensor_by_name(&sensors, "Power").refresh();
        assert_eq!(state.value, Some(StateValue::Int(-1500)));
        let state = sensor_by_name(&sensors, "Frequency").refresh();
        assert_eq!(state.value, Some(StateValue::Float(49.987)));
    }

    #[test]
    fn enum_sensor_publishes_labels() {
        let handle = cache::test_handle(&[(ApiCommand::PowerStatus, battery_payload())]);
        let sensors = descriptors_for(DeviceCapability::Battery, handle);
        let sensor = sensor_by_name(&sensors, "System State");
        assert_eq!(
            sensor.refresh().value,
            Some(StateValue::Text("running-safe".to_string()))
        );
        let options = sensor.options().unwrap();
        assert!(options.contains(&"running-safe"));
    }

    #[test]
    fn meter_power_reading() {
        let handle = cache::test_handle(&[(
            ApiCommand::P1Status,
            json!({"net_power_delivered": 1.204, "state": "P1_OK"}),
        )]);
        let sensors = descriptors_for(DeviceCapability::MeterReader, handle);
        let power = sensor_by_name(&sensors, "P1 Power");
        assert_eq!(power.refresh().value, Some(StateValue::Float(1.204)));
        assert_eq!(power.unit(), Some(UNIT_KILOWATT));
        assert_eq!(power.precision(), Some(3));
        let status = sensor_by_name(&sensors, "P1 Status");
        assert_eq!(status.refresh().value, Some(StateValue::Text("ok".to_string())));
    }

    #[test]
    fn slugs_are_topic_safe() {
        let sensors = descriptors_for(DeviceCapability::Battery, CacheHandle::detached());
        assert_eq!(sensor_by_name(&sensors, "WiFi RSSI").slug(), "wifi_rssi");
        assert_eq!(
            sensor_by_name(&sensors, "Renewable Energy Phase 1 Voltage").slug(),
            "renewable_energy_phase_1_voltage"
        );
    }
}
