use crate::sensor::StateValue;
use crate::transform::enum_to_options_list;

/// Label published for status codes this tool does not know about.
///
/// Newer device firmware occasionally grows states before this table learns
/// about them. Such readings stay available under this label.
pub const FALLBACK_LABEL: &str = "unknown";

/// Operating states reported by the battery in the power status payload.
///
/// The wire codes are the `SYSTEM_STATE_*` strings the firmware puts into the
/// `sessy.system_state` field.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[derive(strum::EnumString, strum::IntoStaticStr, strum::VariantArray)]
pub enum SystemState {
    #[strum(serialize = "SYSTEM_STATE_INIT", to_string = "init")]
    Init,
    #[strum(serialize = "SYSTEM_STATE_WAIT_FOR_PERIPHERALS", to_string = "wait-for-peripherals")]
    WaitForPeripherals,
    #[strum(serialize = "SYSTEM_STATE_STANDBY", to_string = "standby")]
    Standby,
    #[strum(serialize = "SYSTEM_STATE_WAITING_FOR_SAFE_SITUATION", to_string = "waiting-for-safe-situation")]
    WaitingForSafeSituation,
    #[strum(serialize = "SYSTEM_STATE_WAITING_IN_SAFE_SITUATION", to_string = "waiting-in-safe-situation")]
    WaitingInSafeSituation,
    #[strum(serialize = "SYSTEM_STATE_RUNNING_SAFE", to_string = "running-safe")]
    RunningSafe,
    #[strum(serialize = "SYSTEM_STATE_OVERRIDE_OVERFREQUENCY", to_string = "override-overfrequency")]
    OverrideOverfrequency,
    #[strum(serialize = "SYSTEM_STATE_OVERRIDE_UNDERFREQUENCY", to_string = "override-underfrequency")]
    OverrideUnderfrequency,
    #[strum(serialize = "SYSTEM_STATE_DISCONNECT", to_string = "disconnect")]
    Disconnect,
    #[strum(serialize = "SYSTEM_STATE_RECONNECTING", to_string = "reconnecting")]
    Reconnecting,
    #[strum(serialize = "SYSTEM_STATE_BATTERY_FULL", to_string = "battery-full")]
    BatteryFull,
    #[strum(serialize = "SYSTEM_STATE_BATTERY_EMPTY", to_string = "battery-empty")]
    BatteryEmpty,
    #[strum(serialize = "SYSTEM_STATE_ERROR", to_string = "error")]
    Error,
}

/// Connection states reported by the P1 dongle in the meter status payload.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[derive(strum::EnumString, strum::IntoStaticStr, strum::VariantArray)]
pub enum P1State {
    #[strum(serialize = "P1_OK", to_string = "ok")]
    Ok,
    #[strum(serialize = "P1_WAITING_FOR_METER", to_string = "waiting-for-meter")]
    WaitingForMeter,
    #[strum(serialize = "P1_ERROR", to_string = "error")]
    Error,
}

pub fn system_state_options() -> Vec<&'static str> {
    enum_to_options_list::<SystemState>(|state| <&'static str>::from(state))
}

pub fn p1_state_options() -> Vec<&'static str> {
    enum_to_options_list::<P1State>(|state| <&'static str>::from(state))
}

/// Turns a raw `sessy.system_state` field into its display label.
///
/// Unrecognized codes map to [`FALLBACK_LABEL`]; only a missing or non-string
/// field yields `None`.
pub fn status_string_system_state(raw: &serde_json::Value) -> Option<StateValue> {
    let code = raw.as_str()?;
    let label = match code.parse::<SystemState>() {
        Ok(state) => <&'static str>::from(state),
        Err(_) => {
            tracing::debug!(code, "unrecognized system state code");
            FALLBACK_LABEL
        }
    };
    Some(StateValue::Text(label.to_string()))
}

/// Turns a raw P1 `state` field into its display label.
pub fn status_string_p1(raw: &serde_json::Value) -> Option<StateValue> {
    let code = raw.as_str()?;
    let label = match code.parse::<P1State>() {
        Ok(state) => <&'static str>::from(state),
        Err(_) => {
            tracing::debug!(code, "unrecognized P1 state code");
            FALLBACK_LABEL
        }
    };
    Some(StateValue::Text(label.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use strum::VariantArray as _;

    #[test]
    fn known_system_state_label() {
        let raw = serde_json::json!("SYSTEM_STATE_RUNNING_SAFE");
        assert_eq!(
            status_string_system_state(&raw),
            Some(StateValue::Text("running-safe".to_string()))
        );
    }

    #[test]
    fn unrecognized_code_falls_back() {
        let raw = serde_json::json!("SYSTEM_STATE_FROBNICATING");
        assert_eq!(
            status_string_system_state(&raw),
            Some(StateValue::Text(FALLBACK_LABEL.to_string()))
        );
        let raw = serde_json::json!("NOT_EVEN_CLOSE");
        assert_eq!(
            status_string_p1(&raw),
            Some(StateValue::Text(FALLBACK_LABEL.to_string()))
        );
    }

    #[test]
    fn non_string_code_is_unavailable() {
        assert_eq!(status_string_system_state(&serde_json::json!(3)), None);
        assert_eq!(status_string_p1(&serde_json::Value::Null), None);
    }

    #[test]
    fn system_state_options_cover_every_variant() {
        let options = system_state_options();
        assert_eq!(options.len(), SystemState::VARIANTS.len());
        let unique = options.iter().collect::<BTreeSet<_>>();
        assert_eq!(unique.len(), options.len());
        // Declaration order is the publication order.
        assert_eq!(options.first(), Some(&"init"));
        assert_eq!(options.last(), Some(&"error"));
        assert!(options.contains(&"running-safe"));
    }

    #[test]
    fn p1_state_options_cover_every_variant() {
        let options = p1_state_options();
        assert_eq!(options, vec!["ok", "waiting-for-meter", "error"]);
    }
}
