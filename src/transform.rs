use crate::sensor::StateValue;

/// Maps a unit interval value in `0.0..=1.0` to a percentage.
///
/// Values outside of the unit interval are passed through the same
/// multiplication. The device is the only producer of these fractions, so an
/// out-of-range input indicates firmware weirdness rather than something this
/// function should handle.
pub fn unit_interval_to_percentage(value: f64) -> f64 {
    value * 100.0
}

/// Scales a raw milli-unit magnitude down to its base unit (mHz to Hz, mW to
/// W and so on). Sign and fractional precision are preserved.
pub fn divide_by_thousand(value: f64) -> f64 {
    value / 1000.0
}

/// [`unit_interval_to_percentage`] over a raw JSON field value.
///
/// Returns `None` when the field is not numeric.
pub fn percentage_from_unit_interval(raw: &serde_json::Value) -> Option<StateValue> {
    let value = raw.as_f64()?;
    Some(StateValue::Float(unit_interval_to_percentage(value)))
}

/// [`divide_by_thousand`] over a raw JSON field value.
pub fn base_unit_from_milli(raw: &serde_json::Value) -> Option<StateValue> {
    let value = raw.as_f64()?;
    Some(StateValue::Float(divide_by_thousand(value)))
}

/// Produces the ordered list of display labels for every member of an
/// enumerated device state.
///
/// The list declares the closed option set for an enumerated sensor and is
/// computed once while the sensor descriptors are being constructed.
pub fn enum_to_options_list<T: strum::VariantArray>(
    label: fn(&T) -> &'static str,
) -> Vec<&'static str> {
    T::VARIANTS.iter().map(label).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_interval_endpoints() {
        assert_eq!(unit_interval_to_percentage(0.0), 0.0);
        assert_eq!(unit_interval_to_percentage(0.5), 50.0);
        assert_eq!(unit_interval_to_percentage(1.0), 100.0);
    }

    #[test]
    fn state_of_charge_fraction() {
        let percentage = unit_interval_to_percentage(0.873);
        assert!((percentage - 87.3).abs() < 1e-9);
        assert!((0.0..=100.0).contains(&percentage));
    }

    #[test]
    fn thousand_scale_preserves_sign_and_precision() {
        assert_eq!(divide_by_thousand(50125.0), 50.125);
        assert_eq!(divide_by_thousand(-1500.0), -1.5);
        assert_eq!(divide_by_thousand(0.0), 0.0);
    }

    #[test]
    fn percentage_adapter() {
        let raw = serde_json::json!(0.25);
        assert_eq!(
            percentage_from_unit_interval(&raw),
            Some(StateValue::Float(25.0))
        );
        assert_eq!(percentage_from_unit_interval(&serde_json::json!("wat")), None);
        assert_eq!(percentage_from_unit_interval(&serde_json::Value::Null), None);
    }

    #[test]
    fn milli_adapter() {
        let raw = serde_json::json!(49987);
        assert_eq!(base_unit_from_milli(&raw), Some(StateValue::Float(49.987)));
        assert_eq!(base_unit_from_milli(&serde_json::json!([])), None);
    }
}
