use growsync_api::models::ActuatorCommand;
use serde_json::Value;

/// Maps a rule's device command onto the actuator vocabulary. `ON`/`OFF`
/// become relay switches and `PWM` with a numeric percentage becomes a PWM
/// command at the device's native resolution; anything else is passed
/// through as a raw command.
pub fn translate_command(device: &str, command: &str, value: &Value, pwm_native_max: u16) -> ActuatorCommand {
    let percent = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    match (command.trim().to_ascii_uppercase().as_str(), percent) {
        ("ON", _) => ActuatorCommand::relay(device, true),
        ("OFF", _) => ActuatorCommand::relay(device, false),
        ("PWM" | "SET_PWM", Some(percent)) => ActuatorCommand::pwm_percent(device, percent, pwm_native_max),
        _ => ActuatorCommand::Raw {
            device: device.to_string(),
            command: command.to_string(),
            value: value.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_relay_commands() {
        assert_eq!(translate_command("light", "ON", &Value::Null, 255), ActuatorCommand::relay("light", true));
        assert_eq!(translate_command("pump_1", "off", &Value::Null, 255), ActuatorCommand::relay("pump_1", false));
    }

    #[test]
    fn test_pwm_is_rescaled() {
        assert_eq!(
            translate_command("fan_exhaust", "PWM", &json!(50), 255),
            ActuatorCommand::SetPwm { device: "fan_exhaust".into(), value: 128 }
        );
        assert_eq!(
            translate_command("light", "SET_PWM", &json!("100"), 1023),
            ActuatorCommand::SetPwm { device: "light".into(), value: 1023 }
        );
    }

    #[test]
    fn test_unknown_commands_pass_through() {
        assert_eq!(
            translate_command("humidifier", "PULSE", &json!({"ms": 500}), 255),
            ActuatorCommand::Raw { device: "humidifier".into(), command: "PULSE".into(), value: json!({"ms": 500}) }
        );
        // pwm without a usable value
        assert!(matches!(translate_command("light", "PWM", &json!(true), 255), ActuatorCommand::Raw { .. }));
    }
}
