//! Audio device enumeration and lookup
//!
//! Device ids are `input:<name>` or `output:<name>`; `None` selects the
//! host default.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::constants::SAMPLE_RATE;
use crate::error::AudioError;

/// Device summary for host UIs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub is_input: bool,
    pub is_default: bool,
    /// Whether the device advertises a 48 kHz configuration with the
    /// channel count the engine needs (mono in, stereo out)
    pub supports_voice_format: bool,
}

/// List input devices followed by output devices
pub fn list_devices() -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    let default_output = host.default_output_device().and_then(|d| d.name().ok());

    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            if let Ok(name) = device.name() {
                devices.push(DeviceInfo {
                    id: format!("input:{}", name),
                    is_default: default_input.as_ref() == Some(&name),
                    supports_voice_format: supports_voice_format(&device, true),
                    is_input: true,
                    name,
                });
            }
        }
    }

    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(name) = device.name() {
                devices.push(DeviceInfo {
                    id: format!("output:{}", name),
                    is_default: default_output.as_ref() == Some(&name),
                    supports_voice_format: supports_voice_format(&device, false),
                    is_input: false,
                    name,
                });
            }
        }
    }

    devices
}

fn supports_voice_format(device: &cpal::Device, is_input: bool) -> bool {
    let rate = cpal::SampleRate(SAMPLE_RATE);
    let matches = |config: cpal::SupportedStreamConfigRange, channels: u16| {
        config.channels() == channels
            && config.min_sample_rate() <= rate
            && rate <= config.max_sample_rate()
    };

    if is_input {
        device
            .supported_input_configs()
            .map(|mut configs| configs.any(|c| matches(c, 1)))
            .unwrap_or(false)
    } else {
        device
            .supported_output_configs()
            .map(|mut configs| configs.any(|c| matches(c, 2)))
            .unwrap_or(false)
    }
}

/// Split a device id into (is_input, name)
pub fn parse_device_id(id: &str) -> (bool, &str) {
    if let Some(name) = id.strip_prefix("output:") {
        (false, name)
    } else if let Some(name) = id.strip_prefix("input:") {
        (true, name)
    } else {
        (true, id)
    }
}

/// Resolve an input device by id, or the default when `id` is `None`
pub fn input_device(id: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match id {
        None => host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default input device".to_string())),
        Some(id) => {
            let (_, name) = parse_device_id(id);
            let devices = host
                .input_devices()
                .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;
            find_by_name(devices, name).ok_or_else(|| AudioError::DeviceNotFound(id.to_string()))
        }
    }
}

/// Resolve an output device by id, or the default when `id` is `None`
pub fn output_device(id: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match id {
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string())),
        Some(id) => {
            let (_, name) = parse_device_id(id);
            let devices = host
                .output_devices()
                .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;
            find_by_name(devices, name).ok_or_else(|| AudioError::DeviceNotFound(id.to_string()))
        }
    }
}

fn find_by_name(mut devices: impl Iterator<Item = cpal::Device>, name: &str) -> Option<cpal::Device> {
    devices.find(|d| d.name().map(|n| n == name).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_id() {
        assert_eq!(parse_device_id("input:Mic"), (true, "Mic"));
        assert_eq!(parse_device_id("output:Speakers"), (false, "Speakers"));
        assert_eq!(parse_device_id("Headset"), (true, "Headset"));
    }

    #[test]
    fn test_list_devices_ids_are_prefixed() {
        // May be empty on machines without audio hardware
        for device in list_devices() {
            let prefix = if device.is_input { "input:" } else { "output:" };
            assert!(device.id.starts_with(prefix));
        }
    }
}
