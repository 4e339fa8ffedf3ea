//! Capture device enumeration

use rtcbridge_core::{CameraEnumerator, MediaDeviceInfo};
use tracing::warn;

/// Describe every camera plus the single audio input
///
/// Cameras whose facing cannot be queried are skipped.
pub fn enumerate_devices(enumerator: &dyn CameraEnumerator) -> Vec<MediaDeviceInfo> {
    let mut devices: Vec<MediaDeviceInfo> = enumerator
        .device_names()
        .into_iter()
        .enumerate()
        .filter_map(|(index, name)| {
            let front = match enumerator.is_front_facing(&name) {
                Ok(front) => front,
                Err(e) => {
                    warn!("Failed to check the facing mode of camera {}: {}", name, e);
                    return None;
                }
            };
            Some(MediaDeviceInfo {
                device_id: index.to_string(),
                group_id: String::new(),
                label: name,
                kind: "videoinput".to_string(),
                facing: Some(if front { "front" } else { "environment" }.to_string()),
            })
        })
        .collect();

    devices.push(MediaDeviceInfo {
        device_id: "audio-1".to_string(),
        group_id: String::new(),
        label: "Audio".to_string(),
        kind: "audioinput".to_string(),
        facing: None,
    });
    devices
}
