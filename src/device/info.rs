//! Per-device descriptive information.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Info fields a device may report. Discriminants match `rs2_camera_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CameraInfo {
    Name = 0,
    SerialNumber = 1,
    FirmwareVersion = 2,
    RecommendedFirmwareVersion = 3,
    PhysicalPort = 4,
    ProductId = 7,
    UsbTypeDescriptor = 9,
    ProductLine = 10,
}

impl CameraInfo {
    /// All fields read by [`DeviceInfo`].
    pub const ALL: [CameraInfo; 8] = [
        CameraInfo::Name,
        CameraInfo::SerialNumber,
        CameraInfo::FirmwareVersion,
        CameraInfo::RecommendedFirmwareVersion,
        CameraInfo::PhysicalPort,
        CameraInfo::ProductId,
        CameraInfo::UsbTypeDescriptor,
        CameraInfo::ProductLine,
    ];
}

/// Descriptive fields of one device in a [`DeviceList`](super::DeviceList).
///
/// Every field is optional: devices only report what they support.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub recommended_firmware_version: Option<String>,
    #[serde(default)]
    pub physical_port: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub usb_type_descriptor: Option<String>,
    #[serde(default)]
    pub product_line: Option<String>,
}

impl DeviceInfo {
    /// Creates info with just a name and serial number.
    pub fn new(name: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            serial_number: Some(serial_number.into()),
            ..Default::default()
        }
    }

    /// Returns the value stored for `info`.
    pub fn get(&self, info: CameraInfo) -> Option<&str> {
        self.slot(info).as_deref()
    }

    /// Stores the value for `info`.
    pub fn set(&mut self, info: CameraInfo, value: Option<String>) {
        *self.slot_mut(info) = value;
    }

    fn slot(&self, info: CameraInfo) -> &Option<String> {
        match info {
            CameraInfo::Name => &self.name,
            CameraInfo::SerialNumber => &self.serial_number,
            CameraInfo::FirmwareVersion => &self.firmware_version,
            CameraInfo::RecommendedFirmwareVersion => &self.recommended_firmware_version,
            CameraInfo::PhysicalPort => &self.physical_port,
            CameraInfo::ProductId => &self.product_id,
            CameraInfo::UsbTypeDescriptor => &self.usb_type_descriptor,
            CameraInfo::ProductLine => &self.product_line,
        }
    }

    fn slot_mut(&mut self, info: CameraInfo) -> &mut Option<String> {
        match info {
            CameraInfo::Name => &mut self.name,
            CameraInfo::SerialNumber => &mut self.serial_number,
            CameraInfo::FirmwareVersion => &mut self.firmware_version,
            CameraInfo::RecommendedFirmwareVersion => &mut self.recommended_firmware_version,
            CameraInfo::PhysicalPort => &mut self.physical_port,
            CameraInfo::ProductId => &mut self.product_id,
            CameraInfo::UsbTypeDescriptor => &mut self.usb_type_descriptor,
            CameraInfo::ProductLine => &mut self.product_line,
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (serial {})",
            self.name.as_deref().unwrap_or("<unnamed>"),
            self.serial_number.as_deref().unwrap_or("?")
        )?;
        if let Some(fw) = &self.firmware_version {
            write!(f, ", firmware {}", fw)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_by_field() {
        let mut info = DeviceInfo::new("Intel RealSense D435", "8412");
        assert_eq!(info.get(CameraInfo::Name), Some("Intel RealSense D435"));
        assert_eq!(info.get(CameraInfo::FirmwareVersion), None);

        info.set(CameraInfo::FirmwareVersion, Some("5.13.0.50".into()));
        assert_eq!(info.firmware_version.as_deref(), Some("5.13.0.50"));
    }

    #[test]
    fn test_display() {
        let mut info = DeviceInfo::new("Intel RealSense D435", "8412");
        assert_eq!(info.to_string(), "Intel RealSense D435 (serial 8412)");
        info.firmware_version = Some("5.13.0.50".into());
        assert_eq!(
            info.to_string(),
            "Intel RealSense D435 (serial 8412), firmware 5.13.0.50"
        );
    }
}
