//! Product-line masks used to filter device enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// A product line a device belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductLine {
    /// Non-Intel platform cameras (UVC webcams and the like).
    Platform,
    /// D400 depth cameras.
    D400,
    /// SR300 depth cameras.
    Sr300,
    /// L500 lidar cameras.
    L500,
    /// T200 tracking cameras.
    T200,
}

impl ProductLine {
    /// The mask bit identifying this line.
    pub const fn bit(self) -> u32 {
        match self {
            ProductLine::Platform => 0x01,
            ProductLine::D400 => 0x02,
            ProductLine::Sr300 => 0x04,
            ProductLine::L500 => 0x08,
            ProductLine::T200 => 0x10,
        }
    }
}

impl fmt::Display for ProductLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProductLine::Platform => "platform",
            ProductLine::D400 => "D400",
            ProductLine::Sr300 => "SR300",
            ProductLine::L500 => "L500",
            ProductLine::T200 => "T200",
        };
        f.write_str(name)
    }
}

/// Bit mask passed to the native enumeration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceMask(u32);

impl DeviceMask {
    /// Every device, platform cameras included.
    pub const ANY: DeviceMask = DeviceMask(0xff);
    /// Every Intel device; excludes platform cameras.
    pub const ANY_INTEL: DeviceMask = DeviceMask(0xfe);
    /// Platform cameras only.
    pub const NON_INTEL: DeviceMask = DeviceMask(0x01);
    /// Depth product lines.
    pub const DEPTH: DeviceMask = DeviceMask(0x02 | 0x04 | 0x08);
    /// Tracking product lines.
    pub const TRACKING: DeviceMask = DeviceMask(0x10);

    /// Mask used by [`Context::query_devices`](crate::Context::query_devices).
    pub const fn for_platform_camera(include_platform_camera: bool) -> Self {
        if include_platform_camera {
            Self::ANY
        } else {
            Self::ANY_INTEL
        }
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether devices of `line` pass this mask.
    pub const fn includes(self, line: ProductLine) -> bool {
        self.0 & line.bit() != 0
    }
}

impl From<ProductLine> for DeviceMask {
    fn from(line: ProductLine) -> Self {
        DeviceMask(line.bit())
    }
}

impl BitOr for DeviceMask {
    type Output = DeviceMask;

    fn bitor(self, rhs: DeviceMask) -> DeviceMask {
        DeviceMask(self.0 | rhs.0)
    }
}

impl fmt::Display for DeviceMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}
