//! Encoded native API version.

use std::fmt;

/// The librealsense API version, encoded as
/// `major * 10000 + minor * 100 + patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion(i32);

impl ApiVersion {
    const MAJOR_SCALE: i32 = 10000;
    const MINOR_SCALE: i32 = 100;

    pub const fn from_encoded(encoded: i32) -> Self {
        Self(encoded)
    }

    pub const fn from_parts(major: i32, minor: i32, patch: i32) -> Self {
        Self(major * Self::MAJOR_SCALE + minor * Self::MINOR_SCALE + patch)
    }

    pub const fn encoded(self) -> i32 {
        self.0
    }

    pub const fn major(self) -> i32 {
        self.0 / Self::MAJOR_SCALE
    }

    pub const fn minor(self) -> i32 {
        (self.0 % Self::MAJOR_SCALE) / Self::MINOR_SCALE
    }

    pub const fn patch(self) -> i32 {
        self.0 % Self::MINOR_SCALE
    }
}

/// Dotted `major.minor.patch`, or the raw number when there is no major
/// component.
impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.major() == 0 {
            write!(f, "{}", self.0)
        } else {
            write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
        }
    }
}

impl From<i32> for ApiVersion {
    fn from(encoded: i32) -> Self {
        Self(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_dotted_format() {
        assert_eq!(ApiVersion::from_encoded(20700).to_string(), "2.7.0");
        assert_eq!(ApiVersion::from_encoded(25401).to_string(), "2.54.1");
    }

    #[test]
    fn test_single_field_fallback() {
        assert_eq!(ApiVersion::from_encoded(90).to_string(), "90");
        assert_eq!(ApiVersion::from_encoded(9999).to_string(), "9999");
        assert_eq!(ApiVersion::from_encoded(0).to_string(), "0");
    }

    #[test]
    fn test_parts() {
        let version = ApiVersion::from_parts(2, 54, 1);
        assert_eq!(version.encoded(), 25401);
        assert_eq!((version.major(), version.minor(), version.patch()), (2, 54, 1));
    }

    proptest! {
        #[test]
        fn prop_format_is_deterministic(encoded in 0i32..10_000_000) {
            let a = ApiVersion::from_encoded(encoded).to_string();
            let b = ApiVersion::from_encoded(encoded).to_string();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_dotted_parts_roundtrip(major in 1i32..100, minor in 0i32..100, patch in 0i32..100) {
            let version = ApiVersion::from_parts(major, minor, patch);
            prop_assert_eq!(version.to_string(), format!("{}.{}.{}", major, minor, patch));
        }

        #[test]
        fn prop_small_values_are_plain(encoded in 0i32..10_000) {
            prop_assert_eq!(ApiVersion::from_encoded(encoded).to_string(), encoded.to_string());
        }
    }
}
