//! Permission identities and their platform capability mapping.
//!
//! A [`Permission`] is a logical capability token (camera, background location,
//! ...). [`Permission::capabilities`] maps it onto the running [`Platform`]:
//! Android runtime permission strings or an iOS usage-description key.

use std::fmt;
use std::str::FromStr;

use crate::options::{Platform, PlatformFamily};

const ANDROID_FINE_LOCATION: &str = "android.permission.ACCESS_FINE_LOCATION";
const ANDROID_COARSE_LOCATION: &str = "android.permission.ACCESS_COARSE_LOCATION";
const ANDROID_BACKGROUND_LOCATION: &str = "android.permission.ACCESS_BACKGROUND_LOCATION";
const ANDROID_READ_STORAGE: &str = "android.permission.READ_EXTERNAL_STORAGE";
const ANDROID_WRITE_STORAGE: &str = "android.permission.WRITE_EXTERNAL_STORAGE";

const IOS_LOCATION_WHEN_IN_USE: &str = "NSLocationWhenInUseUsageDescription";
const IOS_LOCATION_ALWAYS: &str = "NSLocationAlwaysAndWhenInUseUsageDescription";

/// A logical permission capability
///
/// The catalog is closed; [`Permission::Custom`] is the escape hatch for
/// capabilities the catalog does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Camera capture
    Camera,
    /// Audio recording
    Microphone,
    /// Photo and video library
    Gallery,
    /// Address book
    Contacts,
    /// Calendar events
    Calendar,
    /// Location while the app is in use
    Location,
    /// Location at all times (two-stage: foreground first, then background)
    LocationAlways,
    /// Posting notifications
    Notifications,
    /// Connecting to paired Bluetooth devices
    BluetoothConnect,
    /// Motion and fitness activity
    Motion,
    /// Shared external storage
    Storage,
    /// Caller-defined identity with its own capability set
    Custom(CustomPermission),
}

/// Caller-supplied identity outside the catalog
///
/// # Example
///
/// ```
/// use rusty_permit::identity::{CustomPermission, Permission};
///
/// let sms = Permission::Custom(
///     CustomPermission::new("read_sms").android(["android.permission.READ_SMS"]),
/// );
/// assert_eq!(sms.id(), "read_sms");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomPermission {
    id: String,
    android: Vec<String>,
    ios_usage_key: Option<String>,
}

impl CustomPermission {
    /// Create a custom identity with no platform mapping yet
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            android: Vec::new(),
            ios_usage_key: None,
        }
    }

    /// Set the Android runtime permission strings
    pub fn android<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.android = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Set the iOS usage-description key
    pub fn ios_usage_key(mut self, key: impl Into<String>) -> Self {
        self.ios_usage_key = Some(key.into());
        self
    }
}

/// Which part of a two-stage identity a native request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    /// Every entry at once (single-stage identities)
    Full,
    /// Foreground entries of a two-stage identity
    Foreground,
    /// Background entries of a two-stage identity, after the foreground grant
    Background,
}

/// Native entries backing an identity on one platform
///
/// On Android the entries are runtime permission strings; on iOS they are
/// `Info.plist` usage-description keys. `background` is non-empty only for
/// two-stage identities.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    /// Entries requested first (or the only entries)
    pub foreground: Vec<String>,
    /// Entries requested in a second, separate step
    pub background: Vec<String>,
}

impl CapabilitySet {
    fn single<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            foreground: entries.into_iter().map(Into::into).collect(),
            background: Vec::new(),
        }
    }

    fn two_stage(foreground: &[&str], background: &[&str]) -> Self {
        Self {
            foreground: foreground.iter().map(|e| e.to_string()).collect(),
            background: background.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Whether background entries must be requested separately
    pub fn is_two_stage(&self) -> bool {
        !self.background.is_empty()
    }

    /// Entries a native request for `stage` covers
    pub fn entries_for(&self, stage: RequestStage) -> Vec<String> {
        match stage {
            RequestStage::Foreground => self.foreground.clone(),
            RequestStage::Background => self.background.clone(),
            RequestStage::Full => self
                .foreground
                .iter()
                .chain(self.background.iter())
                .cloned()
                .collect(),
        }
    }
}

/// An identity mapped onto the running platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capabilities {
    /// A runtime permission exists and is backed by these entries
    Native(CapabilitySet),
    /// No runtime permission exists on this OS/version; always granted
    ImplicitlyGranted,
    /// A custom identity with no mapping for this platform family
    Unsupported,
}

impl Permission {
    /// Every catalog identity (custom identities excluded)
    pub fn catalog() -> &'static [Permission] {
        &[
            Permission::Camera,
            Permission::Microphone,
            Permission::Gallery,
            Permission::Contacts,
            Permission::Calendar,
            Permission::Location,
            Permission::LocationAlways,
            Permission::Notifications,
            Permission::BluetoothConnect,
            Permission::Motion,
            Permission::Storage,
        ]
    }

    /// Stable identifier, used as persistence key and in logs
    pub fn id(&self) -> &str {
        match self {
            Permission::Camera => "camera",
            Permission::Microphone => "microphone",
            Permission::Gallery => "gallery",
            Permission::Contacts => "contacts",
            Permission::Calendar => "calendar",
            Permission::Location => "location",
            Permission::LocationAlways => "location_always",
            Permission::Notifications => "notifications",
            Permission::BluetoothConnect => "bluetooth_connect",
            Permission::Motion => "motion",
            Permission::Storage => "storage",
            Permission::Custom(custom) => &custom.id,
        }
    }

    /// Map this identity onto `platform`
    pub fn capabilities(&self, platform: &Platform) -> Capabilities {
        match platform.family() {
            PlatformFamily::Android => self.android_capabilities(platform),
            PlatformFamily::Ios => self.ios_capabilities(platform),
        }
    }

    fn android_capabilities(&self, platform: &Platform) -> Capabilities {
        use Capabilities::{ImplicitlyGranted, Native, Unsupported};

        let set = match self {
            Permission::Camera => CapabilitySet::single(["android.permission.CAMERA"]),
            Permission::Microphone => CapabilitySet::single(["android.permission.RECORD_AUDIO"]),
            Permission::Gallery if platform.at_least(13) => CapabilitySet::single([
                "android.permission.READ_MEDIA_IMAGES",
                "android.permission.READ_MEDIA_VIDEO",
            ]),
            Permission::Gallery => CapabilitySet::single([ANDROID_READ_STORAGE]),
            Permission::Contacts => CapabilitySet::single(["android.permission.READ_CONTACTS"]),
            Permission::Calendar => CapabilitySet::single([
                "android.permission.READ_CALENDAR",
                "android.permission.WRITE_CALENDAR",
            ]),
            Permission::Location => {
                CapabilitySet::single([ANDROID_FINE_LOCATION, ANDROID_COARSE_LOCATION])
            }
            // Before 10 background access came with the foreground grant.
            Permission::LocationAlways if platform.at_least(10) => CapabilitySet::two_stage(
                &[ANDROID_FINE_LOCATION, ANDROID_COARSE_LOCATION],
                &[ANDROID_BACKGROUND_LOCATION],
            ),
            Permission::LocationAlways => {
                CapabilitySet::single([ANDROID_FINE_LOCATION, ANDROID_COARSE_LOCATION])
            }
            Permission::Notifications if platform.at_least(13) => {
                CapabilitySet::single(["android.permission.POST_NOTIFICATIONS"])
            }
            Permission::Notifications => return ImplicitlyGranted,
            Permission::BluetoothConnect if platform.at_least(12) => {
                CapabilitySet::single(["android.permission.BLUETOOTH_CONNECT"])
            }
            Permission::BluetoothConnect => return ImplicitlyGranted,
            Permission::Motion if platform.at_least(10) => {
                CapabilitySet::single(["android.permission.ACTIVITY_RECOGNITION"])
            }
            Permission::Motion => return ImplicitlyGranted,
            // Scoped storage has no runtime permission from 13 on.
            Permission::Storage if platform.at_least(13) => return ImplicitlyGranted,
            Permission::Storage => {
                CapabilitySet::single([ANDROID_READ_STORAGE, ANDROID_WRITE_STORAGE])
            }
            Permission::Custom(custom) if custom.android.is_empty() => return Unsupported,
            Permission::Custom(custom) => CapabilitySet::single(custom.android.clone()),
        };

        Native(set)
    }

    fn ios_capabilities(&self, platform: &Platform) -> Capabilities {
        use Capabilities::{ImplicitlyGranted, Native, Unsupported};

        let set = match self {
            Permission::Camera => CapabilitySet::single(["NSCameraUsageDescription"]),
            Permission::Microphone => CapabilitySet::single(["NSMicrophoneUsageDescription"]),
            Permission::Gallery => CapabilitySet::single(["NSPhotoLibraryUsageDescription"]),
            Permission::Contacts => CapabilitySet::single(["NSContactsUsageDescription"]),
            Permission::Calendar if platform.at_least(17) => {
                CapabilitySet::single(["NSCalendarsFullAccessUsageDescription"])
            }
            Permission::Calendar => CapabilitySet::single(["NSCalendarsUsageDescription"]),
            Permission::Location => CapabilitySet::single([IOS_LOCATION_WHEN_IN_USE]),
            Permission::LocationAlways => {
                CapabilitySet::two_stage(&[IOS_LOCATION_WHEN_IN_USE], &[IOS_LOCATION_ALWAYS])
            }
            // Runtime authorization without a plist key.
            Permission::Notifications => CapabilitySet::default(),
            Permission::BluetoothConnect => {
                CapabilitySet::single(["NSBluetoothAlwaysUsageDescription"])
            }
            Permission::Motion => CapabilitySet::single(["NSMotionUsageDescription"]),
            Permission::Storage => return ImplicitlyGranted,
            Permission::Custom(custom) => match &custom.ios_usage_key {
                Some(key) => CapabilitySet::single([key.clone()]),
                None => return Unsupported,
            },
        };

        Native(set)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Error returned when parsing an unknown catalog identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionParseError(pub String);

impl fmt::Display for PermissionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown permission identity: {:?}", self.0)
    }
}

impl std::error::Error for PermissionParseError {}

impl FromStr for Permission {
    type Err = PermissionParseError;

    /// Parse a catalog id; custom identities cannot be parsed back
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::catalog()
            .iter()
            .find(|p| p.id() == s)
            .cloned()
            .ok_or_else(|| PermissionParseError(s.to_string()))
    }
}
