//! Known-module workarounds
//!
//! Some widely deployed plugin binaries misbehave under a strictly conforming
//! host. Modules are matched against a static table by MIME type, file name,
//! product name and version, and the host consults the resulting
//! [`QuirkSet`] wherever behaviour has to bend.

use crate::mime::ModuleVersion;

/// Workaround flags for one module.
///
/// Multiple quirks can be combined using the `|` operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuirkSet(u32);

impl QuirkSet {
    /// Report a Mozilla user agent
    pub const WANTS_MOZILLA_USER_AGENT: Self = Self(1 << 0);
    /// Skip the set-window call made right after instance creation
    pub const DEFER_FIRST_SET_WINDOW_CALL: Self = Self(1 << 1);
    /// Coalesce invalidations on a short timer
    pub const THROTTLE_INVALIDATE: Self = Self(1 << 2);
    /// Strip the `windowlessvideo` parameter
    pub const REMOVE_WINDOWLESS_VIDEO_PARAM: Self = Self(1 << 3);
    /// Route `WM_USER + 1` through the message throttler
    pub const THROTTLE_USER_PLUS_ONE_MESSAGES: Self = Self(1 << 4);
    /// Never unload the module once loaded
    pub const DONT_UNLOAD_PLUGIN: Self = Self(1 << 5);
    /// Drop a native message arriving while the same message is in flight
    pub const DONT_CALL_WND_PROC_FOR_SAME_MESSAGE_RECURSIVELY: Self = Self(1 << 6);
    /// Module runs nested message loops while the host waits on it
    pub const HAS_MODAL_MESSAGE_LOOP: Self = Self(1 << 7);
    /// Needs a stream opened before URL notify of a failed POST
    pub const FLASH_URL_NOTIFY_BUG: Self = Self(1 << 8);
    /// Keep the native window's clip while it moves instead of zeroing it first
    pub const DONT_CLIP_TO_ZERO_RECT_WHEN_SCROLLING: Self = Self(1 << 9);
    /// Do not tell the module its window went away before destroy
    pub const DONT_SET_NULL_WINDOW_HANDLE_ON_DESTROY: Self = Self(1 << 10);
    /// Only one live instance per module
    pub const DONT_ALLOW_MULTIPLE_INSTANCES: Self = Self(1 << 11);
    /// Window must use the screen's default depth
    pub const REQUIRES_DEFAULT_SCREEN_DEPTH: Self = Self(1 << 12);
    /// Keep the first size sent to a windowed instance
    pub const DONT_CALL_SET_WINDOW_MORE_THAN_ONCE: Self = Self(1 << 13);
    /// Do not deliver right-button events to windowless instances
    pub const IGNORE_RIGHT_CLICK_IN_WINDOWLESS_MODE: Self = Self(1 << 14);
    /// No quirks
    pub const NONE: Self = Self(0);

    #[inline]
    pub const fn has(self, quirk: Self) -> bool {
        (self.0 & quirk.0) != 0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Names of the set flags, for diagnostics.
    pub fn names(self) -> Vec<&'static str> {
        QUIRK_NAMES
            .iter()
            .filter(|(quirk, _)| self.has(*quirk))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for QuirkSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for QuirkSet {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl Default for QuirkSet {
    fn default() -> Self {
        Self::NONE
    }
}

const QUIRK_NAMES: &[(QuirkSet, &str)] = &[
    (QuirkSet::WANTS_MOZILLA_USER_AGENT, "WantsMozillaUserAgent"),
    (QuirkSet::DEFER_FIRST_SET_WINDOW_CALL, "DeferFirstSetWindowCall"),
    (QuirkSet::THROTTLE_INVALIDATE, "ThrottleInvalidate"),
    (QuirkSet::REMOVE_WINDOWLESS_VIDEO_PARAM, "RemoveWindowlessVideoParam"),
    (QuirkSet::THROTTLE_USER_PLUS_ONE_MESSAGES, "ThrottleUserPlusOneMessages"),
    (QuirkSet::DONT_UNLOAD_PLUGIN, "DontUnloadPlugin"),
    (
        QuirkSet::DONT_CALL_WND_PROC_FOR_SAME_MESSAGE_RECURSIVELY,
        "DontCallWndProcForSameMessageRecursively",
    ),
    (QuirkSet::HAS_MODAL_MESSAGE_LOOP, "HasModalMessageLoop"),
    (QuirkSet::FLASH_URL_NOTIFY_BUG, "FlashUrlNotifyBug"),
    (QuirkSet::DONT_CLIP_TO_ZERO_RECT_WHEN_SCROLLING, "DontClipToZeroRectWhenScrolling"),
    (QuirkSet::DONT_SET_NULL_WINDOW_HANDLE_ON_DESTROY, "DontSetNullWindowHandleOnDestroy"),
    (QuirkSet::DONT_ALLOW_MULTIPLE_INSTANCES, "DontAllowMultipleInstances"),
    (QuirkSet::REQUIRES_DEFAULT_SCREEN_DEPTH, "RequiresDefaultScreenDepth"),
    (QuirkSet::DONT_CALL_SET_WINDOW_MORE_THAN_ONCE, "DontCallSetWindowMoreThanOnce"),
    (QuirkSet::IGNORE_RIGHT_CLICK_IN_WINDOWLESS_MODE, "IgnoreRightClickInWindowlessMode"),
];

/// What identifies a module for quirk matching.
#[derive(Debug, Clone, Copy)]
pub struct ModuleIdentity<'a> {
    pub mime_type: &'a str,
    pub file_name: &'a str,
    pub name: &'a str,
    pub version: ModuleVersion,
}

#[derive(Debug, Clone, Copy)]
enum Match {
    Mime(&'static str),
    FileName(&'static str),
    NameContains(&'static str),
}

#[derive(Debug, Clone, Copy)]
enum Versions {
    Any,
    MajorBelow(u16),
    MajorAtLeast(u16),
}

#[derive(Debug, Clone, Copy)]
struct QuirkRule {
    matches: Match,
    versions: Versions,
    quirks: QuirkSet,
}

const FLASH_MIME: &str = "application/x-shockwave-flash";

static QUIRK_TABLE: &[QuirkRule] = &[
    QuirkRule {
        matches: Match::Mime(FLASH_MIME),
        versions: Versions::Any,
        quirks: QuirkSet::DONT_CALL_SET_WINDOW_MORE_THAN_ONCE
            .union(QuirkSet::REQUIRES_DEFAULT_SCREEN_DEPTH)
            .union(QuirkSet::THROTTLE_INVALIDATE)
            .union(QuirkSet::THROTTLE_USER_PLUS_ONE_MESSAGES)
            .union(QuirkSet::FLASH_URL_NOTIFY_BUG)
            .union(QuirkSet::IGNORE_RIGHT_CLICK_IN_WINDOWLESS_MODE),
    },
    QuirkRule {
        matches: Match::Mime(FLASH_MIME),
        versions: Versions::MajorBelow(10),
        quirks: QuirkSet::WANTS_MOZILLA_USER_AGENT,
    },
    QuirkRule {
        matches: Match::Mime(FLASH_MIME),
        versions: Versions::MajorAtLeast(10),
        quirks: QuirkSet::DONT_SET_NULL_WINDOW_HANDLE_ON_DESTROY,
    },
    QuirkRule {
        matches: Match::NameContains("VLC"),
        versions: Versions::Any,
        quirks: QuirkSet::DONT_CALL_WND_PROC_FOR_SAME_MESSAGE_RECURSIVELY
            .union(QuirkSet::HAS_MODAL_MESSAGE_LOOP),
    },
    QuirkRule {
        matches: Match::NameContains("QuickTime"),
        versions: Versions::Any,
        quirks: QuirkSet::REMOVE_WINDOWLESS_VIDEO_PARAM.union(QuirkSet::DEFER_FIRST_SET_WINDOW_CALL),
    },
    QuirkRule {
        matches: Match::NameContains("Silverlight"),
        versions: Versions::Any,
        quirks: QuirkSet::DEFER_FIRST_SET_WINDOW_CALL,
    },
    QuirkRule {
        matches: Match::FileName("libnpjp2.so"),
        versions: Versions::Any,
        quirks: QuirkSet::DONT_UNLOAD_PLUGIN.union(QuirkSet::DONT_CLIP_TO_ZERO_RECT_WHEN_SCROLLING),
    },
    QuirkRule {
        matches: Match::Mime("application/x-java-applet"),
        versions: Versions::Any,
        quirks: QuirkSet::DONT_UNLOAD_PLUGIN,
    },
    QuirkRule {
        matches: Match::NameContains("Windows Media Player"),
        versions: Versions::Any,
        quirks: QuirkSet::DONT_ALLOW_MULTIPLE_INSTANCES,
    },
    QuirkRule {
        matches: Match::NameContains("Acrobat"),
        versions: Versions::Any,
        quirks: QuirkSet::DONT_UNLOAD_PLUGIN,
    },
];

impl Match {
    fn matches(&self, identity: &ModuleIdentity<'_>) -> bool {
        match self {
            Match::Mime(mime) => identity.mime_type.eq_ignore_ascii_case(mime),
            Match::FileName(file) => identity.file_name.eq_ignore_ascii_case(file),
            Match::NameContains(part) => identity.name.contains(part),
        }
    }
}

impl Versions {
    fn matches(&self, version: ModuleVersion) -> bool {
        match *self {
            Versions::Any => true,
            Versions::MajorBelow(major) => version.major < major,
            Versions::MajorAtLeast(major) => version.major >= major,
        }
    }
}

/// Quirks for one MIME type of a module.
pub fn determine_quirks(identity: &ModuleIdentity<'_>) -> QuirkSet {
    QUIRK_TABLE
        .iter()
        .filter(|rule| rule.matches.matches(identity) && rule.versions.matches(identity.version))
        .fold(QuirkSet::NONE, |acc, rule| acc | rule.quirks)
}
