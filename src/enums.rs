//! Flat mirrors of engine enums and flag sets.
//!
//! Discriminants follow the engine headers so values can be passed through unchanged by a
//! caller that mirrors the same headers. Flag sets are `#[repr(transparent)]` so any bit pattern
//! received across the boundary is representable.

use bitflags::bitflags;

bitflags! {
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PropertyAttribute: i32 {
        const NONE = 0;
        const READ_ONLY = 1 << 0;
        const DONT_ENUM = 1 << 1;
        const DONT_DELETE = 1 << 2;
    }
}

impl PropertyAttribute {
    /// Sentinel for "no attributes could be determined", used where an attribute lookup fails.
    pub const ABSENT: Self = Self::from_bits_retain(-1);

    pub fn is_absent(self) -> bool {
        self == Self::ABSENT
    }

    /// Converts to the engine's attribute set. An absent attribute has no engine counterpart.
    pub fn to_v8(self) -> Option<v8::PropertyAttribute> {
        if self.is_absent() {
            return None;
        }
        let mut attr = v8::PropertyAttribute::NONE;
        if self.contains(Self::READ_ONLY) {
            attr = attr | v8::PropertyAttribute::READ_ONLY;
        }
        if self.contains(Self::DONT_ENUM) {
            attr = attr | v8::PropertyAttribute::DONT_ENUM;
        }
        if self.contains(Self::DONT_DELETE) {
            attr = attr | v8::PropertyAttribute::DONT_DELETE;
        }
        Some(attr)
    }

    /// Converts from the engine's attribute set.
    pub fn from_v8(attr: v8::PropertyAttribute) -> Self {
        let mut flags = Self::NONE;
        if attr.is_read_only() {
            flags |= Self::READ_ONLY;
        }
        if attr.is_dont_enum() {
            flags |= Self::DONT_ENUM;
        }
        if attr.is_dont_delete() {
            flags |= Self::DONT_DELETE;
        }
        flags
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PropertyHandlerFlags: i32 {
        const NONE = 0;
        const ALL_CAN_READ = 1 << 0;
        const NON_MASKING = 1 << 1;
        const ONLY_INTERCEPT_STRINGS = 1 << 2;
        const HAS_NO_SIDE_EFFECT = 1 << 3;
    }
}

impl From<PropertyHandlerFlags> for v8::PropertyHandlerFlags {
    fn from(flags: PropertyHandlerFlags) -> Self {
        if flags.contains(PropertyHandlerFlags::ALL_CAN_READ) {
            log::debug!("ignoring ALL_CAN_READ interceptor flag, the engine no longer honours it");
        }
        let mut out = v8::PropertyHandlerFlags::NONE;
        if flags.contains(PropertyHandlerFlags::NON_MASKING) {
            out = out | v8::PropertyHandlerFlags::NON_MASKING;
        }
        if flags.contains(PropertyHandlerFlags::ONLY_INTERCEPT_STRINGS) {
            out = out | v8::PropertyHandlerFlags::ONLY_INTERCEPT_STRINGS;
        }
        if flags.contains(PropertyHandlerFlags::HAS_NO_SIDE_EFFECT) {
            out = out | v8::PropertyHandlerFlags::HAS_NO_SIDE_EFFECT;
        }
        out
    }
}

bitflags! {
    /// Accepted on accessor installation for source compatibility. The engine dropped support
    /// for these bits, so they only get logged.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct AccessControl: i32 {
        const DEFAULT = 0;
        const ALL_CAN_READ = 1 << 0;
        const ALL_CAN_WRITE = 1 << 1;
        const PROHIBITS_OVERWRITING = 1 << 5;
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PropertyFilter: i32 {
        const ALL_PROPERTIES = 0;
        const ONLY_WRITABLE = 1 << 0;
        const ONLY_ENUMERABLE = 1 << 1;
        const ONLY_CONFIGURABLE = 1 << 2;
        const SKIP_STRINGS = 1 << 3;
        const SKIP_SYMBOLS = 1 << 4;
    }
}

impl From<PropertyFilter> for v8::PropertyFilter {
    fn from(filter: PropertyFilter) -> Self {
        let mut out = v8::PropertyFilter::ALL_PROPERTIES;
        for (flag, engine) in [
            (PropertyFilter::ONLY_WRITABLE, v8::PropertyFilter::ONLY_WRITABLE),
            (PropertyFilter::ONLY_ENUMERABLE, v8::PropertyFilter::ONLY_ENUMERABLE),
            (PropertyFilter::ONLY_CONFIGURABLE, v8::PropertyFilter::ONLY_CONFIGURABLE),
            (PropertyFilter::SKIP_STRINGS, v8::PropertyFilter::SKIP_STRINGS),
            (PropertyFilter::SKIP_SYMBOLS, v8::PropertyFilter::SKIP_SYMBOLS),
        ] {
            if filter.contains(flag) {
                out = out | engine;
            }
        }
        out
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyCollectionMode {
    OwnOnly,
    IncludePrototypes,
}

impl From<KeyCollectionMode> for v8::KeyCollectionMode {
    fn from(mode: KeyCollectionMode) -> Self {
        match mode {
            KeyCollectionMode::OwnOnly => v8::KeyCollectionMode::OwnOnly,
            KeyCollectionMode::IncludePrototypes => v8::KeyCollectionMode::IncludePrototypes,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexFilter {
    IncludeIndices,
    SkipIndices,
}

impl From<IndexFilter> for v8::IndexFilter {
    fn from(filter: IndexFilter) -> Self {
        match filter {
            IndexFilter::IncludeIndices => v8::IndexFilter::IncludeIndices,
            IndexFilter::SkipIndices => v8::IndexFilter::SkipIndices,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegrityLevel {
    Frozen,
    Sealed,
}

impl From<IntegrityLevel> for v8::IntegrityLevel {
    fn from(level: IntegrityLevel) -> Self {
        match level {
            IntegrityLevel::Frozen => v8::IntegrityLevel::Frozen,
            IntegrityLevel::Sealed => v8::IntegrityLevel::Sealed,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstructorBehavior {
    Throw,
    Allow,
}

impl From<ConstructorBehavior> for v8::ConstructorBehavior {
    fn from(behavior: ConstructorBehavior) -> Self {
        match behavior {
            ConstructorBehavior::Throw => v8::ConstructorBehavior::Throw,
            ConstructorBehavior::Allow => v8::ConstructorBehavior::Allow,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromiseRejectEvent {
    RejectWithNoHandler,
    HandlerAddedAfterReject,
    RejectAfterResolved,
    ResolveAfterResolved,
}

impl From<v8::PromiseRejectEvent> for PromiseRejectEvent {
    fn from(event: v8::PromiseRejectEvent) -> Self {
        match event {
            v8::PromiseRejectEvent::PromiseRejectWithNoHandler => {
                PromiseRejectEvent::RejectWithNoHandler
            }
            v8::PromiseRejectEvent::PromiseHandlerAddedAfterReject => {
                PromiseRejectEvent::HandlerAddedAfterReject
            }
            v8::PromiseRejectEvent::PromiseRejectAfterResolved => {
                PromiseRejectEvent::RejectAfterResolved
            }
            v8::PromiseRejectEvent::PromiseResolveAfterResolved => {
                PromiseRejectEvent::ResolveAfterResolved
            }
        }
    }
}

/// Built-in values that can be installed as data properties without running script code.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intrinsic {
    ArrayProtoEntries,
    ArrayProtoForEach,
    ArrayProtoKeys,
    ArrayProtoValues,
    ErrorPrototype,
}

impl From<Intrinsic> for v8::Intrinsic {
    fn from(intrinsic: Intrinsic) -> Self {
        match intrinsic {
            Intrinsic::ArrayProtoEntries => v8::Intrinsic::ArrayProtoEntries,
            Intrinsic::ArrayProtoForEach => v8::Intrinsic::ArrayProtoForEach,
            Intrinsic::ArrayProtoKeys => v8::Intrinsic::ArrayProtoKeys,
            Intrinsic::ArrayProtoValues => v8::Intrinsic::ArrayProtoValues,
            Intrinsic::ErrorPrototype => v8::Intrinsic::ErrorPrototype,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpectedRuntime {
    ShortRunning,
    LongRunning,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationMode {
    Normal,
    Reservation,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protection {
    NoAccess,
    ReadWrite,
}
