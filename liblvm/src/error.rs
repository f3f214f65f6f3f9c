// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use thiserror::Error;

/// Errno and message reported by the native library after a failed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub errno: i32,
    pub message: String,
}

impl NativeError {
    pub fn new(errno: i32, message: impl Into<String>) -> Self {
        Self {
            errno,
            message: message.into(),
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "errno {}", self.errno)
        } else {
            write!(f, "{} (errno {})", self.message, self.errno)
        }
    }
}

impl std::error::Error for NativeError {}

/// Result of a raw backend call
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Binding operation that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Init,
    LibraryQuery,
    ConfigReload,
    ConfigOverride,
    Scan,
    ListVgNames,
    ListVgUuids,
    VgNameFromPvid,
    VgNameFromDevice,
    VgOpen,
    VgCreate,
    VgClose,
    VgWrite,
    VgRemove,
    VgExtend,
    VgReduce,
    VgAddTag,
    VgRemoveTag,
    VgTags,
    VgSetExtentSize,
    VgQuery,
    ListLvs,
    ListPvs,
    CreateLvLinear,
    LvLookup,
    PvLookup,
    LvQuery,
    LvAddTag,
    LvRemoveTag,
    LvTags,
    LvActivate,
    LvDeactivate,
    LvRemove,
    LvResize,
    PvQuery,
    PvResize,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Init => "init",
            Operation::LibraryQuery => "library_query",
            Operation::ConfigReload => "config_reload",
            Operation::ConfigOverride => "config_override",
            Operation::Scan => "scan",
            Operation::ListVgNames => "list_vg_names",
            Operation::ListVgUuids => "list_vg_uuids",
            Operation::VgNameFromPvid => "vg_name_from_pvid",
            Operation::VgNameFromDevice => "vg_name_from_device",
            Operation::VgOpen => "vg_open",
            Operation::VgCreate => "vg_create",
            Operation::VgClose => "vg_close",
            Operation::VgWrite => "vg_write",
            Operation::VgRemove => "vg_remove",
            Operation::VgExtend => "vg_extend",
            Operation::VgReduce => "vg_reduce",
            Operation::VgAddTag => "vg_add_tag",
            Operation::VgRemoveTag => "vg_remove_tag",
            Operation::VgTags => "vg_tags",
            Operation::VgSetExtentSize => "vg_set_extent_size",
            Operation::VgQuery => "vg_query",
            Operation::ListLvs => "list_lvs",
            Operation::ListPvs => "list_pvs",
            Operation::CreateLvLinear => "create_lv_linear",
            Operation::LvLookup => "lv_lookup",
            Operation::PvLookup => "pv_lookup",
            Operation::LvQuery => "lv_query",
            Operation::LvAddTag => "lv_add_tag",
            Operation::LvRemoveTag => "lv_remove_tag",
            Operation::LvTags => "lv_tags",
            Operation::LvActivate => "lv_activate",
            Operation::LvDeactivate => "lv_deactivate",
            Operation::LvRemove => "lv_remove",
            Operation::LvResize => "lv_resize",
            Operation::PvQuery => "pv_query",
            Operation::PvResize => "pv_resize",
        }
    }

    fn takes_tag(&self) -> bool {
        matches!(
            self,
            Operation::VgAddTag
                | Operation::VgRemoveTag
                | Operation::LvAddTag
                | Operation::LvRemoveTag
        )
    }

    fn takes_name(&self) -> bool {
        matches!(
            self,
            Operation::VgOpen
                | Operation::VgCreate
                | Operation::CreateLvLinear
                | Operation::LvLookup
                | Operation::PvLookup
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context attached to every error: what was attempted, on what, and why it failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub operation: Operation,
    pub target: String,
    pub detail: String,
    pub native: Option<NativeError>,
}

impl Failure {
    /// A failure detected by the binding before reaching the library
    pub fn binding(
        operation: Operation,
        target: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            target: target.into(),
            detail: detail.into(),
            native: None,
        }
    }

    /// A failure reported by the library
    pub fn native(operation: Operation, target: impl Into<String>, native: NativeError) -> Self {
        Self {
            operation,
            target: target.into(),
            detail: native.message.clone(),
            native: Some(native),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.target.is_empty() {
            write!(f, "{}", self.operation)?;
        } else {
            write!(f, "{} '{}'", self.operation, self.target)?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        if let Some(native) = &self.native {
            write!(f, " (errno {})", native.errno)?;
        }
        Ok(())
    }
}

/// Discriminant of `LvmError`, for callers that branch on the kind only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Initialization,
    NotFound,
    Lock,
    Capability,
    InsufficientSpace,
    InvalidName,
    InvalidTag,
    InvalidArgument,
    Busy,
    UseAfterClose,
    Native,
}

impl ErrorKind {
    /// Busy volumes and contended locks clear on their own; everything else
    /// needs the caller to change something first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Busy | ErrorKind::Lock)
    }
}

/// Error types for LVM operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LvmError {
    #[error("LVM library initialization failed: {0}")]
    Initialization(Failure),

    #[error("Not found: {0}")]
    NotFound(Failure),

    #[error("Volume group is locked: {0}")]
    Lock(Failure),

    #[error("Operation not permitted in this mode: {0}")]
    Capability(Failure),

    #[error("Insufficient space: {0}")]
    InsufficientSpace(Failure),

    #[error("Invalid name: {0}")]
    InvalidName(Failure),

    #[error("Invalid tag: {0}")]
    InvalidTag(Failure),

    #[error("Invalid argument: {0}")]
    InvalidArgument(Failure),

    #[error("Resource busy: {0}")]
    Busy(Failure),

    #[error("Handle used after close: {0}")]
    UseAfterClose(Failure),

    #[error("LVM operation failed: {0}")]
    Native(Failure),
}

impl LvmError {
    pub fn new(kind: ErrorKind, failure: Failure) -> Self {
        match kind {
            ErrorKind::Initialization => LvmError::Initialization(failure),
            ErrorKind::NotFound => LvmError::NotFound(failure),
            ErrorKind::Lock => LvmError::Lock(failure),
            ErrorKind::Capability => LvmError::Capability(failure),
            ErrorKind::InsufficientSpace => LvmError::InsufficientSpace(failure),
            ErrorKind::InvalidName => LvmError::InvalidName(failure),
            ErrorKind::InvalidTag => LvmError::InvalidTag(failure),
            ErrorKind::InvalidArgument => LvmError::InvalidArgument(failure),
            ErrorKind::Busy => LvmError::Busy(failure),
            ErrorKind::UseAfterClose => LvmError::UseAfterClose(failure),
            ErrorKind::Native => LvmError::Native(failure),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LvmError::Initialization(_) => ErrorKind::Initialization,
            LvmError::NotFound(_) => ErrorKind::NotFound,
            LvmError::Lock(_) => ErrorKind::Lock,
            LvmError::Capability(_) => ErrorKind::Capability,
            LvmError::InsufficientSpace(_) => ErrorKind::InsufficientSpace,
            LvmError::InvalidName(_) => ErrorKind::InvalidName,
            LvmError::InvalidTag(_) => ErrorKind::InvalidTag,
            LvmError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            LvmError::Busy(_) => ErrorKind::Busy,
            LvmError::UseAfterClose(_) => ErrorKind::UseAfterClose,
            LvmError::Native(_) => ErrorKind::Native,
        }
    }

    pub fn failure(&self) -> &Failure {
        match self {
            LvmError::Initialization(f)
            | LvmError::NotFound(f)
            | LvmError::Lock(f)
            | LvmError::Capability(f)
            | LvmError::InsufficientSpace(f)
            | LvmError::InvalidName(f)
            | LvmError::InvalidTag(f)
            | LvmError::InvalidArgument(f)
            | LvmError::Busy(f)
            | LvmError::UseAfterClose(f)
            | LvmError::Native(f) => f,
        }
    }

    /// Errno and message from the library, if the library produced this error
    pub fn native(&self) -> Option<&NativeError> {
        self.failure().native.as_ref()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub(crate) fn binding(
        kind: ErrorKind,
        operation: Operation,
        target: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(kind, Failure::binding(operation, target, detail))
    }

    pub(crate) fn closed(operation: Operation, target: impl Into<String>, what: &str) -> Self {
        Self::binding(
            ErrorKind::UseAfterClose,
            operation,
            target,
            format!("{what} is no longer valid"),
        )
    }

    pub(crate) fn read_only(operation: Operation, target: impl Into<String>) -> Self {
        Self::binding(
            ErrorKind::Capability,
            operation,
            target,
            "volume group is open read-only",
        )
    }
}

/// Translate a native failure into a kind-tagged error.
///
/// Specific errno values win; lvm2app reports many failures as a bare
/// `EINVAL`, so the message text is consulted next, and only then does a
/// generic `EINVAL` fall back to the kind implied by the operation.
pub fn classify(operation: Operation, target: &str, native: NativeError) -> LvmError {
    let kind = if operation == Operation::Init {
        ErrorKind::Initialization
    } else {
        kind_for_errno(native.errno)
            .or_else(|| kind_for_message(&native.message))
            .or_else(|| kind_for_invalid(operation, native.errno))
            .unwrap_or(ErrorKind::Native)
    };
    LvmError::new(kind, Failure::native(operation, target, native))
}

fn kind_for_errno(errno: i32) -> Option<ErrorKind> {
    match errno {
        libc::EPERM | libc::EROFS | libc::EACCES => Some(ErrorKind::Capability),
        libc::ENOENT | libc::ENODEV | libc::ENXIO => Some(ErrorKind::NotFound),
        libc::EAGAIN | libc::ENOLCK | libc::EDEADLK => Some(ErrorKind::Lock),
        libc::EBUSY => Some(ErrorKind::Busy),
        libc::ENOSPC => Some(ErrorKind::InsufficientSpace),
        libc::EEXIST | libc::ENAMETOOLONG => Some(ErrorKind::InvalidName),
        _ => None,
    }
}

fn kind_for_message(message: &str) -> Option<ErrorKind> {
    let message = message.to_ascii_lowercase();
    if message.contains("in use") || message.contains("is open") || message.contains("busy") {
        Some(ErrorKind::Busy)
    } else if mentions_lock(&message) {
        Some(ErrorKind::Lock)
    } else if message.contains("not found")
        || message.contains("doesn't exist")
        || message.contains("does not exist")
    {
        Some(ErrorKind::NotFound)
    } else if message.contains("insufficient") || message.contains("not enough") {
        Some(ErrorKind::InsufficientSpace)
    } else if message.contains("already exists") {
        Some(ErrorKind::InvalidName)
    } else if message.contains("read-only") || message.contains("read only") {
        Some(ErrorKind::Capability)
    } else {
        None
    }
}

/// Matches "lock", "locked", "locking" and "locks" as whole words only, so
/// that "block" or "unlocked" never count.
fn mentions_lock(message: &str) -> bool {
    message
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| matches!(word, "lock" | "locks" | "locked" | "locking"))
}

fn kind_for_invalid(operation: Operation, errno: i32) -> Option<ErrorKind> {
    if errno != libc::EINVAL {
        return None;
    }
    if operation.takes_tag() {
        Some(ErrorKind::InvalidTag)
    } else if operation.takes_name() {
        Some(ErrorKind::InvalidName)
    } else {
        Some(ErrorKind::InvalidArgument)
    }
}

/// Result type alias for LVM operations
pub type Result<T> = std::result::Result<T, LvmError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn native(errno: i32, message: &str) -> NativeError {
        NativeError::new(errno, message)
    }

    #[test]
    fn errno_takes_precedence() {
        let err = classify(Operation::LvDeactivate, "myvg/lv0", native(libc::EBUSY, ""));
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert!(err.is_retryable());

        let err = classify(Operation::VgOpen, "myvg", native(libc::EAGAIN, "whatever"));
        assert_eq!(err.kind(), ErrorKind::Lock);

        let err = classify(Operation::VgOpen, "nope", native(libc::ENOENT, ""));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!err.is_retryable());
    }

    #[test]
    fn generic_einval_falls_back_to_message_then_operation() {
        let err = classify(
            Operation::LvDeactivate,
            "myvg/lv0",
            native(libc::EINVAL, "Logical volume myvg/lv0 in use."),
        );
        assert_eq!(err.kind(), ErrorKind::Busy);

        let err = classify(
            Operation::CreateLvLinear,
            "lv0",
            native(libc::EINVAL, "Insufficient free space: 1 extents needed"),
        );
        assert_eq!(err.kind(), ErrorKind::InsufficientSpace);

        let err = classify(Operation::LvAddTag, "bad tag", native(libc::EINVAL, ""));
        assert_eq!(err.kind(), ErrorKind::InvalidTag);

        let err = classify(Operation::CreateLvLinear, "-x", native(libc::EINVAL, ""));
        assert_eq!(err.kind(), ErrorKind::InvalidName);

        let err = classify(Operation::LvResize, "lv0", native(libc::EINVAL, ""));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn lock_is_matched_as_a_word() {
        let err = classify(
            Operation::VgOpen,
            "myvg",
            native(libc::EINVAL, "Can't get lock for myvg"),
        );
        assert_eq!(err.kind(), ErrorKind::Lock);

        let err = classify(
            Operation::VgWrite,
            "myvg",
            native(libc::EINVAL, "VG myvg is locked by another host"),
        );
        assert_eq!(err.kind(), ErrorKind::Lock);

        let err = classify(
            Operation::LvResize,
            "myvg/lv0",
            native(libc::EINVAL, "Failed to read metadata block from /dev/loop0"),
        );
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!err.is_retryable());

        let err = classify(
            Operation::Scan,
            "",
            native(libc::EIO, "Device /dev/loop0 blocklist entry unlocked"),
        );
        assert_eq!(err.kind(), ErrorKind::Native);
    }

    #[test]
    fn unknown_failures_stay_native() {
        let err = classify(Operation::Scan, "", native(libc::EIO, "device read error"));
        assert_eq!(err.kind(), ErrorKind::Native);
        assert_eq!(err.native().map(|n| n.errno), Some(libc::EIO));
    }

    #[test]
    fn init_failures_are_always_initialization() {
        let err = classify(Operation::Init, "", native(libc::ENOENT, "no dm"));
        assert_eq!(err.kind(), ErrorKind::Initialization);
    }

    #[test]
    fn display_includes_operation_target_and_errno() {
        let err = classify(
            Operation::VgOpen,
            "myvg",
            native(libc::ENOENT, "Volume group \"myvg\" not found"),
        );
        let text = err.to_string();
        assert!(text.starts_with("Not found: vg_open 'myvg'"));
        assert!(text.ends_with(&format!("(errno {})", libc::ENOENT)));
    }
}
