// SPDX-License-Identifier: GPL-3.0-only

//! Name and tag validation
//!
//! Mirrors the checks the LVM tools apply, so that malformed input is
//! rejected with a precise error kind before anything reaches the library.

use crate::error::{ErrorKind, LvmError, Operation, Result};

/// Longest volume group or logical volume name LVM accepts
pub const MAX_NAME_LEN: usize = 127;

/// Longest tag LVM accepts
pub const MAX_TAG_LEN: usize = 1024;

const RESERVED_LV_PREFIXES: &[&str] = &["snapshot", "pvmove"];

const RESERVED_LV_SUFFIXES: &[&str] = &[
    "_cdata", "_cmeta", "_corig", "_mlog", "_mimage", "_pmspare", "_rimage", "_rmeta", "_tdata",
    "_tmeta", "_vorigin", "_vdata",
];

fn name_error(operation: Operation, name: &str, detail: impl Into<String>) -> LvmError {
    LvmError::binding(ErrorKind::InvalidName, operation, name, detail)
}

fn check_common_name(operation: Operation, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(name_error(operation, name, "name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(name_error(
            operation,
            name,
            format!("name is longer than {MAX_NAME_LEN} characters"),
        ));
    }
    if name == "." || name == ".." {
        return Err(name_error(operation, name, "name is reserved"));
    }
    if name.starts_with('-') {
        return Err(name_error(operation, name, "name must not start with '-'"));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+')))
    {
        return Err(name_error(
            operation,
            name,
            format!("character {bad:?} is not allowed"),
        ));
    }
    Ok(())
}

/// Validate a volume group name
pub fn validate_vg_name(operation: Operation, name: &str) -> Result<()> {
    check_common_name(operation, name)
}

/// Validate a logical volume name, including LVM's reserved names
pub fn validate_lv_name(operation: Operation, name: &str) -> Result<()> {
    check_common_name(operation, name)?;

    if let Some(prefix) = RESERVED_LV_PREFIXES
        .iter()
        .find(|prefix| name.starts_with(*prefix))
    {
        return Err(name_error(
            operation,
            name,
            format!("names starting with '{prefix}' are reserved"),
        ));
    }
    if let Some(suffix) = RESERVED_LV_SUFFIXES
        .iter()
        .find(|suffix| name.contains(*suffix))
    {
        return Err(name_error(
            operation,
            name,
            format!("names containing '{suffix}' are reserved"),
        ));
    }
    Ok(())
}

/// Validate a device path handed to extend/reduce/lookup calls
pub fn validate_device(operation: Operation, device: &str) -> Result<()> {
    if device.is_empty() || device.contains('\0') {
        return Err(name_error(operation, device, "device path is empty or contains NUL"));
    }
    Ok(())
}

/// Validate a tag against LVM's allowed character set
pub fn validate_tag(operation: Operation, tag: &str) -> Result<()> {
    let fail = |detail: String| LvmError::binding(ErrorKind::InvalidTag, operation, tag, detail);

    if tag.is_empty() {
        return Err(fail("tag is empty".to_string()));
    }
    if tag.len() > MAX_TAG_LEN {
        return Err(fail(format!("tag is longer than {MAX_TAG_LEN} characters")));
    }
    if let Some(bad) = tag.chars().find(|c| {
        !(c.is_ascii_alphanumeric()
            || matches!(c, '.' | '_' | '-' | '+' | '/' | '=' | '!' | ':' | '&' | '#'))
    }) {
        return Err(fail(format!("character {bad:?} is not allowed")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_regular_names() {
        assert!(validate_vg_name(Operation::VgOpen, "myvg").is_ok());
        assert!(validate_lv_name(Operation::CreateLvLinear, "lv_foobar").is_ok());
        assert!(validate_lv_name(Operation::CreateLvLinear, "data.01+x").is_ok());
    }

    #[test]
    fn rejects_malformed_names() {
        for name in ["", ".", "..", "-lv", "lv/0", "lv 0", "lv\0"] {
            let err = validate_lv_name(Operation::CreateLvLinear, name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidName, "{name:?}");
        }
        let long = "a".repeat(MAX_NAME_LEN + 1);
        assert!(validate_vg_name(Operation::VgOpen, &long).is_err());
    }

    #[test]
    fn rejects_reserved_lv_names() {
        assert!(validate_lv_name(Operation::CreateLvLinear, "snapshot0").is_err());
        assert!(validate_lv_name(Operation::CreateLvLinear, "pvmove1").is_err());
        assert!(validate_lv_name(Operation::CreateLvLinear, "data_rimage_0").is_err());
        // Only logical volumes carry these restrictions
        assert!(validate_vg_name(Operation::VgCreate, "snapshot0").is_ok());
    }

    #[test]
    fn tags_use_the_extended_character_set() {
        assert!(validate_tag(Operation::LvAddTag, "my_fance_tag").is_ok());
        assert!(validate_tag(Operation::LvAddTag, "owner=ops/team:a&b#1!").is_ok());

        let err = validate_tag(Operation::LvAddTag, "has space").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTag);
        assert!(validate_tag(Operation::VgAddTag, "").is_err());
        assert!(validate_tag(Operation::VgAddTag, "@home").is_err());
    }
}
