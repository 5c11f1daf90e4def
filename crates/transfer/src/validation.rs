use std::path::{Component, Path};

use crate::TransferError;

/// Longest file name most filesystems accept.
pub(crate) const MAX_FILE_NAME_LEN: usize = 255;

/// Validates a client-supplied file name before it becomes part of a
/// storage name inside the uploads directory.
///
/// Rejects:
/// - Empty names and names longer than 255 bytes
/// - Any path separator (`/` or `\`), so the name is a single component
/// - `.` and `..`
/// - Control characters (including NUL)
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidFileName("empty name".into()));
    }

    if name.len() > MAX_FILE_NAME_LEN {
        return Err(TransferError::InvalidFileName(format!(
            "name longer than {MAX_FILE_NAME_LEN} bytes"
        )));
    }

    if name.contains(['/', '\\']) {
        return Err(TransferError::InvalidFileName(format!(
            "path separators not allowed: {name}"
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(TransferError::InvalidFileName(
            "control characters not allowed".into(),
        ));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TransferError::InvalidFileName(format!(
            "not a plain file name: {name}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_name() {
        assert!(validate_file_name("").is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(validate_file_name("../../../etc/passwd").is_err());
        assert!(validate_file_name("..").is_err());
    }

    #[test]
    fn rejects_current_dir() {
        assert!(validate_file_name(".").is_err());
    }

    #[test]
    fn rejects_absolute_unix_path() {
        assert!(validate_file_name("/tmp/malicious").is_err());
    }

    #[test]
    fn rejects_windows_separators() {
        assert!(validate_file_name("C:\\Windows\\evil").is_err());
        assert!(validate_file_name("sub\\file.txt").is_err());
    }

    #[test]
    fn rejects_subdirectory_path() {
        assert!(validate_file_name("sub/dir/file.txt").is_err());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(validate_file_name("bad\0name").is_err());
        assert!(validate_file_name("line\nbreak.txt").is_err());
    }

    #[test]
    fn rejects_overlong_name() {
        let name = "a".repeat(256);
        assert!(validate_file_name(&name).is_err());
        assert!(validate_file_name(&"a".repeat(255)).is_ok());
    }

    #[test]
    fn accepts_simple_filename() {
        assert!(validate_file_name("a.txt").is_ok());
        assert!(validate_file_name("Quarterly Report (final).pdf").is_ok());
    }

    #[test]
    fn accepts_dotfile_and_unicode() {
        assert!(validate_file_name(".env").is_ok());
        assert!(validate_file_name("résumé.docx").is_ok());
    }
}
