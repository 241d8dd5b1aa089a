//! Name and path helpers shared by the scaffolder, ingestor and planner.
//!
//! Everything here is pure: no filesystem access, no allocation of ids.
//! Span fields go through [`redact_path`] so traces never carry full paths.

use std::path::{Path, PathBuf};

use crate::error::StorageError;

/// Maximum length of a project folder name, in bytes.
pub const MAX_FOLDER_NAME_LEN: usize = 120;

/// Fallback slug when a display name has no ASCII letters or digits.
pub const DEFAULT_SLUG: &str = "project";

/// Locale segment used when a locale sanitizes to nothing.
pub const UNDETERMINED_LOCALE: &str = "und";

const RESERVED_CHARS: [char; 8] = ['<', '>', ':', '"', '|', '?', '*', '\''];

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Absolute path of a `/`-separated path relative to the project root.
pub fn stored_path(project_dir: &Path, rel_path: &str) -> PathBuf {
    rel_path
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(project_dir.to_path_buf(), |path, part| path.join(part))
}

/// Validates a project folder name and returns it trimmed.
pub fn validate_folder_name(name: &str) -> Result<&str, StorageError> {
    let trimmed = name.trim();
    let invalid = |reason: &str| StorageError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if trimmed.is_empty() {
        return Err(invalid("folder name cannot be empty"));
    }
    if trimmed.len() > MAX_FOLDER_NAME_LEN {
        return Err(invalid(&format!(
            "folder name must be at most {MAX_FOLDER_NAME_LEN} characters"
        )));
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(invalid("folder name must not contain path separators"));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(invalid("folder name must not be a relative path component"));
    }
    if trimmed
        .chars()
        .any(|ch| ch.is_control() || ch.is_whitespace() || RESERVED_CHARS.contains(&ch))
    {
        return Err(invalid("folder name contains unsupported characters"));
    }

    Ok(trimmed)
}

/// Lowercase ASCII slug with single dashes between words.
///
/// `"  Marketing Launch  "` becomes `"marketing-launch"`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = false;

    for ch in name.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() {
            slug.push(lower);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }

    // Leave room for a numeric collision suffix.
    let mut trimmed = slug.trim_matches('-').to_string();
    trimmed.truncate(MAX_FOLDER_NAME_LEN - 8);
    let trimmed = trimmed.trim_end_matches('-');

    if trimmed.is_empty() {
        DEFAULT_SLUG.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Folder-safe form of a locale code: ASCII alphanumerics are kept and every
/// other run of characters becomes a single `-`, so `_` never appears.
pub fn sanitize_locale_segment(locale: &str) -> String {
    let mut sanitized = String::with_capacity(locale.len());
    for ch in locale.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            sanitized.push(ch);
        } else if !sanitized.ends_with('-') {
            sanitized.push('-');
        }
    }

    let collapsed = sanitized.trim_matches('-');
    if collapsed.is_empty() {
        UNDETERMINED_LOCALE.to_string()
    } else {
        collapsed.to_string()
    }
}

/// `{source}_{target}` folder name for a language pair. The `_` separator
/// cannot occur inside a sanitized segment.
pub fn language_pair_dir_name(source_lang: &str, target_lang: &str) -> String {
    format!(
        "{}_{}",
        sanitize_locale_segment(source_lang),
        sanitize_locale_segment(target_lang)
    )
}

/// Builds the stored filename for an asset: separators are replaced and the
/// extension is appended unless the name already ends with it.
pub fn destination_filename(name: &str, extension: &str) -> String {
    let name = name.trim().replace(['/', '\\'], "_");
    let ext = extension.trim().trim_start_matches('.');
    if ext.is_empty() {
        return name;
    }

    let has_extension = name
        .rsplit_once('.')
        .map(|(_, existing)| existing.eq_ignore_ascii_case(ext))
        .unwrap_or(false);

    if has_extension {
        name
    } else {
        format!("{name}.{ext}")
    }
}
