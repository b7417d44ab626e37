//! Turning a user's name reply into a safe file name.

use relayfile_session::MediaKind;
use tracing::warn;

/// Name used when neither the reply nor the original name survives
/// sanitization.
const LAST_RESORT_NAME: &str = "file";

/// Result of [`sanitize_name`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedName {
    pub name: String,
    /// The reply was unusable and the original name was used instead.
    pub fell_back: bool,
    /// An extension was added because the name had none.
    pub extension_appended: bool,
}

/// Sanitizes a user-supplied file name.
///
/// Directory components are stripped (both `/` and `\` count as
/// separators), control characters are dropped and whitespace is trimmed.
/// An empty result, `.` or `..` falls back to `original`. A name without
/// an extension gets the extension of `original`, or the default one for
/// `source_kind` when the original has none either.
pub fn sanitize_name(reply: &str, original: &str, source_kind: MediaKind) -> SanitizedName {
    let (mut name, fell_back) = match clean(reply) {
        Some(name) => (name, false),
        None => {
            let fallback = clean(original).unwrap_or_else(|| LAST_RESORT_NAME.to_string());
            warn!(reply, fallback = %fallback, "unusable name reply, keeping original name");
            (fallback, true)
        }
    };

    let mut extension_appended = false;
    if extension(&name).is_none() {
        let ext = extension(original)
            .map(str::to_string)
            .or_else(|| source_kind.default_extension().map(str::to_string));
        if let Some(ext) = ext {
            name.push('.');
            name.push_str(&ext);
            extension_appended = true;
        }
    }

    SanitizedName {
        name,
        fell_back,
        extension_appended,
    }
}

/// Last path component, without control characters, trimmed.
fn clean(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let name: String = last.chars().filter(|c| !c.is_control()).collect();
    let name = name.trim();
    match name {
        "" | "." | ".." => None,
        _ => Some(name.to_string()),
    }
}

/// Extension of a file name, ignoring leading-dot names like `.bashrc`
/// and a trailing bare dot.
fn extension(name: &str) -> Option<&str> {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() && !ext.contains(' ') => Some(ext),
        _ => None,
    }
}
