use super::DatabaseError;
use std::fmt;

// Characters the Realtime Database does not accept inside a key.
const FORBIDDEN_KEY_CHARS: &[char] = &['.', '#', '$', '[', ']'];

/// An absolute location in the database tree.
///
/// Always starts with `/`, never ends with one (except the root itself) and
/// never contains empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path(String);

impl Path {
    /// The root location, `/`.
    pub fn root() -> Self {
        Path("/".to_string())
    }

    /// Parses and normalizes a slash-separated path. Leading, trailing and
    /// duplicate separators are collapsed, so `""`, `"/"` and `"//"` are all the root.
    pub fn new(path: &str) -> Result<Self, DatabaseError> {
        join(&Path::root(), path)
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The non-empty segments of the path, root first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// The last segment, or `None` for the root.
    pub fn key(&self) -> Option<&str> {
        key_of(self)
    }

    pub fn parent(&self) -> Result<Path, DatabaseError> {
        parent_of(self)
    }

    pub fn child(&self, relative: &str) -> Result<Path, DatabaseError> {
        join(self, relative)
    }

    // Keys taken from data the server returned are valid by construction.
    pub(crate) fn child_unchecked(&self, key: &str) -> Path {
        if self.is_root() {
            Path(format!("/{}", key))
        } else {
            Path(format!("{}/{}", self.0, key))
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Path {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Appends `segment` (which may itself contain `/`) to `base`.
pub fn join(base: &Path, segment: &str) -> Result<Path, DatabaseError> {
    let mut joined = base.0.clone();
    for part in segment.split('/').filter(|part| !part.is_empty()) {
        validate_key(part)?;
        if !joined.ends_with('/') {
            joined.push('/');
        }
        joined.push_str(part);
    }
    Ok(Path(joined))
}

/// The path one level up. Fails with `OutOfRange` on the root.
pub fn parent_of(path: &Path) -> Result<Path, DatabaseError> {
    if path.is_root() {
        return Err(DatabaseError::OutOfRange(
            "Cannot get the parent of the root reference".to_string(),
        ));
    }

    match path.0.rfind('/') {
        Some(0) | None => Ok(Path::root()),
        Some(idx) => Ok(Path(path.0[..idx].to_string())),
    }
}

pub fn key_of(path: &Path) -> Option<&str> {
    path.segments().last()
}

fn validate_key(key: &str) -> Result<(), DatabaseError> {
    if key.contains(FORBIDDEN_KEY_CHARS) || key.chars().any(|c| c.is_ascii_control()) {
        return Err(DatabaseError::InvalidArgument(format!(
            "Invalid path segment '{}': keys must not contain '.', '#', '$', '[', ']' or control characters",
            key
        )));
    }
    Ok(())
}
