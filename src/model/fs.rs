use std::time::SystemTime;

/// An object as reported by a store listing.
#[derive(Clone, Debug, PartialEq)]
pub struct FSObject {
    pub key: String,
    pub size: u64,
    pub modified_time: SystemTime,
}

/// One page of a delimited listing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FSListing {
    pub objects: Vec<FSObject>,
    pub prefixes: Vec<String>,
    pub next_marker: Option<String>,
    pub is_truncated: bool,
}

/// Parameters of a single `list_objects` request.
#[derive(Clone, Debug, PartialEq)]
pub struct ListOptions {
    pub delimiter: String,
    pub prefix: String,
    pub max_keys: usize,
    pub marker: String,
}

/// Result of a `head` request.
#[derive(Clone, Debug, PartialEq)]
pub struct FSObjectMeta {
    pub modified_time: SystemTime,
    pub content_type: Option<String>,
    pub content_length: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FileRecord {
    pub path: String,
    pub timestamp: SystemTime,
    pub size: u64,
    pub mimetype: Option<String>,
}

/// A directory seen through the store.
///
/// `timestamp` is `None` when the directory was synthesized from a common
/// prefix or created without a timestamped response.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectoryRecord {
    pub path: String,
    pub timestamp: Option<SystemTime>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ObjectRecord {
    File(FileRecord),
    Directory(DirectoryRecord),
}

impl ObjectRecord {
    pub fn path(&self) -> &str {
        match self {
            ObjectRecord::File(file) => &file.path,
            ObjectRecord::Directory(dir) => &dir.path,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, ObjectRecord::Directory(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WriteResult {
    pub path: String,
    pub contents: Vec<u8>,
    pub mimetype: String,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReadResult {
    pub path: String,
    pub contents: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FileMetadata {
    pub dirname: String,
    pub path: String,
    pub timestamp: SystemTime,
    pub mimetype: Option<String>,
    pub size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}
