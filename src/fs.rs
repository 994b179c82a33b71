use std::{io::Read, time::SystemTime};

use time::OffsetDateTime;
use tracing::{error, info, span, Level};

use crate::{
    adapter::Adapter,
    model::{
        error::{AdapterError, Result},
        fs::{DirectoryRecord, FileMetadata, ObjectRecord, ReadResult, Visibility, WriteResult},
        options::{Config, SignOptions},
    },
    util::path::normalize_path,
};

/// Filesystem handle over any [`Adapter`].
///
/// Every path is normalized before it reaches the adapter, so `/a//b/../c`
/// and `a/c` address the same object.
pub struct Filesystem {
    adapter: Box<dyn Adapter>,
}

impl Filesystem {
    pub fn new(adapter: Box<dyn Adapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    pub fn write(&self, path: &str, contents: &[u8], config: &Config) -> Result<WriteResult> {
        self.adapter.write(&normalize_path(path)?, contents, config)
    }

    pub fn write_stream(
        &self,
        path: &str,
        stream: &mut dyn Read,
        config: &Config,
    ) -> Result<WriteResult> {
        self.adapter
            .write_stream(&normalize_path(path)?, stream, config)
    }

    pub fn update(&self, path: &str, contents: &[u8], config: &Config) -> Result<WriteResult> {
        self.adapter.update(&normalize_path(path)?, contents, config)
    }

    pub fn update_stream(
        &self,
        path: &str,
        stream: &mut dyn Read,
        config: &Config,
    ) -> Result<WriteResult> {
        self.adapter
            .update_stream(&normalize_path(path)?, stream, config)
    }

    /// Writes a new file or updates an existing one.
    pub fn put(&self, path: &str, contents: &[u8], config: &Config) -> Result<WriteResult> {
        let span = span!(Level::INFO, "put", context = "put");
        let _e = span.enter();

        let path = normalize_path(path)?;
        if self.adapter.has(&path) {
            info!(path = %path, "updating existing file");
            self.adapter.update(&path, contents, config)
        } else {
            self.adapter.write(&path, contents, config)
        }
    }

    pub fn read(&self, path: &str) -> Result<ReadResult> {
        self.adapter.read(&normalize_path(path)?)
    }

    pub fn read_stream(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        self.adapter.read_stream(&normalize_path(path)?)
    }

    /// Reads a file and deletes it once the contents are in hand.
    pub fn read_and_delete(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize_path(path)?;
        let result = self.adapter.read(&path)?;
        self.adapter.delete(&path)?;

        Ok(result.contents)
    }

    pub fn has(&self, path: &str) -> bool {
        match normalize_path(path) {
            Ok(path) => self.adapter.has(&path),
            Err(_) => false,
        }
    }

    pub fn try_has(&self, path: &str) -> Result<bool> {
        self.adapter.try_has(&normalize_path(path)?)
    }

    pub fn rename(&self, path: &str, new_path: &str) -> Result<()> {
        self.adapter
            .rename(&normalize_path(path)?, &normalize_path(new_path)?)
    }

    pub fn copy(&self, path: &str, new_path: &str) -> Result<()> {
        self.adapter
            .copy(&normalize_path(path)?, &normalize_path(new_path)?)
    }

    pub fn delete(&self, path: &str) -> Result<()> {
        self.adapter.delete(&normalize_path(path)?)
    }

    /// Deletes a directory and everything below it. The root itself is
    /// never deleted.
    pub fn delete_dir(&self, dirname: &str) -> Result<()> {
        let dirname = normalize_path(dirname)?;
        if dirname.is_empty() {
            error!(error_group = "delete_dir", "root directory deletion refused");
            return Err(AdapterError::RootViolation("delete"));
        }

        self.adapter.delete_dir(&dirname)
    }

    pub fn create_dir(&self, dirname: &str, config: &Config) -> Result<DirectoryRecord> {
        self.adapter.create_dir(&normalize_path(dirname)?, config)
    }

    pub fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<ObjectRecord>> {
        self.adapter
            .list_contents(&normalize_path(directory)?, recursive)
    }

    pub fn get_metadata(&self, path: &str) -> Result<FileMetadata> {
        self.adapter.get_metadata(&normalize_path(path)?)
    }

    pub fn get_size(&self, path: &str) -> Result<u64> {
        Ok(self.adapter.get_size(&normalize_path(path)?)?.size)
    }

    pub fn get_mimetype(&self, path: &str) -> Result<Option<String>> {
        Ok(self.adapter.get_mimetype(&normalize_path(path)?)?.mimetype)
    }

    pub fn get_timestamp(&self, path: &str) -> Result<SystemTime> {
        Ok(self.adapter.get_timestamp(&normalize_path(path)?)?.timestamp)
    }

    pub fn get_visibility(&self, path: &str) -> Result<Visibility> {
        self.adapter.get_visibility(&normalize_path(path)?)
    }

    pub fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        self.adapter
            .set_visibility(&normalize_path(path)?, visibility)
    }

    pub fn get_url(&self, path: &str) -> Result<String> {
        Ok(self.adapter.get_url(&normalize_path(path)?))
    }

    pub fn get_temporary_url(
        &self,
        path: &str,
        expiration: OffsetDateTime,
        options: &SignOptions,
    ) -> Result<String> {
        self.adapter
            .get_temporary_url(&normalize_path(path)?, expiration, options)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        adapter::OssAdapter,
        adapters::memory::{Call, MemoryClient},
    };

    fn filesystem() -> (Arc<MemoryClient>, Filesystem) {
        let client = Arc::new(MemoryClient::new());
        let adapter = OssAdapter::new(client.clone(), "dummy-bucket", "oss-cn-hangzhou.aliyuncs.com")
            .with_prefix(Some("root"));
        (client, Filesystem::new(Box::new(adapter)))
    }

    #[test]
    fn test_paths_are_normalized() {
        let (client, fs) = filesystem();

        let cases = vec![
            ("a.txt", "root/a.txt"),
            ("/b.txt", "root/b.txt"),
            ("dir//c.txt", "root/dir/c.txt"),
            ("dir\\sub\\..\\d.txt", "root/dir/d.txt"),
            ("./e.txt/", "root/e.txt"),
        ];

        for (path, key) in cases {
            client.clear_calls();
            fs.write(path, b"x", &Config::new()).unwrap();

            match &client.calls()[0] {
                Call::Put { key: stored, .. } => assert_eq!(stored, key, "failed for case: {}", path),
                call => panic!("unexpected call: {:?}", call),
            }
        }
    }

    #[test]
    fn test_path_outside_root() {
        let (client, fs) = filesystem();

        let err = fs.read("../etc/passwd").unwrap_err();

        assert!(matches!(err, AdapterError::PathOutsideRoot(_)));
        assert!(client.calls().is_empty());
        assert!(!fs.has("../x"));
    }

    #[test]
    fn test_put_writes_or_updates() {
        let (client, fs) = filesystem();

        fs.put("a.txt", b"one", &Config::new()).unwrap();
        fs.put("a.txt", b"two", &Config::new()).unwrap();

        assert_eq!(fs.read("a.txt").unwrap().contents, b"two".to_vec());
        let exists = client
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Exists { .. }))
            .count();
        assert_eq!(exists, 2);
    }

    #[test]
    fn test_read_and_delete() {
        let (client, fs) = filesystem();
        fs.write("a.txt", b"gone", &Config::new()).unwrap();

        assert_eq!(fs.read_and_delete("a.txt").unwrap(), b"gone".to_vec());
        assert!(client.keys("dummy-bucket").is_empty());
        assert!(fs.read_and_delete("a.txt").is_err());
    }

    #[test]
    fn test_delete_dir_refuses_root() {
        let (client, fs) = filesystem();
        fs.write("keep/a.txt", b"a", &Config::new()).unwrap();
        fs.write("b.txt", b"b", &Config::new()).unwrap();
        client.clear_calls();

        for dirname in ["", "/", ".", "keep/..", "\\"] {
            assert!(
                matches!(fs.delete_dir(dirname), Err(AdapterError::RootViolation(_))),
                "failed for case: {:?}",
                dirname
            );
        }

        assert!(client.calls().is_empty());
        assert_eq!(client.keys("dummy-bucket"), vec!["root/b.txt", "root/keep/a.txt"]);

        fs.delete_dir("/keep/").unwrap();
        assert_eq!(client.keys("dummy-bucket"), vec!["root/b.txt"]);
    }

    #[test]
    fn test_narrowed_metadata() {
        let (_, fs) = filesystem();
        fs.write("img/logo.png", b"\x89PNG", &Config::new()).unwrap();

        assert_eq!(fs.get_size("img/logo.png").unwrap(), 4);
        assert_eq!(fs.get_mimetype("img/logo.png").unwrap().as_deref(), Some("image/png"));
        assert!(fs.get_timestamp("img/logo.png").unwrap() > SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn test_get_url() {
        let (_, fs) = filesystem();

        assert_eq!(
            fs.get_url("/dir/a.txt").unwrap(),
            "https://oss-cn-hangzhou.aliyuncs.com/root/dir/a.txt"
        );
    }
}
