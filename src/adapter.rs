use std::{
    io::{Cursor, Read},
    sync::Arc,
};

use time::OffsetDateTime;
use tracing::{error, info, span, warn, Level};

use crate::{
    adapters::{self, ObjectClient},
    model::{
        error::{AdapterError, Result, StoreError},
        fs::{
            DirectoryRecord, FileMetadata, FileRecord, ListOptions, ObjectRecord, ReadResult,
            Visibility, WriteResult,
        },
        options::{Config, ObjectOptions, SignOptions},
    },
    util::{self, path::PathPrefix},
};

/// Keys requested per `list_objects` page.
pub const LIST_PAGE_SIZE: usize = 1000;
/// Deepest directory nesting a recursive listing will descend into.
pub const MAX_LIST_DEPTH: usize = 64;

const DELIMITER: &str = "/";

/// Filesystem verbs over some backing store.
///
/// Paths are logical and already normalized. Store failures surface as
/// [`AdapterError::StoreOperationFailed`].
pub trait Adapter: Send + Sync {
    fn write(&self, path: &str, contents: &[u8], config: &Config) -> Result<WriteResult>;

    fn write_stream(
        &self,
        path: &str,
        stream: &mut dyn Read,
        config: &Config,
    ) -> Result<WriteResult> {
        let mut contents = Vec::new();
        stream.read_to_end(&mut contents)?;
        self.write(path, &contents, config)
    }

    /// Objects are overwritten in place, so updating is writing.
    fn update(&self, path: &str, contents: &[u8], config: &Config) -> Result<WriteResult> {
        self.write(path, contents, config)
    }

    fn update_stream(
        &self,
        path: &str,
        stream: &mut dyn Read,
        config: &Config,
    ) -> Result<WriteResult> {
        self.write_stream(path, stream, config)
    }

    fn rename(&self, path: &str, new_path: &str) -> Result<()>;

    fn copy(&self, path: &str, new_path: &str) -> Result<()>;

    fn delete(&self, path: &str) -> Result<()>;

    fn delete_dir(&self, dirname: &str) -> Result<()>;

    fn create_dir(&self, dirname: &str, config: &Config) -> Result<DirectoryRecord>;

    fn try_has(&self, path: &str) -> Result<bool>;

    /// `false` both when the object is missing and when the store could not
    /// be asked; use [`Adapter::try_has`] to tell them apart.
    fn has(&self, path: &str) -> bool {
        match self.try_has(path) {
            Ok(exists) => exists,
            Err(err) => {
                warn!(error_message=%err, path=path, "existence check failed");
                false
            }
        }
    }

    fn read(&self, path: &str) -> Result<ReadResult>;

    fn read_stream(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let result = self.read(path)?;
        Ok(Box::new(Cursor::new(result.contents)))
    }

    fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<ObjectRecord>>;

    fn get_metadata(&self, path: &str) -> Result<FileMetadata>;

    fn get_size(&self, path: &str) -> Result<FileMetadata> {
        self.get_metadata(path)
    }

    fn get_mimetype(&self, path: &str) -> Result<FileMetadata> {
        self.get_metadata(path)
    }

    fn get_timestamp(&self, path: &str) -> Result<FileMetadata> {
        self.get_metadata(path)
    }

    fn get_visibility(&self, _path: &str) -> Result<Visibility> {
        Err(AdapterError::Unsupported("visibility"))
    }

    fn set_visibility(&self, _path: &str, _visibility: Visibility) -> Result<()> {
        Err(AdapterError::Unsupported("visibility"))
    }

    fn get_url(&self, path: &str) -> String;

    fn get_temporary_url(
        &self,
        path: &str,
        expiration: OffsetDateTime,
        options: &SignOptions,
    ) -> Result<String>;
}

/// Storage adapter for an OSS bucket.
pub struct OssAdapter {
    client: Arc<dyn ObjectClient>,
    bucket: String,
    endpoint: String,
    cdn_base_url: Option<String>,
    prefix: PathPrefix,
    options: ObjectOptions,
}

fn failed(operation: &'static str, path: &str, group: &'static str, err: StoreError) -> AdapterError {
    error!(error_message=%err, error_group=group);
    AdapterError::store(operation, path, err)
}

impl OssAdapter {
    pub fn new(client: Arc<dyn ObjectClient>, bucket: &str, endpoint: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            endpoint: endpoint.to_string(),
            cdn_base_url: None,
            prefix: PathPrefix::default(),
            options: ObjectOptions::default(),
        }
    }

    pub fn with_cdn_base_url(mut self, cdn_base_url: Option<&str>) -> Self {
        self.cdn_base_url = cdn_base_url.map(|url| url.to_string());
        self
    }

    pub fn with_prefix(mut self, prefix: Option<&str>) -> Self {
        self.prefix = PathPrefix::new(prefix);
        self
    }

    /// Default request parameters every write starts from.
    pub fn with_options(mut self, options: ObjectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn client(&self) -> &Arc<dyn ObjectClient> {
        &self.client
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn cdn_base_url(&self) -> Option<&str> {
        self.cdn_base_url.as_deref()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_str()
    }

    pub fn options(&self) -> &ObjectOptions {
        &self.options
    }

    /// Logical path of a directory key (`{prefix}dir/`).
    fn directory_path(&self, key: &str) -> Result<String> {
        let key = if key.ends_with(DELIMITER) {
            key.to_string()
        } else {
            format!("{}{}", key, DELIMITER)
        };

        Ok(self.prefix.remove(&key)?.trim_end_matches(DELIMITER).to_string())
    }

    fn list_level(&self, directory: &str, recursive: bool, depth: usize) -> Result<Vec<ObjectRecord>> {
        if depth > MAX_LIST_DEPTH {
            return Err(AdapterError::ListingTooDeep {
                path: directory.to_string(),
                max_depth: MAX_LIST_DEPTH,
            });
        }

        let mut prefix = self
            .prefix
            .apply(directory)
            .trim_end_matches(['/', '\\'])
            .to_string();
        if !prefix.is_empty() {
            prefix.push_str(DELIMITER);
        }

        let mut objects = Vec::new();
        let mut prefixes = Vec::new();
        let mut marker = String::new();
        loop {
            let options = ListOptions {
                delimiter: DELIMITER.to_string(),
                prefix: prefix.clone(),
                max_keys: LIST_PAGE_SIZE,
                marker: marker.clone(),
            };

            let listing = self
                .client
                .fs_list_objects(&self.bucket, &options)
                .map_err(|err| failed("list_contents", directory, adapters::LIST_OBJECTS, err))?;

            objects.extend(listing.objects);
            prefixes.extend(listing.prefixes);

            match listing.next_marker {
                Some(next) if listing.is_truncated && next != marker => marker = next,
                _ => break,
            }
        }

        let mut records = Vec::with_capacity(objects.len() + prefixes.len());
        for object in objects {
            if object.size == 0 && object.key == prefix {
                records.push(ObjectRecord::Directory(DirectoryRecord {
                    path: self.directory_path(&object.key)?,
                    timestamp: Some(object.modified_time),
                }));
                continue;
            }

            records.push(ObjectRecord::File(FileRecord {
                path: self.prefix.remove(&object.key)?.to_string(),
                timestamp: object.modified_time,
                size: object.size,
                mimetype: None,
            }));
        }

        for common_prefix in prefixes {
            if recursive {
                let next = self.prefix.remove(&common_prefix)?.to_string();
                records.extend(self.list_level(&next, recursive, depth + 1)?);
            } else {
                records.push(ObjectRecord::Directory(DirectoryRecord {
                    path: self.directory_path(&common_prefix)?,
                    timestamp: None,
                }));
            }
        }

        Ok(records)
    }
}

impl Adapter for OssAdapter {
    fn write(&self, path: &str, contents: &[u8], config: &Config) -> Result<WriteResult> {
        let span = span!(Level::INFO, "write", context = "write");
        let _e = span.enter();
        info!(path = path, size = contents.len(), "called");

        let object = self.prefix.apply(path);
        let mut options = self.options.merged_with(config);
        let size = *options.content_length.get_or_insert(contents.len() as u64);
        let mimetype = options
            .content_type
            .get_or_insert_with(|| util::mime::guess_mime_type(path, contents))
            .clone();

        self.client
            .fs_put_object(&self.bucket, &object, contents.to_vec(), &options)
            .map_err(|err| failed("write", path, adapters::PUT_OBJECT, err))?;

        Ok(WriteResult {
            path: path.to_string(),
            contents: contents.to_vec(),
            mimetype,
            size,
        })
    }

    /// Copy then delete. A failed delete leaves both objects in place.
    fn rename(&self, path: &str, new_path: &str) -> Result<()> {
        let span = span!(Level::INFO, "rename", context = "rename");
        let _e = span.enter();
        info!(path = path, new_path = new_path, "called");

        self.copy(path, new_path)?;
        self.delete(path)
    }

    fn copy(&self, path: &str, new_path: &str) -> Result<()> {
        let span = span!(Level::INFO, "copy", context = "copy");
        let _e = span.enter();
        info!(path = path, new_path = new_path, "called");

        let object = self.prefix.apply(path);
        let new_object = self.prefix.apply(new_path);

        self.client
            .fs_copy_object(&self.bucket, &object, &self.bucket, &new_object)
            .map_err(|err| failed("copy", path, adapters::COPY_OBJECT, err))
    }

    fn delete(&self, path: &str) -> Result<()> {
        let span = span!(Level::INFO, "delete", context = "delete");
        let _e = span.enter();
        info!(path = path, "called");

        let object = self.prefix.apply(path);

        self.client
            .fs_delete_object(&self.bucket, &object)
            .map_err(|err| failed("delete", path, adapters::DELETE_OBJECT, err))
    }

    fn delete_dir(&self, dirname: &str) -> Result<()> {
        let span = span!(Level::INFO, "delete_dir", context = "delete_dir");
        let _e = span.enter();
        info!(dirname = dirname, "called");

        let keys: Vec<String> = self
            .list_contents(dirname, true)?
            .iter()
            .map(|record| match record {
                ObjectRecord::File(file) => self.prefix.apply(&file.path),
                ObjectRecord::Directory(dir) => {
                    adapters::dir_marker_key(&self.prefix.apply(&dir.path))
                }
            })
            .collect();

        info!(count = keys.len(), "deleting objects");
        self.client
            .fs_delete_objects(&self.bucket, &keys)
            .map_err(|err| failed("delete_dir", dirname, adapters::DELETE_OBJECTS, err))
    }

    fn create_dir(&self, dirname: &str, config: &Config) -> Result<DirectoryRecord> {
        let span = span!(Level::INFO, "create_dir", context = "create_dir");
        let _e = span.enter();
        info!(dirname = dirname, "called");

        let object = self.prefix.apply(dirname);
        let options = self.options.merged_with(config);

        self.client
            .fs_create_object_dir(&self.bucket, &object, &options)
            .map_err(|err| failed("create_dir", dirname, adapters::CREATE_OBJECT_DIR, err))?;

        Ok(DirectoryRecord {
            path: dirname.to_string(),
            timestamp: None,
        })
    }

    fn try_has(&self, path: &str) -> Result<bool> {
        let span = span!(Level::INFO, "has", context = "has");
        let _e = span.enter();
        info!(path = path, "called");

        let object = self.prefix.apply(path);

        self.client
            .fs_does_object_exist(&self.bucket, &object)
            .map_err(|err| failed("has", path, adapters::DOES_OBJECT_EXIST, err))
    }

    fn read(&self, path: &str) -> Result<ReadResult> {
        let span = span!(Level::INFO, "read", context = "read");
        let _e = span.enter();
        info!(path = path, "called");

        let object = self.prefix.apply(path);

        let contents = self
            .client
            .fs_get_object(&self.bucket, &object)
            .map_err(|err| failed("read", path, adapters::GET_OBJECT, err))?;

        Ok(ReadResult {
            path: path.to_string(),
            contents,
        })
    }

    /// Files and directory markers of `directory` come first, then each
    /// common prefix in store order, expanded depth-first when `recursive`.
    fn list_contents(&self, directory: &str, recursive: bool) -> Result<Vec<ObjectRecord>> {
        let span = span!(Level::INFO, "list_contents", context = "list_contents");
        let _e = span.enter();
        info!(directory = directory, recursive = recursive, "called");

        self.list_level(directory, recursive, 0)
    }

    fn get_metadata(&self, path: &str) -> Result<FileMetadata> {
        let span = span!(Level::INFO, "get_metadata", context = "get_metadata");
        let _e = span.enter();
        info!(path = path, "called");

        let object = self.prefix.apply(path);

        let meta = self
            .client
            .fs_get_object_meta(&self.bucket, &object)
            .map_err(|err| failed("get_metadata", path, adapters::GET_OBJECT_META, err))?;

        Ok(FileMetadata {
            dirname: util::path::dirname(path),
            path: path.to_string(),
            timestamp: meta.modified_time,
            mimetype: meta.content_type,
            size: meta.content_length,
        })
    }

    fn get_url(&self, path: &str) -> String {
        let object = self.prefix.apply(path);

        match &self.cdn_base_url {
            Some(cdn_base_url) => format!("{}/{}", cdn_base_url, object),
            None => format!("{}/{}", util::endpoint::base_url_of(&self.endpoint), object),
        }
    }

    fn get_temporary_url(
        &self,
        path: &str,
        expiration: OffsetDateTime,
        options: &SignOptions,
    ) -> Result<String> {
        let span = span!(Level::INFO, "get_temporary_url", context = "get_temporary_url");
        let _e = span.enter();
        info!(path = path, expiration = %expiration, "called");

        let remaining = expiration - OffsetDateTime::now_utc();
        let expires_in = std::time::Duration::try_from(remaining)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| {
                failed(
                    "get_temporary_url",
                    path,
                    adapters::SIGN_URL,
                    StoreError::InvalidArgument(format!("expiration {} is not in the future", expiration)),
                )
            })?;

        let object = self.prefix.apply(path);
        let url = self
            .client
            .fs_sign_url(&self.bucket, &object, expires_in, options)
            .map_err(|err| failed("get_temporary_url", path, adapters::SIGN_URL, err))?;

        Ok(match &self.cdn_base_url {
            Some(cdn_base_url) => util::endpoint::rewrite_base_url(
                &url,
                &util::endpoint::base_url_of(&self.endpoint),
                &self.bucket,
                cdn_base_url,
            ),
            None => url,
        })
    }
}
