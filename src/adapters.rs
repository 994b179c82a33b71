use std::time::Duration;

use crate::model::{
    error::StoreError,
    fs::{FSListing, FSObjectMeta, ListOptions},
    options::{ObjectOptions, SignOptions},
};

pub mod memory;
pub mod s3;

pub const PUT_OBJECT: &str = "put_object";
pub const GET_OBJECT: &str = "get_object";
pub const DELETE_OBJECT: &str = "delete_object";
pub const DELETE_OBJECTS: &str = "delete_objects";
pub const COPY_OBJECT: &str = "copy_object";
pub const DOES_OBJECT_EXIST: &str = "does_object_exist";
pub const GET_OBJECT_META: &str = "get_object_meta";
pub const CREATE_OBJECT_DIR: &str = "create_object_dir";
pub const LIST_OBJECTS: &str = "list_objects";
pub const SIGN_URL: &str = "sign_url";

/// Bucket-scoped calls the storage adapter needs from an object store.
///
/// Implementations block until the store answers.
pub trait ObjectClient: Send + Sync {
    fn fs_put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        options: &ObjectOptions,
    ) -> Result<(), StoreError>;

    fn fs_get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    fn fs_delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    fn fs_delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StoreError>;

    fn fs_copy_object(
        &self,
        from_bucket: &str,
        from_key: &str,
        to_bucket: &str,
        to_key: &str,
    ) -> Result<(), StoreError>;

    fn fs_does_object_exist(&self, bucket: &str, key: &str) -> Result<bool, StoreError>;

    fn fs_get_object_meta(&self, bucket: &str, key: &str) -> Result<FSObjectMeta, StoreError>;

    /// Creates the zero-byte marker `{dir}/`.
    fn fs_create_object_dir(
        &self,
        bucket: &str,
        dir: &str,
        options: &ObjectOptions,
    ) -> Result<(), StoreError>;

    fn fs_list_objects(&self, bucket: &str, options: &ListOptions)
        -> Result<FSListing, StoreError>;

    /// Signs a GET for `key` valid for `expires_in`. Every option ends up
    /// as a signed query parameter (`x-oss-process`, `response-*`, ...).
    fn fs_sign_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        options: &SignOptions,
    ) -> Result<String, StoreError>;
}

/// Query parameters the signature itself writes.
const RESERVED_SIGN_PREFIX: &str = "x-amz-";

pub fn validate_sign_options(options: &SignOptions) -> Result<(), StoreError> {
    match options.keys().find(|name| {
        name.trim().is_empty() || name.to_ascii_lowercase().starts_with(RESERVED_SIGN_PREFIX)
    }) {
        Some(name) => Err(StoreError::InvalidArgument(format!(
            "unsupported sign option: {:?}",
            name
        ))),
        None => Ok(()),
    }
}

/// Appends `params` to the query string of `url`, percent-encoding both
/// names and values.
pub fn append_query<'a>(url: &str, params: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut url = url.to_string();
    for (name, value) in params {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&urlencoding::encode(name));
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }

    url
}

/// Key of the zero-byte object that materializes `dir`.
pub fn dir_marker_key(dir: &str) -> String {
    format!("{}/", dir.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sign_options() {
        let cases = vec![
            ("x-oss-process", true),
            ("response-content-type", true),
            ("versionId", true),
            ("", false),
            ("X-Amz-Signature", false),
            ("x-amz-expires", false),
        ];

        for (name, valid) in cases {
            let mut options = SignOptions::new();
            options.insert(name.to_string(), "v".to_string());

            assert_eq!(validate_sign_options(&options).is_ok(), valid, "failed for case: {:?}", name);
        }
    }

    #[test]
    fn test_append_query() {
        let cases = vec![
            ("https://h/k", vec![], "https://h/k"),
            (
                "https://h/k",
                vec![("x-oss-process", "image/resize,w_100")],
                "https://h/k?x-oss-process=image%2Fresize%2Cw_100",
            ),
            ("https://h/k?x-id=GetObject", vec![("a b", "c&d")], "https://h/k?x-id=GetObject&a%20b=c%26d"),
        ];

        for (url, params, expected) in cases {
            assert_eq!(append_query(url, params), expected, "failed for case: {}", url);
        }
    }

    #[test]
    fn test_dir_marker_key() {
        let cases = vec![("dir", "dir/"), ("dir/", "dir/"), ("app/", "app/"), ("app/dir//", "app/dir/")];

        for (dir, expected) in cases {
            assert_eq!(dir_marker_key(dir), expected, "failed for case: {}", dir);
        }
    }
}
