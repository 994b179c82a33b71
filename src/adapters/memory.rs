use std::{
    collections::{BTreeMap, HashSet},
    sync::{Mutex, MutexGuard},
    time::{Duration, SystemTime},
};

use crate::{
    adapters::{self, ObjectClient},
    model::{
        error::StoreError,
        fs::{FSListing, FSObject, FSObjectMeta, ListOptions},
        options::{ObjectOptions, SignOptions},
    },
    util,
};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:9000";

/// A store call as the memory client received it.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Put {
        key: String,
        options: ObjectOptions,
        size: usize,
    },
    Get { key: String },
    Delete { key: String },
    DeleteMany { keys: Vec<String> },
    Copy { from: String, to: String },
    Exists { key: String },
    Head { key: String },
    CreateDir { key: String, options: ObjectOptions },
    List { options: ListOptions },
    Sign { key: String, expires_in: Duration },
}

#[derive(Clone, Debug)]
struct StoredObject {
    body: Vec<u8>,
    content_type: Option<String>,
    modified_time: SystemTime,
}

/// Object store held in process memory.
///
/// Every call is recorded, and any operation can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryClient {
    base_url: String,
    buckets: Mutex<BTreeMap<String, BTreeMap<String, StoredObject>>>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<&'static str>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// `base_url` is the endpoint signed URLs are issued against.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: util::endpoint::base_url_of(base_url),
            ..Default::default()
        }
    }

    /// Makes every later call of `op` fail.
    pub fn fail_on(&self, op: &'static str) {
        lock(&self.failing).insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        lock(&self.failing).remove(op);
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn insert(&self, bucket: &str, key: &str, body: &[u8]) {
        lock(&self.buckets).entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                content_type: None,
                modified_time: SystemTime::now(),
            },
        );
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        lock(&self.buckets)
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, op: &'static str, key: &str, call: Call) -> Result<(), StoreError> {
        lock(&self.calls).push(call);

        if lock(&self.failing).contains(op) {
            return Err(StoreError::request(op, key, "injected failure"));
        }

        Ok(())
    }

    fn put(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: Option<String>) {
        lock(&self.buckets).entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                body,
                content_type,
                modified_time: SystemTime::now(),
            },
        );
    }

    fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        lock(&self.buckets)
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
    }
}

/// Whether a listing resumed after `marker` has already covered `key`.
fn is_before_marker(key: &str, marker: &str, delimiter: &str) -> bool {
    if marker.is_empty() {
        return false;
    }

    key <= marker || (!delimiter.is_empty() && marker.ends_with(delimiter) && key.starts_with(marker))
}

impl ObjectClient for MemoryClient {
    fn fs_put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        options: &ObjectOptions,
    ) -> Result<(), StoreError> {
        self.record(
            adapters::PUT_OBJECT,
            key,
            Call::Put {
                key: key.to_string(),
                options: options.clone(),
                size: body.len(),
            },
        )?;

        self.put(bucket, key, body, options.content_type.clone());
        Ok(())
    }

    fn fs_get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.record(adapters::GET_OBJECT, key, Call::Get { key: key.to_string() })?;

        self.get(bucket, key)
            .map(|object| object.body)
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    fn fs_delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.record(
            adapters::DELETE_OBJECT,
            key,
            Call::Delete { key: key.to_string() },
        )?;

        if let Some(objects) = lock(&self.buckets).get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }

    fn fs_delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StoreError> {
        self.record(
            adapters::DELETE_OBJECTS,
            bucket,
            Call::DeleteMany { keys: keys.to_vec() },
        )?;

        if let Some(objects) = lock(&self.buckets).get_mut(bucket) {
            for key in keys {
                objects.remove(key);
            }
        }
        Ok(())
    }

    fn fs_copy_object(
        &self,
        from_bucket: &str,
        from_key: &str,
        to_bucket: &str,
        to_key: &str,
    ) -> Result<(), StoreError> {
        self.record(
            adapters::COPY_OBJECT,
            from_key,
            Call::Copy {
                from: from_key.to_string(),
                to: to_key.to_string(),
            },
        )?;

        let object = self
            .get(from_bucket, from_key)
            .ok_or_else(|| StoreError::NotFound {
                key: from_key.to_string(),
            })?;

        self.put(to_bucket, to_key, object.body, object.content_type);
        Ok(())
    }

    fn fs_does_object_exist(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        self.record(
            adapters::DOES_OBJECT_EXIST,
            key,
            Call::Exists { key: key.to_string() },
        )?;

        Ok(self.get(bucket, key).is_some())
    }

    fn fs_get_object_meta(&self, bucket: &str, key: &str) -> Result<FSObjectMeta, StoreError> {
        self.record(
            adapters::GET_OBJECT_META,
            key,
            Call::Head { key: key.to_string() },
        )?;

        self.get(bucket, key)
            .map(|object| FSObjectMeta {
                modified_time: object.modified_time,
                content_type: object.content_type,
                content_length: object.body.len() as u64,
            })
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    fn fs_create_object_dir(
        &self,
        bucket: &str,
        dir: &str,
        options: &ObjectOptions,
    ) -> Result<(), StoreError> {
        let key = adapters::dir_marker_key(dir);
        self.record(
            adapters::CREATE_OBJECT_DIR,
            &key,
            Call::CreateDir {
                key: key.clone(),
                options: options.clone(),
            },
        )?;

        self.put(bucket, &key, Vec::new(), options.content_type.clone());
        Ok(())
    }

    fn fs_list_objects(
        &self,
        bucket: &str,
        options: &ListOptions,
    ) -> Result<FSListing, StoreError> {
        self.record(
            adapters::LIST_OBJECTS,
            &options.prefix,
            Call::List {
                options: options.clone(),
            },
        )?;

        let buckets = lock(&self.buckets);
        let mut listing = FSListing::default();
        let Some(objects) = buckets.get(bucket) else {
            return Ok(listing);
        };

        let mut count = 0;
        let mut last_entry: Option<String> = None;
        for (key, object) in objects.range(options.prefix.clone()..) {
            if !key.starts_with(&options.prefix) {
                break;
            }
            if is_before_marker(key, &options.marker, &options.delimiter) {
                continue;
            }

            let rest = &key[options.prefix.len()..];
            let common_prefix = if options.delimiter.is_empty() {
                None
            } else {
                rest.find(options.delimiter.as_str()).map(|pos| {
                    format!(
                        "{}{}",
                        options.prefix,
                        &rest[..pos + options.delimiter.len()]
                    )
                })
            };

            if let Some(common_prefix) = &common_prefix {
                if listing.prefixes.last() == Some(common_prefix) {
                    continue;
                }
            }

            if count == options.max_keys {
                listing.is_truncated = true;
                listing.next_marker = last_entry;
                break;
            }

            match common_prefix {
                Some(common_prefix) => {
                    last_entry = Some(common_prefix.clone());
                    listing.prefixes.push(common_prefix);
                }
                None => {
                    last_entry = Some(key.clone());
                    listing.objects.push(FSObject {
                        key: key.clone(),
                        size: object.body.len() as u64,
                        modified_time: object.modified_time,
                    });
                }
            }
            count += 1;
        }

        Ok(listing)
    }

    fn fs_sign_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        options: &SignOptions,
    ) -> Result<String, StoreError> {
        self.record(
            adapters::SIGN_URL,
            key,
            Call::Sign {
                key: key.to_string(),
                expires_in,
            },
        )?;
        adapters::validate_sign_options(options)?;

        let url = format!(
            "{}/{}?Expires={}&Signature=memory",
            util::endpoint::virtual_host_base_url(&self.base_url, bucket),
            key,
            expires_in.as_secs()
        );

        Ok(adapters::append_query(
            &url,
            options.iter().map(|(name, value)| (name.as_str(), value.as_str())),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(client: &MemoryClient, prefix: &str, max_keys: usize, marker: &str) -> FSListing {
        client
            .fs_list_objects(
                "b",
                &ListOptions {
                    delimiter: "/".to_string(),
                    prefix: prefix.to_string(),
                    max_keys,
                    marker: marker.to_string(),
                },
            )
            .unwrap()
    }

    #[test]
    fn test_list_objects_groups_common_prefixes() {
        let client = MemoryClient::new();
        for key in ["a.txt", "dir/", "dir/b.txt", "dir/sub/c.txt", "z.txt"] {
            client.insert("b", key, b"x");
        }

        let cases = vec![
            ("", vec!["a.txt", "z.txt"], vec!["dir/"]),
            ("dir/", vec!["dir/", "dir/b.txt"], vec!["dir/sub/"]),
            ("dir/sub/", vec!["dir/sub/c.txt"], vec![]),
            ("missing/", vec![], vec![]),
        ];

        for (prefix, objects, prefixes) in cases {
            let listing = list(&client, prefix, 1000, "");
            let keys: Vec<&str> = listing.objects.iter().map(|o| o.key.as_str()).collect();

            assert_eq!(keys, objects, "failed objects for case: {}", prefix);
            assert_eq!(listing.prefixes, prefixes, "failed prefixes for case: {}", prefix);
            assert!(!listing.is_truncated, "failed truncation for case: {}", prefix);
        }
    }

    #[test]
    fn test_list_objects_pages_with_marker() {
        let client = MemoryClient::new();
        for key in ["a", "b/1", "b/2", "c", "d"] {
            client.insert("b", key, b"x");
        }

        let first = list(&client, "", 2, "");
        assert_eq!(first.objects.len(), 1);
        assert_eq!(first.prefixes, vec!["b/"]);
        assert!(first.is_truncated);
        assert_eq!(first.next_marker.as_deref(), Some("b/"));

        let second = list(&client, "", 2, "b/");
        let keys: Vec<&str> = second.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "d"]);
        assert!(second.prefixes.is_empty());
        assert!(!second.is_truncated);
    }

    #[test]
    fn test_fail_on() {
        let client = MemoryClient::new();
        client.fail_on(adapters::GET_OBJECT);
        client.insert("b", "k", b"v");

        assert!(client.fs_get_object("b", "k").is_err());
        client.recover(adapters::GET_OBJECT);
        assert_eq!(client.fs_get_object("b", "k").unwrap(), b"v".to_vec());
    }

    #[test]
    fn test_sign_url_options() {
        let client = MemoryClient::with_base_url("oss-cn-hangzhou.aliyuncs.com");

        let cases = vec![
            (vec![], Some("https://b.oss-cn-hangzhou.aliyuncs.com/k?Expires=60&Signature=memory")),
            (
                vec![("x-oss-process", "image/resize,w_100")],
                Some("https://b.oss-cn-hangzhou.aliyuncs.com/k?Expires=60&Signature=memory&x-oss-process=image%2Fresize%2Cw_100"),
            ),
            (vec![("X-Amz-Signature", "forged")], None),
        ];

        for (params, expected) in cases {
            let options: SignOptions = params
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();

            let result = client.fs_sign_url("b", "k", Duration::from_secs(60), &options);
            match expected {
                Some(url) => assert_eq!(result.unwrap(), url, "failed for case: {:?}", params),
                None => assert!(
                    matches!(result, Err(StoreError::InvalidArgument(_))),
                    "failed for case: {:?}",
                    params
                ),
            }
        }
    }
}
