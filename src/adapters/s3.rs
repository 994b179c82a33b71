use std::time::{Duration, SystemTime};

use aws_sdk_s3::{
    config::{
        endpoint::{Endpoint, EndpointFuture, Params, ResolveEndpoint},
        Credentials, Region,
    },
    error::DisplayErrorContext,
    presigning::PresigningConfig,
    primitives::{ByteStream, DateTime, DateTimeFormat},
    types::{Delete, ObjectIdentifier},
};
use tracing::{debug, error};

use crate::{
    adapters::{self, ObjectClient},
    model::{
        error::{ConfigError, StoreError},
        fs::{FSListing, FSObject, FSObjectMeta, ListOptions},
        options::{ObjectOptions, SignOptions},
    },
    util,
};

/// Upper bound of keys in one batch delete request.
const MAX_DELETE_KEYS: usize = 1000;

/// Connection settings for the OSS S3-compatible API.
#[derive(Clone, Debug)]
pub struct ClientSettings {
    pub access_id: String,
    pub access_key_secret: String,
    /// Endpoint including its scheme.
    pub endpoint: String,
    pub region: String,
    /// Address the endpoint as a custom domain already bound to the bucket.
    pub cname: bool,
}

/// Resolves every request to the configured custom domain.
///
/// A CNAME is bound to exactly one bucket, so neither virtual-hosted nor
/// path-style bucket addressing applies.
#[derive(Debug)]
pub struct CnameEndpointResolver {
    url: String,
}

impl CnameEndpointResolver {
    pub fn new(endpoint: &str) -> Self {
        Self {
            url: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

impl ResolveEndpoint for CnameEndpointResolver {
    fn resolve_endpoint<'a>(&'a self, _params: &'a Params) -> EndpointFuture<'a> {
        EndpointFuture::ready(Ok(Endpoint::builder().url(self.url.clone()).build()))
    }
}

pub fn connect(settings: &ClientSettings) -> Result<aws_sdk_s3::Client, ConfigError> {
    let credentials = Credentials::new(
        settings.access_id.clone(),
        settings.access_key_secret.clone(),
        None,
        None,
        "ossfs",
    );

    let sdk_config = util::poll::block_on(
        aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(settings.endpoint.clone())
            .load(),
    )
    .map_err(ConfigError::Runtime)?;

    let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
    if settings.cname {
        builder = builder.endpoint_resolver(CnameEndpointResolver::new(&settings.endpoint));
    }

    debug!(endpoint=%settings.endpoint, region=%settings.region, cname=settings.cname, "client configured");
    Ok(aws_sdk_s3::Client::from_conf(builder.build()))
}

fn to_system_time(time: Option<&DateTime>) -> SystemTime {
    let (secs, nanos) = match time {
        Some(time) => (time.secs().max(0) as u64, time.subsec_nanos()),
        None => (0, 0),
    };

    SystemTime::UNIX_EPOCH + Duration::new(secs, nanos)
}

impl ObjectClient for aws_sdk_s3::Client {
    fn fs_put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        options: &ObjectOptions,
    ) -> Result<(), StoreError> {
        let mut req = self
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_content_type(options.content_type.clone())
            .set_content_disposition(options.content_disposition.clone())
            .set_cache_control(options.cache_control.clone())
            .set_content_encoding(options.content_encoding.clone())
            .set_content_length(options.content_length.map(|len| len as i64))
            .body(ByteStream::from(body));

        for (name, value) in &options.metadata {
            req = req.metadata(name, value);
        }

        util::poll::block_on(req.send())?.map_err(|err| {
            StoreError::request(adapters::PUT_OBJECT, key, DisplayErrorContext(&err))
        })?;

        Ok(())
    }

    fn fs_get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let req = self.get_object().bucket(bucket).key(key);

        let o = match util::poll::block_on(req.send())? {
            Err(err) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_no_such_key() {
                        return Err(StoreError::NotFound {
                            key: key.to_string(),
                        });
                    }
                }

                return Err(StoreError::request(
                    adapters::GET_OBJECT,
                    key,
                    DisplayErrorContext(&err),
                ));
            }
            Ok(o) => o,
        };

        let bytes = util::poll::block_on(o.body.collect())?
            .map_err(|err| StoreError::request(adapters::GET_OBJECT, key, err))?;

        Ok(bytes.into_bytes().to_vec())
    }

    fn fs_delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let req = self.delete_object().bucket(bucket).key(key);

        util::poll::block_on(req.send())?.map_err(|err| {
            StoreError::request(adapters::DELETE_OBJECT, key, DisplayErrorContext(&err))
        })?;

        Ok(())
    }

    fn fs_delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StoreError> {
        for chunk in keys.chunks(MAX_DELETE_KEYS) {
            let objects = chunk
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| StoreError::InvalidArgument(err.to_string()))?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|err| StoreError::InvalidArgument(err.to_string()))?;

            let req = self.delete_objects().bucket(bucket).delete(delete);
            let out = util::poll::block_on(req.send())?.map_err(|err| {
                StoreError::request(adapters::DELETE_OBJECTS, bucket, DisplayErrorContext(&err))
            })?;

            if let Some(failed) = out.errors().first() {
                return Err(StoreError::request(
                    adapters::DELETE_OBJECTS,
                    failed.key().unwrap_or(bucket),
                    failed.message().unwrap_or("delete rejected"),
                ));
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
        let source = format!("{}/{}", from_bucket, urlencoding::encode(from_key));
        let req = self
            .copy_object()
            .copy_source(source)
            .bucket(to_bucket)
            .key(to_key);

        util::poll::block_on(req.send())?.map_err(|err| {
            StoreError::request(adapters::COPY_OBJECT, from_key, DisplayErrorContext(&err))
        })?;

        Ok(())
    }

    fn fs_does_object_exist(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        match self.fs_get_object_meta(bucket, key) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn fs_get_object_meta(&self, bucket: &str, key: &str) -> Result<FSObjectMeta, StoreError> {
        let req = self.head_object().bucket(bucket).key(key);

        let ho = match util::poll::block_on(req.send())? {
            Err(err) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_not_found() {
                        return Err(StoreError::NotFound {
                            key: key.to_string(),
                        });
                    }
                }

                return Err(StoreError::request(
                    adapters::GET_OBJECT_META,
                    key,
                    DisplayErrorContext(&err),
                ));
            }
            Ok(ho) => ho,
        };

        Ok(FSObjectMeta {
            modified_time: to_system_time(ho.last_modified()),
            content_type: ho.content_type().map(|t| t.to_string()),
            content_length: ho.content_length().unwrap_or(0).max(0) as u64,
        })
    }

    fn fs_create_object_dir(
        &self,
        bucket: &str,
        dir: &str,
        options: &ObjectOptions,
    ) -> Result<(), StoreError> {
        let options = ObjectOptions {
            content_length: Some(0),
            ..options.clone()
        };

        self.fs_put_object(bucket, &adapters::dir_marker_key(dir), Vec::new(), &options)
    }

    fn fs_list_objects(
        &self,
        bucket: &str,
        options: &ListOptions,
    ) -> Result<FSListing, StoreError> {
        let mut req = self
            .list_objects()
            .bucket(bucket)
            .prefix(&options.prefix)
            .max_keys(options.max_keys as i32);

        if !options.delimiter.is_empty() {
            req = req.delimiter(&options.delimiter);
        }
        if !options.marker.is_empty() {
            req = req.marker(&options.marker);
        }

        let lo = util::poll::block_on(req.send())?.map_err(|err| {
            StoreError::request(adapters::LIST_OBJECTS, &options.prefix, DisplayErrorContext(&err))
        })?;

        let objects: Vec<FSObject> = lo
            .contents()
            .iter()
            .map(|o| FSObject {
                key: o.key().unwrap_or("").to_string(),
                size: o.size().unwrap_or(0).max(0) as u64,
                modified_time: to_system_time(o.last_modified()),
            })
            .collect();

        let prefixes: Vec<String> = lo
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix())
            .map(|p| p.to_string())
            .collect();

        let is_truncated = lo.is_truncated().unwrap_or(false);
        // NextMarker may be omitted; the last returned entry resumes the listing.
        let next_marker = lo.next_marker().map(|m| m.to_string()).or_else(|| {
            if !is_truncated {
                return None;
            }
            let last_key = objects.last().map(|o| o.key.clone());
            let last_prefix = prefixes.last().cloned();
            last_key.max(last_prefix)
        });

        Ok(FSListing {
            objects,
            prefixes,
            next_marker,
            is_truncated,
        })
    }

    fn fs_sign_url(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
        options: &SignOptions,
    ) -> Result<String, StoreError> {
        adapters::validate_sign_options(options)?;

        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|err| StoreError::InvalidArgument(err.to_string()))?;

        let mut req = self.get_object().bucket(bucket).key(key);
        let mut query = Vec::new();
        for (name, value) in options {
            req = match name.as_str() {
                "response-content-type" => req.response_content_type(value),
                "response-content-disposition" => req.response_content_disposition(value),
                "response-cache-control" => req.response_cache_control(value),
                "response-content-encoding" => req.response_content_encoding(value),
                "response-content-language" => req.response_content_language(value),
                "response-expires" => {
                    let expires = DateTime::from_str(value, DateTimeFormat::HttpDate)
                        .map_err(|err| StoreError::InvalidArgument(err.to_string()))?;
                    req.response_expires(expires)
                }
                _ => {
                    query.push((name.clone(), value.clone()));
                    req
                }
            };
        }

        let presigned = if query.is_empty() {
            util::poll::block_on(req.presigned(config))?.map_err(|err| {
                StoreError::request(adapters::SIGN_URL, key, DisplayErrorContext(&err))
            })?
        } else {
            // Added before signing, so the extra parameters are covered by the signature.
            let customized = req.customize().mutate_request(move |request| {
                let uri = adapters::append_query(
                    request.uri(),
                    query.iter().map(|(name, value)| (name.as_str(), value.as_str())),
                );
                if let Err(err) = request.set_uri(uri) {
                    error!(error_message=%err, error_group=adapters::SIGN_URL);
                }
            });

            util::poll::block_on(customized.presigned(config))?.map_err(|err| {
                StoreError::request(adapters::SIGN_URL, key, DisplayErrorContext(&err))
            })?
        };

        Ok(presigned.uri().to_string())
    }
}
