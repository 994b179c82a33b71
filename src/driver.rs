//! Named-disk configuration and the drivers that turn it into filesystems.
//!
//! ```toml
//! default = "assets"
//!
//! [disks.assets]
//! driver = "oss"
//! access_id = "..."
//! access_key_secret = "..."
//! bucket = "my-bucket"
//! endpoint = "oss-cn-hangzhou.aliyuncs.com"
//! cdn_base_url = "https://cdn.example.com/"
//! prefix = "app/"
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
    sync::Arc,
};

use serde::Deserialize;
use tracing::info;

use crate::{
    adapter::OssAdapter,
    adapters::{
        memory::{self, MemoryClient},
        s3::{self, ClientSettings},
    },
    fs::Filesystem,
    model::{error::ConfigError, options::ObjectOptions},
    util::endpoint::{self, Scheme},
};

pub const OSS_DRIVER: &str = "oss";
pub const MEMORY_DRIVER: &str = "memory";

fn default_driver() -> String {
    OSS_DRIVER.to_string()
}

/// Configuration of one disk.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiskConfig {
    pub driver: String,
    pub access_id: Option<String>,
    pub access_key_secret: Option<String>,
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
    pub cdn_base_url: Option<String>,
    pub prefix: Option<String>,
    /// Signing region; derived from the endpoint when unset.
    pub region: Option<String>,
    /// Scheme given to an endpoint that carries none.
    pub default_scheme: Scheme,
    /// Overrides the custom-domain detection of the endpoint.
    pub cname: Option<bool>,
    /// Write options applied to every write before per-call config.
    pub options: ObjectOptions,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            access_id: None,
            access_key_secret: None,
            bucket: None,
            endpoint: None,
            cdn_base_url: None,
            prefix: None,
            region: None,
            default_scheme: Scheme::default(),
            cname: None,
            options: ObjectOptions::default(),
        }
    }
}

fn required<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str, ConfigError> {
    match value.as_deref() {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingKey(key)),
    }
}

/// CDN base URL without trailing separators; empty means unset.
fn cdn_base_url_of(config: &DiskConfig) -> Result<Option<String>, ConfigError> {
    let url = match config.cdn_base_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => url.trim_end_matches('/'),
        _ => return Ok(None),
    };

    if !endpoint::has_scheme(url) || endpoint::domain_of(url).is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "cdn_base_url",
            message: format!("`{}` is not an http(s) URL", url),
        });
    }

    Ok(Some(url.to_string()))
}

/// Key prefix as configured; `.` and `..` segments are rejected.
fn prefix_of(config: &DiskConfig) -> Result<Option<String>, ConfigError> {
    let Some(prefix) = config.prefix.as_deref() else {
        return Ok(None);
    };

    if prefix.split(['/', '\\']).any(|part| part == "." || part == "..") {
        return Err(ConfigError::InvalidValue {
            key: "prefix",
            message: format!("`{}` leaves the bucket root", prefix),
        });
    }

    Ok(Some(prefix.to_string()))
}

/// Every named disk plus the one used when no name is given.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub default: Option<String>,
    pub disks: BTreeMap<String, DiskConfig>,
}

impl StorageConfig {
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Looks up `name`, or the default disk when `name` is `None`.
    pub fn disk(&self, name: Option<&str>) -> Result<(&str, &DiskConfig), ConfigError> {
        let name = match name {
            Some(name) => name,
            None => self.default.as_deref().ok_or(ConfigError::NoDefaultDisk)?,
        };

        self.disks
            .get_key_value(name)
            .map(|(name, disk)| (name.as_str(), disk))
            .ok_or_else(|| ConfigError::UnknownDisk(name.to_string()))
    }
}

/// Connection parameters of an OSS disk after normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct OssDisk {
    pub access_id: String,
    pub access_key_secret: String,
    pub bucket: String,
    /// Endpoint with its scheme.
    pub endpoint: String,
    pub cdn_base_url: Option<String>,
    pub prefix: Option<String>,
    pub region: String,
    pub cname: bool,
}

impl OssDisk {
    pub fn from_config(config: &DiskConfig) -> Result<Self, ConfigError> {
        let access_id = required(&config.access_id, "access_id")?;
        let access_key_secret = required(&config.access_key_secret, "access_key_secret")?;
        let bucket = required(&config.bucket, "bucket")?;
        let endpoint = endpoint::base_url_with_scheme(
            required(&config.endpoint, "endpoint")?,
            config.default_scheme,
        );

        let cdn_base_url = cdn_base_url_of(config)?;
        let prefix = prefix_of(config)?;

        Ok(Self {
            access_id: access_id.to_string(),
            access_key_secret: access_key_secret.to_string(),
            bucket: bucket.to_string(),
            cdn_base_url,
            prefix,
            region: config
                .region
                .clone()
                .unwrap_or_else(|| endpoint::region_of(&endpoint)),
            cname: config
                .cname
                .unwrap_or_else(|| endpoint::is_cname_domain(&endpoint)),
            endpoint,
        })
    }
}

/// Builds a filesystem from the configuration of one disk.
pub trait DriverFactory: Send + Sync {
    fn driver_type(&self) -> &'static str;

    fn create_filesystem(&self, config: &DiskConfig) -> Result<Filesystem, ConfigError>;
}

pub struct OssDriverFactory;

impl DriverFactory for OssDriverFactory {
    fn driver_type(&self) -> &'static str {
        OSS_DRIVER
    }

    fn create_filesystem(&self, config: &DiskConfig) -> Result<Filesystem, ConfigError> {
        let disk = OssDisk::from_config(config)?;

        let client = s3::connect(&ClientSettings {
            access_id: disk.access_id.clone(),
            access_key_secret: disk.access_key_secret.clone(),
            endpoint: disk.endpoint.clone(),
            region: disk.region.clone(),
            cname: disk.cname,
        })?;

        let adapter = OssAdapter::new(Arc::new(client), &disk.bucket, &disk.endpoint)
            .with_cdn_base_url(disk.cdn_base_url.as_deref())
            .with_prefix(disk.prefix.as_deref())
            .with_options(config.options.clone());

        Ok(Filesystem::new(Box::new(adapter)))
    }
}

/// Keeps objects in process memory; nothing survives the process.
pub struct MemoryDriverFactory;

impl DriverFactory for MemoryDriverFactory {
    fn driver_type(&self) -> &'static str {
        MEMORY_DRIVER
    }

    fn create_filesystem(&self, config: &DiskConfig) -> Result<Filesystem, ConfigError> {
        let endpoint = endpoint::base_url_with_scheme(
            config.endpoint.as_deref().unwrap_or(memory::DEFAULT_BASE_URL),
            config.default_scheme,
        );
        let bucket = config.bucket.as_deref().unwrap_or(MEMORY_DRIVER);
        let cdn_base_url = cdn_base_url_of(config)?;
        let prefix = prefix_of(config)?;

        let adapter = OssAdapter::new(Arc::new(MemoryClient::with_base_url(&endpoint)), bucket, &endpoint)
            .with_cdn_base_url(cdn_base_url.as_deref())
            .with_prefix(prefix.as_deref())
            .with_options(config.options.clone());

        Ok(Filesystem::new(Box::new(adapter)))
    }
}

/// Driver factories by name.
pub struct DriverRegistry {
    factories: HashMap<String, Box<dyn DriverFactory>>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(OssDriverFactory));
        registry.register(Box::new(MemoryDriverFactory));
        registry
    }
}

impl DriverRegistry {
    /// A registry with no drivers; `default()` has `oss` and `memory`.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers `factory`, replacing any factory of the same type.
    pub fn register(&mut self, factory: Box<dyn DriverFactory>) {
        let driver_type = factory.driver_type();
        info!(driver = driver_type, "driver registered");
        self.factories.insert(driver_type.to_string(), factory);
    }

    pub fn drivers(&self) -> Vec<&str> {
        let mut drivers: Vec<&str> = self.factories.keys().map(|k| k.as_str()).collect();
        drivers.sort();
        drivers
    }

    pub fn create(&self, config: &DiskConfig) -> Result<Filesystem, ConfigError> {
        let factory = self
            .factories
            .get(&config.driver)
            .ok_or_else(|| ConfigError::UnknownDriver(config.driver.clone()))?;

        factory.create_filesystem(config)
    }

    /// Builds the disk called `name` (or the default disk) from `storage`.
    pub fn disk(&self, storage: &StorageConfig, name: Option<&str>) -> Result<Filesystem, ConfigError> {
        let (name, config) = storage.disk(name)?;
        info!(disk = name, driver = %config.driver, "building disk");

        self.create(config)
    }
}
