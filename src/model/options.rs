use std::collections::BTreeMap;

use serde::Deserialize;

/// Request parameters sent with `put_object` and `create_object_dir`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObjectOptions {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    pub content_encoding: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Extra query parameters for a signed URL, keyed by their wire name
/// (`response-content-type`, ...).
pub type SignOptions = BTreeMap<String, String>;

/// Per-call write configuration using the logical option names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    pub mimetype: Option<String>,
    pub size: Option<u64>,
    pub filename: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mimetype(mut self, mimetype: &str) -> Self {
        self.mimetype = Some(mimetype.to_string());
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }
}

impl ObjectOptions {
    /// Layers the per-call config over these defaults.
    ///
    /// `mimetype` maps to content-type, `size` to content-length and
    /// `filename` to content-disposition; anything set in `config` wins.
    pub fn merged_with(&self, config: &Config) -> ObjectOptions {
        let mut options = self.clone();

        if let Some(mimetype) = &config.mimetype {
            options.content_type = Some(mimetype.clone());
        }
        if let Some(size) = config.size {
            options.content_length = Some(size);
        }
        if let Some(filename) = &config.filename {
            options.content_disposition = Some(filename.clone());
        }

        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_with() {
        let defaults = ObjectOptions {
            content_type: Some("text/html".to_string()),
            cache_control: Some("max-age=60".to_string()),
            ..Default::default()
        };

        let cases = vec![
            (Config::new(), Some("text/html"), None, None),
            (
                Config::new().mimetype("image/png"),
                Some("image/png"),
                None,
                None,
            ),
            (
                Config::new().size(12).filename("attachment; filename=a.txt"),
                Some("text/html"),
                Some(12),
                Some("attachment; filename=a.txt"),
            ),
        ];

        for (config, content_type, content_length, content_disposition) in cases {
            let merged = defaults.merged_with(&config);

            assert_eq!(merged.content_type.as_deref(), content_type, "failed content_type for case: {:?}", config);
            assert_eq!(merged.content_length, content_length, "failed content_length for case: {:?}", config);
            assert_eq!(
                merged.content_disposition.as_deref(),
                content_disposition,
                "failed content_disposition for case: {:?}",
                config
            );
            assert_eq!(merged.cache_control.as_deref(), Some("max-age=60"));
        }
    }
}
