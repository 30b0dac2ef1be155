use serde::Deserialize;

/// Settings of the resolution context itself, as opposed to the properties
/// of individual projects.
///
/// Can be embedded in a larger configuration file and read with `serde`, or
/// parsed directly with [`Options::from_json`]:
///
/// ```rust
/// let options = tsumiki::Options::from_json(r#"{ "threads": 4 }"#).unwrap();
/// assert_eq!(options.threads, Some(4));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Number of worker threads, `None` lets rayon decide.
    pub threads: Option<usize>,
    /// Prefix of worker thread names.
    pub thread_name: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            threads: None,
            thread_name: "tsumiki".to_string(),
        }
    }
}

impl Options {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub(crate) fn build_pool(&self) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        let prefix = self.thread_name.clone();
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(move |i| format!("{prefix}-{i}"));

        if let Some(threads) = self.threads {
            builder = builder.num_threads(threads);
        }

        builder.build()
    }
}
