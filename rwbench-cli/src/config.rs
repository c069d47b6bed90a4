//! Configuration for the `rwbench` tool.
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command-line flags
//! 2. Environment variables (prefixed with `RWBENCH__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `RWBENCH__` as a prefix and double underscores (`__`) to denote
//! nested configuration structures. For example:
//!
//! - `RWBENCH__BUCKET=my-bucket` sets the bucket to benchmark
//! - `RWBENCH__CONCURRENCY=16` sets the number of workers
//! - `RWBENCH__STORAGE__REGION=eu-west-1` sets the region of the S3 bucket
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! bucket: my-bucket
//! concurrency: 16
//!
//! storage:
//!   type: s3
//!   region: eu-west-1
//! ```

use std::fmt;
use std::path::Path;
use std::thread::available_parallelism;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use rwbench_core::BenchmarkConfig;
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "RWBENCH__";

/// Region used when none is configured.
const DEFAULT_REGION: &str = "us-east-1";

/// Newtype around `String` that protects against accidental logging of secrets in our
/// configuration struct. Use with [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// Returns the secret value.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// The object store to benchmark.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is
/// used.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// Amazon S3 or an S3-compatible service (type `"s3"`).
    ///
    /// Credentials are taken from `access_key` and `secret_key` when both are set. Otherwise they
    /// are resolved from the environment (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`), the
    /// shared credentials file, or instance metadata.
    S3 {
        /// The AWS region of the bucket.
        #[serde(default = "default_region")]
        region: String,

        /// Custom endpoint URL, for example `http://localhost:9000` for MinIO.
        #[serde(default)]
        endpoint: Option<String>,

        /// Address the bucket by path instead of by virtual host.
        #[serde(default)]
        path_style: bool,

        /// Timeout for every request, for example `5s`.
        #[serde(default, with = "humantime_serde")]
        request_timeout: Option<Duration>,

        /// Static access key ID.
        #[serde(default)]
        access_key: Option<String>,

        /// Static secret access key.
        #[serde(default)]
        secret_key: Option<SecretBox<ConfigSecret>>,

        /// Session token for temporary credentials.
        #[serde(default)]
        session_token: Option<SecretBox<ConfigSecret>>,
    },

    /// An in-process store (type `"memory"`), useful for dry runs.
    Memory {
        /// Probability in `0.0..=1.0` that a read serves the previous value of an object.
        #[serde(default)]
        stale_rate: f64,
    },
}

fn default_region() -> String {
    DEFAULT_REGION.to_owned()
}

impl Default for Storage {
    fn default() -> Self {
        Self::S3 {
            region: default_region(),
            endpoint: None,
            path_style: false,
            request_timeout: None,
            access_key: None,
            secret_key: None,
            session_token: None,
        }
    }
}

/// Runtime configuration for the Tokio async runtime.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads driving the benchmark.
    ///
    /// Defaults to the available parallelism of the host.
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
///
/// Parsing is case-insensitive, so `JSON` and `json` are equivalent.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

impl std::error::Error for FormatParseError {}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Auto => "auto",
            LogFormat::Pretty => "pretty",
            LogFormat::Simplified => "simplified",
            LogFormat::Json => "json",
        })
    }
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr, the report to stdout.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output. `RUST_LOG` takes precedence when set.
    ///
    /// Defaults to `INFO`.
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format, see [`LogFormat`].
    #[serde(with = "display_fromstr")]
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct of the tool.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Parameters of the benchmark run itself.
    #[serde(flatten)]
    pub benchmark: BenchmarkConfig,

    /// The object store to run against.
    pub storage: Storage,

    /// Async runtime settings.
    pub runtime: Runtime,

    /// Log level and format.
    pub logging: Logging,
}

/// Values given on the command line, applied on top of all other sources.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    /// Overrides `bucket`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// Overrides `clear`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clear: Option<bool>,

    /// Overrides `concurrency`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Overrides `iterations`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,

    /// Overrides `rwratio`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rwratio: Option<f64>,

    /// Overrides `seed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Overrides `storage.region`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageOverrides>,
}

/// Storage values given on the command line.
#[derive(Debug, Default, Serialize)]
pub struct StorageOverrides {
    /// Overrides `storage.region`.
    pub region: String,
}

impl Config {
    /// Loads and validates the configuration from all sources.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()?;

        config.benchmark.validate()?;
        Ok(config)
    }
}
