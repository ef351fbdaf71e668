//! Configuration for a benchmark run.
//!
//! [`RunConfig`] describes *what* to run (operation kind, operation count,
//! parallelism, payload shape) and [`ClientConfig`] describes *where* to run
//! it (endpoint, credentials, transport knobs). Both are built once at
//! startup from validated CLI input and never mutated afterwards.

use std::fmt;
use std::time::Duration;

/// The kind of operation a run performs. Every run executes exactly one kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    /// `PutObject` requests with a generated payload.
    Upload,
    /// `GetObject` requests against deterministically derived keys.
    Download,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Upload => write!(f, "UPLOAD"),
            Operation::Download => write!(f, "DOWNLOAD"),
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            s if s.eq_ignore_ascii_case("upload") => Operation::Upload,
            s if s.eq_ignore_ascii_case("download") => Operation::Download,
            s => return Err(ConfigError::UnknownOperation(s.into())),
        };

        Ok(result)
    }
}

/// The request signing scheme used by the storage client.
///
/// This is an explicit construction parameter rather than process-wide state,
/// so two clients with different schemes can coexist.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SigningScheme {
    /// AWS Signature Version 4, the default for S3 and most compatible stores.
    #[default]
    V4,
    /// Compatibility mode for stores that do not support virtual-host style
    /// addressing (e.g. Ceph / radosgw). Requests use path-style URLs; the
    /// wire signature remains SigV4.
    Legacy,
}

/// Immutable description of a single benchmark run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// The operation kind executed by every worker.
    pub operation: Operation,
    /// Total number of operations to perform across all workers.
    pub number: u64,
    /// Number of concurrent workers the operations are partitioned across.
    pub threads: u64,
    /// Uncompressed payload size in bytes for upload operations.
    pub size: u64,
    /// Whether upload payloads are gzip-compressed on the wire.
    pub gzip: bool,
    /// Target bucket. Assumed to exist; bucket lifecycle is out of scope.
    pub bucket: String,
    /// Object key namespace. Key derivation is a pure function of this
    /// prefix and the operation index, so an upload run and a later download
    /// run with the same prefix target the same keys.
    pub prefix: String,
    /// Extra attempts for a failed operation before it counts as a failure.
    pub retries: u32,
    /// Optional wall-clock bound for the whole run. When it elapses, workers
    /// finish their in-flight operation and stop; partial results are
    /// reported.
    pub timeout: Option<Duration>,
}

impl RunConfig {
    /// Validates the counts that must be positive for a run to make sense.
    ///
    /// Called once before any operation executes; a failure here means the
    /// benchmark never starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.number == 0 {
            return Err(ConfigError::InvalidOperationCount);
        }
        if self.threads == 0 {
            return Err(ConfigError::InvalidWorkerCount);
        }
        if self.size == 0 {
            return Err(ConfigError::InvalidPayloadSize);
        }
        if self.bucket.is_empty() {
            return Err(ConfigError::MissingBucket);
        }
        Ok(())
    }
}

/// Construction parameters for the storage client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Access key ID.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Endpoint host or URL. A bare host is combined with the scheme derived
    /// from `use_tls`; a value containing `://` is used as-is.
    pub endpoint: String,
    /// Region name sent with SigV4 signatures. S3-compatible stores usually
    /// accept any value here.
    pub region: String,
    /// Use HTTPS when talking to the endpoint.
    pub use_tls: bool,
    /// Keep TCP connections to the endpoint alive between requests.
    pub keep_alive: bool,
    /// Request signing scheme, see [`SigningScheme`].
    pub signing: SigningScheme,
    /// Optional per-request timeout.
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    /// The full endpoint URL including scheme.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            let scheme = if self.use_tls { "https" } else { "http" };
            format!("{scheme}://{}", self.endpoint)
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"[redacted]")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("use_tls", &self.use_tls)
            .field("keep_alive", &self.keep_alive)
            .field("signing", &self.signing)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Fatal configuration errors, surfaced before any operation runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The operation count must be at least 1.
    #[error("number of operations must be positive")]
    InvalidOperationCount,
    /// The worker count must be at least 1.
    #[error("number of threads must be positive")]
    InvalidWorkerCount,
    /// The payload size must be at least 1 byte.
    #[error("payload size must be positive")]
    InvalidPayloadSize,
    /// No bucket was given.
    #[error("a bucket name is required")]
    MissingBucket,
    /// Neither a flag nor an environment variable supplied a credential.
    #[error("missing {0}; pass the flag or set {1} in the environment")]
    MissingCredential(&'static str, &'static str),
    /// The `--operation` value is not a known operation kind.
    #[error(r#"unknown operation "{0}": expected "upload" or "download""#)]
    UnknownOperation(String),
    /// A size value could not be parsed as a byte count.
    #[error(r#"cannot parse "{0}" as a size: expected digits with an optional B, K or M suffix"#)]
    InvalidSizeUnit(String),
}
