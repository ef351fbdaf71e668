//! Command-line surface and conversion into validated configuration.

use std::str::FromStr;
use std::time::Duration;

use argh::FromArgs;

use crate::config::{ClientConfig, ConfigError, Operation, RunConfig, SigningScheme};

/// Region name sent with request signatures. S3-compatible stores accept
/// any value, and AWS resolves the real region from the endpoint.
const DEFAULT_REGION: &str = "us-east-1";

/// Performance test for S3-compatible object storage.
#[derive(Debug, FromArgs)]
pub struct Args {
    /// number of threads (default 1)
    #[argh(option, short = 't', default = "1")]
    pub threads: u64,

    /// number of operations
    #[argh(option, short = 'n')]
    pub number: u64,

    /// file size (e.g. for UPLOAD); supported units: B, K, M (default 64K)
    #[argh(option, default = "ByteCount(64 * 1024)")]
    pub size: ByteCount,

    /// access key ID; also possible to set AWS_ACCESS_KEY in environment
    #[argh(option)]
    pub access_key: Option<String>,

    /// secret access key; also possible to set AWS_SECRET_KEY in environment
    #[argh(option)]
    pub secret_key: Option<String>,

    /// endpoint url (default s3.amazonaws.com)
    #[argh(option, default = "String::from(\"s3.amazonaws.com\")")]
    pub endpoint_url: String,

    /// name of bucket
    #[argh(option)]
    pub bucket_name: Option<String>,

    /// operation: upload or download (default upload)
    #[argh(option, default = "Operation::Upload")]
    pub operation: Operation,

    /// object key prefix (default s3pt)
    #[argh(option, default = "String::from(\"s3pt\")")]
    pub prefix: String,

    /// retry a failed operation this many times before counting it (default 0)
    #[argh(option, default = "0")]
    pub retries: u32,

    /// stop dispatching new operations after this many seconds
    #[argh(option)]
    pub timeout: Option<u64>,

    /// use http instead of https
    #[argh(switch)]
    pub http: bool,

    /// use gzip
    #[argh(switch)]
    pub gzip: bool,

    /// use the legacy signing scheme; currently required for Ceph / radosgw
    #[argh(switch)]
    pub legacy_signer: bool,

    /// use TCP keep alive
    #[argh(switch)]
    pub keep_alive: bool,
}

impl Args {
    /// Converts parsed flags into validated run and client configuration.
    ///
    /// Credentials fall back to `AWS_ACCESS_KEY` / `AWS_SECRET_KEY` when the
    /// flag is absent; an explicit flag always wins over the environment.
    pub fn resolve(self) -> Result<(RunConfig, ClientConfig), ConfigError> {
        let access_key = credential(self.access_key, "--access-key", "AWS_ACCESS_KEY")?;
        let secret_key = credential(self.secret_key, "--secret-key", "AWS_SECRET_KEY")?;

        let run = RunConfig {
            operation: self.operation,
            number: self.number,
            threads: self.threads,
            size: self.size.0,
            gzip: self.gzip,
            bucket: self.bucket_name.unwrap_or_default(),
            prefix: self.prefix,
            retries: self.retries,
            timeout: self.timeout.map(Duration::from_secs),
        };
        run.validate()?;

        let client = ClientConfig {
            access_key,
            secret_key,
            endpoint: self.endpoint_url,
            region: DEFAULT_REGION.to_owned(),
            use_tls: !self.http,
            keep_alive: self.keep_alive,
            signing: if self.legacy_signer {
                SigningScheme::Legacy
            } else {
                SigningScheme::V4
            },
            request_timeout: None,
        };

        Ok((run, client))
    }
}

fn credential(
    flag: Option<String>,
    flag_name: &'static str,
    env_key: &'static str,
) -> Result<String, ConfigError> {
    if let Some(value) = flag {
        if std::env::var_os(env_key).is_some() {
            tracing::info!("ignoring {env_key} from the environment; {flag_name} was supplied");
        }
        return Ok(value);
    }

    match std::env::var(env_key) {
        Ok(value) => {
            tracing::info!("using {env_key} from the environment");
            Ok(value)
        }
        Err(_) => Err(ConfigError::MissingCredential(flag_name, env_key)),
    }
}

/// A byte count parsed from a number with an optional B, K or M suffix.
///
/// K and M are 1024 multiples: `64K` is 65536 bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ByteCount(pub u64);

impl FromStr for ByteCount {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidSizeUnit(s.to_owned());
        let trimmed = s.trim();

        let (digits, multiplier) = match trimmed.char_indices().last().ok_or_else(invalid)? {
            (i, 'b' | 'B') => (&trimmed[..i], 1),
            (i, 'k' | 'K') => (&trimmed[..i], 1024),
            (i, 'm' | 'M') => (&trimmed[..i], 1024 * 1024),
            _ => (trimmed, 1),
        };

        let value: u64 = digits.parse().map_err(|_| invalid())?;
        value.checked_mul(multiplier).map(ByteCount).ok_or_else(invalid)
    }
}
