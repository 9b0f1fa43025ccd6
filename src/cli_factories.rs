use std::ffi::OsString;
use std::io::Write;

use crate::credentials::CredentialSet;
use crate::errors::{ErrorKind, Result};

const VAR_PREFIX: &str = "DRIVE_";

/// Log level used unless `RUST_LOG` says otherwise. A successful run logs
/// nothing at this level.
pub const DEFAULT_LOG_LEVEL: log::LevelFilter = log::LevelFilter::Warn;

/// Collects the `DRIVE_*` variables of the current process.
pub fn credentials_from_env() -> Result<CredentialSet> {
    credentials_from_vars(std::env::vars_os())
}

/// Keeps the `DRIVE_*` pairs. One that is not valid unicode is rejected
/// rather than dropped, so it is never reported as missing.
pub fn credentials_from_vars<I>(vars: I) -> Result<CredentialSet>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut pairs = vec![];
    for (key, value) in vars {
        if !key.to_string_lossy().starts_with(VAR_PREFIX) {
            continue;
        }
        match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => pairs.push((key, value)),
            (key, value) => {
                let key = key.unwrap_or_else(|k| k.to_string_lossy().into_owned());
                let value = value.unwrap_or_else(|v| v.to_string_lossy().into_owned());
                return Err(ErrorKind::MalformedEntry(format!("{key}={value}")).into());
            }
        }
    }
    Ok(CredentialSet::from_pairs(pairs))
}

pub fn set_up_logging() {
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{}:{} {} [{}] - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(DEFAULT_LOG_LEVEL)
        .parse_default_env()
        .init();
}
