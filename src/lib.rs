use std::path::Path;

use log::info;

use errors::{ErrorKind, Result, ResultExt};

pub mod cli_factories;
pub mod credentials;
pub mod drive;
pub mod errors;

pub use credentials::CredentialSet;
pub use drive::{Connect, DriveConnector, RemoteFile, Root};

/// Uploads a local file to the root folder of a drive.
pub struct Command<C = DriveConnector> {
    credentials: CredentialSet,
    connector: C,
    replace: bool,
}

impl Command<DriveConnector> {
    pub fn new(credentials: CredentialSet) -> Command<DriveConnector> {
        Command::with_connector(credentials, DriveConnector)
    }
}

impl<C: Connect> Command<C> {
    pub fn with_connector(credentials: CredentialSet, connector: C) -> Command<C> {
        Command { credentials, connector, replace: false }
    }

    /// Overwrite the first file with the same name instead of adding another one.
    pub fn replace_existing(mut self, replace: bool) -> Command<C> {
        self.replace = replace;
        self
    }

    /// Uploads `source` under its path as given. `destination` is accepted
    /// but files always land in the drive root.
    pub async fn run(&self, source: &Path, destination: Option<&str>) -> Result<()> {
        let missing = self.credentials.missing();
        if !missing.is_empty() {
            return Err(
                ErrorKind::MissingEnvironment(missing.iter().map(|v| v.to_string()).collect())
                    .into(),
            );
        }

        let name = source.to_string_lossy().into_owned();
        let file =
            std::fs::File::open(source).chain_err(|| ErrorKind::FileOpen(name.clone()))?;
        if let Some(destination) = destination {
            info!("Ignoring destination \"{destination}\", uploading to the drive root");
        }

        let root = self.connector.connect(&self.credentials).await.chain_err(|| ErrorKind::Root)?;
        let uploaded = if self.replace {
            root.replace(file, &name).await?
        } else {
            root.upload(file, &name).await?
        };
        info!("{} is in drive as {}", name, uploaded.id);
        Ok(())
    }
}
