use std::io::{Cursor, Read};
use std::mem;
use std::sync::Mutex;

use async_trait::async_trait;
use byte_unit::Byte;
use google_drive3::api::File;
use google_drive3::hyper::client::HttpConnector;
use google_drive3::hyper_rustls::HttpsConnector;
use google_drive3::oauth2::authorized_user::AuthorizedUserSecret;
use google_drive3::oauth2::storage::{TokenInfo, TokenStorage};
use google_drive3::{hyper, hyper_rustls, oauth2, DriveHub};
use log::{debug, info};
use mime::Mime;

use crate::credentials::{CredentialSet, Token};
use crate::errors::{ErrorKind, Result, ResultExt};

const PAGE_SIZE: i32 = 100;
const FILE_FIELDS: &str = "id,name,md5Checksum";

/// What Drive reports about a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    pub md5_checksum: Option<String>,
}

impl From<File> for FileMetadata {
    fn from(file: File) -> Self {
        FileMetadata {
            id: file.id.unwrap_or_default(),
            name: file.name.unwrap_or_default(),
            md5_checksum: file.md5_checksum,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilePage {
    pub files: Vec<FileMetadata>,
    pub next_page_token: Option<String>,
}

/// Raw file operations against a backing store. `Root` builds the
/// name-based workflow on top of these.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// One page of files whose name equals `name`.
    async fn list_page(&self, name: &str, page_token: Option<&str>) -> Result<FilePage>;

    async fn create(&self, name: &str, content: Vec<u8>, mime: Mime) -> Result<FileMetadata>;

    /// Replaces the content of the file with the given id.
    async fn update(&self, id: &str, content: Vec<u8>, mime: Mime) -> Result<FileMetadata>;

    async fn download(&self, id: &str) -> Result<Vec<u8>>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// Produces an authenticated `Root` from a credential set.
#[async_trait]
pub trait Connect: Send + Sync {
    type Store: FileStore;

    async fn connect(&self, credentials: &CredentialSet) -> Result<Root<Self::Store>>;
}

/// Connects to the real Google Drive.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriveConnector;

#[async_trait]
impl Connect for DriveConnector {
    type Store = DriveStore;

    async fn connect(&self, credentials: &CredentialSet) -> Result<Root<DriveStore>> {
        Root::connect(credentials).await
    }
}

/// Files and folders in the root folder of a drive.
pub struct Root<S = DriveStore> {
    store: S,
}

impl Root<DriveStore> {
    /// Authenticates against Google Drive with the given credentials.
    pub async fn connect(credentials: &CredentialSet) -> Result<Root<DriveStore>> {
        let json = credentials
            .application_config()
            .chain_err(|| ErrorKind::Auth("Unable to retrieve config json from creds".into()))?;
        let secret = oauth2::parse_application_secret(&json).chain_err(|| {
            ErrorKind::Auth("Unable to create config from json credentials".into())
        })?;
        let token = credentials
            .token()
            .and_then(|token| token_info(&token))
            .chain_err(|| ErrorKind::Auth("Unable to create oauth token from credentials".into()))?;
        let aus = AuthorizedUserSecret {
            client_id: secret.client_id,
            client_secret: secret.client_secret,
            refresh_token: token.refresh_token.clone().unwrap_or_default(),
            key_type: "authorized_user".to_string(),
        };
        let hub = create_drive_hub(aus, token)
            .await
            .chain_err(|| ErrorKind::Auth("Unable to new-up a Drive service".into()))?;
        Ok(Root::new(DriveStore::new(hub)))
    }
}

impl<S: FileStore> Root<S> {
    pub fn new(store: S) -> Root<S> {
        Root { store }
    }

    /// All files named exactly `name`, in the order the store lists them.
    pub async fn list(&self, name: &str) -> Result<Vec<FileMetadata>> {
        let mut files = vec![];
        let mut page_token: Option<String> = None;
        loop {
            let page = self.store.list_page(name, page_token.as_deref()).await?;
            files.extend(page.files);
            if page.next_page_token.is_none() {
                break;
            }
            page_token = page.next_page_token;
        }
        Ok(files)
    }

    /// Creates a new file named `name`. An existing file with the same name is
    /// left alone, so repeated uploads produce several files with that name.
    pub async fn upload<R>(&self, content: R, name: &str) -> Result<RemoteFile<'_, S>>
    where
        R: Read + Send,
    {
        let mut upload = Upload::read(content, name)?;
        let metadata = self
            .store
            .create(name, mem::take(&mut upload.bytes), upload.mime.clone())
            .await
            .chain_err(|| ErrorKind::Upload(name.to_string()))?;
        upload.verify(&metadata)?;
        info!("Uploaded {} ({}) as {}", name, upload.size(), metadata.id);
        Ok(RemoteFile::new(metadata, &self.store))
    }

    /// Writes `content` into the first file named `name`, or creates it when
    /// there is none.
    pub async fn replace<R>(&self, content: R, name: &str) -> Result<RemoteFile<'_, S>>
    where
        R: Read + Send,
    {
        let existing = self
            .list(name)
            .await
            .chain_err(|| format!("Unable to fetch files list under name '{name}'"))?;
        let Some(target) = existing.into_iter().next() else {
            debug!("No file named {name} yet, creating it");
            return self.upload(content, name).await;
        };
        let mut upload = Upload::read(content, name)?;
        let metadata = self
            .store
            .update(&target.id, mem::take(&mut upload.bytes), upload.mime.clone())
            .await
            .chain_err(|| ErrorKind::Upload(name.to_string()))?;
        upload.verify(&metadata)?;
        info!("Replaced content of {} ({}) with {}", metadata.id, name, upload.size());
        Ok(RemoteFile::new(metadata, &self.store))
    }

    /// The first file the store lists under `name`.
    pub async fn find_by_name(&self, name: &str) -> Result<RemoteFile<'_, S>> {
        let files = self
            .list(name)
            .await
            .chain_err(|| format!("Unable to fetch files list under name '{name}'"))?;
        match files.into_iter().next() {
            Some(metadata) => Ok(RemoteFile::new(metadata, &self.store)),
            None => Err(ErrorKind::NotFound(name.to_string()).into()),
        }
    }
}

/// A file in drive, tied to the root it was obtained from.
#[derive(Debug)]
pub struct RemoteFile<'r, S> {
    pub id: String,
    pub name: String,
    pub md5_checksum: Option<String>,
    store: &'r S,
}

impl<'r, S: FileStore> RemoteFile<'r, S> {
    fn new(metadata: FileMetadata, store: &'r S) -> Self {
        RemoteFile {
            id: metadata.id,
            name: metadata.name,
            md5_checksum: metadata.md5_checksum,
            store,
        }
    }

    /// Downloads the whole file and decodes it as UTF-8.
    pub async fn content(&self) -> Result<String> {
        let body = self
            .store
            .download(&self.id)
            .await
            .chain_err(|| ErrorKind::Download(self.id.clone()))?;
        String::from_utf8(body).chain_err(|| ErrorKind::Download(self.id.clone()))
    }

    pub async fn delete(&self) -> Result<()> {
        self.store.delete(&self.id).await.chain_err(|| ErrorKind::Delete(self.id.clone()))
    }
}

/// Local content read ahead of an upload, with the checksum Drive should echo back.
struct Upload {
    bytes: Vec<u8>,
    mime: Mime,
    checksum: String,
    name: String,
    size: usize,
}

impl Upload {
    fn read<R: Read>(mut content: R, name: &str) -> Result<Upload> {
        let mut bytes = vec![];
        content
            .read_to_end(&mut bytes)
            .chain_err(|| format!("Error while reading content for \"{name}\""))?;
        Ok(Upload {
            checksum: format!("{:x}", md5::compute(&bytes)),
            mime: content_type(name)?,
            name: name.to_string(),
            size: bytes.len(),
            bytes,
        })
    }

    fn size(&self) -> String {
        Byte::from_bytes(self.size as u128).get_appropriate_unit(true).to_string()
    }

    fn verify(&self, metadata: &FileMetadata) -> Result<()> {
        match &metadata.md5_checksum {
            Some(remote) if *remote != self.checksum => Err(ErrorKind::ChecksumMismatch(
                self.name.clone(),
                self.checksum.clone(),
                remote.clone(),
            )
            .into()),
            Some(_) => Ok(()),
            None => {
                debug!("Drive reported no checksum for {}, skipping verification", self.name);
                Ok(())
            }
        }
    }
}

/// Content type guessed from the file name, in the form the Drive client takes.
fn content_type(name: &str) -> Result<Mime> {
    let guessed = mime_guess::from_path(name).first_or_octet_stream();
    guessed
        .essence_str()
        .parse()
        .map_err(|_| format!("Unsupported content type {} for \"{name}\"", guessed).into())
}

/// `FileStore` backed by the Drive v3 API.
pub struct DriveStore {
    hub: DriveHub<HttpsConnector<HttpConnector>>,
}

impl std::fmt::Debug for DriveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveStore").finish_non_exhaustive()
    }
}

impl DriveStore {
    pub fn new(hub: DriveHub<HttpsConnector<HttpConnector>>) -> DriveStore {
        DriveStore { hub }
    }
}

#[async_trait]
impl FileStore for DriveStore {
    async fn list_page(&self, name: &str, page_token: Option<&str>) -> Result<FilePage> {
        let mut list_query = self
            .hub
            .files()
            .list()
            .q(&name_query(name))
            .page_size(PAGE_SIZE)
            .param("fields", "nextPageToken,files(id,name,md5Checksum)");
        if let Some(page_token) = page_token {
            list_query = list_query.page_token(page_token);
        }
        let file_list = list_query.doit().await?.1;
        Ok(FilePage {
            files: file_list.files.unwrap_or_default().into_iter().map(FileMetadata::from).collect(),
            next_page_token: file_list.next_page_token,
        })
    }

    async fn create(&self, name: &str, content: Vec<u8>, mime: Mime) -> Result<FileMetadata> {
        let metadata = File { name: Some(name.to_string()), ..Default::default() };
        let (_, file) = self
            .hub
            .files()
            .create(metadata)
            .param("fields", FILE_FIELDS)
            .upload(Cursor::new(content), mime)
            .await?;
        Ok(file.into())
    }

    async fn update(&self, id: &str, content: Vec<u8>, mime: Mime) -> Result<FileMetadata> {
        let (_, file) = self
            .hub
            .files()
            .update(File::default(), id)
            .param("fields", FILE_FIELDS)
            .upload(Cursor::new(content), mime)
            .await?;
        Ok(file.into())
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>> {
        let (response, _) = self
            .hub
            .files()
            .get(id)
            .param("alt", "media")
            .doit()
            .await
            .chain_err(|| "Unable to download file")?;
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .chain_err(|| "Error while reading http response body")?;
        Ok(body.to_vec())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.hub.files().delete(id).doit().await?;
        Ok(())
    }
}

/// Drive query matching non-trashed files named exactly `name`.
fn name_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name = '{escaped}' and trashed = false")
}

fn token_info(token: &Token) -> Result<TokenInfo> {
    let expires_at = time::OffsetDateTime::from_unix_timestamp(token.expiry.timestamp())
        .chain_err(|| ErrorKind::InvalidExpiry(token.expiry.to_rfc3339()))?;
    Ok(TokenInfo {
        access_token: token.access_token.clone(),
        refresh_token: Some(token.refresh_token.clone()),
        expires_at: Some(expires_at),
        id_token: None,
    })
}

/// Hands the pre-provisioned token to the authenticator and keeps whatever
/// it refreshes to, in memory only.
struct PresetTokenStorage {
    token: Mutex<Option<TokenInfo>>,
}

#[async_trait]
impl TokenStorage for PresetTokenStorage {
    async fn set(&self, _scopes: &[&str], token: TokenInfo) -> anyhow::Result<()> {
        let mut stored =
            self.token.lock().map_err(|_| anyhow::anyhow!("token storage lock poisoned"))?;
        *stored = Some(token);
        Ok(())
    }

    async fn get(&self, _scopes: &[&str]) -> Option<TokenInfo> {
        self.token.lock().ok()?.clone()
    }
}

async fn create_drive_hub(
    aus: AuthorizedUserSecret,
    token: TokenInfo,
) -> Result<DriveHub<HttpsConnector<HttpConnector>>> {
    let storage = PresetTokenStorage { token: Mutex::new(Some(token)) };
    let authenticator = oauth2::AuthorizedUserAuthenticator::builder(aus)
        .with_storage(Box::new(storage))
        .build()
        .await?;
    Ok(DriveHub::new(
        hyper::Client::builder().build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .https_or_http()
                .enable_http1()
                .enable_http2()
                .build(),
        ),
        authenticator,
    ))
}
