use super::ownership::OwnershipLookup;
use super::path::{extension_of, resolve_within, sanitize_filename, sanitize_segments};
use super::signature::{FileKind, MAX_SIGNATURE_LEN};
use crate::config::StorageConfig;
use crate::error::{GuardError, RejectReason, Result};
use crate::identity::AuthorizationContext;
use crate::metrics;
use bytes::Bytes;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// A file that passed every check, ready to be written to the response
#[derive(Debug, Clone)]
pub struct ServedFile {
    pub bytes: Bytes,
    pub content_type: &'static str,
    /// Name safe for `Content-Disposition`
    pub filename: String,
}

/// Authorizes and reads privately stored files.
///
/// Checks run in a fixed order and each failure ends the request:
/// authentication, segment sanitation, root containment, extension
/// allow-list, existence, ownership, signature. No file byte is read before
/// the signature step, and nothing about the filesystem is consulted until
/// the request is authenticated and well formed.
pub struct ResourceGuard {
    root: PathBuf,
    url_prefix: String,
    allowed_extensions: Vec<String>,
    protected_categories: HashSet<String>,
    ownership: Arc<dyn OwnershipLookup>,
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("root", &self.root)
            .field("url_prefix", &self.url_prefix)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("protected_categories", &self.protected_categories)
            .finish_non_exhaustive()
    }
}

impl ResourceGuard {
    /// Create a guard over `config.root`, which must be an existing directory
    pub fn new(config: &StorageConfig, ownership: Arc<dyn OwnershipLookup>) -> Result<Self> {
        let root = std::fs::canonicalize(&config.root).map_err(|e| {
            GuardError::Config(format!(
                "Storage root {} is not accessible: {}",
                config.root.display(),
                e
            ))
        })?;

        if !root.is_dir() {
            return Err(GuardError::Config(format!(
                "Storage root {} is not a directory",
                root.display()
            )));
        }

        let mut allowed_extensions = Vec::with_capacity(config.allowed_extensions.len());
        for ext in &config.allowed_extensions {
            let ext = ext.trim_start_matches('.').to_ascii_lowercase();
            if FileKind::from_extension(&ext).is_none() {
                return Err(GuardError::Config(format!(
                    "Unsupported storage extension: {}",
                    ext
                )));
            }
            allowed_extensions.push(ext);
        }

        info!(
            root = %root.display(),
            url_prefix = %config.url_prefix,
            allowed = ?allowed_extensions,
            "Initializing resource guard"
        );

        Ok(Self {
            root,
            url_prefix: config.url_prefix.trim_end_matches('/').to_string(),
            allowed_extensions,
            protected_categories: config.protected_categories.iter().cloned().collect(),
            ownership,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Canonical URL of a resource, the key used for ownership lookups
    pub fn resource_url<S: AsRef<str>>(&self, segments: &[S]) -> String {
        let mut url = self.url_prefix.clone();
        for segment in segments {
            url.push('/');
            url.push_str(segment.as_ref());
        }
        url
    }

    /// Run the full validation chain for `segments` and read the file.
    pub async fn serve<S: AsRef<str> + Sync>(
        &self,
        caller: Option<&AuthorizationContext>,
        segments: &[S],
    ) -> Result<ServedFile> {
        let result = self.validate_and_read(caller, segments).await;

        match &result {
            Ok(file) => {
                debug!(
                    user_id = caller.map(|c| c.user_id.as_str()).unwrap_or_default(),
                    content_type = file.content_type,
                    size = file.bytes.len(),
                    "Serving private file"
                );
                metrics::record_resource_served(file.content_type);
            }
            Err(err) => {
                metrics::record_resource_rejected(metrics::rejection_label(err));
            }
        }

        result
    }

    async fn validate_and_read<S: AsRef<str> + Sync>(
        &self,
        caller: Option<&AuthorizationContext>,
        segments: &[S],
    ) -> Result<ServedFile> {
        let caller = caller.ok_or(GuardError::Unauthenticated)?;

        sanitize_segments(segments).map_err(|e| {
            warn!(user_id = %caller.user_id, "Rejected unsafe path segments");
            e
        })?;

        let path = resolve_within(&self.root, segments).map_err(|e| {
            warn!(user_id = %caller.user_id, "Rejected path escaping storage root");
            e
        })?;

        let filename = segments
            .last()
            .map(|s| s.as_ref())
            .ok_or(GuardError::Forbidden(RejectReason::InvalidPath))?;
        let kind = self.allowed_kind(filename)?;

        let path = self.existing_file(&path).await?;

        // Ownership follows the file actually served, not the requested alias
        let stored = self.stored_segments(&path)?;
        self.authorize(caller, &stored).await?;

        let bytes = read_verified(&path, kind).await.map_err(|e| {
            if matches!(e, GuardError::Forbidden(RejectReason::SignatureMismatch)) {
                warn!(
                    user_id = %caller.user_id,
                    claimed = kind.content_type(),
                    "File content does not match its extension"
                );
            }
            e
        })?;

        Ok(ServedFile {
            bytes: Bytes::from(bytes),
            content_type: kind.content_type(),
            filename: sanitize_filename(filename),
        })
    }

    /// Map the file's extension onto an allowed kind
    fn allowed_kind(&self, filename: &str) -> Result<FileKind> {
        extension_of(filename)
            .filter(|ext| self.allowed_extensions.iter().any(|allowed| allowed == ext))
            .and_then(|ext| FileKind::from_extension(&ext))
            .ok_or(GuardError::Forbidden(RejectReason::ExtensionNotAllowed))
    }

    /// Resolve symlinks and confirm a regular file inside the root
    async fn existing_file(&self, path: &Path) -> Result<PathBuf> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => return Err(e.into()),
            Err(_) => return Err(GuardError::NotFound),
        };

        if !metadata.is_file() {
            return Err(GuardError::NotFound);
        }

        let canonical = tokio::fs::canonicalize(path).await?;
        if !canonical.starts_with(&self.root) {
            warn!("Rejected symlink resolving outside storage root");
            return Err(GuardError::Forbidden(RejectReason::OutsideRoot));
        }

        Ok(canonical)
    }

    /// Segments of a canonical path below the root
    fn stored_segments(&self, canonical: &Path) -> Result<Vec<String>> {
        let relative = canonical
            .strip_prefix(&self.root)
            .map_err(|_| GuardError::Forbidden(RejectReason::OutsideRoot))?;

        relative
            .components()
            .map(|component| {
                component
                    .as_os_str()
                    .to_str()
                    .map(str::to_string)
                    .ok_or(GuardError::Forbidden(RejectReason::InvalidPath))
            })
            .collect()
    }

    /// Ownership check for protected categories
    async fn authorize<S: AsRef<str> + Sync>(
        &self,
        caller: &AuthorizationContext,
        segments: &[S],
    ) -> Result<()> {
        let category = segments.first().map(|s| s.as_ref()).unwrap_or_default();
        if !self.protected_categories.contains(category) || caller.role.is_system_admin() {
            return Ok(());
        }

        let url = self.resource_url(segments);
        let owner = self.ownership.owner_scope(&url).await?;

        if !caller.can_access(owner.as_deref()) {
            warn!(
                user_id = %caller.user_id,
                role = ?caller.role,
                category,
                "Caller scope does not own resource"
            );
            return Err(GuardError::Forbidden(RejectReason::ScopeMismatch));
        }

        Ok(())
    }
}

/// Read the file through one handle, checking the signature on the leading
/// bytes before the rest of the body is read.
///
/// The returned buffer starts with the exact bytes that were validated.
async fn read_verified(path: &Path, kind: FileKind) -> Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;

    let mut bytes = Vec::with_capacity(MAX_SIGNATURE_LEN);
    (&mut file)
        .take(MAX_SIGNATURE_LEN as u64)
        .read_to_end(&mut bytes)
        .await?;

    if !kind.matches(&bytes) {
        return Err(GuardError::Forbidden(RejectReason::SignatureMismatch));
    }

    file.read_to_end(&mut bytes).await?;
    Ok(bytes)
}
