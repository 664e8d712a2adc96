//! Version history: create, revert, download

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::Arc;

use futures::stream::{self, Stream};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::types::*;
use crate::access::{Actor, Permission, ResourceRef};
use crate::context::CoreContext;
use crate::error::{CoreError, Entity, Result};
use crate::history::HistoryEventKind;

/// Default chunk size for streamed downloads
pub const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Raw content of one version, ready to be served
#[derive(Debug, Clone)]
pub struct VersionDownload {
    pub version_id: VersionId,
    /// Suggested filename: document label plus an extension for the MIME type
    pub filename: String,
    pub mime_type: String,
    pub data: Arc<Vec<u8>>,
}

impl VersionDownload {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Stream the content in chunks of at most `chunk_size` bytes
    pub fn into_stream(self, chunk_size: usize) -> impl Stream<Item = std::io::Result<Vec<u8>>> {
        let chunk_size = chunk_size.max(1);
        let data = self.data;
        let chunks = (0..data.len())
            .step_by(chunk_size)
            .map(move |start| {
                let end = (start + chunk_size).min(data.len());
                Ok::<_, std::io::Error>(data[start..end].to_vec())
            });
        stream::iter(chunks)
    }
}

#[derive(Clone)]
pub struct VersionManager {
    ctx: Arc<CoreContext>,
}

impl VersionManager {
    pub(crate) fn new(ctx: Arc<CoreContext>) -> Self {
        Self { ctx }
    }

    /// Append a new version and make it current
    pub async fn create_version(
        &self,
        actor: &Actor,
        document_id: DocumentId,
        content: Vec<u8>,
        comment: &str,
    ) -> Result<DocumentVersion> {
        self.ctx
            .authorize(
                actor,
                Permission::DocumentNewVersion,
                ResourceRef::of::<Document>(document_id),
            )
            .await?;
        self.ctx.catalog.read().await.document(document_id)?;

        let content = Arc::new(content);
        let decomposed = self.ctx.decompose(content.clone()).await?;

        let version = {
            let mut catalog = self.ctx.catalog.write().await;
            catalog.document(document_id)?;
            let number = catalog
                .versions_of(document_id)
                .last()
                .map(|v| v.version_number + 1)
                .unwrap_or(1);

            let version = catalog.insert_version(
                VersionId::new(),
                document_id,
                number,
                content,
                decomposed,
                comment.to_string(),
            );
            catalog.document_mut(document_id)?.current_version_id = version.id;
            version
        };

        tracing::info!(
            document_id = %document_id,
            version_id = %version.id,
            version_number = version.version_number,
            pages = version.page_count,
            "Created document version"
        );
        self.ctx.emit(HistoryEventKind::DocumentEdited, document_id, actor);
        Ok(version)
    }

    /// Make an existing version current
    ///
    /// Newer versions are kept; reverting is itself reversible.
    pub async fn revert(
        &self,
        actor: &Actor,
        document_id: DocumentId,
        version_id: VersionId,
    ) -> Result<DocumentVersion> {
        self.ctx
            .authorize(
                actor,
                Permission::DocumentVersionRevert,
                ResourceRef::of::<Document>(document_id),
            )
            .await?;

        let version = {
            let mut catalog = self.ctx.catalog.write().await;
            catalog.document(document_id)?;
            let version = catalog
                .versions
                .get(&version_id)
                .filter(|v| v.document_id == document_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found(Entity::Version, version_id))?;
            catalog.document_mut(document_id)?.current_version_id = version_id;
            version
        };

        tracing::info!(
            document_id = %document_id,
            version_id = %version_id,
            version_number = version.version_number,
            "Reverted document"
        );
        self.ctx.emit(HistoryEventKind::DocumentEdited, document_id, actor);
        Ok(version)
    }

    pub async fn current_version(&self, document_id: DocumentId) -> Result<DocumentVersion> {
        let catalog = self.ctx.catalog.read().await;
        let current = catalog.document(document_id)?.current_version_id;
        catalog.version(current).cloned()
    }

    /// Raw content of a version, unmodified
    pub async fn download(&self, actor: &Actor, version_id: VersionId) -> Result<VersionDownload> {
        self.ctx
            .authorize(
                actor,
                Permission::DocumentDownload,
                ResourceRef::of::<DocumentVersion>(version_id),
            )
            .await?;

        let catalog = self.ctx.catalog.read().await;
        let version = catalog.version(version_id)?;
        let document = catalog.document(version.document_id)?;

        Ok(VersionDownload {
            version_id,
            filename: download_filename(&document.label, &version.mime_type),
            mime_type: version.mime_type.clone(),
            data: catalog.content(version_id)?,
        })
    }

    /// Zip archive holding several versions
    pub async fn download_bundle(
        &self,
        actor: &Actor,
        version_ids: &[VersionId],
    ) -> Result<Vec<u8>> {
        let mut downloads = Vec::with_capacity(version_ids.len());
        for version_id in version_ids {
            let download = self.download(actor, *version_id).await?;
            let number = self.ctx.catalog.read().await.version(*version_id)?.version_number;
            downloads.push((number, download));
        }

        tokio::task::spawn_blocking(move || build_bundle(&downloads))
            .await
            .map_err(|e| CoreError::Archive(format!("Task join error: {}", e)))?
    }
}

fn build_bundle(downloads: &[(u32, VersionDownload)]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    let mut used = HashSet::new();

    for (number, download) in downloads {
        let mut name = bundle_entry_name(&download.filename, *number);
        if !used.insert(name.clone()) {
            name = format!("{}-{}", download.version_id, name);
            used.insert(name.clone());
        }
        writer.start_file(name, options)?;
        writer.write_all(&download.data)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// `label.ext` becomes `label-v<number>.ext`
fn bundle_entry_name(filename: &str, number: u32) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-v{}.{}", stem, number, ext),
        _ => format!("{}-v{}", filename, number),
    }
}

fn download_filename(label: &str, mime_type: &str) -> String {
    let base: String = label
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    let base = if base.trim().is_empty() { "document".to_string() } else { base };

    let extension = mime_guess::get_mime_extensions_str(mime_type)
        .and_then(|extensions| extensions.first())
        .copied();

    match extension {
        Some(ext) if !base.to_lowercase().ends_with(&format!(".{}", ext)) => {
            format!("{}.{}", base, ext)
        }
        _ => base,
    }
}
