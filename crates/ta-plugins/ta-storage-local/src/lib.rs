//! # ta-storage-local
//!
//! Local filesystem implementation of `MediaStore`.
//! Content-addressable storage: files are named by their SHA-256 hash and
//! sharded into `ab/cd/` directories, with a WebP thumbnail alongside.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, ImageReader};
use sha2::{Digest, Sha256};
use ta_core::traits::MediaStore;
use tokio::fs;

pub struct LocalMediaStore {
    /// Root directory for all uploads (e.g., "./uploads")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/media")
    url_prefix: String,
    thumb_size: u32,
}

/// `ab/cd/abcd...` for a hex media id; `None` for anything else.
fn shard(media_id: &str) -> Option<String> {
    if media_id.len() < 4 || !media_id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("{}/{}/{}", &media_id[0..2], &media_id[2..4], media_id))
}

/// Writes `data` to a temporary file beside `path`, then renames it over
/// `path`. Only complete files ever appear under the final name.
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl LocalMediaStore {
    pub fn new(root: PathBuf, url_prefix: String, thumb_size: u32) -> Self {
        Self {
            root_path: root,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
            thumb_size: thumb_size.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    fn original_path(&self, media_id: &str) -> Option<PathBuf> {
        shard(media_id).map(|rel| self.root_path.join(rel))
    }

    fn thumb_path(&self, media_id: &str) -> Option<PathBuf> {
        self.original_path(media_id)
            .map(|p| p.with_file_name(format!("thumb_{media_id}.webp")))
    }

    /// Decodes `data` and writes a WebP thumbnail that fits in a
    /// `thumb_size` square.
    async fn generate_thumbnail(&self, data: Vec<u8>, thumb_path: PathBuf) -> anyhow::Result<()> {
        let size = self.thumb_size;
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let img = ImageReader::new(Cursor::new(data))
                .with_guessed_format()?
                .decode()?;
            let thumb = DynamicImage::ImageRgba8(img.thumbnail(size, size).to_rgba8());
            let mut encoded = Cursor::new(Vec::new());
            thumb.write_to(&mut encoded, ImageFormat::WebP)?;
            write_atomic(&thumb_path, encoded.get_ref())?;
            Ok(())
        })
        .await?
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    /// Saves an upload using its SHA-256 hash as the filename.
    /// Identical uploads share one file.
    async fn save_upload(&self, data: Vec<u8>, content_type: &str) -> anyhow::Result<String> {
        let hash = hex::encode(Sha256::digest(&data));
        let target_path = self
            .original_path(&hash)
            .ok_or_else(|| anyhow::anyhow!("bad media id {hash}"))?;
        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // same hash and same length: already stored
        let stored_len = fs::metadata(&target_path).await.ok().map(|m| m.len());
        if stored_len == Some(data.len() as u64) {
            log::debug!("upload {hash} already stored");
            return Ok(hash);
        }
        if stored_len.is_some() {
            log::warn!("upload {hash}: stored copy is incomplete, rewriting");
        }
        let path = target_path.clone();
        let data = tokio::task::spawn_blocking(move || write_atomic(&path, &data).map(|()| data)).await??;
        log::info!("stored upload {hash} ({content_type}, {} bytes)", data.len());

        // A missing thumbnail only means the original is served instead
        if let Some(thumb_path) = self.thumb_path(&hash) {
            if let Err(e) = self.generate_thumbnail(data, thumb_path).await {
                log::warn!("thumbnail for {hash} failed: {e}");
            }
        }
        Ok(hash)
    }

    async fn get_url(&self, media_id: &str) -> String {
        match shard(media_id) {
            Some(rel) => format!("{}/{}", self.url_prefix, rel),
            None => format!("{}/{}", self.url_prefix, media_id),
        }
    }

    async fn get_thumbnail_url(&self, media_id: &str) -> String {
        let has_thumb = match self.thumb_path(media_id) {
            Some(p) => fs::try_exists(&p).await.unwrap_or(false),
            None => false,
        };
        if !has_thumb {
            return self.get_url(media_id).await;
        }
        format!(
            "{}/{}/{}/thumb_{}.webp",
            self.url_prefix,
            &media_id[0..2],
            &media_id[2..4],
            media_id
        )
    }

    async fn read_original(&self, media_id: &str) -> anyhow::Result<Vec<u8>> {
        let path = self
            .original_path(media_id)
            .ok_or_else(|| anyhow::anyhow!("bad media id {media_id}"))?;
        Ok(fs::read(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(w, h, Rgb([30, 120, 60]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn store(dir: &tempfile::TempDir) -> LocalMediaStore {
        LocalMediaStore::new(dir.path().to_path_buf(), "/media/".into(), 250)
    }

    #[tokio::test]
    async fn images_are_sharded_with_a_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let data = png(600, 300);

        let id = store.save_upload(data.clone(), "image/png").await.unwrap();
        assert_eq!(id.len(), 64);
        assert_eq!(store.save_upload(data.clone(), "image/png").await.unwrap(), id);

        let original = dir.path().join(&id[0..2]).join(&id[2..4]).join(&id);
        assert!(original.exists());
        assert_eq!(store.read_original(&id).await.unwrap(), data);

        let thumb_url = store.get_thumbnail_url(&id).await;
        assert_eq!(thumb_url, format!("/media/{}/{}/thumb_{}.webp", &id[0..2], &id[2..4], id));
        let thumb = image::open(store.thumb_path(&id).unwrap()).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (250, 125));
    }

    #[tokio::test]
    async fn non_images_fall_back_to_the_original_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let id = store.save_upload(b"not an image".to_vec(), "image/jpeg").await.unwrap();

        let url = store.get_url(&id).await;
        assert_eq!(url, format!("/media/{}/{}/{}", &id[0..2], &id[2..4], id));
        assert_eq!(store.get_thumbnail_url(&id).await, url);
    }

    fn shard_dir_entries(dir: &tempfile::TempDir, id: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path().join(&id[0..2]).join(&id[2..4]))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn writes_leave_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let id = store.save_upload(png(40, 40), "image/png").await.unwrap();
        assert_eq!(shard_dir_entries(&dir, &id), [id.clone(), format!("thumb_{id}.webp")]);
    }

    #[tokio::test]
    async fn truncated_originals_are_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let data = b"not an image, but long enough to cut".to_vec();
        let id = hex::encode(Sha256::digest(&data));

        let original = store.original_path(&id).unwrap();
        std::fs::create_dir_all(original.parent().unwrap()).unwrap();
        std::fs::write(&original, &data[..10]).unwrap();

        assert_eq!(store.save_upload(data.clone(), "image/jpeg").await.unwrap(), id);
        assert_eq!(store.read_original(&id).await.unwrap(), data);
        assert_eq!(shard_dir_entries(&dir, &id), [id.clone()]);
    }

    #[tokio::test]
    async fn malformed_ids_do_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert_eq!(store.get_url("ab").await, "/media/ab");
        assert_eq!(store.get_thumbnail_url("../etc").await, "/media/../etc");
        assert!(store.read_original("zz").await.is_err());
    }
}
