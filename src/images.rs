use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, ImageReader};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

const CANONICAL_EXTENSION: &str = "png";
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

const MARGIN_COLUMNS: u16 = 8;
const MARGIN_ROWS: u16 = 10;
const NARROW_COLUMNS: u32 = 100;
const FALLBACK_VIEWPORT: Viewport = Viewport { columns: 80, rows: 24 };

const RAMP: &[u8] = b" .:-=+*#%@";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(u16),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("empty response")]
    Empty,
}

pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, RenderError>;
}

pub struct HttpMediaFetcher {
    http: reqwest::Client,
}

impl HttpMediaFetcher {
    pub fn new() -> Result<Self, RenderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, RenderError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Status(status.as_u16()));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let bytes = response.bytes().await?.to_vec();
        Ok(FetchedMedia { bytes, content_type })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub columns: u16,
    pub rows: u16,
}

impl Viewport {
    pub fn current() -> Self {
        crossterm::terminal::size()
            .ok()
            .filter(|(columns, rows)| *columns > 0 && *rows > 0)
            .map(|(columns, rows)| Viewport { columns, rows })
            .unwrap_or(FALLBACK_VIEWPORT)
    }
}

#[derive(Clone)]
pub struct ImageCache {
    dir: PathBuf,
    fetcher: Arc<dyn MediaFetcher>,
    viewport: Option<Viewport>,
}

impl ImageCache {
    pub fn new(dir: PathBuf, fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self {
            dir,
            fetcher,
            viewport: None,
        }
    }

    #[cfg(test)]
    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn artifact_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.{CANONICAL_EXTENSION}", cache_key(url)))
    }

    /// `"<url>\n\n<ascii art>"`, or `""` on any failure.
    pub async fn resolve(&self, url: &str) -> String {
        let url = url.trim();
        if url.is_empty() {
            return String::new();
        }
        match self.render(url).await {
            Ok(art) => format!("{url}\n\n{art}"),
            Err(error) => {
                warn!(url, %error, "could not render image");
                String::new()
            }
        }
    }

    async fn render(&self, url: &str) -> Result<String, RenderError> {
        let image = self.load(url).await?;
        let viewport = self.viewport.unwrap_or_else(Viewport::current);
        Ok(render_ascii(&image, viewport))
    }

    async fn load(&self, url: &str) -> Result<DynamicImage, RenderError> {
        let artifact = self.artifact_path(url);
        if tokio::fs::try_exists(&artifact).await? {
            debug!(url, path = %artifact.display(), "image cache hit");
            return Ok(image::open(&artifact)?);
        }

        debug!(url, "image cache miss");
        tokio::fs::create_dir_all(&self.dir).await?;
        let media = self.fetcher.fetch(url).await?;
        if media.bytes.is_empty() {
            return Err(RenderError::Empty);
        }
        normalize_download(&self.dir, &artifact, media)
    }
}

fn normalize_download(dir: &Path, artifact: &Path, media: FetchedMedia) -> Result<DynamicImage, RenderError> {
    let stem = artifact
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("image");
    let download = TempFile::new(dir.join(format!("{stem}.download")));
    let staged = TempFile::new(dir.join(format!("{stem}.{CANONICAL_EXTENSION}.part")));

    fs::write(download.path(), &media.bytes)?;

    let mut reader = ImageReader::open(download.path())?;
    let declared = media.content_type.as_deref().and_then(format_from_content_type);
    match declared {
        Some(format) => reader.set_format(format),
        None => reader = reader.with_guessed_format()?,
    }
    let source_format = reader.format();
    let image = reader.decode()?;

    if source_format == Some(ImageFormat::Png) {
        fs::rename(download.path(), artifact)?;
    } else {
        image.save_with_format(staged.path(), ImageFormat::Png)?;
        fs::rename(staged.path(), artifact)?;
    }
    Ok(image)
}

fn format_from_content_type(content_type: &str) -> Option<ImageFormat> {
    let mime = content_type.split(';').next()?.trim();
    ImageFormat::from_mime_type(mime)
}

pub fn cache_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    bytes_to_hex(&digest)
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = std::fmt::Write::write_fmt(&mut out, format_args!("{:02x}", byte));
    }
    out
}

/// Terminal cells are about twice as tall as wide: wide renders spend two
/// characters per pixel, narrow ones halve the vertical resolution.
pub fn render_ascii(image: &DynamicImage, viewport: Viewport) -> String {
    let max_columns = u32::from(viewport.columns.saturating_sub(MARGIN_COLUMNS).max(1));
    let max_rows = u32::from(viewport.rows.saturating_sub(MARGIN_ROWS).max(1));
    let cell_width: u32 = if max_columns < NARROW_COLUMNS { 1 } else { 2 };

    let (width, height) = (image.width().max(1), image.height().max(1));
    // Vertical pixels per character row.
    let row_scale = cell_width as f64 / 2.0;
    let scale = f64::min(
        (max_columns / cell_width).max(1) as f64 / width as f64,
        max_rows as f64 / (height as f64 * row_scale),
    );
    let out_width = ((width as f64 * scale).round() as u32).max(1);
    let out_height = ((height as f64 * scale * row_scale).round() as u32).max(1);

    let pixels = image::imageops::resize(
        &image.to_luma_alpha8(),
        out_width,
        out_height,
        image::imageops::FilterType::Triangle,
    );

    let mut out = String::with_capacity(((out_width * cell_width + 1) * out_height) as usize);
    for (y, row) in pixels.rows().enumerate() {
        if y > 0 {
            out.push('\n');
        }
        for pixel in row {
            let [luma, alpha] = pixel.0;
            let ch = if alpha < 64 { ' ' } else { ramp_char(luma) };
            for _ in 0..cell_width {
                out.push(ch);
            }
        }
    }
    out
}

fn ramp_char(luma: u8) -> char {
    let index = luma as usize * (RAMP.len() - 1) / u8::MAX as usize;
    RAMP[index] as char
}

struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), %err, "could not remove temporary file"),
        }
    }
}
