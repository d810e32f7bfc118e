//! Infer a file extension for a fetched response, falling back from
//! byte-sniffing to `Content-Type` to the URL path, then transcode
//! HEIC/HEIF payloads to JPEG.

use log::warn;
use reqwest::header::HeaderMap;

/// Result of type detection: the extension to store the asset under and
/// the bytes to write, which may have been transcoded.
pub struct DetectedType {
    pub extension: String,
    pub bytes: Vec<u8>,
}

pub fn detect(url: &str, headers: &HeaderMap, body: &[u8]) -> DetectedType {
    let mut extension = sniff_extension(body)
        .or_else(|| extension_from_content_type(headers))
        .or_else(|| extension_from_url_path(url))
        .unwrap_or_else(|| "bin".to_string());

    let mut bytes = body.to_vec();

    if extension.eq_ignore_ascii_case("heic") || extension.eq_ignore_ascii_case("heif") {
        match transcode_heic_to_jpeg(body) {
            Ok(jpeg_bytes) => {
                bytes = jpeg_bytes;
                extension = "jpg".to_string();
            }
            Err(e) => {
                warn!("HEIC transcode failed for {}, keeping original bytes: {}", url, e);
            }
        }
    }

    DetectedType { extension, bytes }
}

fn sniff_extension(body: &[u8]) -> Option<String> {
    infer::get(body).map(|kind| kind.extension().to_string())
}

fn extension_from_content_type(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get(reqwest::header::CONTENT_TYPE)?.to_str().ok()?;
    let mime: mime::Mime = content_type.parse().ok()?;
    mime_guess::get_mime_extensions(&mime)
        .and_then(|exts| exts.first())
        .map(|ext| ext.to_string())
}

/// Last-resort fallback: the first maximal `[a-zA-Z]+` run in the final
/// extension segment of the URL path.
fn extension_from_url_path(url: &str) -> Option<String> {
    let path = url::Url::parse(url).ok().map(|u| u.path().to_string()).unwrap_or_else(|| url.to_string());
    let last_segment = path.rsplit('/').next()?;
    let tail = last_segment.rsplit('.').next()?;
    let run: String = tail.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if run.is_empty() {
        None
    } else {
        Some(run.to_lowercase())
    }
}

fn transcode_heic_to_jpeg(body: &[u8]) -> anyhow::Result<Vec<u8>> {
    use libheif_rs::{ColorSpace, HeifContext, RgbChroma};

    let ctx = HeifContext::read_from_bytes(body)?;
    let handle = ctx.primary_image_handle()?;
    let image = handle.decode(ColorSpace::Rgb(RgbChroma::Rgb), None)?;

    let width = image.width();
    let height = image.height();
    let plane = image
        .planes()
        .interleaved
        .ok_or_else(|| anyhow::anyhow!("decoded HEIC image has no interleaved RGB plane"))?;

    let stride = plane.stride;
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for row in 0..height as usize {
        let start = row * stride;
        rgb.extend_from_slice(&plane.data[start..start + (width as usize * 3)]);
    }

    let buffer: image::RgbImage = image::ImageBuffer::from_raw(width, height, rgb)
        .ok_or_else(|| anyhow::anyhow!("could not build image buffer from decoded HEIC planes"))?;

    let mut jpeg_bytes = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut jpeg_bytes);
    buffer.write_to(&mut cursor, image::ImageFormat::Jpeg)?;
    Ok(jpeg_bytes)
}
