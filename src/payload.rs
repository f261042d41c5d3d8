use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use eyre::{Result, WrapErr, eyre};

pub const DEFAULT_MIME_TYPE: &str = "image/png";
pub const DEFAULT_IMAGE_FILE_NAME: &str = "generated-image.png";

const BASE64_MARKER: &str = "base64,";

/// Returns the raw base64 body of an image payload, dropping any
/// `data:<mime>;base64,` header. Inputs without the marker come back as-is.
pub fn strip_prefix(payload: &str) -> &str {
    match payload.find(BASE64_MARKER) {
        Some(index) => &payload[index + BASE64_MARKER.len()..],
        None => payload,
    }
}

/// Wraps raw base64 in a data URL. Payloads that already are data URLs pass
/// through untouched.
pub fn to_data_url(payload: &str, mime_type: &str) -> String {
    if payload.starts_with("data:") {
        return payload.to_string();
    }
    format!("data:{mime_type};{BASE64_MARKER}{payload}")
}

/// Reads an image file into a raw base64 payload.
pub fn read_image_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).wrap_err_with(|| format!("failed reading {}", path.display()))?;
    if bytes.is_empty() {
        return Err(eyre!("Image file is empty: {}", path.display()));
    }
    Ok(BASE64.encode(bytes))
}

/// Decodes a payload (raw or data URL) and writes the image bytes to `path`,
/// creating parent directories as needed.
pub fn write_image_file(path: &Path, payload: &str) -> Result<()> {
    let bytes = BASE64
        .decode(strip_prefix(payload).trim().as_bytes())
        .wrap_err("image payload is not valid base64")?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed creating {}", parent.display()))?;
        }
    }

    fs::write(path, bytes).wrap_err_with(|| format!("failed writing {}", path.display()))?;
    tracing::info!("Saved image to {}", path.display());
    Ok(())
}

/// Where `/save` writes when no path is given.
pub fn default_save_path() -> PathBuf {
    dirs::download_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_IMAGE_FILE_NAME)
}
