//! Dataset archive download and extraction

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::utils::error::{PipelineError, Result};

/// Download `url` to `dest` unless the file already exists
pub fn download_file(url: &str, dest: &Path) -> Result<()> {
    if dest.is_file() {
        info!("{:?} already exists, skipping download", dest);
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    info!("Downloading {} ...", url);
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| PipelineError::Download(format!("failed to download {}: {}", url, e)))?;

    let bytes = response
        .bytes()
        .map_err(|e| PipelineError::Download(format!("failed to read response from {}: {}", url, e)))?;

    // `dest` only appears once the whole body is written.
    let partial = dest.with_extension("part");
    let mut file = File::create(&partial)?;
    file.write_all(&bytes)?;
    fs::rename(&partial, dest)?;

    info!("Saved {} bytes to {:?}", bytes.len(), dest);
    Ok(())
}

/// Unpack a `.tar.gz` archive into `output_dir`
pub fn extract_tar_gz(archive_path: &Path, output_dir: &Path) -> Result<()> {
    info!("Extracting {:?} ...", archive_path);
    fs::create_dir_all(output_dir)?;
    let tar_gz = File::open(archive_path)?;
    let decompressor = flate2::read::GzDecoder::new(tar_gz);
    let mut archive = tar::Archive::new(decompressor);

    archive.unpack(output_dir).map_err(|e| {
        PipelineError::Download(format!("failed to extract {:?}: {}", archive_path, e))
    })?;

    info!("Extraction complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    #[test]
    fn test_extract_tar_gz() {
        let dir = std::env::temp_dir().join(format!("vision_batch_tar_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let archive_path = dir.join("data.tar.gz");

        {
            let file = File::create(&archive_path).unwrap();
            let encoder = GzEncoder::new(file, Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let payload = b"hello";
            let mut header = tar::Header::new_gnu();
            header.set_size(payload.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "inner/file.bin", &payload[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let out = dir.join("out");
        extract_tar_gz(&archive_path, &out).unwrap();
        assert_eq!(fs::read(out.join("inner").join("file.bin")).unwrap(), b"hello");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_existing_file_is_not_downloaded() {
        let path = std::env::temp_dir().join(format!("vision_batch_dl_{}.bin", std::process::id()));
        fs::write(&path, b"cached").unwrap();
        // The URL is never contacted because the file exists.
        download_file("http://invalid.invalid/archive.tar.gz", &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"cached");
        fs::remove_file(&path).ok();
    }
}
