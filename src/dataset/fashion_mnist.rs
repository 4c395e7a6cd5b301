//! Fashion-MNIST idx datasets
//!
//! Files live in `<root>/FashionMNIST/raw`, either plain or gzipped:
//! `{train,t10k}-images-idx3-ubyte[.gz]` and `{train,t10k}-labels-idx1-ubyte[.gz]`.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::info;

use crate::dataset::download::download_file;
use crate::dataset::{InMemoryDataset, PixelLayout};
use crate::utils::error::{PipelineError, Result};

const IMAGES_MAGIC: u32 = 0x0000_0803;
const LABELS_MAGIC: u32 = 0x0000_0801;

const MIRROR: &str = "http://fashion-mnist.s3-website.eu-central-1.amazonaws.com";

pub const FASHION_MNIST_CLASSES: [&str; 10] = [
    "T-shirt/top",
    "Trouser",
    "Pullover",
    "Dress",
    "Coat",
    "Sandal",
    "Shirt",
    "Sneaker",
    "Bag",
    "Ankle boot",
];

/// Directory holding the raw idx files
pub fn raw_dir(root: &Path) -> PathBuf {
    root.join("FashionMNIST").join("raw")
}

fn file_stems(train: bool) -> [&'static str; 2] {
    if train {
        ["train-images-idx3-ubyte", "train-labels-idx1-ubyte"]
    } else {
        ["t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte"]
    }
}

/// Read an idx file, transparently decompressing a `.gz` sibling
fn read_idx(dir: &Path, stem: &str) -> Result<Vec<u8>> {
    let plain = dir.join(stem);
    if plain.is_file() {
        return Ok(std::fs::read(&plain)?);
    }

    let gz = dir.join(format!("{}.gz", stem));
    let file = std::fs::File::open(&gz).map_err(|e| {
        PipelineError::Dataset(format!("missing Fashion-MNIST file {:?}: {}", gz, e))
    })?;
    let mut bytes = Vec::new();
    GzDecoder::new(file).read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn be_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| PipelineError::Dataset("truncated idx header".to_string()))
}

/// Parse an idx3 image file into `(count, rows, cols, pixels)`
fn parse_images(bytes: &[u8]) -> Result<(usize, u32, u32, Vec<u8>)> {
    let magic = be_u32(bytes, 0)?;
    if magic != IMAGES_MAGIC {
        return Err(PipelineError::Dataset(format!(
            "bad idx image magic {:#x} (expected {:#x})",
            magic, IMAGES_MAGIC
        )));
    }
    let count = be_u32(bytes, 4)? as usize;
    let rows = be_u32(bytes, 8)?;
    let cols = be_u32(bytes, 12)?;

    let expected = count * rows as usize * cols as usize;
    let pixels = &bytes[16..];
    if pixels.len() != expected {
        return Err(PipelineError::Dataset(format!(
            "idx image payload has {} bytes, expected {}",
            pixels.len(),
            expected
        )));
    }
    Ok((count, rows, cols, pixels.to_vec()))
}

fn parse_labels(bytes: &[u8]) -> Result<Vec<usize>> {
    let magic = be_u32(bytes, 0)?;
    if magic != LABELS_MAGIC {
        return Err(PipelineError::Dataset(format!(
            "bad idx label magic {:#x} (expected {:#x})",
            magic, LABELS_MAGIC
        )));
    }
    let count = be_u32(bytes, 4)? as usize;
    let labels = &bytes[8..];
    if labels.len() != count {
        return Err(PipelineError::Dataset(format!(
            "idx label payload has {} bytes, expected {}",
            labels.len(),
            count
        )));
    }
    Ok(labels.iter().map(|&l| l as usize).collect())
}

/// Whether both splits are present, plain or gzipped
pub fn is_present(root: &Path) -> bool {
    let dir = raw_dir(root);
    [true, false].iter().flat_map(|&t| file_stems(t)).all(|stem| {
        dir.join(stem).is_file() || dir.join(format!("{}.gz", stem)).is_file()
    })
}

/// Fetch the four gzipped idx files into `<root>/FashionMNIST/raw`
pub fn download(root: &Path) -> Result<()> {
    let dir = raw_dir(root);
    for stem in [true, false].iter().flat_map(|&t| file_stems(t)) {
        if dir.join(stem).is_file() {
            continue;
        }
        let name = format!("{}.gz", stem);
        download_file(&format!("{}/{}", MIRROR, name), &dir.join(&name))?;
    }
    Ok(())
}

/// Load the train or test split from `root`
pub fn load_fashion_mnist(root: &Path, train: bool) -> Result<InMemoryDataset> {
    let dir = raw_dir(root);
    let [images_stem, labels_stem] = file_stems(train);

    let (count, rows, cols, pixels) = parse_images(&read_idx(&dir, images_stem)?)?;
    let labels = parse_labels(&read_idx(&dir, labels_stem)?)?;
    if labels.len() != count {
        return Err(PipelineError::Dataset(format!(
            "{} images but {} labels",
            count,
            labels.len()
        )));
    }

    info!(
        "Loaded FashionMNIST {} split: {} images of {}x{}",
        if train { "train" } else { "test" },
        count,
        rows,
        cols
    );

    let classes = FASHION_MNIST_CLASSES.iter().map(|s| s.to_string()).collect();
    InMemoryDataset::new(cols, rows, PixelLayout::Luma, pixels, labels, classes)
}
