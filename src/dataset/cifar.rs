//! CIFAR-10 / CIFAR-100 binary datasets
//!
//! Record layout (one record per image, no header):
//!
//! ```text
//! CIFAR-10:  [label: 1 byte][R: 1024][G: 1024][B: 1024]
//! CIFAR-100: [coarse label: 1 byte][fine label: 1 byte][R: 1024][G: 1024][B: 1024]
//! ```
//!
//! CIFAR-100 uses the fine labels.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::dataset::download::{download_file, extract_tar_gz};
use crate::dataset::{InMemoryDataset, PixelLayout};
use crate::utils::error::{PipelineError, Result};

const SIDE: u32 = 32;
const PLANE: usize = (SIDE * SIDE) as usize;
const IMAGE_BYTES: usize = 3 * PLANE;

pub const CIFAR10_CLASSES: [&str; 10] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

pub const CIFAR100_CLASSES: [&str; 100] = [
    "apple", "aquarium_fish", "baby", "bear", "beaver", "bed", "bee", "beetle", "bicycle",
    "bottle", "bowl", "boy", "bridge", "bus", "butterfly", "camel", "can", "castle",
    "caterpillar", "cattle", "chair", "chimpanzee", "clock", "cloud", "cockroach", "couch",
    "crab", "crocodile", "cup", "dinosaur", "dolphin", "elephant", "flatfish", "forest", "fox",
    "girl", "hamster", "house", "kangaroo", "keyboard", "lamp", "lawn_mower", "leopard", "lion",
    "lizard", "lobster", "man", "maple_tree", "motorcycle", "mountain", "mouse", "mushroom",
    "oak_tree", "orange", "orchid", "otter", "palm_tree", "pear", "pickup_truck", "pine_tree",
    "plain", "plate", "poppy", "porcupine", "possum", "rabbit", "raccoon", "ray", "road",
    "rocket", "rose", "sea", "seal", "shark", "shrew", "skunk", "skyscraper", "snail", "snake",
    "spider", "squirrel", "streetcar", "sunflower", "sweet_pepper", "table", "tank",
    "telephone", "television", "tiger", "tractor", "train", "trout", "tulip", "turtle",
    "wardrobe", "whale", "willow_tree", "wolf", "woman", "worm",
];

/// Which CIFAR archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CifarVariant {
    Cifar10,
    Cifar100,
}

impl CifarVariant {
    pub fn archive_url(&self) -> &'static str {
        match self {
            CifarVariant::Cifar10 => "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz",
            CifarVariant::Cifar100 => "https://www.cs.toronto.edu/~kriz/cifar-100-binary.tar.gz",
        }
    }

    fn archive_name(&self) -> &'static str {
        match self {
            CifarVariant::Cifar10 => "cifar-10-binary.tar.gz",
            CifarVariant::Cifar100 => "cifar-100-binary.tar.gz",
        }
    }

    /// Directory the archive unpacks to
    pub fn extracted_dir(&self, root: &Path) -> PathBuf {
        match self {
            CifarVariant::Cifar10 => root.join("cifar-10-batches-bin"),
            CifarVariant::Cifar100 => root.join("cifar-100-binary"),
        }
    }

    fn batch_files(&self, train: bool) -> Vec<String> {
        match (self, train) {
            (CifarVariant::Cifar10, true) => {
                (1..=5).map(|i| format!("data_batch_{}.bin", i)).collect()
            }
            (CifarVariant::Cifar10, false) => vec!["test_batch.bin".to_string()],
            (CifarVariant::Cifar100, true) => vec!["train.bin".to_string()],
            (CifarVariant::Cifar100, false) => vec!["test.bin".to_string()],
        }
    }

    /// Label bytes preceding the pixels; the last one is used
    fn label_bytes(&self) -> usize {
        match self {
            CifarVariant::Cifar10 => 1,
            CifarVariant::Cifar100 => 2,
        }
    }

    pub fn classes(&self) -> Vec<String> {
        match self {
            CifarVariant::Cifar10 => CIFAR10_CLASSES.iter().map(|s| s.to_string()).collect(),
            CifarVariant::Cifar100 => CIFAR100_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Whether every batch file of both splits is present
    pub fn is_present(&self, root: &Path) -> bool {
        let dir = self.extracted_dir(root);
        [true, false]
            .iter()
            .flat_map(|&train| self.batch_files(train))
            .all(|file| dir.join(file).is_file())
    }

    /// Fetch and unpack the archive into `root` unless it is already there
    pub fn download(&self, root: &Path) -> Result<()> {
        if self.is_present(root) {
            info!("{:?} already present in {:?}", self, root);
            return Ok(());
        }
        let archive = root.join(self.archive_name());
        download_file(self.archive_url(), &archive)?;
        extract_tar_gz(&archive, root)
    }
}

/// Decode records into interleaved RGB pixels and labels
fn parse_records(bytes: &[u8], label_bytes: usize) -> Result<(Vec<u8>, Vec<usize>)> {
    let record = label_bytes + IMAGE_BYTES;
    if bytes.is_empty() || bytes.len() % record != 0 {
        return Err(PipelineError::Dataset(format!(
            "invalid CIFAR batch size {} (expected a multiple of {})",
            bytes.len(),
            record
        )));
    }

    let count = bytes.len() / record;
    let mut pixels = Vec::with_capacity(count * IMAGE_BYTES);
    let mut labels = Vec::with_capacity(count);

    for chunk in bytes.chunks_exact(record) {
        labels.push(chunk[label_bytes - 1] as usize);
        let planes = &chunk[label_bytes..];
        for j in 0..PLANE {
            pixels.push(planes[j]);
            pixels.push(planes[PLANE + j]);
            pixels.push(planes[2 * PLANE + j]);
        }
    }

    Ok((pixels, labels))
}

/// Load the train or test split of a CIFAR variant from `root`
pub fn load_cifar(root: &Path, variant: CifarVariant, train: bool) -> Result<InMemoryDataset> {
    let dir = variant.extracted_dir(root);
    let mut pixels = Vec::new();
    let mut labels = Vec::new();

    for file in variant.batch_files(train) {
        let path = dir.join(&file);
        let bytes = std::fs::read(&path).map_err(|e| {
            PipelineError::Dataset(format!("failed to read {:?}: {}", path, e))
        })?;
        let (p, l) = parse_records(&bytes, variant.label_bytes())?;
        pixels.extend(p);
        labels.extend(l);
    }

    info!(
        "Loaded {:?} {} split: {} images",
        variant,
        if train { "train" } else { "test" },
        labels.len()
    );

    InMemoryDataset::new(SIDE, SIDE, PixelLayout::Rgb, pixels, labels, variant.classes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ImageDataset;

    fn record(labels: &[u8], r: u8, g: u8, b: u8) -> Vec<u8> {
        let mut bytes = labels.to_vec();
        bytes.extend(std::iter::repeat(r).take(PLANE));
        bytes.extend(std::iter::repeat(g).take(PLANE));
        bytes.extend(std::iter::repeat(b).take(PLANE));
        bytes
    }

    #[test]
    fn test_class_tables() {
        assert_eq!(CifarVariant::Cifar10.classes().len(), 10);
        assert_eq!(CifarVariant::Cifar100.classes().len(), 100);
        assert_eq!(CIFAR100_CLASSES[99], "worm");
    }

    #[test]
    fn test_parse_planar_records() {
        let mut bytes = record(&[3], 10, 20, 30);
        bytes.extend(record(&[7], 1, 2, 3));
        let (pixels, labels) = parse_records(&bytes, 1).unwrap();
        assert_eq!(labels, vec![3, 7]);
        assert_eq!(&pixels[..3], &[10, 20, 30]);
        assert_eq!(&pixels[IMAGE_BYTES..IMAGE_BYTES + 3], &[1, 2, 3]);
    }

    #[test]
    fn test_cifar100_uses_fine_label() {
        let bytes = record(&[4, 42], 0, 0, 0);
        let (_, labels) = parse_records(&bytes, 2).unwrap();
        assert_eq!(labels, vec![42]);
    }

    #[test]
    fn test_truncated_batch_is_error() {
        assert!(parse_records(&[0u8; 100], 1).is_err());
        assert!(parse_records(&[], 1).is_err());
    }

    #[test]
    fn test_load_test_split_from_disk() {
        let root = std::env::temp_dir().join(format!("vision_batch_cifar_{}", std::process::id()));
        let dir = CifarVariant::Cifar10.extracted_dir(&root);
        std::fs::create_dir_all(&dir).unwrap();
        let mut bytes = record(&[1], 255, 0, 0);
        bytes.extend(record(&[9], 0, 0, 255));
        std::fs::write(dir.join("test_batch.bin"), bytes).unwrap();

        let dataset = load_cifar(&root, CifarVariant::Cifar10, false).unwrap();
        assert_eq!(dataset.len(), 2);
        let (image, label) = dataset.get(1).unwrap();
        assert_eq!(label, 9);
        assert_eq!(image.to_rgb8().get_pixel(31, 31).0, [0, 0, 255]);
        assert!(!CifarVariant::Cifar10.is_present(&root));

        std::fs::remove_dir_all(&root).ok();
    }
}
