//! Image folder dataset
//!
//! ```text
//! root/
//! ├── bird/
//! │   ├── 0001.jpg
//! │   └── ...
//! ├── cat/
//! └── dog/
//! ```
//!
//! Every sub-directory is a class; class indices follow the sorted directory
//! names. Images are found recursively and decoded when fetched.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::dataset::ImageDataset;
use crate::utils::error::{PipelineError, Result};

/// File extensions treated as images
pub const IMAGE_EXTENSIONS: [&str; 9] = [
    "jpg", "jpeg", "png", "bmp", "ppm", "pgm", "tif", "tiff", "webp",
];

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    samples: Vec<(PathBuf, usize)>,
    classes: Vec<String>,
}

impl ImageFolder {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!("Loading image folder from: {:?}", root);

        if !root.is_dir() {
            return Err(PipelineError::Dataset(format!(
                "dataset directory does not exist: {:?}",
                root
            )));
        }

        let mut classes: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    classes.push(name.to_string());
                }
            }
        }
        classes.sort();

        if classes.is_empty() {
            return Err(PipelineError::Dataset(format!(
                "no class directories found in {:?}",
                root
            )));
        }

        let mut samples = Vec::new();
        for (label, class_name) in classes.iter().enumerate() {
            let before = samples.len();
            for entry in WalkDir::new(root.join(class_name))
                .min_depth(1)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() && is_image(entry.path()) {
                    samples.push((entry.path().to_path_buf(), label));
                }
            }

            let found = samples.len() - before;
            if found == 0 {
                return Err(PipelineError::Dataset(format!(
                    "class '{}' in {:?} has no image files (supported: {})",
                    class_name,
                    root,
                    IMAGE_EXTENSIONS.join(", ")
                )));
            }
            debug!("Class '{}' (label {}): {} images", class_name, label, found);
        }

        info!(
            "Found {} images in {} classes",
            samples.len(),
            classes.len()
        );

        Ok(Self {
            root,
            samples,
            classes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path and label of every sample, in index order
    pub fn samples(&self) -> &[(PathBuf, usize)] {
        &self.samples
    }
}

impl ImageDataset for ImageFolder {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<(DynamicImage, usize)> {
        let (path, label) = self.samples.get(index).ok_or_else(|| {
            PipelineError::Dataset(format!(
                "index {} out of range for {} samples",
                index,
                self.samples.len()
            ))
        })?;

        let image = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| PipelineError::ImageLoadError(path.clone(), e.to_string()))?
            .decode()
            .map_err(|e| PipelineError::ImageLoadError(path.clone(), e.to_string()))?;

        Ok((image, *label))
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }
}
