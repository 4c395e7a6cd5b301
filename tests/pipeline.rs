//! End-to-end pipeline tests over image folders on disk

use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

use vision_batch::batch::{BatchTargets, Target};
use vision_batch::{build_pipeline, DataConfig, ImageSize, PipelineError};

struct TempTree {
    root: PathBuf,
}

impl TempTree {
    fn new(name: &str) -> Self {
        let root = std::env::temp_dir().join(format!(
            "vision_batch_it_{}_{}",
            name,
            std::process::id()
        ));
        fs::remove_dir_all(&root).ok();
        fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    /// Write `count` solid-color images per class into `split`
    fn split(&self, split: &str, classes: &[&str], count: usize) {
        for (c, class) in classes.iter().enumerate() {
            let dir = self.root.join(split).join(class);
            fs::create_dir_all(&dir).unwrap();
            for i in 0..count {
                let color = Rgb([(40 * c) as u8, (20 * i) as u8, 128]);
                let image = RgbImage::from_pixel(20 + i as u32, 16, color);
                image.save(dir.join(format!("{:03}.png", i))).unwrap();
            }
        }
    }

    fn path(&self) -> &Path {
        &self.root
    }
}

impl Drop for TempTree {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.root).ok();
    }
}

fn folder_config(root: &Path) -> DataConfig {
    DataConfig {
        dataset_type: "ImageFolder".to_string(),
        data_dir: root.to_path_buf(),
        train_size: ImageSize::Square(12),
        test_size: ImageSize::Square(12),
        batch_size: 4,
        num_workers: 2,
        num_classes: 1000,
        ..DataConfig::default()
    }
}

#[test]
fn test_class_discovery_and_batch_count() {
    let tree = TempTree::new("discovery");
    tree.split("train", &["cat", "dog", "bird"], 3);
    tree.split("val", &["cat", "dog", "bird"], 1);

    let mut config = folder_config(tree.path());
    let pipeline = build_pipeline(&mut config).unwrap();

    assert_eq!(pipeline.num_classes, 3);
    assert_eq!(config.num_classes, 3);
    // 9 samples in batches of 4, remainder kept
    assert_eq!(pipeline.iter_per_epoch, 3);
    assert_eq!(config.iter_per_epoch, 3);

    let sizes: Vec<usize> = pipeline
        .train
        .iter(0)
        .map(|b| b.unwrap().images.len())
        .collect();
    assert_eq!(sizes, vec![4, 4, 1]);

    let eval: Vec<_> = pipeline.eval.iter(0).map(|b| b.unwrap()).collect();
    assert_eq!(eval.len(), 1);
    assert_eq!(eval[0].images.shape(), [3, 3, 12, 12]);
    // sorted class names: bird, cat, dog
    assert_eq!(eval[0].target, Target::Hard(vec![0, 1, 2]));
}

#[test]
fn test_mixed_training_batches_have_unit_rows() {
    let tree = TempTree::new("mixing");
    tree.split("train", &["cat", "dog", "bird"], 4);
    tree.split("val", &["cat", "dog", "bird"], 2);

    let mut config = DataConfig {
        mixup: 0.8,
        cutmix: 1.0,
        mix_skip_prob: 0.0,
        auto_aug: Some("ra".to_string()),
        remode: 0.25,
        ..folder_config(tree.path())
    };
    let pipeline = build_pipeline(&mut config).unwrap();

    for batch in pipeline.train.iter(1) {
        let batch = batch.unwrap();
        assert!(batch.mixed_by.is_some());
        for sum in batch.target.row_sums() {
            assert!((sum - 1.0).abs() < 1e-5, "row sum {}", sum);
        }

        let tensors = batch.to_tensors::<burn::backend::NdArray>(&Default::default());
        match tensors.targets {
            BatchTargets::Soft(t) => assert_eq!(t.dims(), [batch.images.len(), 3]),
            BatchTargets::Hard(_) => panic!("mixed batch with hard targets"),
        }
    }

    for batch in pipeline.eval.iter(1) {
        let batch = batch.unwrap();
        assert!(batch.mixed_by.is_none());
        assert!(!batch.target.is_soft());
    }
}

#[test]
fn test_epochs_are_reproducible() {
    let tree = TempTree::new("repro");
    tree.split("train", &["a", "b"], 3);
    tree.split("val", &["a", "b"], 1);

    let mut config = DataConfig {
        cutmix: 1.0,
        ..folder_config(tree.path())
    };
    let first = build_pipeline(&mut config).unwrap();
    let second = build_pipeline(&mut config).unwrap();

    let a: Vec<_> = first.train.iter(2).map(|b| b.unwrap()).collect();
    let b: Vec<_> = second.train.iter(2).map(|b| b.unwrap()).collect();
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.images, y.images);
        assert_eq!(x.target, y.target);
    }
}

#[test]
fn test_unknown_resize_mode_fails_before_loading() {
    let mut config = DataConfig {
        train_resize_mode: "Unknown".to_string(),
        data_dir: PathBuf::from("/nonexistent/vision_batch"),
        ..DataConfig::default()
    };
    let err = build_pipeline(&mut config).unwrap_err();
    assert!(err.is_config_error());
    assert!(err.to_string().contains("Unknown"));
}

#[test]
fn test_unsupported_dataset_is_rejected() {
    let mut config = DataConfig {
        dataset_type: "ImageNet21k".to_string(),
        ..DataConfig::default()
    };
    match build_pipeline(&mut config) {
        Err(PipelineError::UnsupportedDataset { name, accepted }) => {
            assert_eq!(name, "ImageNet21k");
            assert!(accepted.contains("CIFAR100"));
        }
        other => panic!("expected UnsupportedDataset, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_corrupt_image_reaches_consumer() {
    let tree = TempTree::new("corrupt");
    tree.split("train", &["cat", "dog"], 2);
    tree.split("val", &["cat", "dog"], 1);
    fs::write(tree.path().join("train").join("dog").join("broken.png"), b"not a png").unwrap();

    let mut config = DataConfig {
        batch_size: 8,
        ..folder_config(tree.path())
    };
    let pipeline = build_pipeline(&mut config).unwrap();

    let results: Vec<_> = pipeline.train.iter(0).collect();
    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(PipelineError::ImageLoadError(path, _)) => {
            assert!(path.ends_with("broken.png"));
        }
        other => panic!("expected ImageLoadError, got {:?}", other.as_ref().map(|_| ())),
    }
}

#[test]
fn test_distributed_shards_cover_dataset() {
    let tree = TempTree::new("shards");
    tree.split("train", &["a", "b", "c"], 3);
    tree.split("val", &["a", "b", "c"], 1);

    let mut lengths = Vec::new();
    for rank in 0..2 {
        let mut config = DataConfig {
            distributed: true,
            world_size: 2,
            rank,
            ..folder_config(tree.path())
        };
        let pipeline = build_pipeline(&mut config).unwrap();
        let total: usize = pipeline
            .train
            .iter(0)
            .map(|b| b.unwrap().images.len())
            .sum();
        lengths.push(total);
        // ceil(9 / 2) = 5 samples per shard, batches of 4
        assert_eq!(config.iter_per_epoch, 2);
    }
    assert_eq!(lengths, vec![5, 5]);
}
