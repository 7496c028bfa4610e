use std::io::Cursor;
use std::sync::{Arc, Mutex};

use super::*;
use crate::fret_pipeline::image::ChannelImage;

/// Serves 12x12 channels with a background of 10 in the top-left 2x2 corner
/// and `20 + channel` elsewhere. Inputs starting with `corrupt` fail to
/// decode; every call records the input length.
struct MockReader {
    channels: usize,
    calls: Arc<Mutex<Vec<usize>>>,
}

impl StackReader for MockReader {
    fn read_channels(&self, data: &[u8]) -> Result<Vec<ChannelImage>> {
        self.calls.lock().unwrap().push(data.len());
        if data.starts_with(b"corrupt") {
            return Err(FretError::DecodeError("Mock decode error".to_string()));
        }
        Ok((0..self.channels)
            .map(|c| {
                let mut img = ChannelImage::filled(12, 12, 1, 20.0 + c as f32);
                for y in 0..2 {
                    for x in 0..2 {
                        img.set(0, x, y, 10.0);
                    }
                }
                img
            })
            .collect())
    }
}

/// Counts applications without touching the pixels.
struct CountingFilter {
    radii: Arc<Mutex<Vec<f64>>>,
}

impl ChannelFilter for CountingFilter {
    fn apply(&self, _image: &mut ChannelImage, radius: f64) -> Result<()> {
        self.radii.lock().unwrap().push(radius);
        Ok(())
    }
}

fn processor(channels: usize, config: PipelineConfig) -> (BatchProcessor<MockReader, CountingFilter>, Arc<Mutex<Vec<usize>>>, Arc<Mutex<Vec<f64>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let radii = Arc::new(Mutex::new(Vec::new()));
    let reader = MockReader {
        channels,
        calls: calls.clone(),
    };
    let filter = CountingFilter { radii: radii.clone() };
    (BatchProcessor::with_custom(reader, filter, config), calls, radii)
}

fn write_files(dir: &Path, files: &[(&str, &[u8])]) {
    for (name, content) in files {
        fs::write(dir.join(name), content).unwrap();
    }
}

#[test]
fn test_skips_non_lsm_entries() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), &[("a.lsm", b"a"), ("b.txt", b"bb"), ("c.LSM", b"ccc")]);
    let (mut batch, calls, _) = processor(3, PipelineConfig::default());

    assert_eq!(batch.start(dir.path()).unwrap(), BatchState::ProcessingFile(0));
    assert_eq!(batch.current_file().unwrap().file_name().unwrap(), "a.lsm");
    assert_eq!(batch.next(), BatchState::ProcessingFile(2));
    assert_eq!(batch.current_file().unwrap().file_name().unwrap(), "c.LSM");
    assert_eq!(batch.next(), BatchState::Idle);

    // b.txt is never opened
    assert_eq!(*calls.lock().unwrap(), vec![1, 3]);
    assert_eq!(batch.files().len(), 3);
    assert!(batch.skipped().is_empty());
}

#[test]
fn test_failing_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), &[("1.lsm", b"corrupt"), ("2.lsm", b"ok")]);
    let (mut batch, calls, _) = processor(3, PipelineConfig::default());

    assert_eq!(batch.start(dir.path()).unwrap(), BatchState::ProcessingFile(1));
    assert_eq!(calls.lock().unwrap().len(), 2);
    assert_eq!(batch.skipped().len(), 1);
    assert!(batch.skipped()[0].reason.contains("Mock decode error"));
    assert!(batch.session().is_bound(ChannelRole::Donor));
}

#[test]
fn test_too_few_channels_skips_every_file() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), &[("a.lsm", b"a"), ("b.lsm", b"b")]);
    let (mut batch, _, _) = processor(2, PipelineConfig::default());

    assert_eq!(batch.start(dir.path()).unwrap(), BatchState::Idle);
    assert_eq!(batch.skipped().len(), 2);
    assert!(!batch.session().is_bound(ChannelRole::Acceptor));
}

#[test]
fn test_channels_corrected_and_corner_zeroed() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), &[("cells.lsm", b"x")]);
    let config = PipelineConfig::builder().background_fraction(6).build();
    let (mut batch, _, radii) = processor(3, config);
    batch.start(dir.path()).unwrap();

    let session = batch.session();
    // split order: acceptor 20, transfer 21, donor 22
    for (role, signal) in [
        (ChannelRole::Acceptor, 10.0),
        (ChannelRole::Transfer, 11.0),
        (ChannelRole::Donor, 12.0),
    ] {
        let bound = session.channel(role).unwrap();
        assert_eq!(bound.label, "cells.lsm");
        assert!(bound.is_corrected());
        assert!(bound.roi().is_none());
        assert_eq!(bound.background_averages(), Some(&[10.0][..]));
        assert_eq!(bound.image().get(0, 0, 0), 0.0);
        assert_eq!(bound.image().get(0, 1, 1), 0.0);
        assert_eq!(bound.image().get(0, 2, 2), signal);
    }
    // no blur radius configured
    assert!(radii.lock().unwrap().is_empty());
}

#[test]
fn test_blur_uses_configured_radius() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), &[("cells.lsm", b"x")]);
    let config = PipelineConfig::builder().blur_radius(Some(1.5)).build();
    let (mut batch, _, radii) = processor(3, config);
    batch.start(dir.path()).unwrap();

    assert_eq!(*radii.lock().unwrap(), vec![1.5; 3]);
    assert!(batch.session().channel(ChannelRole::Donor).unwrap().is_blurred());
}

#[test]
fn test_next_closes_session() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), &[("only.lsm", b"x")]);
    let (mut batch, _, _) = processor(3, PipelineConfig::default());
    batch.start(dir.path()).unwrap();

    assert_eq!(batch.next(), BatchState::Idle);
    assert!(!batch.session().is_bound(ChannelRole::Donor));
    assert!(batch.current_file().is_none());
    // nothing to advance
    assert_eq!(batch.next(), BatchState::Idle);
}

#[test]
fn test_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let (mut batch, _, _) = processor(3, PipelineConfig::default());
    let result = batch.start(dir.path().join("absent"));
    assert!(matches!(result, Err(FretError::InputReadError(_))));
    assert_eq!(batch.state(), BatchState::Idle);
}

#[test]
fn test_listing_failure_returns_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), &[("a.lsm", b"a")]);
    let (mut batch, _, _) = processor(3, PipelineConfig::default());
    assert_eq!(batch.start(dir.path()).unwrap(), BatchState::ProcessingFile(0));

    // a plain file cannot be listed
    let result = batch.start(dir.path().join("a.lsm"));
    assert!(matches!(result, Err(FretError::InputReadError(_))));
    assert_eq!(batch.state(), BatchState::Idle);
    assert!(!batch.session().is_bound(ChannelRole::Donor));
}

#[test]
fn test_reads_real_tiff_stack() {
    let mut buffer = Vec::new();
    {
        let mut encoder = tiff::encoder::TiffEncoder::new(Cursor::new(&mut buffer)).unwrap();
        // 6x6 RGB: corner pixel 5 in every channel, signal 50/60/70 elsewhere
        let mut data = Vec::with_capacity(6 * 6 * 3);
        for i in 0..36 {
            if i == 0 {
                data.extend_from_slice(&[5u16, 5, 5]);
            } else {
                data.extend_from_slice(&[50u16, 60, 70]);
            }
        }
        encoder
            .write_image::<tiff::encoder::colortype::RGB16>(6, 6, &data)
            .unwrap();
    }
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("stack.lsm"), &buffer).unwrap();

    let mut batch = BatchProcessor::new(PipelineConfig::default());
    assert_eq!(batch.start(dir.path()).unwrap(), BatchState::ProcessingFile(0));

    let donor = batch.session().channel(ChannelRole::Donor).unwrap().image();
    assert_eq!(donor.get(0, 0, 0), 0.0);
    assert_eq!(donor.get(0, 3, 3), 65.0);
    let acceptor = batch.session().channel(ChannelRole::Acceptor).unwrap().image();
    assert_eq!(acceptor.get(0, 3, 3), 45.0);
}
