use super::*;
use crate::fret_pipeline::config::{RegistrationConfig, ValidPixelPolicy};
use crate::fret_pipeline::image::{LsmReader, StackReader, StandardTiffWriter};
use crate::fret_pipeline::registration::translate;

/// 8x8 channel: background 10 in the top-left 2x2 corner, `signal` elsewhere.
fn channel(signal: f32) -> ChannelImage {
    let mut img = ChannelImage::filled(8, 8, 1, signal);
    for y in 0..2 {
        for x in 0..2 {
            img.set(0, x, y, 10.0);
        }
    }
    img
}

fn corner() -> Roi {
    Roi::rectangle(0, 0, 2, 2)
}

/// Donor 14, transfer 17, acceptor 14 after subtracting 10 give
/// DD = 4, DA = 7, AA = 4 and an efficiency of 0.5 with the factors below.
fn prepared_session() -> Session {
    let mut session = Session::new(PipelineConfig::default());
    session.bind(ChannelRole::Donor, "d", channel(14.0)).unwrap();
    session.bind(ChannelRole::Transfer, "t", channel(17.0)).unwrap();
    session.bind(ChannelRole::Acceptor, "a", channel(14.0)).unwrap();
    session.set_factors(CalibrationFactors::new(0.5, 0.25, 0.0, 0.0, 1.0));
    session
}

fn subtract_all(session: &mut Session) {
    session.set_roi(ChannelRole::Donor, Some(corner())).unwrap();
    session.copy_roi(ChannelRole::Donor).unwrap();
    for role in ChannelRole::ALL {
        session.subtract_background(role).unwrap();
    }
}

#[test]
fn test_bind_rejects_slice_mismatch() {
    let mut session = Session::default();
    session.bind(ChannelRole::Donor, "d", ChannelImage::filled(4, 4, 2, 0.0)).unwrap();
    let result = session.bind(ChannelRole::Transfer, "t", ChannelImage::filled(4, 4, 1, 0.0));
    assert!(matches!(result, Err(FretError::InvalidGeometry(_))));
    assert!(!session.is_bound(ChannelRole::Transfer));

    // rebinding the same role with a new geometry is fine while it is alone
    session.bind(ChannelRole::Donor, "d2", ChannelImage::filled(5, 5, 1, 0.0)).unwrap();
}

#[test]
fn test_background_requires_roi() {
    let mut session = prepared_session();
    let result = session.subtract_background(ChannelRole::Donor);
    match result {
        Err(FretError::MissingInput(what)) => assert_eq!(what, "ROI on donor image"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(!session.channel(ChannelRole::Donor).unwrap().is_corrected());
}

#[test]
fn test_background_clears_roi_and_snapshots() {
    let mut session = prepared_session();
    subtract_all(&mut session);

    let donor = session.channel(ChannelRole::Donor).unwrap();
    assert!(donor.is_corrected());
    assert!(donor.roi().is_none());
    assert_eq!(donor.background_averages(), Some(&[10.0][..]));
    assert_eq!(donor.image().get(0, 5, 5), 4.0);
    assert_eq!(donor.image().get(0, 0, 0), 0.0);
}

#[test]
fn test_reset_undoes_threshold_and_blur() {
    let mut session = prepared_session();
    subtract_all(&mut session);

    let excluded = session
        .threshold_channel(ChannelRole::Transfer, ThresholdBand::new(5.0, 100.0))
        .unwrap();
    assert_eq!(excluded, 4);
    session.blur_channel(ChannelRole::Transfer, &GaussianBlur, 1.0).unwrap();
    let transfer = session.channel(ChannelRole::Transfer).unwrap();
    assert!(transfer.is_thresholded());
    assert!(transfer.is_blurred());

    session.reset(ChannelRole::Transfer).unwrap();
    let transfer = session.channel(ChannelRole::Transfer).unwrap();
    assert!(!transfer.is_thresholded());
    assert!(!transfer.is_blurred());
    assert_eq!(transfer.image().get(0, 0, 0), 0.0);
    assert_eq!(transfer.image().get(0, 4, 4), 7.0);
}

#[test]
fn test_reset_without_snapshot() {
    let mut session = prepared_session();
    assert!(matches!(session.reset(ChannelRole::Acceptor), Err(FretError::MissingInput(_))));
}

#[test]
fn test_compose_appends_row_and_replaces_image() {
    let mut session = prepared_session();
    subtract_all(&mut session);

    let stats = session.compose_fret("cells.lsm").unwrap();
    assert_eq!(stats.pixels, 64);
    // the zeroed background corner divides 0 by 0
    assert_eq!(stats.not_nan, 60);
    assert_eq!(stats.mean, 0.5);

    session.compose_fret("cells.lsm").unwrap();
    assert_eq!(session.results().len(), 2);
    assert_eq!(session.fret().unwrap().image.get(0, 5, 5), 0.5);
}

#[test]
fn test_compose_requires_all_channels() {
    let mut session = Session::default();
    session.bind(ChannelRole::Donor, "d", channel(14.0)).unwrap();
    match session.compose_fret("x") {
        Err(FretError::MissingInput(what)) => assert_eq!(what, "transfer image"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(session.results().is_empty());
}

#[test]
fn test_fret_roi_copied_back_to_channels() {
    let mut session = prepared_session();
    subtract_all(&mut session);
    session.compose_fret("first").unwrap();

    let roi = Roi::rectangle(4, 4, 2, 2);
    session.set_fret_roi(Some(roi.clone())).unwrap();
    let stats = session.compose_fret("second").unwrap();
    assert_eq!(stats.pixels, 4);
    for role in ChannelRole::ALL {
        assert_eq!(session.channel(role).unwrap().roi(), Some(&roi));
    }

    session.set_fret_roi(None).unwrap();
    session.compose_fret("third").unwrap();
    for role in ChannelRole::ALL {
        assert!(session.channel(role).unwrap().roi().is_none());
    }
}

#[test]
fn test_measure_current_slice() {
    let mut session = Session::new(
        PipelineConfig::builder()
            .valid_pixel_policy(ValidPixelPolicy::StrictNotNan)
            .build(),
    );
    let stack = |a: f32, b: f32| ChannelImage::new(2, 1, vec![vec![a; 2], vec![b; 2]]).unwrap();
    session.bind(ChannelRole::Donor, "d", stack(4.0, 4.0)).unwrap();
    session.bind(ChannelRole::Transfer, "t", stack(7.0, 11.0)).unwrap();
    session.bind(ChannelRole::Acceptor, "a", stack(4.0, 4.0)).unwrap();
    session.set_factors(CalibrationFactors::new(0.5, 0.25, 0.0, 0.0, 1.0));

    assert!(matches!(session.measure_fret(0, "x"), Err(FretError::MissingInput(_))));

    session.compose_fret("stack").unwrap();
    let second = session.measure_fret(1, "stack").unwrap();
    assert!((second.mean - 2.0 / 3.0).abs() < 1e-6);
    assert_eq!(session.results().len(), 2);
}

/// 32x32 LCG texture with a single sharp correlation peak.
fn texture() -> ChannelImage {
    let mut state: u32 = 12345;
    let pixels: Vec<f32> = (0..32 * 32)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            ((state >> 16) % 500) as f32
        })
        .collect();
    ChannelImage::from_pixels(32, 32, pixels).unwrap()
}

#[test]
fn test_register_channels() {
    let donor = texture();
    let mut transfer = donor.clone();
    translate(&mut transfer, 2, -1);
    let mut acceptor = donor.clone();
    translate(&mut acceptor, -3, 0);

    let mut session = Session::default();
    session.bind(ChannelRole::Donor, "d", donor).unwrap();
    session.bind(ChannelRole::Transfer, "t", transfer).unwrap();
    session.bind(ChannelRole::Acceptor, "a", acceptor).unwrap();

    let outcome = session.execute(SessionCommand::Register).unwrap();
    match outcome {
        CommandOutcome::Registered { transfer, acceptor } => {
            assert_eq!((transfer.displacement.dx, transfer.displacement.dy), (2, -1));
            assert_eq!((acceptor.displacement.dx, acceptor.displacement.dy), (-3, 0));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_register_without_acceptor_leaves_transfer_untouched() {
    let donor = texture();
    let mut transfer = donor.clone();
    translate(&mut transfer, 2, -1);

    let mut session = Session::default();
    session.bind(ChannelRole::Donor, "d", donor).unwrap();
    session.bind(ChannelRole::Transfer, "t", transfer.clone()).unwrap();

    match session.register_channels() {
        Err(FretError::MissingInput(what)) => assert_eq!(what, "acceptor image"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(session.channel(ChannelRole::Transfer).unwrap().image(), &transfer);
}

#[test]
fn test_register_aligns_acceptor_when_transfer_fails() {
    let donor = texture();
    let mut transfer = donor.clone();
    translate(&mut transfer, 5, 3);
    let mut acceptor = donor.clone();
    translate(&mut acceptor, -3, 0);

    // one round detects and undoes a shift but cannot confirm convergence
    let config = PipelineConfig::builder()
        .registration(RegistrationConfig {
            max_iterations: 1,
            ..Default::default()
        })
        .build();
    let mut session = Session::new(config);
    session.bind(ChannelRole::Donor, "d", donor.clone()).unwrap();
    session.bind(ChannelRole::Transfer, "t", transfer).unwrap();
    session.bind(ChannelRole::Acceptor, "a", acceptor).unwrap();

    match session.register_channels() {
        Err(FretError::RegistrationDidNotConverge { last_shift, .. }) => assert_eq!(last_shift, (5, 3)),
        other => panic!("unexpected result: {:?}", other),
    }
    let acceptor = session.channel(ChannelRole::Acceptor).unwrap().image();
    for (x, y) in [(3, 0), (10, 10), (31, 31)] {
        assert_eq!(acceptor.get(0, x, y), donor.get(0, x, y));
    }
    assert_eq!(acceptor.get(0, 0, 5), 0.0);
}

#[test]
fn test_estimate_ratios_store_factors() {
    let mut session = Session::default();
    session.bind(ChannelRole::Donor, "d", ChannelImage::filled(2, 2, 1, 100.0)).unwrap();
    session.bind(ChannelRole::Transfer, "t", ChannelImage::filled(2, 2, 1, 30.0)).unwrap();
    session.bind(ChannelRole::Acceptor, "a", ChannelImage::filled(2, 2, 1, 2.0)).unwrap();

    let outcome = session
        .execute(SessionCommand::EstimateRatios(ControlSample::DonorOnly))
        .unwrap();
    assert!(matches!(outcome, CommandOutcome::Ratios(_)));
    assert!((session.factors().s1.unwrap() - 0.3).abs() < 1e-9);
    assert!((session.factors().s3.unwrap() - 0.02).abs() < 1e-9);
    assert_eq!(session.factors().s2, None);

    let means = session.production_means().unwrap();
    assert_eq!(means.transfer, 30.0);
}

#[test]
fn test_estimate_acceptor_ratios() {
    let mut session = Session::default();
    session.bind(ChannelRole::Donor, "d", ChannelImage::filled(2, 2, 1, 1.0)).unwrap();
    session.bind(ChannelRole::Transfer, "t", ChannelImage::filled(2, 2, 1, 10.0)).unwrap();
    session.bind(ChannelRole::Acceptor, "a", ChannelImage::filled(2, 2, 1, 50.0)).unwrap();

    let estimate = session.estimate_acceptor_ratios().unwrap();
    assert_eq!(estimate.valid_pixels, 4);
    assert!((session.factors().s2.unwrap() - 0.2).abs() < 1e-9);
    assert!((session.factors().s4.unwrap() - 0.02).abs() < 1e-9);
    assert_eq!(session.factors().s1, None);
}

#[test]
fn test_execute_reports_errors() {
    let mut session = Session::default();
    let result = session.execute(SessionCommand::SubtractBackground(ChannelRole::Acceptor));
    assert!(matches!(result, Err(FretError::MissingInput(_))));
}

#[test]
fn test_export_fret_writes_tiff() {
    let mut session = prepared_session();
    subtract_all(&mut session);
    session.compose_fret("cells").unwrap();

    let mut out = Vec::new();
    session.export_fret(&StandardTiffWriter, &mut out).unwrap();
    let channels = LsmReader::new().read_channels(&out).unwrap();
    assert_eq!(channels[0].get(0, 6, 6), 0.5);
}

#[test]
fn test_reset_session_keeps_results() {
    let mut session = prepared_session();
    subtract_all(&mut session);
    session.compose_fret("cells").unwrap();
    session.execute(SessionCommand::ResetSession).unwrap();
    assert!(session.fret().is_none());
    assert!(!session.is_bound(ChannelRole::Donor));
    assert_eq!(session.results().len(), 1);
}
