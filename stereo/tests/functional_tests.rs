use cv_stereo::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cv_core::{GrayF32, GrayU8};
use cv_imgproc::CensusVariant;

/// A pixel at left column `x` appears at right column `x - shift`; columns
/// the shift pushes outside the pattern are filled with zero.
fn shifted_pair(width: usize, height: usize, shift: usize) -> (GrayU8, GrayU8) {
    let pattern = |x: usize, y: usize| ((x * 37 + y * 11 + (x * x + y) % 29) % 241) as u8;
    let left = GrayU8::from_fn(width, height, &pattern);
    let right = GrayU8::from_fn(width, height, |x, y| {
        if x + shift < width {
            pattern(x + shift, y)
        } else {
            0
        }
    });
    (left, right)
}

fn bm_config(range: usize, radius: usize) -> BmConfig {
    BmConfig {
        disparity: DisparityConfig {
            disparity_range: range,
            validate_rtol: -1,
            ..Default::default()
        },
        radius_x: radius,
        radius_y: radius,
        use_concurrent: false,
        ..Default::default()
    }
}

#[test]
fn scenario_identical_constant_images() {
    // left == right, constant 128: every candidate ties, so the winner is
    // disparity zero everywhere a region fits; border columns are invalid.
    let img = GrayU8::from_fn(64, 40, |_, _| 128);
    let cfg = bm_config(16, 3);
    let mut alg = block_match_u8(&cfg).unwrap();
    let mut disparity = GrayU8::new(1, 1);
    alg.process(&img, &img, &mut disparity).unwrap();

    assert!(disparity.same_shape(&img));
    let border = 2 * 3;
    for y in 0..40 {
        for x in 0..64 {
            let v = disparity.get(x, y);
            if x < border || x + border >= 64 {
                assert_eq!(v, 16, "border column {x} must be invalid");
            } else {
                assert_eq!(v, 0, "({x},{y})");
            }
        }
    }
}

#[test]
fn scenario_shifted_pair_recovers_disparity() {
    let shift = 5;
    let (left, right) = shifted_pair(80, 30, shift);
    let cfg = bm_config(16, 2);
    let mut alg = block_match_u8(&cfg).unwrap();
    let mut disparity = GrayU8::new(1, 1);
    alg.process(&left, &right, &mut disparity).unwrap();

    // Valid wherever both windows see shifted content: away from the left
    // search border and the zero-filled right margin.
    for y in 0..30 {
        for x in 10..70 {
            assert_eq!(disparity.get(x, y), shift as u8, "({x},{y})");
        }
    }
}

#[test]
fn scenario_sgm_ramp_with_consistency_check() {
    // L[y,x] = ramp(x), R shifted so the true disparity is 3. With a strict
    // right-to-left check the three columns that cannot reach d=3 fail
    // validation.
    let width = 40;
    let left = GrayU8::from_fn(width, 12, |x, _| (x * 5) as u8);
    let right = GrayU8::from_fn(width, 12, |x, _| ((x + 3) * 5) as u8);

    let cfg = SgmConfig {
        disparity: DisparityConfig {
            disparity_range: 8,
            validate_rtol: 0,
            ..Default::default()
        },
        p1: 10,
        p2: 40,
        paths: SgmPaths::Paths8,
        use_concurrent: false,
        ..Default::default()
    };
    let mut sgm = sgm_disparity(&cfg).unwrap();
    let mut disparity = GrayU8::new(1, 1);
    sgm.process(&left, &right, &mut disparity).unwrap();

    for y in 0..12 {
        for x in 0..width {
            let v = disparity.get(x, y);
            if x < 3 {
                assert_eq!(v, 8, "({x},{y}) cannot reach the true disparity");
            } else {
                assert_eq!(v, 3, "({x},{y})");
            }
        }
    }
}

#[test]
fn scenario_noise_rejected_by_texture() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let left = GrayU8::from_fn(64, 64, |_, _| rng.gen());
    let right = GrayU8::from_fn(64, 64, |_, _| rng.gen());

    let mut cfg = bm_config(16, 2);
    cfg.disparity.texture = 0.15;
    let mut alg = block_match_u8(&cfg).unwrap();
    let mut disparity = GrayU8::new(1, 1);
    alg.process(&left, &right, &mut disparity).unwrap();

    let invalid = disparity.data.iter().filter(|&&v| v == 16).count();
    let total = disparity.data.len();
    assert!(
        invalid * 10 > total * 9,
        "uncorrelated noise must fail the texture check on >90% of pixels, got {invalid}/{total}"
    );
}

#[test]
fn scenario_ncc_flat_images_with_pixel_noise() {
    // Flat left, right with +-1 noise: correlations vanish, the eps guard
    // keeps the division finite, and ties resolve to disparity zero.
    let width = 48;
    let height = 20;
    let left = GrayF32::from_fn(width, height, |_, _| 128.0);
    let right = GrayF32::from_fn(width, height, |x, _| 128.0 + (x % 3) as f32 - 1.0);

    let radius = 3;
    let cfg = BmConfig {
        disparity: DisparityConfig {
            disparity_range: 8,
            validate_rtol: -1,
            ..Default::default()
        },
        radius_x: radius,
        radius_y: radius,
        score: BmScore::Ncc { eps: 1e-4 },
        use_concurrent: false,
    };
    let mut alg = block_match_f32(&cfg).unwrap();
    let mut disparity = GrayU8::new(1, 1);
    alg.process(&left, &right, &mut disparity).unwrap();

    let border = 2 * radius;
    for y in 0..height {
        for x in border..width - border {
            let v = disparity.get(x, y);
            assert!(v == 0 || v == 8, "({x},{y}): unexpected value {v}");
            assert_eq!(v, 0, "({x},{y})");
        }
    }
}

#[test]
fn scenario_census_sgm_recovers_shift_without_saturation() {
    let shift = 7;
    let (left, right) = shifted_pair(72, 36, shift);

    let p2 = 150u16;
    let cfg = SgmConfig {
        disparity: DisparityConfig {
            disparity_range: 16,
            validate_rtol: -1,
            ..Default::default()
        },
        p1: 20,
        p2,
        paths: SgmPaths::Paths4,
        error: SgmError::Census(CensusVariant::Block5x5),
        use_concurrent: false,
        ..Default::default()
    };
    let mut sgm = sgm_disparity(&cfg).unwrap();
    let mut disparity = GrayU8::new(1, 1);
    sgm.process(&left, &right, &mut disparity).unwrap();

    for y in 4..32 {
        for x in 20..60 {
            assert_eq!(disparity.get(x, y), shift as u8, "({x},{y})");
        }
    }

    // Four paths, each bounded by MAX_COST + P2: far from saturation.
    let bound = 4 * (MAX_COST as u32 + p2 as u32);
    let max_s = sgm
        .aggregated_volume()
        .data
        .iter()
        .map(|&s| s as u32)
        .max()
        .unwrap();
    assert!(max_s <= bound);
    assert!(max_s < u16::MAX as u32, "no saturation may occur for small P2");
}

#[test]
fn invariant_idempotent_serial_runs() {
    let (left, right) = shifted_pair(56, 28, 4);
    let cfg = bm_config(12, 2);

    let mut alg = block_match_u8(&cfg).unwrap();
    let mut first = GrayU8::new(1, 1);
    let mut second = GrayU8::new(1, 1);
    alg.process(&left, &right, &mut first).unwrap();
    alg.process(&left, &right, &mut second).unwrap();
    assert_eq!(first.data, second.data);

    let sgm_cfg = SgmConfig {
        disparity: DisparityConfig {
            disparity_range: 12,
            ..Default::default()
        },
        use_concurrent: false,
        ..Default::default()
    };
    let mut sgm = sgm_disparity(&sgm_cfg).unwrap();
    let mut a = GrayU8::new(1, 1);
    let mut b = GrayU8::new(1, 1);
    sgm.process(&left, &right, &mut a).unwrap();
    sgm.process(&left, &right, &mut b).unwrap();
    assert_eq!(a.data, b.data);
}

#[test]
fn invariant_disparity_min_offsets_encoding() {
    let shift = 5;
    let (left, right) = shifted_pair(60, 24, shift);
    let mut cfg = bm_config(8, 2);
    cfg.disparity.disparity_min = 2;
    let mut alg = block_match_u8(&cfg).unwrap();
    let mut disparity = GrayU8::new(1, 1);
    alg.process(&left, &right, &mut disparity).unwrap();

    // Encoded value is relative: 5 = 2 + 3.
    for y in 0..24 {
        for x in 15..50 {
            assert_eq!(disparity.get(x, y), (shift - 2) as u8, "({x},{y})");
        }
    }

    // Every pixel decodes into [min, max] or the invalid code.
    for &v in &disparity.data {
        assert!(v <= 8, "encoded value {v} out of range");
    }
}

#[test]
fn invariant_subpixel_outputs_stay_in_range() {
    let (left, right) = shifted_pair(60, 24, 4);
    let cfg = bm_config(12, 2);
    let mut alg = block_match_u8(&cfg).unwrap();
    let mut disparity = GrayF32::new(1, 1);
    alg.process_subpixel(&left, &right, &mut disparity).unwrap();

    assert!(disparity.same_shape(&left));
    for &v in &disparity.data {
        let valid = v == 12.0 || (-0.5..=11.5).contains(&v);
        assert!(valid, "subpixel value {v} outside range and not the sentinel");
    }
}

#[test]
fn invariant_concurrent_matches_serial() {
    let (left, right) = shifted_pair(96, 64, 6);

    let mut serial_cfg = bm_config(16, 3);
    serial_cfg.disparity.texture = 0.1;
    let mut concurrent_cfg = serial_cfg.clone();
    concurrent_cfg.use_concurrent = true;

    let mut serial_out = GrayU8::new(1, 1);
    let mut concurrent_out = GrayU8::new(1, 1);
    block_match_u8(&serial_cfg)
        .unwrap()
        .process(&left, &right, &mut serial_out)
        .unwrap();
    block_match_u8(&concurrent_cfg)
        .unwrap()
        .process(&left, &right, &mut concurrent_out)
        .unwrap();
    assert_eq!(serial_out.data, concurrent_out.data);

    let sgm_serial = SgmConfig {
        disparity: DisparityConfig {
            disparity_range: 16,
            ..Default::default()
        },
        use_concurrent: false,
        ..Default::default()
    };
    let mut sgm_concurrent = sgm_serial.clone();
    sgm_concurrent.use_concurrent = true;

    let mut a = GrayU8::new(1, 1);
    let mut b = GrayU8::new(1, 1);
    sgm_disparity(&sgm_serial)
        .unwrap()
        .process(&left, &right, &mut a)
        .unwrap();
    sgm_disparity(&sgm_concurrent)
        .unwrap()
        .process(&left, &right, &mut b)
        .unwrap();
    assert_eq!(a.data, b.data);
}

#[test]
fn invariant_shape_mismatch_is_rejected() {
    let a = GrayU8::new(32, 20);
    let b = GrayU8::new(32, 21);
    let mut alg = block_match_u8(&bm_config(8, 2)).unwrap();
    let mut disparity = GrayU8::new(1, 1);
    assert!(alg.process(&a, &b, &mut disparity).is_err());

    let mut sgm = sgm_disparity(&SgmConfig {
        disparity: DisparityConfig {
            disparity_range: 8,
            ..Default::default()
        },
        ..Default::default()
    })
    .unwrap();
    assert!(sgm.process(&a, &b, &mut disparity).is_err());
}
