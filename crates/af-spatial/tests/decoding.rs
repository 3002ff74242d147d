//! Decoder properties over built-in and synthetic layouts

use af_spatial::decoder::nearest_index;
use af_spatial::position::cart2sph;
use af_spatial::sph::sh_matrix;
use af_spatial::{
    AmbisonicOptions, DecodingMode, DecoderConfig, Direction, Grid, LayoutPreset,
    LoudspeakerSetup, PruneLimits, SpatialError, VbapOptions, allrad, allrad2, allrap, allrap2,
    builtin_names, decode, nearest_loudspeaker, vbap,
};
use approx::assert_abs_diff_eq;
use nalgebra::Vector3;

fn permissive(name: &str) -> LayoutPreset {
    let mut preset = LayoutPreset::builtin(name).unwrap();
    preset.normal_limit = Some(180.0);
    preset.aperture_limit = Some(180.0);
    preset.opening_limit = Some(180.0);
    preset
}

fn upper_hemisphere() -> LoudspeakerSetup {
    let mut dirs = Vec::new();
    for i in 0..8 {
        dirs.push(Direction::from_elevation_degrees(45.0 * i as f64, 0.0).to_vector());
    }
    for i in 0..4 {
        dirs.push(Direction::from_elevation_degrees(45.0 + 90.0 * i as f64, 45.0).to_vector());
    }
    dirs.push(Vector3::z());
    LoudspeakerSetup::from_positions(&dirs, Vector3::zeros()).unwrap()
}

#[test]
fn test_vbap_gains_are_sparse_and_non_negative() {
    let sources = Grid::fibonacci(200).vectors();
    for name in builtin_names() {
        let setup = LoudspeakerSetup::from_preset(&LayoutPreset::builtin(name).unwrap()).unwrap();
        let gains = vbap(&sources, &setup, &VbapOptions::default()).unwrap();
        assert_eq!(gains.dim(), (sources.len(), setup.num_loudspeakers()));
        for row in gains.rows() {
            assert!(row.iter().all(|&g| g >= 0.0), "{name}: negative gain");
            let active = row.iter().filter(|&&g| g > 1e-9).count();
            assert!((1..=3).contains(&active), "{name}: {active} active gains");
        }
    }
}

#[test]
fn test_vbap_at_loudspeaker_directions_is_identity() {
    let sphere = LoudspeakerSetup::from_positions(&Grid::fibonacci(30).vectors(), Vector3::zeros()).unwrap();
    let full = LoudspeakerSetup::from_preset(&permissive("aalto_full")).unwrap();
    for setup in [sphere, full] {
        let gains = vbap(setup.directions(), &setup, &VbapOptions::default()).unwrap();
        for (i, row) in gains.rows().into_iter().enumerate() {
            for (j, &g) in row.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(g, expected, epsilon = 1e-6);
            }
        }
    }
}

#[test]
fn test_allrap_matches_allrad_of_dirac() {
    let mut setup = LoudspeakerSetup::from_preset(&LayoutPreset::builtin("aalto_full").unwrap()).unwrap();
    setup.setup_for_ambisonic(&AmbisonicOptions::new(4)).unwrap();

    let sources = Grid::fibonacci(12).vectors();
    let order = 3;
    let (azi, colat): (Vec<f64>, Vec<f64>) = sources
        .iter()
        .map(|s| {
            let (a, c, _) = cart2sph(s.x, s.y, s.z);
            (a, c)
        })
        .unzip();
    let f_nm = sh_matrix(order, &azi, &colat);

    let rap = allrap(&sources, &setup, Some(order)).unwrap();
    let rad = allrad(&f_nm, &setup, Some(order)).unwrap();
    for (a, b) in rap.iter().zip(&rad) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }

    let rap2 = allrap2(&sources, &setup, Some(order)).unwrap();
    let rad2 = allrad2(&f_nm, &setup, None).unwrap();
    for (a, b) in rap2.iter().zip(&rad2) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
fn test_nearest_loudspeaker_breaks_ties_to_lowest_index() {
    let setup = LoudspeakerSetup::from_positions(
        &[
            Vector3::x(),
            -Vector3::x(),
            Vector3::y(),
            -Vector3::y(),
            Vector3::z(),
            -Vector3::z(),
        ],
        Vector3::zeros(),
    )
    .unwrap();

    let gains = nearest_loudspeaker(&[Vector3::new(1.0, 1.0, 0.0), Vector3::new(0.0, -1.0, 1.0)], &setup).unwrap();
    assert_eq!(gains[[0, 0]], 1.0);
    assert_eq!(gains[[1, 3]], 1.0);
    for row in gains.rows() {
        assert_eq!(row.iter().filter(|&&g| g != 0.0).count(), 1);
    }
    assert_eq!(nearest_index(setup.directions(), &Vector3::new(1.0, 1.0, 1.0)), 0);
}

#[test]
fn test_hemisphere_source_above_loudspeaker() {
    let setup = upper_hemisphere();
    // first loudspeaker of the 45° ring, azimuth 45°
    let target = 8;
    let above = setup.directions()[target];
    let target_dir = Direction::from_vector(&above);
    let (azimuth_deg, elevation_deg) = (target_dir.azimuth.to_degrees(), target_dir.elevation().to_degrees());
    assert_abs_diff_eq!(azimuth_deg, 45.0, epsilon = 1e-9);
    assert_abs_diff_eq!(elevation_deg, 45.0, epsilon = 1e-9);

    let nls = decode(DecodingMode::Nls, &[above], &setup, None).unwrap();
    assert_eq!(nls[[0, target]], 1.0);
    assert_abs_diff_eq!(nls.sum(), 1.0);

    let mut previous = 0.0;
    for delta in [10.0_f64, 1.0, 0.01] {
        let src = Direction::from_elevation_degrees(azimuth_deg, elevation_deg - delta).to_vector();
        let g = vbap(&[src], &setup, &VbapOptions::default().with_norm(2.0)).unwrap();
        let dominant = g.row(0).iter().copied().fold(0.0, f64::max);
        assert_eq!(g[[0, target]], dominant);
        assert!(dominant > previous);
        previous = dominant;
    }
    assert!(previous > 0.999);
}

#[test]
fn test_decoder_config_prepares_ambisonics() {
    let mut setup = LoudspeakerSetup::from_preset(&LayoutPreset::builtin("aalto_partial").unwrap()).unwrap();
    let config = DecoderConfig::default()
        .with_mode(DecodingMode::Allrap2)
        .with_n_kernel(3)
        .with_n_sph(2);
    let sources = [Vector3::x(), Vector3::new(0.5, 0.5, 0.7)];
    let gains = config.decode(&sources, &mut setup).unwrap();
    assert!(setup.ambisonic().is_some());
    assert_eq!(gains.dim(), (2, 9));
    assert!(gains.iter().all(|g| g.is_finite() && *g >= 0.0));
}

#[test]
fn test_pruning_everything_is_an_error() {
    let mut setup = LoudspeakerSetup::from_preset(&LayoutPreset::builtin("graz").unwrap()).unwrap();
    let before = setup.hull().triangles.len();
    let result = setup.pop_triangles(&PruneLimits::new(180.0, 180.0, 30.0), &[]);
    assert!(matches!(result, Err(SpatialError::NoValidTriangles)));
    assert_eq!(setup.hull().triangles.len(), before);
}

#[test]
fn test_unknown_preset_is_config_error() {
    assert!(matches!(LayoutPreset::builtin("studio_b"), Err(SpatialError::Config(_))));
    assert!(matches!("ambisonic".parse::<DecodingMode>(), Err(SpatialError::Config(_))));
}
