//! Conversion-path properties across the public API.

use prism_color::{
    Chromaticity, ColorError, ColorSpace, ComponentType, D65, Layout, PixelFormat, Trc,
};
use rand::Rng;

const PIXELS: usize = 512;

fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..len).map(|_| rng.random::<u8>()).collect()
}

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[test]
fn test_identity_fish_is_bit_exact_for_integer_formats() {
    for name in ["R'G'B'A u8", "RGB u16", "Y'A u8", "R'aG'aB'aA u16", "CIE Lab u8", "format_n 5 u32"] {
        let format = prism_color::format(name).unwrap();
        let fish = prism_color::fish(&format, &format).unwrap();
        assert!(fish.is_identity(), "{name}");

        let src = random_bytes(PIXELS * format.bytes_per_pixel());
        let mut mid = vec![0u8; src.len()];
        let mut out = vec![0u8; src.len()];
        fish.process(&src, &mut mid, PIXELS).unwrap();
        fish.process(&mid, &mut out, PIXELS).unwrap();
        assert_eq!(src, out, "{name}");
    }
}

#[test]
fn test_u8_roundtrip_through_float_is_lossless() {
    let u8_fmt = prism_color::format("R'G'B'A u8").unwrap();
    let float_fmt = prism_color::format("RGBA float").unwrap();
    let there = prism_color::fish(&u8_fmt, &float_fmt).unwrap();
    let back = prism_color::fish(&float_fmt, &u8_fmt).unwrap();

    let src = random_bytes(PIXELS * 4);
    let mut mid = vec![0u8; PIXELS * 16];
    let mut out = vec![0u8; PIXELS * 4];
    there.process(&src, &mut mid, PIXELS).unwrap();
    back.process(&mid, &mut out, PIXELS).unwrap();
    assert_eq!(src, out);
}

#[test]
fn test_composed_path_error_is_bounded() {
    // A → B → C must stay within B's quantisation (amplified by the curve slope)
    // plus both declared errors of the direct A → C path.
    let a = prism_color::format("RGBA float").unwrap();
    let b = prism_color::format("R'G'B'A u16").unwrap();
    let c = prism_color::format("RGBA double").unwrap();
    let a_to_b = prism_color::fish(&a, &b).unwrap();
    let b_to_c = prism_color::fish(&b, &c).unwrap();
    let a_to_c = prism_color::fish(&a, &c).unwrap();

    let mut rng = rand::rng();
    let values: Vec<f32> = (0..PIXELS * 4).map(|_| rng.random_range(0.0..1.0)).collect();
    let src: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();

    let mut mid = vec![0u8; PIXELS * b.bytes_per_pixel()];
    let mut composed = vec![0u8; PIXELS * c.bytes_per_pixel()];
    let mut direct = vec![0u8; PIXELS * c.bytes_per_pixel()];
    a_to_b.process(&src, &mut mid, PIXELS).unwrap();
    b_to_c.process(&mid, &mut composed, PIXELS).unwrap();
    a_to_c.process(&src, &mut direct, PIXELS).unwrap();

    // Max slope of the sRGB decode curve on [0, 1] is below 2.4.
    let bound = 2.4 * a_to_b.declared_error() + b_to_c.declared_error() + a_to_c.declared_error();
    for (x, y) in composed.chunks_exact(8).zip(direct.chunks_exact(8)) {
        let x = ComponentType::Double.decode(x);
        let y = ComponentType::Double.decode(y);
        assert!((x - y).abs() <= bound, "{x} vs {y} exceeds {bound}");
    }
}

#[test]
fn test_cross_space_roundtrip() {
    let srgb = prism_color::format("RGBA double").unwrap();
    let acescg = ColorSpace::named("ACEScg").unwrap();
    let aces = prism_color::format_with_space("RGBA double", &acescg).unwrap();
    assert_ne!(srgb, aces);

    let there = prism_color::fish(&srgb, &aces).unwrap();
    let back = prism_color::fish(&aces, &srgb).unwrap();
    let src: Vec<u8> = [0.2f64, 0.5, 0.9, 0.75].iter().flat_map(|v| v.to_ne_bytes()).collect();
    let mut mid = vec![0u8; 32];
    let mut out = vec![0u8; 32];
    there.process(&src, &mut mid, 1).unwrap();
    back.process(&mid, &mut out, 1).unwrap();
    for (x, y) in src.chunks_exact(8).zip(out.chunks_exact(8)) {
        let x = ComponentType::Double.decode(x);
        let y = ComponentType::Double.decode(y);
        assert!((x - y).abs() < 1e-9);
    }
}

#[test]
fn test_format_interning_is_identity() {
    let a = prism_color::format("R'G'B'A u8").unwrap();
    let b = PixelFormat::named("R'G'B'A u8").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.bytes_per_pixel(), 4);
    assert_eq!(a.n_components(), 4);
    assert!(a.has_alpha());

    let space = ColorSpace::from_chromaticities(
        "test-primaries",
        D65,
        Chromaticity::new(0.65, 0.32),
        Chromaticity::new(0.3, 0.6),
        Chromaticity::new(0.15, 0.05),
        Trc::gamma(2.4),
    )
    .unwrap();
    let c = a.with_space(&space);
    assert_ne!(a, c);
    assert_eq!(c, prism_color::format_with_space("R'G'B'A u8", &space).unwrap());
    assert_eq!(c.name(), a.name());
}

#[test]
fn test_unknown_names_are_lookup_errors() {
    let err = prism_color::format("R'G'B'A u7").unwrap_err();
    assert!(err.is_lookup());
    let err = prism_color::space("NoSuchSpace").unwrap_err();
    assert!(matches!(err, ColorError::UnknownSpace(_)));
    assert!(!prism_color::format_exists("bogus"));
    assert!(prism_color::format_exists("Y'aA half"));
}

#[test]
fn test_registered_direct_conversion_is_preferred() {
    let src = prism_color::register_format(
        "test gray8",
        Layout::Components(1),
        ComponentType::U8,
    )
    .unwrap();
    let dst = prism_color::format_n(ComponentType::U8, 2).unwrap();
    assert!(prism_color::fish(&src, &dst).is_err());

    let convert: prism_color::ConversionFn = std::sync::Arc::new(|s: &[u8], d: &mut [u8], n: usize| {
        for i in 0..n {
            d[2 * i] = s[i];
            d[2 * i + 1] = s[i];
        }
    });
    assert!(prism_color::register_conversion(&src, &dst, convert.clone()));
    assert!(!prism_color::register_conversion(&src, &dst, convert));

    let fish = prism_color::fish(&src, &dst).unwrap();
    assert_eq!(fish.kind_name(), "direct");
    let mut out = [0u8; 4];
    fish.process(&[7, 9], &mut out, 2).unwrap();
    assert_eq!(out, [7, 7, 9, 9]);
}

#[test]
fn test_fast_fish_stays_close_to_exact() {
    let u8_fmt = prism_color::format("R'G'B'A u8").unwrap();
    let lin = prism_color::format("RGBA float").unwrap();
    let exact = prism_color::fish(&u8_fmt, &lin).unwrap();
    let fast = prism_color::fast_fish(&u8_fmt, &lin).unwrap();
    let src = random_bytes(PIXELS * 4);
    let mut a = vec![0u8; PIXELS * 16];
    let mut b = vec![0u8; PIXELS * 16];
    exact.process(&src, &mut a, PIXELS).unwrap();
    fast.process(&src, &mut b, PIXELS).unwrap();
    for (x, y) in floats(&a).iter().zip(floats(&b)) {
        assert!((x - y).abs() <= fast.declared_error() as f32);
    }
}
