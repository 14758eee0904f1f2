//! Buffer behaviour across the public API.

use prism_core::{AbyssPolicy, Buffer, Colour, Rect};
use rand::Rng;

fn rgba() -> prism_core::PixelFormat {
    prism_color::format("RGBA float").unwrap()
}

#[test]
fn test_solid_colour_reads_back_in_every_format() {
    let buffer = Buffer::new(Rect::new(0, 0, 32, 32), &rgba()).unwrap();
    let colour = Colour::new(0.5, 0.25, 0.75, 1.0);
    let patch = Rect::new(5, 7, 11, 9);
    buffer.set_color(patch, &colour).unwrap();

    for name in ["RGBA float", "RGBA double", "R'G'B'A u8", "RGB u16", "R'G'B'A half"] {
        let format = prism_color::format(name).unwrap();
        let expected = colour.get_pixel(&format).unwrap();
        let bytes = buffer.get(patch, 1.0, &format, AbyssPolicy::None).unwrap();
        for (i, px) in bytes.chunks_exact(format.bytes_per_pixel()).enumerate() {
            assert_eq!(px, expected.as_slice(), "{name} pixel {i}");
        }
    }
}

#[test]
fn test_clamp_abyss_fully_outside_replicates_edge() {
    let format = prism_color::format("R'G'B'A u8").unwrap();
    let extent = Rect::new(0, 0, 4, 4);
    let mut rng = rand::rng();
    let data: Vec<u8> = (0..extent.area() * 4).map(|_| rng.random::<u8>()).collect();
    let buffer = Buffer::from_bytes(extent, &format, &data).unwrap();

    // Far right of row 2: every pixel equals the last pixel of that row.
    let out = buffer
        .get(Rect::new(10, 2, 3, 1), 1.0, &format, AbyssPolicy::Clamp)
        .unwrap();
    let edge = &data[(2 * 4 + 3) * 4..(2 * 4 + 4) * 4];
    for px in out.chunks_exact(4) {
        assert_eq!(px, edge);
    }

    // Above-left corner clamps to the origin pixel.
    let corner = buffer
        .get(Rect::new(-5, -5, 1, 1), 1.0, &format, AbyssPolicy::Clamp)
        .unwrap();
    assert_eq!(corner, &data[..4]);
}

#[test]
fn test_none_abyss_fully_outside_is_out_of_range() {
    let buffer = Buffer::new(Rect::new(0, 0, 4, 4), &rgba()).unwrap();
    let err = buffer
        .get(Rect::new(10, 10, 2, 2), 1.0, &rgba(), AbyssPolicy::None)
        .unwrap_err();
    assert!(matches!(err, prism_core::PrismError::OutOfRange { .. }));
}

#[test]
fn test_overlapping_sub_buffers_share_writes() {
    let format = prism_color::format("R'G'B'A u8").unwrap();
    let parent = Buffer::new(Rect::new(0, 0, 16, 16), &format).unwrap();
    let left = parent.create_sub_buffer(Rect::new(0, 0, 10, 16));
    let right = parent.create_sub_buffer(Rect::new(6, 0, 10, 16));

    left.set_color(Rect::new(6, 4, 4, 4), &Colour::WHITE).unwrap();
    let seen = right
        .get(Rect::new(6, 4, 4, 4), 1.0, &format, AbyssPolicy::None)
        .unwrap();
    assert!(seen.iter().all(|&b| b == 255));

    right.clear(Rect::new(8, 4, 2, 4));
    let cleared = left
        .get(Rect::new(8, 4, 2, 4), 1.0, &format, AbyssPolicy::None)
        .unwrap();
    assert!(cleared.iter().all(|&b| b == 0));
    assert!(Buffer::share_storage(&left, &right));
}

#[test]
fn test_writes_outside_extent_are_clipped() {
    let format = prism_color::format("R'G'B'A u8").unwrap();
    let parent = Buffer::new(Rect::new(0, 0, 8, 8), &format).unwrap();
    let view = parent.create_sub_buffer(Rect::new(0, 0, 4, 4));
    view.set_color(Rect::new(0, 0, 8, 8), &Colour::WHITE).unwrap();

    let outside = parent
        .get(Rect::new(4, 4, 4, 4), 1.0, &format, AbyssPolicy::None)
        .unwrap();
    assert!(outside.iter().all(|&b| b == 0));
}
