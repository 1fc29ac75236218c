//! Cubemap sources round-tripped through the filesystem.

use std::path::PathBuf;

use vkframe_resources::{Cubemap, KtxImage, ResourceError};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("vkframe-resources-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_ktx_cubemap_round_trip() {
    let dir = scratch_dir("ktx");
    let path = dir.join("sky.ktx");

    let sky = Cubemap::procedural_sky(16);
    sky.to_ktx().unwrap().write(&path).unwrap();

    let loaded = Cubemap::load(&path).unwrap();
    assert_eq!(loaded, sky);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_face_directory_loads_in_layer_order() {
    let dir = scratch_dir("faces");
    for (i, name) in ["px", "nx", "py", "ny", "pz", "nz"].iter().enumerate() {
        let shade = (i as u8) * 40;
        let face = image::RgbaImage::from_pixel(4, 4, image::Rgba([shade, shade, shade, 255]));
        face.save(dir.join(format!("{name}.png"))).unwrap();
    }

    let cubemap = Cubemap::load(&dir).unwrap();
    assert_eq!(cubemap.face_size(), 4);
    for face in 0..6u32 {
        let expected = (face * 40) as f32 / 255.0;
        let first = cubemap.face(face)[0];
        assert!(
            (first - expected).abs() < 1e-4,
            "face {face}: {first} vs {expected}"
        );
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_face_directory_rejects_mismatched_sizes() {
    let dir = scratch_dir("mismatch");
    for (i, name) in ["px", "nx", "py", "ny", "pz", "nz"].iter().enumerate() {
        let size = if i == 3 { 8 } else { 4 };
        image::RgbaImage::new(size, size)
            .save(dir.join(format!("{name}.png")))
            .unwrap();
    }

    assert!(matches!(
        Cubemap::load(&dir),
        Err(ResourceError::InvalidCubemap { .. })
    ));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_face_directory_reports_missing_face() {
    let dir = scratch_dir("missing");
    image::RgbaImage::new(4, 4).save(dir.join("px.png")).unwrap();

    let err = Cubemap::load(&dir).unwrap_err();
    assert!(err.to_string().contains("nx"), "{err}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_non_cube_ktx_is_rejected() {
    let dir = scratch_dir("flat");
    let path = dir.join("flat.ktx");
    let header = vkframe_resources::KtxHeader {
        format: vkframe_resources::PixelFormat::Rgba8,
        width: 2,
        height: 2,
        mip_levels: 1,
        faces: 1,
        array_layers: 1,
    };
    KtxImage::new(header, vec![0; 16]).unwrap().write(&path).unwrap();

    assert!(matches!(
        Cubemap::load(&path),
        Err(ResourceError::InvalidCubemap { .. })
    ));

    let _ = std::fs::remove_dir_all(&dir);
}
