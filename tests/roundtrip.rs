//! End-to-end round-trip coverage for the parallel LAS<->LAZ coordinator,
//! exercising the boundary scenarios a synthetic fixture can reach.

use las::{Builder, Color, Header, Point, Reader, Writer};
use parlaz::{config::Direction, infer_direction, run, Config};
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write_las(path: &Path, point_format: u8, n_points: u64) {
    let mut builder = Builder::from(Header::default());
    let format = las::point::Format::new(point_format).unwrap();
    builder.point_format = format;
    let header = builder.into_header().unwrap();
    let mut writer = Writer::from_path(path, header).unwrap();
    for i in 0..n_points {
        let mut point = Point {
            x: i as f64 * 0.01,
            y: (i as f64 * 0.02) - 500.0,
            z: (i % 1000) as f64 * 0.1,
            intensity: (i % 65536) as u16,
            return_number: 1,
            number_of_returns: 1,
            classification: las::point::Classification::new({
                let c = (i % 18) + 1;
                (if c >= 12 { c + 1 } else { c }) as u8
            })
            .unwrap(),
            scan_angle: ((i % 180) as f32) - 90.0,
            user_data: (i % 256) as u8,
            point_source_id: (i % 1024) as u16,
            ..Default::default()
        };
        if format.has_gps_time {
            point.gps_time = Some(i as f64 * 1e-3);
        }
        if format.has_color {
            point.color = Some(Color::new(
                (i % 65536) as u16,
                (i % 65536) as u16,
                (i % 65536) as u16,
            ));
        }
        writer.write_point(point).unwrap();
    }
    writer.close().unwrap();
}

fn read_all(path: &Path) -> Vec<Point> {
    let mut reader = Reader::from_path(path).unwrap();
    reader.points().map(|p| p.unwrap()).collect()
}

fn convert(input: PathBuf, output: PathBuf, peers: u32) {
    let direction = infer_direction(&input).unwrap();
    let cfg = Config {
        input,
        output,
        peers,
        chunk_size: 1_000,
        direction,
    };
    run(cfg).unwrap();
}

#[test]
fn las_to_laz_round_trip_single_peer() {
    let dir = tempdir().unwrap();
    let las_path = dir.path().join("in.las");
    let laz_path = dir.path().join("out.laz");
    write_las(&las_path, 1, 5_500);

    convert(las_path.clone(), laz_path.clone(), 1);

    let original = read_all(&las_path);
    let roundtripped = read_all(&laz_path);
    assert_eq!(original.len(), roundtripped.len());
    for (a, b) in original.iter().zip(roundtripped.iter()) {
        assert_eq!(a.x, b.x);
        assert_eq!(a.y, b.y);
        assert_eq!(a.z, b.z);
        assert_eq!(a.intensity, b.intensity);
        assert_eq!(a.classification, b.classification);
    }
}

#[test]
fn las_to_laz_peer_count_invariance() {
    let dir = tempdir().unwrap();
    let las_path = dir.path().join("in.las");
    write_las(&las_path, 0, 12_345);

    let mut reference: Option<Vec<Point>> = None;
    for peers in [1u32, 2, 3, 4] {
        let laz_path = dir.path().join(format!("out_{peers}.laz"));
        convert(las_path.clone(), laz_path.clone(), peers);
        let points = read_all(&laz_path);
        match &reference {
            None => reference = Some(points),
            Some(r) => {
                assert_eq!(r.len(), points.len());
                for (a, b) in r.iter().zip(points.iter()) {
                    assert_eq!(a.x, b.x);
                    assert_eq!(a.y, b.y);
                    assert_eq!(a.z, b.z);
                }
            }
        }
    }
}

#[test]
fn laz_to_las_equal_split_with_remainder() {
    let dir = tempdir().unwrap();
    let las_path = dir.path().join("in.las");
    let laz_path = dir.path().join("mid.laz");
    let roundtrip_path = dir.path().join("out.las");
    write_las(&las_path, 3, 10_007);

    convert(las_path.clone(), laz_path.clone(), 1);
    convert(laz_path.clone(), roundtrip_path.clone(), 4);

    let original = read_all(&las_path);
    let roundtripped = read_all(&roundtrip_path);
    assert_eq!(original.len(), roundtripped.len());
    for (a, b) in original.iter().zip(roundtripped.iter()) {
        assert_eq!(a.x, b.x);
        assert_eq!(a.color, b.color);
    }
}

#[test]
fn insufficient_chunks_reported_to_every_peer() {
    let dir = tempdir().unwrap();
    let las_path = dir.path().join("in.las");
    let laz_path = dir.path().join("out.laz");
    write_las(&las_path, 0, 500);

    let cfg = Config {
        input: las_path,
        output: laz_path,
        peers: 4,
        chunk_size: 1_000,
        direction: Direction::LasToLaz,
    };
    let err = run(cfg).unwrap_err();
    assert!(matches!(err, parlaz::Error::InsufficientChunks { .. }));
}

#[test]
fn direction_is_inferred_from_the_input_header() {
    let dir = tempdir().unwrap();
    let las_path = dir.path().join("in.las");
    let laz_path = dir.path().join("out.laz");
    write_las(&las_path, 0, 1_500);
    assert_eq!(infer_direction(&las_path).unwrap(), Direction::LasToLaz);

    convert(las_path, laz_path.clone(), 1);
    assert_eq!(infer_direction(&laz_path).unwrap(), Direction::LazToLas);
}
