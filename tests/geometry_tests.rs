//! Geometry round trips through the stream writer and reader

use gmlstream::geometry::{CoordinateFormatter, Curve, LineString, Point, Points, Polygon, Surface};
use gmlstream::{Crs, Envelope, Geometry, GmlStreamReader, GmlStreamWriter, GmlVersion, ReaderConfig, WriterConfig};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn write(version: GmlVersion, geometry: &Geometry) -> String {
    let mut out = Vec::new();
    {
        let mut writer = GmlStreamWriter::new(&mut out, WriterConfig::new(version));
        writer.write_geometry(geometry).unwrap();
        writer.finish().unwrap();
    }
    String::from_utf8(out).unwrap()
}

fn read(version: GmlVersion, xml: &str) -> Geometry {
    let mut reader = GmlStreamReader::from_str(xml, ReaderConfig::new(version)).unwrap();
    let geometry = reader.read_geometry().unwrap();
    (*geometry).clone()
}

fn wgs84() -> Option<Crs> {
    Some(Crs::new("EPSG:4326"))
}

fn ring(positions: &[[f64; 2]]) -> LineString {
    LineString {
        id: None,
        crs: wgs84(),
        points: Points::from_positions(positions).unwrap(),
    }
}

fn square() -> Polygon {
    Polygon {
        id: None,
        crs: wgs84(),
        exterior: Some(ring(&[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]])),
        interiors: vec![ring(&[[2.0, 2.0], [3.0, 2.0], [3.0, 3.0], [2.0, 2.0]])],
    }
}

fn assert_round_trip(version: GmlVersion, geometry: &Geometry) {
    let xml = write(version, geometry);
    let back = read(version, &xml);
    assert!(
        geometry.approx_eq(&back, 1e-9),
        "{} round trip changed the geometry\n{}\n{:?}",
        version,
        xml,
        back
    );
}

#[test]
fn test_point_round_trip_all_versions() {
    let point = Geometry::Point(Point::new(vec![7.25, -3.5], wgs84()));
    for version in GmlVersion::ALL {
        assert_round_trip(version, &point);
    }
}

#[test]
fn test_line_string_round_trip_all_versions() {
    let line = Geometry::LineString(LineString {
        id: None,
        crs: wgs84(),
        points: Points::from_positions(&[[0.0, 0.0], [1.5, 2.5], [3.0, 1.0]]).unwrap(),
    });
    for version in GmlVersion::ALL {
        assert_round_trip(version, &line);
    }
}

#[test]
fn test_polygon_round_trip_all_versions() {
    let polygon = Geometry::Polygon(square());
    for version in GmlVersion::ALL {
        assert_round_trip(version, &polygon);
    }
}

#[test]
fn test_curve_and_surface_round_trip_gml3() {
    let curve = Geometry::Curve(Curve {
        id: None,
        crs: wgs84(),
        segments: vec![
            Points::from_positions(&[[0.0, 0.0], [1.0, 1.0]]).unwrap(),
            Points::from_positions(&[[1.0, 1.0], [2.0, 0.0]]).unwrap(),
        ],
    });
    let surface = Geometry::Surface(Surface {
        id: None,
        crs: wgs84(),
        patches: vec![square()],
    });
    for version in [GmlVersion::Gml30, GmlVersion::Gml31, GmlVersion::Gml32] {
        assert_round_trip(version, &curve);
        assert_round_trip(version, &surface);
    }
}

#[test]
fn test_envelope_round_trip_all_versions() {
    let envelope = Envelope {
        crs: wgs84(),
        lower: vec![-1.0, -2.0],
        upper: vec![3.0, 4.0],
    };
    for version in GmlVersion::ALL {
        let mut out = Vec::new();
        {
            let mut writer = GmlStreamWriter::new(&mut out, WriterConfig::new(version));
            writer.write_envelope(&envelope).unwrap();
            writer.finish().unwrap();
        }
        let xml = String::from_utf8(out).unwrap();
        match read(version, &xml) {
            Geometry::Envelope(back) => assert_eq!(back, envelope, "{}", xml),
            other => panic!("{}: unexpected {:?}", version, other),
        }
    }
}

#[test]
fn test_gml2_coordinates_equal_gml32_pos() {
    let gml2 = read(
        GmlVersion::Gml2,
        r#"<gml:Point xmlns:gml="http://www.opengis.net/gml" srsName="EPSG:4326"><gml:coordinates>1.5,2.5</gml:coordinates></gml:Point>"#,
    );
    let gml32 = read(
        GmlVersion::Gml32,
        r#"<gml:Point xmlns:gml="http://www.opengis.net/gml/3.2" srsName="EPSG:4326"><gml:pos>1.5 2.5</gml:pos></gml:Point>"#,
    );
    assert!(gml2.approx_eq(&gml32, 0.0));
}

#[test]
fn test_lax_reading_skips_bad_tuples() {
    let xml = r#"<gml:LineString xmlns:gml="http://www.opengis.net/gml"><gml:coordinates>10,abc 1,2 3,4</gml:coordinates></gml:LineString>"#;

    let mut strict = GmlStreamReader::from_str(xml, ReaderConfig::new(GmlVersion::Gml2)).unwrap();
    assert!(strict.read_geometry().unwrap_err().is_parse());

    let config = ReaderConfig::new(GmlVersion::Gml2).with_lax(true);
    let mut lax = GmlStreamReader::from_str(xml, config).unwrap();
    match &*lax.read_geometry().unwrap() {
        Geometry::LineString(line) => assert_eq!(line.points.len(), 2),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_lax_reading_skips_bad_positions() {
    let xml = r#"<gml:LineString xmlns:gml="http://www.opengis.net/gml" srsName="EPSG:4326"><gml:pos>0 0</gml:pos><gml:pos>10 abc</gml:pos><gml:pos>5 5</gml:pos><gml:pos>6 6</gml:pos></gml:LineString>"#;

    let mut strict = GmlStreamReader::from_str(xml, ReaderConfig::new(GmlVersion::Gml31)).unwrap();
    assert!(strict.read_geometry().unwrap_err().is_parse());

    let config = ReaderConfig::new(GmlVersion::Gml31).with_lax(true);
    let mut lax = GmlStreamReader::from_str(xml, config).unwrap();
    match &*lax.read_geometry().unwrap() {
        Geometry::LineString(line) => {
            assert_eq!(line.points.len(), 3);
            assert_eq!(line.points.get(1), Some(&[5.0, 5.0][..]));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_lax_reading_skips_bad_point_properties() {
    let xml = r#"<gml:LineString xmlns:gml="http://www.opengis.net/gml" srsName="EPSG:4326"><gml:pointProperty><gml:Point><gml:pos>1 x</gml:pos></gml:Point></gml:pointProperty><gml:pos>1 1</gml:pos><gml:pointProperty><gml:Point><gml:pos>2 2</gml:pos></gml:Point></gml:pointProperty></gml:LineString>"#;
    let config = ReaderConfig::new(GmlVersion::Gml31).with_lax(true);
    let mut reader = GmlStreamReader::from_str(xml, config).unwrap();
    match &*reader.read_geometry().unwrap() {
        Geometry::LineString(line) => assert_eq!(line.points.len(), 2),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_lax_reading_skips_bad_coord_tuples() {
    let xml = r#"<gml:LineString xmlns:gml="http://www.opengis.net/gml" srsName="EPSG:4326"><gml:coord><gml:X>1</gml:X><gml:Y>2</gml:Y></gml:coord><gml:coord><gml:X>oops</gml:X><gml:Y>3</gml:Y></gml:coord><gml:coord><gml:X>4</gml:X><gml:Y>5</gml:Y></gml:coord></gml:LineString>"#;

    let mut strict = GmlStreamReader::from_str(xml, ReaderConfig::new(GmlVersion::Gml2)).unwrap();
    assert!(strict.read_geometry().unwrap_err().is_parse());

    let config = ReaderConfig::new(GmlVersion::Gml2).with_lax(true);
    let mut lax = GmlStreamReader::from_str(xml, config).unwrap();
    match &*lax.read_geometry().unwrap() {
        Geometry::LineString(line) => assert_eq!(line.points.len(), 2),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_precision_applies_on_write() {
    let point = Geometry::Point(Point::new(vec![1.23456789, 9.87654321], None));
    let mut out = Vec::new();
    {
        let config = WriterConfig::new(GmlVersion::Gml31).with_formatter(CoordinateFormatter::with_precision(3));
        let mut writer = GmlStreamWriter::new(&mut out, config);
        writer.write_geometry(&point).unwrap();
        writer.finish().unwrap();
    }
    let xml = String::from_utf8(out).unwrap();
    assert!(xml.contains(">1.235 9.877<"), "{}", xml);
}

proptest! {
    #[test]
    fn prop_rounded_ordinates_stay_within_tolerance(value in -1.0e6f64..1.0e6, digits in 0usize..9) {
        let formatter = CoordinateFormatter::with_precision(digits);
        let text = formatter.format(value);
        let parsed: f64 = text.parse().unwrap();
        prop_assert!((parsed - value).abs() <= formatter.tolerance() + value.abs() * 1e-12);
        let fraction = text.split('.').nth(1).map(str::len).unwrap_or(0);
        prop_assert!(fraction <= digits);
    }

    #[test]
    fn prop_exact_formatter_is_lossless(value in proptest::num::f64::NORMAL) {
        let text = CoordinateFormatter::new().format(value);
        prop_assert_eq!(text.parse::<f64>().unwrap(), value);
    }
}
