use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use geo_types::Point;
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use shared::GeoPoint;

use crate::error::ExportError;

/// Serialize the walked path as a single-track GPX 1.1 document.
pub fn visited_path_gpx(path: &[GeoPoint]) -> Result<Vec<u8>, ExportError> {
    if path.is_empty() {
        return Err(ExportError::EmptyPath);
    }
    let mut gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some("explorer".into()),
        ..Default::default()
    };
    let mut track = Track {
        name: Some("visited".into()),
        ..Default::default()
    };

    let mut segment = TrackSegment::new();
    segment.points.extend(path.iter().map(to_waypoint));
    track.segments.push(segment);
    gpx.tracks.push(track);

    let mut buffer = Vec::new();
    gpx::write(&gpx, &mut buffer)?;
    Ok(buffer)
}

pub fn encode_visited_path(path: &[GeoPoint]) -> Result<String, ExportError> {
    visited_path_gpx(path).map(|bytes| BASE64.encode(bytes))
}

fn to_waypoint(point: &GeoPoint) -> Waypoint {
    Waypoint::new(Point::new(point.lng, point.lat))
}
