use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shared::{GeoPoint, Maneuver, Route, RouteStep};

use crate::error::ServiceError;

/// Turn-by-turn routing between two points.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<Route, ServiceError>;
}

/// OSRM `/route/v1/driving` client.
#[derive(Debug, Clone)]
pub struct OsrmRouter {
    client: Client,
    base_url: String,
}

impl OsrmRouter {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn route_url(&self, from: GeoPoint, to: GeoPoint) -> String {
        format!(
            "{}/route/v1/driving/{}?overview=full&geometries=geojson&steps=true",
            self.base_url,
            encode_waypoints(&[from, to])
        )
    }
}

#[async_trait]
impl RouteProvider for OsrmRouter {
    async fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<Route, ServiceError> {
        let url = self.route_url(from, to);
        tracing::debug!("requesting route {url}");
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            // OSRM answers 400 with a JSON code when no route exists.
            return match serde_json::from_str::<OsrmResponse>(&body) {
                Ok(parsed) if is_no_route(parsed.code.as_deref()) => Err(ServiceError::NotFound),
                _ => Err(ServiceError::Status(status)),
            };
        }
        parse_route(&body)
    }
}

/// `lng,lat;lng,lat`, the order OSRM expects.
pub fn encode_waypoints(points: &[GeoPoint]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", p.lng, p.lat))
        .collect::<Vec<_>>()
        .join(";")
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: GeoJsonLine,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct GeoJsonLine {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    distance: f64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    instruction: Option<String>,
    maneuver: OsrmManeuver,
}

#[derive(Debug, Deserialize)]
struct OsrmManeuver {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
    #[serde(default)]
    location: Option<[f64; 2]>,
}

fn is_no_route(code: Option<&str>) -> bool {
    matches!(code, Some("NoRoute" | "NoSegment"))
}

/// Convert the first route of an OSRM response.
pub fn parse_route(body: &str) -> Result<Route, ServiceError> {
    let response: OsrmResponse =
        serde_json::from_str(body).map_err(|err| ServiceError::Malformed(err.to_string()))?;
    if is_no_route(response.code.as_deref()) {
        return Err(ServiceError::NotFound);
    }
    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or(ServiceError::NotFound)?;
    if route.geometry.kind != "LineString" {
        return Err(ServiceError::Malformed(format!(
            "expected LineString geometry, got {}",
            route.geometry.kind
        )));
    }

    let geometry: Vec<GeoPoint> = route
        .geometry
        .coordinates
        .iter()
        .map(|[lng, lat]| GeoPoint::new(*lat, *lng))
        .collect();
    let fallback = geometry.first().copied();

    let steps = route
        .legs
        .into_iter()
        .flat_map(|leg| leg.steps)
        .map(|step| {
            let location = step
                .maneuver
                .location
                .map(|[lng, lat]| GeoPoint::new(lat, lng))
                .or(fallback)
                .ok_or_else(|| ServiceError::Malformed("maneuver without location".into()))?;
            let name = (!step.name.is_empty()).then_some(step.name);
            let instruction = step.instruction.filter(|text| !text.is_empty()).unwrap_or_else(|| {
                describe_maneuver(
                    &step.maneuver.kind,
                    step.maneuver.modifier.as_deref(),
                    name.as_deref(),
                )
            });
            Ok(RouteStep {
                instruction,
                maneuver: Maneuver {
                    kind: step.maneuver.kind,
                    modifier: step.maneuver.modifier,
                    location,
                },
                distance_meters: step.distance,
                duration_seconds: step.duration,
                name,
            })
        })
        .collect::<Result<Vec<_>, ServiceError>>()?;

    Ok(Route {
        geometry,
        steps,
        total_distance_km: route.distance / 1000.0,
        total_duration_min: route.duration / 60.0,
    })
}

/// Human readable text for a maneuver that came without an instruction.
pub fn describe_maneuver(kind: &str, modifier: Option<&str>, street: Option<&str>) -> String {
    let modifier = modifier.filter(|m| !m.is_empty());
    let base = match (kind, modifier) {
        ("arrive", _) => return "Arrive at your destination".to_string(),
        ("depart", Some(m)) => format!("Head {m}"),
        ("depart", None) => "Head out".to_string(),
        ("turn" | "end of road", Some(m)) => format!("Turn {m}"),
        ("fork", Some(m)) => format!("Keep {m} at the fork"),
        ("merge", _) => "Merge".to_string(),
        ("roundabout" | "rotary", _) => "Enter the roundabout".to_string(),
        ("exit roundabout" | "exit rotary", _) => "Exit the roundabout".to_string(),
        (_, Some("uturn")) => "Make a U-turn".to_string(),
        (_, Some(m)) => format!("Continue {m}"),
        (_, None) => "Continue".to_string(),
    };
    match street {
        Some(street) if !street.is_empty() => format!("{base} onto {street}"),
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_ROUTE: &str = r#"{
        "code": "Ok",
        "routes": [{
            "distance": 2450.5,
            "duration": 420.0,
            "geometry": {"type": "LineString", "coordinates": [[76.4600, 15.3350], [76.4650, 15.3380], [76.4747, 15.3424]]},
            "legs": [{
                "steps": [
                    {"distance": 600.0, "duration": 90.0, "name": "Bazaar Road", "maneuver": {"type": "depart", "modifier": "right", "location": [76.4600, 15.3350]}},
                    {"distance": 1800.0, "duration": 300.0, "name": "", "maneuver": {"type": "turn", "modifier": "slight left", "location": [76.4650, 15.3380]}},
                    {"distance": 0.0, "duration": 0.0, "name": "", "maneuver": {"type": "arrive", "location": [76.4747, 15.3424]}}
                ]
            }]
        }]
    }"#;

    #[test]
    fn encodes_lng_first() {
        let encoded = encode_waypoints(&[GeoPoint::new(15.335, 76.46), GeoPoint::new(15.3424, 76.4747)]);
        assert_eq!(encoded, "76.46,15.335;76.4747,15.3424");
    }

    #[test]
    fn route_url_requests_full_geometry_and_steps() {
        let router = OsrmRouter::new(Client::new(), "https://osrm.example/");
        let url = router.route_url(GeoPoint::new(1.0, 2.0), GeoPoint::new(3.0, 4.0));
        assert_eq!(
            url,
            "https://osrm.example/route/v1/driving/2,1;4,3?overview=full&geometries=geojson&steps=true"
        );
    }

    #[test]
    fn parses_sample_route() {
        let route = parse_route(SAMPLE_ROUTE).unwrap();
        assert_eq!(route.geometry.len(), 3);
        assert_eq!(route.geometry[0], GeoPoint::new(15.3350, 76.4600));
        assert!((route.total_distance_km - 2.4505).abs() < 1e-9);
        assert!((route.total_duration_min - 7.0).abs() < 1e-9);

        assert_eq!(route.steps.len(), 3);
        assert_eq!(route.steps[0].instruction, "Head right onto Bazaar Road");
        assert_eq!(route.steps[1].instruction, "Turn slight left");
        assert_eq!(route.steps[1].maneuver.modifier.as_deref(), Some("slight left"));
        assert_eq!(route.steps[2].instruction, "Arrive at your destination");
        assert_eq!(route.steps[2].maneuver.location, GeoPoint::new(15.3424, 76.4747));
    }

    #[test]
    fn zero_routes_is_not_found() {
        let body = r#"{"code": "Ok", "routes": []}"#;
        assert!(matches!(parse_route(body), Err(ServiceError::NotFound)));
        let body = r#"{"code": "NoRoute", "message": "Impossible route"}"#;
        assert!(matches!(parse_route(body), Err(ServiceError::NotFound)));
    }

    #[test]
    fn unexpected_shape_is_malformed() {
        assert!(matches!(parse_route("[]"), Err(ServiceError::Malformed(_))));
        let body = r#"{"routes": [{"distance": 1.0, "duration": 1.0, "geometry": {"type": "Point", "coordinates": [[1.0, 2.0]]}}]}"#;
        assert!(matches!(parse_route(body), Err(ServiceError::Malformed(_))));
    }

    #[test]
    fn describes_common_maneuvers() {
        assert_eq!(describe_maneuver("turn", Some("left"), Some("Main St")), "Turn left onto Main St");
        assert_eq!(describe_maneuver("new name", None, None), "Continue");
        assert_eq!(describe_maneuver("continue", Some("uturn"), None), "Make a U-turn");
        assert_eq!(describe_maneuver("roundabout", Some("right"), None), "Enter the roundabout");
    }
}
