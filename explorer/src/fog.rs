//! Fog-of-war mask.
//!
//! The mask is a full-viewport alpha buffer. Every visited point punches a soft
//! disc into it: fully clear inside `inner_radius`, fading back to full fog at
//! `outer_radius`. Discs combine by taking the strongest reveal per pixel, so
//! overlaps never clear more than one disc would and revisiting a spot changes
//! nothing.

use rayon::prelude::*;
use shared::GeoPoint;

use crate::{config::FogStyle, geo::ScreenPoint};

/// Append-only history of recorded positions for the current session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitedPath {
    points: Vec<GeoPoint>,
}

impl VisitedPath {
    pub fn seeded(seed: GeoPoint) -> Self {
        Self { points: vec![seed] }
    }

    pub fn push(&mut self, point: GeoPoint) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn as_slice(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn last(&self) -> Option<GeoPoint> {
        self.points.last().copied()
    }
}

/// One alpha byte per pixel, row-major. The fog colour is black.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FogFrame {
    pub width: u32,
    pub height: u32,
    pub alpha: Vec<u8>,
}

impl FogFrame {
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            alpha: Vec::new(),
        }
    }

    pub fn alpha_at(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.alpha.get((y * self.width + x) as usize).copied()
    }

    pub fn alpha_near(&self, point: ScreenPoint) -> Option<u8> {
        if point.x < 0.0 || point.y < 0.0 {
            return None;
        }
        self.alpha_at(point.x as u32, point.y as u32)
    }

    /// Premultiplied-free RGBA for a canvas `ImageData`.
    pub fn to_rgba(&self) -> Vec<u8> {
        self.alpha.iter().flat_map(|&a| [0, 0, 0, a]).collect()
    }
}

/// Reveal strength of a disc at distance `d` from its center, `0.0..=1.0`.
fn reveal_strength(d: f64, style: &FogStyle) -> f64 {
    if d <= style.inner_radius {
        1.0
    } else if d >= style.outer_radius {
        0.0
    } else {
        1.0 - (d - style.inner_radius) / (style.outer_radius - style.inner_radius)
    }
}

fn touches_viewport(center: ScreenPoint, radius: f64, width: u32, height: u32) -> bool {
    center.x.is_finite()
        && center.y.is_finite()
        && center.x > -radius
        && center.y > -radius
        && center.x < width as f64 + radius
        && center.y < height as f64 + radius
}

/// Rasterize the fog for `path` as seen through `project`.
///
/// Returns the frame and the number of discs that intersect the viewport.
pub fn render(
    path: &[GeoPoint],
    style: &FogStyle,
    width: u32,
    height: u32,
    project: impl Fn(GeoPoint) -> ScreenPoint,
) -> (FogFrame, usize) {
    if width == 0 || height == 0 {
        return (FogFrame::empty(), 0);
    }

    let outer = style.outer_radius.max(style.inner_radius);
    let discs: Vec<ScreenPoint> = path
        .iter()
        .map(|point| project(*point))
        .filter(|center| touches_viewport(*center, outer, width, height))
        .collect();

    let fog = f64::from(style.alpha.clamp(0.0, 1.0)) * 255.0;
    let row_len = width as usize;
    let mut alpha = vec![0u8; row_len * height as usize];

    alpha
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let py = y as f64 + 0.5;
            let mut coverage = vec![0.0f64; row_len];
            for disc in &discs {
                let dy = py - disc.y;
                if dy.abs() >= outer {
                    continue;
                }
                let half = (outer * outer - dy * dy).sqrt();
                let x0 = (disc.x - half).floor().max(0.0) as usize;
                let x1 = ((disc.x + half).ceil().max(0.0) as usize).min(row_len);
                for (x, cell) in coverage.iter_mut().enumerate().take(x1).skip(x0) {
                    let dx = x as f64 + 0.5 - disc.x;
                    let strength = reveal_strength(dx.hypot(dy), style);
                    if strength > *cell {
                        *cell = strength;
                    }
                }
            }
            for (pixel, cell) in row.iter_mut().zip(&coverage) {
                *pixel = (fog * (1.0 - cell)).round() as u8;
            }
        });

    (
        FogFrame {
            width,
            height,
            alpha,
        },
        discs.len(),
    )
}

/// Visited path plus the last rendered mask.
#[derive(Debug, Clone)]
pub struct FogOverlay {
    style: FogStyle,
    path: VisitedPath,
    frame: FogFrame,
    visible_holes: usize,
    redraws: u64,
}

impl FogOverlay {
    pub fn new(style: FogStyle, seed: GeoPoint) -> Self {
        Self {
            style,
            path: VisitedPath::seeded(seed),
            frame: FogFrame::empty(),
            visible_holes: 0,
            redraws: 0,
        }
    }

    /// Path changed, projection unchanged.
    pub fn record(
        &mut self,
        point: GeoPoint,
        size: (u32, u32),
        project: impl Fn(GeoPoint) -> ScreenPoint,
    ) {
        self.path.push(point);
        self.redraw(size, project);
    }

    /// Projection changed (pan, zoom, rotate, resize), path unchanged.
    pub fn camera_changed(&mut self, size: (u32, u32), project: impl Fn(GeoPoint) -> ScreenPoint) {
        self.redraw(size, project);
    }

    pub fn redraw(&mut self, (width, height): (u32, u32), project: impl Fn(GeoPoint) -> ScreenPoint) {
        let (frame, holes) = render(self.path.as_slice(), &self.style, width, height, project);
        self.frame = frame;
        self.visible_holes = holes;
        self.redraws += 1;
        tracing::trace!(
            "fog redraw #{} {}x{} points={} holes={}",
            self.redraws,
            width,
            height,
            self.path.len(),
            holes
        );
    }

    pub fn path(&self) -> &VisitedPath {
        &self.path
    }

    pub fn frame(&self) -> &FogFrame {
        &self.frame
    }

    pub fn visible_holes(&self) -> usize {
        self.visible_holes
    }

    pub fn redraw_count(&self) -> u64 {
        self.redraws
    }

    pub fn style(&self) -> &FogStyle {
        &self.style
    }
}
