//! Brush hit testing and per-application stroke state.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Region a brush test accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FalloffShape {
    /// Points within `radius` of the brush location
    #[default]
    Sphere,
    /// Points within `radius` of the view ray through the brush location
    ProjectedCircle,
}

/// State of the brush for one application
#[derive(Debug, Clone, Copy)]
pub struct StrokeCache {
    /// World-space brush location
    pub location: Vec3,
    pub radius: f32,
    /// Effective strength after pressure
    pub bstrength: f32,
    /// Pressure (0.0 to 1.0)
    pub pressure: f32,
    /// Direction the surface is viewed along
    pub view_normal: Vec3,
    pub falloff_shape: FalloffShape,
}

impl StrokeCache {
    pub fn new(location: Vec3, radius: f32, strength: f32) -> Self {
        Self {
            location,
            radius,
            bstrength: strength,
            pressure: 1.0,
            view_normal: Vec3::Z,
            falloff_shape: FalloffShape::Sphere,
        }
    }

    /// Scale strength by pen pressure
    pub fn with_pressure(mut self, strength: f32, pressure: f32) -> Self {
        self.pressure = pressure.clamp(0.0, 1.0);
        self.bstrength = strength * self.pressure;
        self
    }

    pub fn with_shape(mut self, shape: FalloffShape) -> Self {
        self.falloff_shape = shape;
        self
    }
}

/// Distance test against the brush region
#[derive(Debug, Clone, Copy)]
pub struct BrushTest {
    location: Vec3,
    radius_squared: f32,
    /// Unit view direction for projected tests
    plane_normal: Option<Vec3>,
    /// Squared distance of the last accepted point
    pub dist_squared: f32,
}

impl BrushTest {
    pub fn new(cache: &StrokeCache) -> Self {
        let plane_normal = match cache.falloff_shape {
            FalloffShape::Sphere => None,
            FalloffShape::ProjectedCircle => Some(cache.view_normal.normalize_or(Vec3::Z)),
        };
        Self {
            location: cache.location,
            radius_squared: cache.radius * cache.radius,
            plane_normal,
            dist_squared: 0.0,
        }
    }

    /// Whether `co` lies inside the brush region
    pub fn test(&mut self, co: Vec3) -> bool {
        let mut offset = co - self.location;
        if let Some(n) = self.plane_normal {
            offset -= n * offset.dot(n);
        }
        let dist_squared = offset.length_squared();
        if dist_squared <= self.radius_squared {
            self.dist_squared = dist_squared;
            true
        } else {
            false
        }
    }

}
