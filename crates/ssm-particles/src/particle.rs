// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — Particle
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

/// A point in ambient 3-D space.
pub type Point3 = [f64; 3];

/// One correspondence particle on a domain surface.
///
/// Normals, attributes and their spatial derivatives are computed by the
/// surface sampler that owns the domain; the store only carries them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub position: Point3,
    pub normal: Option<Point3>,
    pub attributes: Vec<f64>,
    /// ∂n/∂x: row `i` is the spatial gradient of normal component `i`.
    #[serde(default)]
    pub normal_jacobian: Option<[Point3; 3]>,
    /// ∂a/∂x, one entry per attribute. Empty when not supplied.
    #[serde(default)]
    pub attribute_gradients: Vec<Point3>,
}

impl Particle {
    pub fn at(position: Point3) -> Self {
        Self {
            position,
            normal: None,
            attributes: Vec::new(),
            normal_jacobian: None,
            attribute_gradients: Vec::new(),
        }
    }

    pub fn with_normal(mut self, normal: Point3) -> Self {
        self.normal = Some(normal);
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<f64>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_normal_jacobian(mut self, jacobian: [Point3; 3]) -> Self {
        self.normal_jacobian = Some(jacobian);
        self
    }

    pub fn with_attribute_gradients(mut self, gradients: Vec<Point3>) -> Self {
        self.attribute_gradients = gradients;
        self
    }
}

/// One surface of one shape and the particles sampled on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub particles: Vec<Particle>,
}

impl Domain {
    pub fn new(particles: Vec<Particle>) -> Self {
        Self { particles }
    }

    pub fn from_positions(positions: &[Point3]) -> Self {
        Self {
            particles: positions.iter().copied().map(Particle::at).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = Point3> + '_ {
        self.particles.iter().map(|p| p.position)
    }
}
