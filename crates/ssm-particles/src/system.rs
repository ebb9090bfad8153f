// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — Correspondence Particle System
// ─────────────────────────────────────────────────────────────────────
//! Particle positions and feature values for every domain of every shape.
//!
//! Domains are stored flat, shape-major: global domain `d` belongs to
//! shape `d / domains_per_shape` at slot `d % domains_per_shape`.

use serde::{Deserialize, Serialize};

use ssm_types::{SsmError, SsmResult};

use crate::particle::{Domain, Particle, Point3};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticleSystem {
    domains: Vec<Domain>,
}

impl ParticleSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domains(domains: Vec<Domain>) -> Self {
        Self { domains }
    }

    /// Append a domain; returns its global index.
    pub fn add_domain(&mut self, domain: Domain) -> usize {
        self.domains.push(domain);
        self.domains.len() - 1
    }

    pub fn num_domains(&self) -> usize {
        self.domains.len()
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    pub fn domain(&self, d: usize) -> SsmResult<&Domain> {
        self.domains.get(d).ok_or_else(|| {
            SsmError::Validation(format!(
                "domain {d} out of range ({} domains)",
                self.domains.len()
            ))
        })
    }

    pub fn num_particles(&self, d: usize) -> SsmResult<usize> {
        Ok(self.domain(d)?.len())
    }

    /// Number of shapes, or an error when the domain count is not an
    /// exact multiple of `domains_per_shape`.
    pub fn num_shapes(&self, domains_per_shape: usize) -> SsmResult<usize> {
        if domains_per_shape == 0 {
            return Err(SsmError::Configuration(
                "domains_per_shape must be > 0".to_string(),
            ));
        }
        if self.domains.len() % domains_per_shape != 0 {
            return Err(SsmError::Configuration(format!(
                "{} domains is not a multiple of domains_per_shape {domains_per_shape}",
                self.domains.len()
            )));
        }
        Ok(self.domains.len() / domains_per_shape)
    }

    pub fn particle(&self, d: usize, p: usize) -> SsmResult<&Particle> {
        let domain = self.domain(d)?;
        domain.particles.get(p).ok_or_else(|| {
            SsmError::Validation(format!(
                "particle {p} out of range in domain {d} ({} particles)",
                domain.len()
            ))
        })
    }

    pub fn particle_mut(&mut self, d: usize, p: usize) -> SsmResult<&mut Particle> {
        let n_domains = self.domains.len();
        let domain = self.domains.get_mut(d).ok_or_else(|| {
            SsmError::Validation(format!("domain {d} out of range ({n_domains} domains)"))
        })?;
        let n = domain.len();
        domain.particles.get_mut(p).ok_or_else(|| {
            SsmError::Validation(format!(
                "particle {p} out of range in domain {d} ({n} particles)"
            ))
        })
    }

    pub fn position(&self, d: usize, p: usize) -> SsmResult<Point3> {
        Ok(self.particle(d, p)?.position)
    }

    pub fn set_position(&mut self, d: usize, p: usize, position: Point3) -> SsmResult<()> {
        self.particle_mut(d, p)?.position = position;
        Ok(())
    }

    /// Move a particle by `delta`.
    pub fn translate(&mut self, d: usize, p: usize, delta: Point3) -> SsmResult<()> {
        let particle = self.particle_mut(d, p)?;
        for (x, dx) in particle.position.iter_mut().zip(delta) {
            *x += dx;
        }
        Ok(())
    }

    pub fn set_normal(&mut self, d: usize, p: usize, normal: Point3) -> SsmResult<()> {
        self.particle_mut(d, p)?.normal = Some(normal);
        Ok(())
    }

    pub fn set_attributes(&mut self, d: usize, p: usize, attributes: Vec<f64>) -> SsmResult<()> {
        self.particle_mut(d, p)?.attributes = attributes;
        Ok(())
    }

    pub fn set_normal_jacobian(
        &mut self,
        d: usize,
        p: usize,
        jacobian: [Point3; 3],
    ) -> SsmResult<()> {
        self.particle_mut(d, p)?.normal_jacobian = Some(jacobian);
        Ok(())
    }

    pub fn set_attribute_gradients(
        &mut self,
        d: usize,
        p: usize,
        gradients: Vec<Point3>,
    ) -> SsmResult<()> {
        self.particle_mut(d, p)?.attribute_gradients = gradients;
        Ok(())
    }

    /// All particle positions, one vector per domain.
    pub fn positions(&self) -> Vec<Vec<Point3>> {
        self.domains
            .iter()
            .map(|domain| domain.positions().collect())
            .collect()
    }
}
