// ─────────────────────────────────────────────────────────────────────
// SSM Kernel — Feature Matrix Assembly
// ─────────────────────────────────────────────────────────────────────
//! Particle store → Y (num_dims × num_samples), one column per shape.
//!
//! Row order is (slot, particle, feature) with the per-particle features
//! laid out as xyz → normal → attributes, each multiplied by its scale
//! weight. Rows therefore map back to the same particle every iteration.

use rayon::prelude::*;

use ssm_particles::ParticleSystem;
use ssm_types::{EntropyConfig, SsmError, SsmResult};

use crate::matrix::FeatureMatrix;

/// Dimensions and row offsets of Y for one configuration and population.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureLayout {
    pub domains_per_shape: usize,
    pub num_dims: usize,
    pub num_samples: usize,
    /// Particles per domain slot (identical across shapes).
    pub slot_particles: Vec<usize>,
    /// Feature values per particle in each slot.
    pub slot_features: Vec<usize>,
    /// First row of each slot.
    pub slot_offsets: Vec<usize>,
    /// Scale weights per slot, one per per-particle feature.
    pub slot_scales: Vec<Vec<f64>>,
    pub use_xyz: Vec<bool>,
    pub use_normals: Vec<bool>,
    pub attributes: Vec<usize>,
}

impl FeatureLayout {
    /// Compute dimensions for `system` under `config`.
    ///
    /// Fails with a configuration error when the config is inconsistent,
    /// the domain count is not a multiple of `domains_per_shape`, or a slot
    /// carries different particle counts in different shapes.
    pub fn new(config: &EntropyConfig, system: &ParticleSystem) -> SsmResult<Self> {
        config.validate()?;
        let dps = config.domains_per_shape;
        let num_samples = system.num_shapes(dps)?;

        let slot_features: Vec<usize> = (0..dps).map(|j| config.features_per_particle(j)).collect();
        let slot_particles: Vec<usize> = if num_samples == 0 {
            vec![0; dps]
        } else {
            (0..dps)
                .map(|j| system.num_particles(j))
                .collect::<SsmResult<_>>()?
        };

        for shape in 1..num_samples {
            for (j, &expected) in slot_particles.iter().enumerate() {
                let d = shape * dps + j;
                let actual = system.num_particles(d)?;
                if actual != expected {
                    return Err(SsmError::Configuration(format!(
                        "domain {d} has {actual} particles, slot {j} of shape 0 has {expected}"
                    )));
                }
            }
        }

        let mut slot_offsets = Vec::with_capacity(dps);
        let mut num_dims = 0;
        for j in 0..dps {
            slot_offsets.push(num_dims);
            num_dims += slot_particles[j] * slot_features[j];
        }

        let slot_scales = (0..dps)
            .map(|j| (0..slot_features[j]).map(|f| config.scale(j, f)).collect())
            .collect();

        Ok(Self {
            domains_per_shape: dps,
            num_dims,
            num_samples,
            slot_particles,
            slot_features,
            slot_offsets,
            slot_scales,
            use_xyz: config.use_xyz[..dps].to_vec(),
            use_normals: config.use_normals[..dps].to_vec(),
            attributes: config.attributes_per_domain[..dps].to_vec(),
        })
    }

    /// First row of particle `particle` in slot `slot`.
    #[inline]
    pub fn row(&self, slot: usize, particle: usize) -> usize {
        self.slot_offsets[slot] + particle * self.slot_features[slot]
    }

    /// (shape, slot) of global domain `domain`.
    #[inline]
    pub fn locate(&self, domain: usize) -> (usize, usize) {
        (
            domain / self.domains_per_shape,
            domain % self.domains_per_shape,
        )
    }
}

/// Build Y for the current particle state.
///
/// Columns are populated in parallel; each column depends only on its own
/// shape, so the result is identical to a sequential build.
pub fn assemble(layout: &FeatureLayout, system: &ParticleSystem) -> SsmResult<FeatureMatrix> {
    let columns = (0..layout.num_samples)
        .into_par_iter()
        .map(|shape| shape_column(layout, system, shape))
        .collect::<SsmResult<Vec<_>>>()?;
    Ok(FeatureMatrix::from_columns(layout.num_dims, columns))
}

fn shape_column(
    layout: &FeatureLayout,
    system: &ParticleSystem,
    shape: usize,
) -> SsmResult<Vec<f64>> {
    let mut column = Vec::with_capacity(layout.num_dims);

    for slot in 0..layout.domains_per_shape {
        let d = shape * layout.domains_per_shape + slot;
        let domain = system.domain(d)?;
        if domain.len() != layout.slot_particles[slot] {
            return Err(SsmError::Configuration(format!(
                "domain {d} has {} particles, layout expects {} for slot {slot}",
                domain.len(),
                layout.slot_particles[slot]
            )));
        }
        let scales = &layout.slot_scales[slot];
        let n_attrs = layout.attributes[slot];

        for (p, particle) in domain.particles.iter().enumerate() {
            let mut k = 0;
            if layout.use_xyz[slot] {
                for x in 0..3 {
                    column.push(particle.position[x] * scales[k + x]);
                }
                k += 3;
            }
            if layout.use_normals[slot] {
                let normal = particle.normal.ok_or_else(|| {
                    SsmError::Configuration(format!(
                        "normals enabled for slot {slot} but particle {p} of domain {d} has none"
                    ))
                })?;
                for x in 0..3 {
                    column.push(normal[x] * scales[k + x]);
                }
                k += 3;
            }
            if n_attrs > 0 {
                if particle.attributes.len() != n_attrs {
                    return Err(SsmError::Configuration(format!(
                        "particle {p} of domain {d} has {} attributes, slot {slot} expects {n_attrs}",
                        particle.attributes.len()
                    )));
                }
                for (a, value) in particle.attributes.iter().enumerate() {
                    column.push(value * scales[k + a]);
                }
            }
        }
    }

    debug_assert_eq!(column.len(), layout.num_dims);
    Ok(column)
}

#[cfg(test)]
mod tests {
    use ssm_particles::{Domain, Particle};

    use super::*;

    fn two_shape_system() -> ParticleSystem {
        let mut ps = ParticleSystem::new();
        for s in 0..2 {
            let o = s as f64 * 10.0;
            ps.add_domain(Domain::new(vec![
                Particle::at([o, 1.0, 2.0])
                    .with_normal([0.0, 0.0, 1.0])
                    .with_attributes(vec![o + 0.5]),
                Particle::at([o, 3.0, 4.0])
                    .with_normal([0.0, 1.0, 0.0])
                    .with_attributes(vec![o + 0.25]),
            ]));
        }
        ps
    }

    fn full_config() -> EntropyConfig {
        EntropyConfig {
            attributes_per_domain: vec![1],
            use_xyz: vec![true],
            use_normals: vec![true],
            ..EntropyConfig::default()
        }
    }

    #[test]
    fn test_layout_dimensions() {
        let ps = two_shape_system();
        let layout = FeatureLayout::new(&full_config(), &ps).unwrap();
        assert_eq!(layout.num_samples, 2);
        assert_eq!(layout.num_dims, 2 * 7);
        assert_eq!(layout.row(0, 1), 7);
    }

    #[test]
    fn test_row_order_xyz_normal_attributes() {
        let ps = two_shape_system();
        let layout = FeatureLayout::new(&full_config(), &ps).unwrap();
        let y = assemble(&layout, &ps).unwrap();
        assert_eq!(
            y.column(1)[..7],
            [10.0, 1.0, 2.0, 0.0, 0.0, 1.0, 10.5]
        );
        assert_eq!(y.get(7 + 1, 0), 3.0);
        assert_eq!(y.get(13, 0), 0.25);
    }

    #[test]
    fn test_scales_applied() {
        let ps = two_shape_system();
        let mut cfg = full_config();
        cfg.attribute_scales = vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 4.0];
        let layout = FeatureLayout::new(&cfg, &ps).unwrap();
        let y = assemble(&layout, &ps).unwrap();
        assert_eq!(y.get(5, 0), 2.0);
        assert_eq!(y.get(6, 1), 42.0);
    }

    #[test]
    fn test_multi_domain_rows() {
        let mut ps = ParticleSystem::new();
        for s in 0..3 {
            let o = s as f64;
            ps.add_domain(Domain::from_positions(&[[o, 0.0, 0.0]]));
            ps.add_domain(Domain::from_positions(&[[0.0, o, 0.0], [0.0, 0.0, o]]));
        }
        let layout = FeatureLayout::new(&EntropyConfig::xyz_only(2), &ps).unwrap();
        assert_eq!(layout.num_samples, 3);
        assert_eq!(layout.num_dims, 9);
        assert_eq!(layout.locate(5), (2, 1));
        let y = assemble(&layout, &ps).unwrap();
        assert_eq!(y.get(0, 2), 2.0);
        assert_eq!(y.get(layout.row(1, 1) + 2, 2), 2.0);
    }

    #[test]
    fn test_missing_normal_is_configuration_error() {
        let mut ps = two_shape_system();
        ps.add_domain(Domain::from_positions(&[[0.0; 3], [1.0; 3]]));
        let mut cfg = full_config();
        cfg.attributes_per_domain = vec![0];
        let layout = FeatureLayout::new(&cfg, &ps).unwrap();
        assert!(matches!(
            assemble(&layout, &ps),
            Err(SsmError::Configuration(_))
        ));
    }

    #[test]
    fn test_attribute_count_mismatch() {
        let ps = two_shape_system();
        let mut cfg = full_config();
        cfg.attributes_per_domain = vec![2];
        let layout = FeatureLayout::new(&cfg, &ps).unwrap();
        assert!(assemble(&layout, &ps).is_err());
    }

    #[test]
    fn test_uneven_particle_counts_rejected() {
        let mut ps = ParticleSystem::new();
        ps.add_domain(Domain::from_positions(&[[0.0; 3], [1.0; 3]]));
        ps.add_domain(Domain::from_positions(&[[0.0; 3]]));
        let err = FeatureLayout::new(&EntropyConfig::xyz_only(1), &ps).unwrap_err();
        assert!(matches!(err, SsmError::Configuration(_)));
    }

    #[test]
    fn test_stale_layout_is_configuration_error() {
        let ps = two_shape_system();
        let layout = FeatureLayout::new(&EntropyConfig::default(), &ps).unwrap();

        let grown = ParticleSystem::with_domains(
            ps.domains()
                .iter()
                .map(|domain| {
                    let mut particles = domain.particles.clone();
                    particles.push(Particle::at([5.0; 3]));
                    Domain::new(particles)
                })
                .collect(),
        );
        assert!(matches!(
            assemble(&layout, &grown),
            Err(SsmError::Configuration(_))
        ));

        let shrunk = ParticleSystem::with_domains(vec![
            Domain::from_positions(&[[0.0; 3]]),
            Domain::from_positions(&[[1.0; 3]]),
        ]);
        assert!(matches!(
            assemble(&layout, &shrunk),
            Err(SsmError::Configuration(_))
        ));
    }

    #[test]
    fn test_short_config_arrays_rejected() {
        let ps = two_shape_system();
        let mut cfg = EntropyConfig::xyz_only(1);
        cfg.use_xyz.clear();
        assert!(matches!(
            FeatureLayout::new(&cfg, &ps),
            Err(SsmError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_population() {
        let ps = ParticleSystem::new();
        let layout = FeatureLayout::new(&EntropyConfig::default(), &ps).unwrap();
        assert_eq!(layout.num_samples, 0);
        assert_eq!(layout.num_dims, 0);
        let y = assemble(&layout, &ps).unwrap();
        assert!(y.is_empty());
    }
}
