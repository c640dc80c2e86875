//! Rectangular cloth held by pinned particles.

use bevy::prelude::*;

use super::{log_reset, step_constrained, sync_springs, Body, Environment};
use crate::dynamics::collider::Collider;
use crate::dynamics::contact::{resolve_self_collisions, SelfCollision};
use crate::dynamics::force::{Spring, SpringKind};
use crate::dynamics::params::SimParams;
use crate::dynamics::particle::Particle;
use crate::dynamics::spatial::SpatialHash;
use crate::dynamics::system::ParticleSystem;

const PIN_COLOR: Color = Color::srgb(0.1, 0.1, 0.1);

/// How the mesh is laid out and pinned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClothLayout {
    /// Horizontal sheet in the XZ plane pinned at the two corners of its first row.
    #[default]
    Drape,
    /// Vertical sheet in the XY plane pinned at its four corners and at the
    /// thirds of its top edge.
    Sail,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClothConfig {
    pub columns: u32,
    pub rows: u32,
    /// Rest distance between neighboring particles.
    pub spacing: f32,
    /// Position of particle `(0, 0)`.
    pub origin: Vec3,
    pub layout: ClothLayout,
}

impl Default for ClothConfig {
    fn default() -> Self {
        Self {
            columns: 20,
            rows: 20,
            spacing: 1.0,
            origin: Vec3::new(-10.0, 50.0, -10.0),
            layout: ClothLayout::Drape,
        }
    }
}

impl ClothConfig {
    pub fn sail() -> Self {
        Self {
            columns: 21,
            rows: 15,
            origin: Vec3::new(-10.0, 40.0, 0.0),
            layout: ClothLayout::Sail,
            ..Self::default()
        }
    }

    fn index(&self, column: u32, row: u32) -> usize {
        (row * self.columns + column) as usize
    }

    fn position(&self, column: u32, row: u32) -> Vec3 {
        let (c, r) = (column as f32, row as f32);
        let offset = match self.layout {
            ClothLayout::Drape => Vec3::new(c, 0.0, r),
            ClothLayout::Sail => Vec3::new(c, -r, 0.0),
        };
        self.origin + offset * self.spacing
    }

    fn pins(&self) -> Vec<usize> {
        let (w, h) = (self.columns, self.rows);
        let mut pins = match self.layout {
            ClothLayout::Drape => vec![self.index(0, 0), self.index(w - 1, 0)],
            ClothLayout::Sail => vec![
                self.index(0, 0),
                self.index((w / 3).saturating_sub(1), 0),
                self.index((2 * w / 3).saturating_sub(1), 0),
                self.index(w - 1, 0),
                self.index(0, h - 1),
                self.index(w - 1, h - 1),
            ],
        };
        pins.sort_unstable();
        pins.dedup();
        pins
    }
}

/// Mass-spring cloth integrated with Verlet and kept in shape by relaxation.
pub struct ClothBody {
    config: ClothConfig,
    params: SimParams,
    system: ParticleSystem,
    colliders: Vec<Collider>,
    environment: Option<Environment>,
    hash: SpatialHash,
    frame: u64,
}

impl ClothBody {
    pub fn new(config: ClothConfig) -> Self {
        let config = ClothConfig {
            columns: config.columns.max(2),
            rows: config.rows.max(2),
            ..config
        };
        let count = (config.columns * config.rows) as usize;
        Self {
            config,
            params: SimParams::cloth(),
            system: ParticleSystem::with_capacity(count),
            colliders: Vec::new(),
            environment: None,
            hash: SpatialHash::new(1.0, count),
            frame: 0,
        }
    }

    pub fn config(&self) -> &ClothConfig {
        &self.config
    }

    /// Unlock every pinned particle.
    pub fn release_pins(&mut self) {
        for i in 0..self.system.len() {
            self.system.set_locked(i, false);
        }
    }

    fn build_mesh(&mut self) {
        let config = self.config;
        for row in 0..config.rows {
            for column in 0..config.columns {
                self.system.add_particle(
                    Particle::new(config.position(column, row)).with_grid_coord(column, row),
                );
            }
        }
        for i in config.pins() {
            self.system.set_locked(i, true);
            if let Some(p) = self.system.particle_mut(i) {
                p.color = PIN_COLOR;
            }
        }

        let (ke, kd) = (self.params.spring_stiffness, self.params.spring_damping);
        let s = config.spacing;
        let link = |system: &mut ParticleSystem, a: (u32, u32), b: (u32, u32), kind, rest| {
            let spring = Spring::new(config.index(a.0, a.1), config.index(b.0, b.1), rest, ke, kd);
            system.add_spring(spring.with_kind(kind));
        };
        for row in 0..config.rows {
            for column in 0..config.columns {
                let right = column + 1 < config.columns;
                let down = row + 1 < config.rows;
                if right {
                    link(&mut self.system, (column, row), (column + 1, row), SpringKind::Stretch, s);
                }
                if down {
                    link(&mut self.system, (column, row), (column, row + 1), SpringKind::Stretch, s);
                }
                if right && down {
                    let diagonal = s * std::f32::consts::SQRT_2;
                    link(&mut self.system, (column, row), (column + 1, row + 1), SpringKind::Shear, diagonal);
                    link(&mut self.system, (column + 1, row), (column, row + 1), SpringKind::Shear, diagonal);
                }
                if column + 2 < config.columns {
                    link(&mut self.system, (column, row), (column + 2, row), SpringKind::Bend, 2.0 * s);
                }
                if row + 2 < config.rows {
                    link(&mut self.system, (column, row), (column, row + 2), SpringKind::Bend, 2.0 * s);
                }
            }
        }
    }
}

impl Body for ClothBody {
    fn name(&self) -> &'static str {
        match self.config.layout {
            ClothLayout::Drape => "cloth",
            ClothLayout::Sail => "sail",
        }
    }

    fn reset(&mut self, params: &SimParams) {
        self.params = params.validated();
        self.system.clear();
        self.frame = 0;

        self.build_mesh();
        let all: Vec<usize> = (0..self.system.len()).collect();
        self.environment = Some(Environment::attach(&mut self.system, &self.params, &all));

        self.colliders = vec![
            Collider::floor(0.0),
            Collider::sphere(Vec3::new(20.0, 0.0, 20.0), 20.0),
            Collider::aabb(Vec3::ZERO, Vec3::new(15.0, 15.0, 30.0)),
        ];
        self.hash = SpatialHash::new(self.params.cloth_thickness, self.system.len());
        log_reset(self.name(), &self.system, &self.colliders);
    }

    fn update(&mut self) {
        let params = &self.params;
        let settings = SelfCollision {
            thickness: params.cloth_thickness,
            spacing: self.config.spacing,
            friction: params.self_collision_friction,
        };
        if params.self_collision {
            let positions = self.system.positions();
            self.hash.rebuild(&positions);
            self.hash.query_all(&positions, params.cloth_thickness);
        }

        let hash = &self.hash;
        step_constrained(&mut self.system, &self.colliders, params, |system| {
            if params.self_collision {
                resolve_self_collisions(system.particles_mut(), hash, &settings);
            }
        });
        self.frame += 1;
    }

    fn system(&self) -> &ParticleSystem {
        &self.system
    }

    fn system_mut(&mut self) -> &mut ParticleSystem {
        &mut self.system
    }

    fn colliders(&self) -> &[Collider] {
        &self.colliders
    }

    fn colliders_mut(&mut self) -> &mut [Collider] {
        &mut self.colliders
    }

    fn params(&self) -> &SimParams {
        &self.params
    }

    fn set_params(&mut self, params: &SimParams) {
        self.params = params.validated();
        if let Some(environment) = self.environment {
            environment.sync(&mut self.system, &self.params);
        }
        sync_springs(&mut self.system, &self.params);
    }

    fn frame(&self) -> u64 {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::constraint::max_stretch_error;
    use crate::dynamics::force::Force;

    fn small(layout: ClothLayout) -> ClothBody {
        let mut body = ClothBody::new(ClothConfig {
            columns: 4,
            rows: 3,
            layout,
            ..ClothConfig::default()
        });
        body.initialize(&SimParams::cloth());
        body
    }

    fn count(system: &ParticleSystem, kind: SpringKind) -> usize {
        system.springs().filter(|s| s.kind == kind).count()
    }

    #[test]
    fn test_mesh_topology() {
        let body = small(ClothLayout::Drape);
        let system = body.system();

        assert_eq!(system.len(), 12);
        assert_eq!(count(system, SpringKind::Stretch), 17);
        assert_eq!(count(system, SpringKind::Shear), 12);
        assert_eq!(count(system, SpringKind::Bend), 10);

        let locked: Vec<usize> = system.particles().iter().filter(|p| p.locked).map(|p| p.id).collect();
        assert_eq!(locked, vec![0, 3]);
        assert_eq!(system.particles()[5].grid_coord, Some(UVec2::new(1, 1)));
    }

    #[test]
    fn test_sail_is_vertical() {
        let body = small(ClothLayout::Sail);
        let p = &body.system().particles()[body.config().index(1, 2)];

        assert_eq!(p.position, body.config().origin + Vec3::new(1.0, -2.0, 0.0));
        assert!(body.system().particles()[8].locked);
        assert!(body.system().particles()[11].locked);
    }

    #[test]
    fn test_springs_stay_in_band_while_falling() {
        let mut body = ClothBody::new(ClothConfig::default());
        body.initialize(&SimParams::cloth());
        for _ in 0..20 {
            body.update();
        }

        assert!(max_stretch_error(body.system()) < 0.15);
        let free = &body.system().particles()[body.config().index(10, 19)];
        assert!(free.position.y < 50.0);
    }

    #[test]
    fn test_set_params_updates_springs_and_gravity() {
        let mut body = small(ClothLayout::Drape);
        let params = SimParams::cloth()
            .with_springs(42.0, 0.25)
            .with_gravity(Vec3::ZERO);
        body.set_params(&params);

        assert!(body.system().springs().all(|s| s.stiffness == 42.0 && s.damping == 0.25));
        let gravity = body
            .system()
            .forces()
            .iter()
            .find_map(|f| match f {
                Force::Acceleration(a) => Some(a.acceleration),
                _ => None,
            });
        assert_eq!(gravity, Some(Vec3::ZERO));
    }

    #[test]
    fn test_release_pins_lets_cloth_fall() {
        let mut body = small(ClothLayout::Drape);
        body.release_pins();
        body.update();

        assert!(body.system().particles().iter().all(|p| p.position.y < 50.0));
    }

    #[test]
    fn test_reset_is_reproducible() {
        let mut body = small(ClothLayout::Drape);
        let initial = body.system().positions();
        for _ in 0..5 {
            body.update();
        }
        body.reset(&SimParams::cloth());

        assert_eq!(body.system().positions(), initial);
        assert_eq!(body.frame(), 0);
    }
}
