//! Identical launches integrated side by side against the closed-form trajectory.

use std::collections::VecDeque;

use bevy::prelude::*;

use super::{log_reset, Body, Environment};
use crate::dynamics::collider::Collider;
use crate::dynamics::integrator::Integrator;
use crate::dynamics::params::SimParams;
use crate::dynamics::particle::Particle;
use crate::dynamics::system::ParticleSystem;

const MAX_TRAIL_POINTS: usize = 2000;

const TRACK_COLORS: [Color; 4] = [
    Color::WHITE,
    Color::srgb(0.5, 0.0, 0.0),
    Color::srgb(0.0, 0.5, 0.0),
    Color::srgb(0.0, 0.0, 0.5),
];

#[derive(Clone, Debug, PartialEq)]
pub struct ProjectileConfig {
    /// Launch speed in m/s.
    pub speed: f32,
    /// Launch elevation in radians.
    pub angle: f32,
    /// Launch height above the floor.
    pub height: f32,
    /// Lateral distance between the outermost lanes and the center.
    pub lane_spread: f32,
    /// One numerical track per entry, drawn after the analytic lane.
    pub integrators: Vec<Integrator>,
}

impl Default for ProjectileConfig {
    fn default() -> Self {
        Self {
            speed: 30.0,
            angle: std::f32::consts::FRAC_PI_4,
            height: 0.0,
            lane_spread: 15.0,
            integrators: vec![Integrator::Euler, Integrator::Midpoint, Integrator::Rk4],
        }
    }
}

impl ProjectileConfig {
    fn launch_velocity(&self) -> Vec3 {
        self.speed * Vec3::new(self.angle.cos(), self.angle.sin(), 0.0)
    }

    /// Lateral offset of lane `i` out of `lanes`, spread evenly over
    /// `[-lane_spread, lane_spread]`.
    fn lane(&self, i: usize, lanes: usize) -> f32 {
        if lanes < 2 {
            return 0.0;
        }
        -self.lane_spread + 2.0 * self.lane_spread * i as f32 / (lanes - 1) as f32
    }
}

struct Track {
    integrator: Integrator,
    system: ParticleSystem,
    environment: Environment,
}

/// Lane 0 follows the closed-form solution, the other lanes one integrator each.
///
/// [`Body::system`] is a read-only view with one particle per lane, refreshed
/// every frame; edit lanes through [`Body::translate_particle`] and
/// [`Body::set_locked`].
pub struct ProjectileBody {
    config: ProjectileConfig,
    params: SimParams,
    tracks: Vec<Track>,
    view: ParticleSystem,
    trails: Vec<VecDeque<Vec3>>,
    colliders: Vec<Collider>,
    time: f32,
    frame: u64,
}

impl ProjectileBody {
    pub fn new(config: ProjectileConfig) -> Self {
        Self {
            config,
            params: SimParams::projectile(),
            tracks: Vec::new(),
            view: ParticleSystem::new(),
            trails: Vec::new(),
            colliders: Vec::new(),
            time: 0.0,
            frame: 0,
        }
    }

    pub fn config(&self) -> &ProjectileConfig {
        &self.config
    }

    pub fn elapsed(&self) -> f32 {
        self.time
    }

    /// Recorded positions of a lane, oldest first.
    pub fn trail(&self, lane: usize) -> Option<&VecDeque<Vec3>> {
        self.trails.get(lane)
    }

    /// Time the closed-form trajectory reaches the floor.
    pub fn ground_time(&self) -> f32 {
        let g = -self.params.gravity.y;
        let vy0 = self.config.launch_velocity().y;
        if g <= 0.0 {
            return f32::INFINITY;
        }
        let discriminant = (vy0 * vy0 + 2.0 * g * self.config.height).max(0.0);
        (vy0 + discriminant.sqrt()) / g
    }

    /// Closed-form position and velocity at `t`, frozen once it lands.
    pub fn analytic(&self, t: f32) -> (Vec3, Vec3) {
        let g = -self.params.gravity.y;
        let v0 = self.config.launch_velocity();
        let t = t.min(self.ground_time());
        let lanes = self.tracks.len() + 1;
        let position = Vec3::new(
            t * v0.x,
            self.config.height + t * v0.y - 0.5 * g * t * t,
            self.config.lane(0, lanes),
        );
        (position, Vec3::new(v0.x, v0.y - g * t, 0.0))
    }

    fn refresh_view(&mut self) {
        let (position, velocity) = self.analytic(self.time);
        let mut lanes = Vec::with_capacity(self.tracks.len() + 1);
        if let Some(p) = self.view.particle_mut(0) {
            p.prev_position = p.position;
            p.position = position;
            p.velocity = velocity;
        }
        lanes.push(position);
        for (k, track) in self.tracks.iter().enumerate() {
            if let (Some(src), Some(dst)) = (track.system.particle(0), self.view.particle_mut(k + 1)) {
                *dst = Particle { id: k + 1, ..src.clone() };
                lanes.push(src.position);
            }
        }
        for (trail, position) in self.trails.iter_mut().zip(lanes) {
            trail.push_back(position);
            if trail.len() > MAX_TRAIL_POINTS {
                trail.pop_front();
            }
        }
    }
}

impl Body for ProjectileBody {
    fn name(&self) -> &'static str {
        "projectile"
    }

    fn reset(&mut self, params: &SimParams) {
        self.params = params.validated();
        self.time = 0.0;
        self.frame = 0;
        self.view.clear();
        self.tracks.clear();

        let dt = self.params.time_step;
        let lanes = self.config.integrators.len() + 1;
        let velocity = self.config.launch_velocity();
        let start = |lane: usize| Vec3::new(0.0, self.config.height, self.config.lane(lane, lanes));
        let color = |lane: usize| TRACK_COLORS[lane % TRACK_COLORS.len()];

        self.view
            .add_particle(Particle::launched(start(0), velocity, dt).with_color(color(0)));
        for (k, &integrator) in self.config.integrators.iter().enumerate() {
            let particle = Particle::launched(start(k + 1), velocity, dt).with_color(color(k + 1));
            let mut system = ParticleSystem::new();
            let i = system.add_particle(particle.clone());
            let environment = Environment::attach(&mut system, &self.params, &[i]);
            self.tracks.push(Track {
                integrator,
                system,
                environment,
            });
            self.view.add_particle(particle);
        }
        self.trails = vec![VecDeque::new(); lanes];
        self.colliders = vec![Collider::floor(0.0)];
        log_reset(self.name(), &self.view, &self.colliders);
    }

    fn update(&mut self) {
        let dt = self.params.time_step;
        self.time += dt;
        for track in &mut self.tracks {
            track.integrator.step(&mut track.system, dt);
            for p in track.system.particles_mut() {
                Collider::resolve_all(&self.colliders, p, self.params.restitution, self.params.friction, dt);
            }
        }
        self.refresh_view();
        self.frame += 1;
    }

    fn system(&self) -> &ParticleSystem {
        &self.view
    }

    /// Changes made here are overwritten on the next frame.
    fn system_mut(&mut self) -> &mut ParticleSystem {
        &mut self.view
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
        for track in &mut self.tracks {
            track.environment.sync(&mut track.system, &self.params);
        }
    }

    fn frame(&self) -> u64 {
        self.frame
    }

    fn translate_particle(&mut self, i: usize, offset: Vec3) -> bool {
        let Some(track) = i.checked_sub(1).and_then(|k| self.tracks.get_mut(k)) else {
            return false;
        };
        let moved = track.system.translate_particle(0, offset);
        if let Some(p) = self.view.particle_mut(i) {
            p.position += offset;
            p.prev_position += offset;
        }
        moved
    }

    fn set_locked(&mut self, i: usize, locked: bool) -> bool {
        let Some(track) = i.checked_sub(1).and_then(|k| self.tracks.get_mut(k)) else {
            return false;
        };
        self.view.set_locked(i, locked);
        track.system.set_locked(0, locked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projectile() -> ProjectileBody {
        let mut body = ProjectileBody::new(ProjectileConfig::default());
        body.initialize(&SimParams::projectile());
        body
    }

    #[test]
    fn test_lanes() {
        let body = projectile();
        let z: Vec<f32> = body.system().particles().iter().map(|p| p.position.z).collect();
        assert_eq!(z, vec![-15.0, -5.0, 5.0, 15.0]);
    }

    #[test]
    fn test_higher_order_tracks_follow_closed_form() {
        let mut body = projectile();
        for _ in 0..50 {
            body.update();
        }
        let exact = body.analytic(body.elapsed()).0;
        let view = body.system().particles();

        assert_eq!(view[0].position, exact);
        for lane in [2, 3] {
            let p = view[lane].position;
            assert!((p.truncate() - exact.truncate()).length() < 1e-2, "lane {lane} at {p:?}");
        }
        // Euler lags behind by about |g| dt t / 2.
        assert!((view[1].position.y - exact.y).abs() > 1e-2);
    }

    #[test]
    fn test_closed_form_lands_on_floor() {
        let mut body = projectile();
        let landing = body.ground_time();
        while body.elapsed() < landing + 1.0 {
            body.update();
        }
        let p = body.system().particles()[0].position;
        assert!(p.y.abs() < 1e-2, "analytic lane ended at {p:?}");
        assert!((p.x - landing * 30.0 * std::f32::consts::FRAC_PI_4.cos()).abs() < 1e-2);
    }

    #[test]
    fn test_numeric_tracks_bounce_off_floor() {
        let mut body = projectile();
        for _ in 0..800 {
            body.update();
            for p in body.system().particles() {
                assert!(p.position.y > -1e-3, "{p:?} fell through");
            }
        }
        assert_eq!(body.trail(1).map(|t| t.len()), Some(800));
    }

    #[test]
    fn test_locking_a_lane() {
        let mut body = projectile();
        assert!(body.set_locked(1, true));
        assert!(!body.set_locked(0, true));
        let before = body.system().particles()[1].position;
        body.update();
        assert_eq!(body.system().particles()[1].position, before);
        assert!(body.translate_particle(2, Vec3::Y));
        assert!(!body.translate_particle(9, Vec3::Y));
    }
}
