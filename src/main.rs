//! Particula - headless demo
//!
//! Runs one body for a fixed number of frames and logs what happened.
//!
//! ```text
//! particula [cloth|sail|rope|fluid|fountain|snowball|projectile] [frames]
//! ```

use bevy::log::LogPlugin;
use bevy::prelude::*;
use particula::prelude::*;

const DEFAULT_FRAMES: u64 = 300;
const REPORT_EVERY: u64 = 100;

fn main() {
    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_else(|| "cloth".to_string());
    let frames = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_FRAMES);

    let mut app = App::new();
    app.add_plugins(LogPlugin::default());

    let Some(body) = body_by_name(&name) else {
        error!("unknown body '{name}', expected one of {BODY_NAMES:?} or sail");
        return;
    };
    app.add_plugins(DynamicsPlugin::with_params(preset(&name)))
        .insert_resource(ActiveBody(body))
        .add_systems(Update, report_progress.after(DynamicsSet));

    for _ in 0..frames {
        app.update();
    }

    let world = app.world();
    let body = &world.resource::<ActiveBody>().0;
    summarize(body.as_ref());
}

fn report_progress(state: Res<DynamicsState>, body: Res<ActiveBody>) {
    if state.frame == 0 || state.frame % REPORT_EVERY != 0 {
        return;
    }
    let system = body.0.system();
    info!(
        "{} frame {}: kinetic energy {:.3}",
        body.0.name(),
        state.frame,
        system.kinetic_energy()
    );
}

fn summarize(body: &dyn Body) {
    let system = body.system();
    let positions = system.positions();
    let (min, max) = positions.iter().fold(
        (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
        |(lo, hi), p| (lo.min(*p), hi.max(*p)),
    );
    info!(
        "{} after {} frames: {} particles, {} forces, bounds {min} .. {max}",
        body.name(),
        body.frame(),
        system.len(),
        system.forces().len(),
    );
    if system.springs().next().is_some() {
        info!("max spring stretch error {:.4}", max_stretch_error(system));
    }
}
