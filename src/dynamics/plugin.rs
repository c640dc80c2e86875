//! Bevy plugin driving the active body.

use bevy::prelude::*;

use super::body::Body;
use super::params::SimParams;

/// Plugin that advances an [`ActiveBody`] once per `Update`.
///
/// The application inserts the body; the plugin owns [`SimParams`] and
/// [`DynamicsState`].
///
/// # Example
///
/// ```rust,no_run
/// use bevy::prelude::*;
/// use particula::prelude::*;
///
/// let Some(body) = body_by_name("rope") else { return };
/// App::new()
///     .add_plugins(DynamicsPlugin::with_params(preset("rope")))
///     .insert_resource(ActiveBody(body))
///     .run();
/// ```
#[derive(Default)]
pub struct DynamicsPlugin {
    params: SimParams,
}

impl DynamicsPlugin {
    pub fn with_params(params: SimParams) -> Self {
        Self { params }
    }
}

impl Plugin for DynamicsPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.params.clone())
            .init_resource::<DynamicsState>();

        app.add_systems(
            Update,
            (reset_body, sync_params, step_body)
                .chain()
                .in_set(DynamicsSet),
        );
    }
}

/// Systems that reset, configure and advance the active body.
#[derive(SystemSet, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DynamicsSet;

/// The body being simulated.
#[derive(Resource)]
pub struct ActiveBody(pub Box<dyn Body>);

/// Run control shared with input handlers.
#[derive(Resource, Clone, Debug, Default, PartialEq, Eq)]
pub struct DynamicsState {
    pub paused: bool,
    /// Advance exactly one frame while paused.
    pub step_requested: bool,
    /// Rebuild the body from the current [`SimParams`] on the next update.
    pub reset_requested: bool,
    /// Frames advanced since the last reset.
    pub frame: u64,
}

impl DynamicsState {
    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn request_step(&mut self) {
        self.step_requested = true;
    }

    pub fn request_reset(&mut self) {
        self.reset_requested = true;
    }
}

fn reset_body(
    params: Res<SimParams>,
    mut state: ResMut<DynamicsState>,
    body: Option<ResMut<ActiveBody>>,
) {
    if !state.reset_requested {
        return;
    }
    state.reset_requested = false;
    if let Some(mut body) = body {
        body.0.reset(&params);
        state.frame = 0;
    }
}

/// Push edited parameters into the body without rebuilding it.
fn sync_params(params: Res<SimParams>, body: Option<ResMut<ActiveBody>>) {
    let Some(mut body) = body else {
        return;
    };
    if params.is_changed() || body.is_added() {
        body.0.set_params(&params);
    }
}

fn step_body(mut state: ResMut<DynamicsState>, body: Option<ResMut<ActiveBody>>) {
    let Some(mut body) = body else {
        return;
    };
    if state.paused && !state.step_requested {
        return;
    }
    state.step_requested = false;
    body.0.update();
    state.frame += 1;
}
