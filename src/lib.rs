pub mod anchor_mod;
pub mod fsm;
pub mod gizmo;
pub mod history;
pub mod modes;
pub mod picking;
pub mod scene;
pub mod selection;
pub mod signals;
pub mod snapping;
pub mod transform_mod;
pub mod viewport;
pub mod visual_aids;

use bevy::prelude::*;
use bevy_infinite_grid::InfiniteGridPlugin;

/// Tag for entities the editor spawns for itself. They never appear in pick
/// results and are not part of the scene being edited.
#[derive(Component, Default)]
pub struct EditorEntity;

pub struct MalletPlugin;

impl Plugin for MalletPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(InfiniteGridPlugin)
            .init_resource::<signals::SignalQueue>()
            .init_resource::<signals::InputModifiers>()
            .init_resource::<signals::DragTracker>()
            .init_resource::<viewport::EditorViewport>()
            .init_resource::<scene::SceneIdRegistry>()
            .init_resource::<selection::Selection>()
            .init_resource::<history::ActionHistory>()
            .init_resource::<snapping::SnapSettings>()
            .init_resource::<snapping::GridSettings>()
            .init_resource::<gizmo::TransformSpace>()
            .init_resource::<visual_aids::VisualAids>()
            .init_resource::<modes::ModeStack>()
            .init_resource::<modes::Cursor3d>()
            .add_observer(selection::on_selected_removed)
            .add_systems(Startup, snapping::spawn_reference_grid)
            .add_systems(
                Update,
                (
                    signals::collect_input_signals,
                    modes::handle_mode_keys,
                    history::handle_undo_redo_keys,
                    snapping::sync_grid_settings,
                    modes::drive_modes,
                )
                    .chain(),
            );
    }
}
