//! Application root owning every editing component.
//!
//! Input flows in through [`Editor::handle_pointer`] and [`Editor::handle_key`];
//! every finished edit becomes one history snapshot and, when collaborating,
//! one batch of sync operations. The host paints with [`Editor::render`].

use crate::background::{BackgroundError, BackgroundLoader, FetchError, FetchTicket, LoadOutcome};
use crate::clock::Clock;
use crate::config::EditorConfig;
use crate::element::{Element, ElementId, ElementPatch};
use crate::export::{ExportError, export_svg};
use crate::geometry::union_bounds;
use crate::history::History;
use crate::input::{KeyInput, PointerEvent, PointerPhase};
use crate::render::{RenderLayer, RenderReconciler};
use crate::scene::{Scene, Snapshot};
use crate::selection::Selection;
use crate::shortcuts::{Action, ShortcutRegistry};
use crate::sync::{CursorPosition, Identity, SyncEngine, SyncNotice, Transport};
use crate::tools::{ColorTarget, Commit, ToolEffect, ToolKind, ToolManager};
use crate::viewport::Viewport;
use std::rc::Rc;

/// The editor: scene, view, selection, tools, history and collaboration.
#[derive(Debug)]
pub struct Editor {
    config: EditorConfig,
    scene: Scene,
    viewport: Viewport,
    selection: Selection,
    tools: ToolManager,
    history: History,
    background: BackgroundLoader,
    editing_background: bool,
    sync: Option<SyncEngine>,
    renderer: RenderReconciler,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl Editor {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            scene: Scene::new(),
            viewport: Viewport::with_limits(config.min_zoom, config.max_zoom),
            selection: Selection::new(),
            tools: ToolManager::new(&config),
            history: History::new(config.max_history),
            background: BackgroundLoader::new(),
            editing_background: false,
            sync: None,
            renderer: RenderReconciler::new(),
            config,
        }
    }

    /// Start collaborating through `engine`.
    pub fn with_sync(mut self, engine: SyncEngine) -> Self {
        self.attach_sync(engine);
        self
    }

    /// Join `room` over `transport` using the sync settings from this
    /// editor's configuration.
    pub fn collaborate(
        &mut self,
        transport: Box<dyn Transport>,
        clock: Rc<dyn Clock>,
        identity: Identity,
        room: impl Into<String>,
    ) {
        let engine = SyncEngine::new(transport, clock, self.config.sync.clone(), identity, room);
        self.attach_sync(engine);
    }

    pub fn attach_sync(&mut self, engine: SyncEngine) {
        log::info!("collaboration attached to room {}", engine.room());
        self.sync = Some(engine);
    }

    /// Stop collaborating. The scene stays as it is.
    pub fn detach_sync(&mut self) -> Option<SyncEngine> {
        self.sync.take()
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn tools(&self) -> &ToolManager {
        &self.tools
    }

    pub fn tools_mut(&mut self) -> &mut ToolManager {
        &mut self.tools
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn sync(&self) -> Option<&SyncEngine> {
        self.sync.as_ref()
    }

    pub fn sync_mut(&mut self) -> Option<&mut SyncEngine> {
        self.sync.as_mut()
    }

    pub fn background(&self) -> &BackgroundLoader {
        &self.background
    }

    pub fn set_tool(&mut self, tool: Option<ToolKind>) {
        self.tools.set_tool(tool);
    }

    // --- Background artwork ------------------------------------------------

    pub fn is_editing_background(&self) -> bool {
        self.editing_background
    }

    /// Toggle background-editing mode. Entering it clears the selection.
    pub fn set_background_editing(&mut self, editing: bool) {
        if editing && !self.editing_background {
            self.tools.cancel();
            self.set_selection(Vec::new());
        }
        self.editing_background = editing;
    }

    /// Start loading artwork; the newest request supersedes older ones.
    pub fn load_background(&mut self, url: impl Into<String>) -> FetchTicket {
        self.background.begin(url)
    }

    pub fn retry_background(&mut self) -> Option<FetchTicket> {
        self.background.retry()
    }

    pub fn complete_background(
        &mut self,
        ticket: FetchTicket,
        result: Result<String, FetchError>,
    ) -> Result<LoadOutcome, BackgroundError> {
        self.background.complete(ticket, result)
    }

    // --- Input -------------------------------------------------------------

    /// Route a pointer event in screen coordinates. Returns true if anything
    /// visible changed.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> bool {
        if self.editing_background {
            return false;
        }
        let point = self.viewport.screen_to_world(event.position);

        if let Some(sync) = &mut self.sync {
            sync.update_user_cursor(CursorPosition::new(point.x, point.y));
        }

        let effect = match event.phase {
            PointerPhase::Down => {
                self.tools
                    .pointer_down(point, event.modifiers, &self.scene, &mut self.selection)
            }
            PointerPhase::Move => self.tools.pointer_move(point),
            PointerPhase::Up => self.tools.pointer_up(point),
        };
        self.apply_effect(effect)
    }

    fn apply_effect(&mut self, effect: ToolEffect) -> bool {
        match effect {
            ToolEffect::None => false,
            ToolEffect::Preview => true,
            ToolEffect::SelectionChanged => {
                self.selection_changed();
                true
            }
            ToolEffect::Drag(patches) => {
                for (id, patch) in &patches {
                    self.scene.update_element(id, patch);
                }
                self.refresh_bounds();
                true
            }
            ToolEffect::Commit(Commit::Create(element)) => {
                self.commit_create(element);
                true
            }
            ToolEffect::Commit(Commit::Move(moves)) => {
                self.commit_moves(&moves);
                true
            }
        }
    }

    /// Route a key press. Returns true if a shortcut fired.
    pub fn handle_key(&mut self, input: &KeyInput) -> bool {
        let Some(action) = ShortcutRegistry::lookup(input) else {
            return false;
        };
        log::debug!("shortcut {:?}", action);
        match action {
            Action::SelectTool(tool) => self.set_tool(Some(tool)),
            Action::Undo => {
                self.undo();
            }
            Action::Redo => {
                self.redo();
            }
            Action::DeleteSelection => {
                self.delete_selected();
            }
            Action::Escape => {
                self.tools.cancel();
                self.set_selection(Vec::new());
            }
        }
        true
    }

    // --- Edits -------------------------------------------------------------

    fn commit_create(&mut self, element: Element) {
        log::debug!("creating {} {}", element.kind, element.id);
        match &mut self.sync {
            Some(sync) => {
                sync.create_element(&mut self.scene, &mut self.history, element);
            }
            None => {
                self.scene.add_element(element);
                self.history.add_to_history(&self.scene);
            }
        }
    }

    fn commit_moves(&mut self, moves: &[(ElementId, ElementPatch)]) {
        match &mut self.sync {
            Some(sync) => {
                sync.move_elements(&mut self.scene, &mut self.history, moves);
            }
            None => {
                for (id, patch) in moves {
                    self.scene.update_element(id, patch);
                }
                self.history.add_to_history(&self.scene);
            }
        }
        self.refresh_bounds();
    }

    /// Set `target` as the tool color and apply it to every selected element.
    pub fn apply_color(&mut self, target: ColorTarget, color: &str) {
        self.tools.set_color(target, color);
        let edits: Vec<(ElementId, ElementPatch)> = self
            .selection
            .ids()
            .iter()
            .filter(|id| self.scene.contains(id))
            .map(|id| (id.clone(), ElementPatch::attributes([(target.attribute(), color)])))
            .collect();
        if edits.is_empty() {
            return;
        }
        match &mut self.sync {
            Some(sync) => {
                sync.update_elements(&mut self.scene, &mut self.history, &edits);
            }
            None => {
                for (id, patch) in &edits {
                    self.scene.update_element(id, patch);
                }
                self.history.add_to_history(&self.scene);
            }
        }
    }

    /// Delete every selected element as one undo step.
    pub fn delete_selected(&mut self) -> usize {
        let ids: Vec<ElementId> = self.selection.ids().iter().cloned().collect();
        let removed = self.remove_elements(&ids);
        self.set_selection(Vec::new());
        removed
    }

    /// Delete one element and drop it from the selection.
    pub fn remove_element(&mut self, id: &str) -> bool {
        self.remove_elements(&[id.to_string()]) == 1
    }

    fn remove_elements(&mut self, ids: &[ElementId]) -> usize {
        let removed = match &mut self.sync {
            Some(sync) => sync.delete_elements(&mut self.scene, &mut self.history, ids),
            None => {
                let removed = ids
                    .iter()
                    .filter(|id| self.scene.remove_element(id).is_some())
                    .count();
                if removed > 0 {
                    self.history.add_to_history(&self.scene);
                }
                removed
            }
        };
        if removed > 0 {
            self.prune_selection();
        }
        removed
    }

    pub fn undo(&mut self) -> bool {
        if !self.history.undo(&mut self.scene) {
            return false;
        }
        self.after_history();
        true
    }

    pub fn redo(&mut self) -> bool {
        if !self.history.redo(&mut self.scene) {
            return false;
        }
        self.after_history();
        true
    }

    fn after_history(&mut self) {
        if let Some(sync) = &mut self.sync {
            sync.reconcile_after_history(&mut self.scene);
        }
        self.prune_selection();
    }

    /// Replace the whole scene, e.g. from a saved document.
    pub fn import_state(&mut self, snapshot: Snapshot) {
        self.scene.import_state(snapshot);
        self.history.reset_to(&self.scene);
        self.set_selection(Vec::new());
    }

    pub fn export_state(&self) -> Snapshot {
        self.scene.export_state()
    }

    /// Standalone SVG of the canvas: the background artwork under the drawing,
    /// sized by `canvas_width` x `canvas_height`.
    pub fn export_svg(&self) -> Result<String, ExportError> {
        export_svg(
            &self.scene,
            self.background.markup(),
            self.config.canvas_width,
            self.config.canvas_height,
        )
    }

    /// Remove every element for all participants. History is cleared, so the
    /// reset cannot be undone.
    pub fn reset_canvas(&mut self) -> usize {
        self.tools.cancel();
        let ids = self.scene.ids().to_vec();
        let removed = self.remove_elements(&ids);
        self.history.reset_to(&self.scene);
        self.set_selection(Vec::new());
        log::info!("canvas reset, {} elements removed", removed);
        removed
    }

    // --- Selection ---------------------------------------------------------

    pub fn set_selection(&mut self, ids: Vec<ElementId>) {
        self.selection.set_selected(ids);
        self.selection_changed();
    }

    fn selection_changed(&mut self) {
        self.refresh_bounds();
        if let Some(sync) = &mut self.sync {
            sync.update_selection(self.selection.ids().iter().cloned().collect());
        }
    }

    fn refresh_bounds(&mut self) {
        let bounds = union_bounds(self.selection.ids().iter().filter_map(|id| self.scene.get(id)));
        self.selection.set_bounds(bounds);
    }

    /// Drop selected ids that no longer exist in the scene.
    fn prune_selection(&mut self) {
        let before = self.selection.len();
        let scene = &self.scene;
        self.selection
            .update(|ids| ids.iter().filter(|id| scene.contains(id)).cloned().collect());
        if self.selection.len() != before {
            self.selection_changed();
        } else {
            self.refresh_bounds();
        }
    }

    // --- Collaboration and output -------------------------------------------

    /// Drain collaboration events. Call once per frame.
    pub fn poll_sync(&mut self) -> Vec<SyncNotice> {
        let Some(sync) = &mut self.sync else {
            return Vec::new();
        };
        let notices = sync.poll(&mut self.scene, &mut self.history);
        if notices.iter().any(SyncNotice::changes_scene) {
            self.prune_selection();
        }
        notices
    }

    /// Periodic maintenance (presence expiry).
    pub fn tick(&mut self) {
        if let Some(sync) = &mut self.sync {
            sync.tick();
        }
    }

    /// Push scene, selection and preview changes to the rendering layer.
    pub fn render(&mut self, layer: &mut dyn RenderLayer) {
        self.renderer.sync_scene(&self.scene, layer);
        self.renderer.sync_selection(&self.selection, layer);
        layer.set_preview(self.tools.preview().as_deref());
    }
}
