//! Keyboard shortcut registry and lookup.

use crate::input::KeyInput;
use crate::tools::ToolKind;

/// Editor action bound to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SelectTool(ToolKind),
    Undo,
    Redo,
    DeleteSelection,
    /// Cancel the pen polygon, or clear the selection.
    Escape,
}

/// A keyboard shortcut definition.
#[derive(Debug, Clone)]
pub struct Shortcut {
    pub key: &'static str,
    pub command: bool,
    pub shift: bool,
    pub action: Action,
    pub description: &'static str,
}

impl Shortcut {
    pub const fn new(
        key: &'static str,
        command: bool,
        shift: bool,
        action: Action,
        description: &'static str,
    ) -> Self {
        Self {
            key,
            command,
            shift,
            action,
            description,
        }
    }

    /// Format the shortcut for display (e.g., "Ctrl+Z").
    pub fn format(&self) -> String {
        let mut parts = Vec::new();
        if self.command {
            parts.push("Ctrl/Cmd");
        }
        if self.shift {
            parts.push("Shift");
        }
        parts.push(self.key);
        parts.join("+")
    }

    fn matches(&self, input: &KeyInput) -> bool {
        self.key.eq_ignore_ascii_case(&input.key)
            && self.command == input.modifiers.command()
            && (!self.command || self.shift == input.modifiers.shift)
    }
}

/// Registry of all keyboard shortcuts.
pub struct ShortcutRegistry;

impl ShortcutRegistry {
    /// Get all registered shortcuts.
    pub fn all() -> Vec<Shortcut> {
        vec![
            Shortcut::new("V", false, false, Action::SelectTool(ToolKind::Select), "Select tool"),
            Shortcut::new("B", false, false, Action::SelectTool(ToolKind::Brush), "Brush tool"),
            Shortcut::new("P", false, false, Action::SelectTool(ToolKind::Pen), "Pen tool"),
            Shortcut::new("R", false, false, Action::SelectTool(ToolKind::Rectangle), "Rectangle tool"),
            Shortcut::new("E", false, false, Action::SelectTool(ToolKind::Ellipse), "Ellipse tool"),
            Shortcut::new("Z", true, false, Action::Undo, "Undo"),
            Shortcut::new("Z", true, true, Action::Redo, "Redo"),
            Shortcut::new("Y", true, false, Action::Redo, "Redo"),
            Shortcut::new("Delete", false, false, Action::DeleteSelection, "Delete selected elements"),
            Shortcut::new("Backspace", false, false, Action::DeleteSelection, "Delete selected elements"),
            Shortcut::new("Escape", false, false, Action::Escape, "Cancel polygon or clear selection"),
        ]
    }

    /// Resolve a key press to an action.
    ///
    /// Keys typed into a focused text field never trigger shortcuts.
    pub fn lookup(input: &KeyInput) -> Option<Action> {
        if input.text_input_focused {
            return None;
        }
        Self::all()
            .into_iter()
            .find(|shortcut| shortcut.matches(input))
            .map(|shortcut| shortcut.action)
    }
}
