// src/menu.rs - Two-level menu driven by headset mental commands
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentalCommand {
    Push,
    Pull,
    Lift,
}

impl MentalCommand {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "push" => Some(Self::Push),
            "pull" => Some(Self::Pull),
            "lift" => Some(Self::Lift),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::Push => 0,
            Self::Pull => 1,
            Self::Lift => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    StartDrawing,
    StopDrawing,
    ToggleEraser,
    Undo,
    Redo,
    ClearCanvas,
    Recalibrate,
    ResetGaze,
}

impl MenuAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::StartDrawing => "Start drawing",
            Self::StopDrawing => "Stop drawing",
            Self::ToggleEraser => "Toggle eraser",
            Self::Undo => "Undo",
            Self::Redo => "Redo",
            Self::ClearCanvas => "Clear canvas",
            Self::Recalibrate => "Recalibrate",
            Self::ResetGaze => "Reset gaze",
        }
    }
}

pub struct MenuSection {
    pub title: &'static str,
    pub actions: &'static [MenuAction],
}

pub static MENU_SECTIONS: [MenuSection; 3] = [
    MenuSection {
        title: "Draw",
        actions: &[MenuAction::StartDrawing, MenuAction::StopDrawing, MenuAction::ToggleEraser],
    },
    MenuSection {
        title: "Edit",
        actions: &[MenuAction::Undo, MenuAction::Redo, MenuAction::ClearCanvas],
    },
    MenuSection {
        title: "Gaze",
        actions: &[MenuAction::Recalibrate, MenuAction::ResetGaze],
    },
];

/// `None` is the top level; `Some(i)` means section `i` is open and further
/// commands run its actions until the menu is cleared.
#[derive(Debug, Default)]
pub struct CommandMenu {
    selected: Option<usize>,
}

impl CommandMenu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn handle(&mut self, command: MentalCommand) -> Option<MenuAction> {
        let index = command.index();
        match self.selected {
            None => {
                if index < MENU_SECTIONS.len() {
                    info!("Menu section selected: {}", MENU_SECTIONS[index].title);
                    self.selected = Some(index);
                }
                None
            }
            Some(section) => {
                let action = MENU_SECTIONS[section].actions.get(index).copied();
                match action {
                    Some(action) => info!("Menu action: {}", action.label()),
                    None => debug!(
                        "Section {} has no action {}",
                        MENU_SECTIONS[section].title, index
                    ),
                }
                action
            }
        }
    }

    pub fn clear(&mut self) {
        if self.selected.take().is_some() {
            debug!("Menu cleared");
        }
    }
}

/// Drops commands arriving within `window` of the last accepted one.
#[derive(Debug)]
pub struct CommandDebouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl CommandDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}

impl Default for CommandDebouncer {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}
