use ratatui::style::Color;

// Slate panels with a render-orange accent.
pub const BAR_BG: Color = Color::Rgb(18, 22, 30);

pub const FG: Color = Color::Rgb(226, 232, 240);
pub const MUTED: Color = Color::Rgb(148, 163, 184);
pub const DIM: Color = Color::Rgb(100, 116, 139);
pub const BORDER: Color = Color::Rgb(51, 65, 85);

pub const ACCENT: Color = Color::Rgb(251, 146, 60);
pub const ACCENT_BG: Color = Color::Rgb(48, 30, 14);

pub const SUCCESS: Color = Color::Rgb(74, 222, 128); // running indicator, progress gauge
pub const ERROR: Color = Color::Rgb(239, 68, 68); // crash count, stop button
