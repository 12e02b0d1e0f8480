/// Colour scheme for the dashboard.
///
/// All colours the renderer uses are named here so the drawing code
/// references semantic values rather than raw RGB triples. Terminals without
/// true-colour support approximate `Color::Rgb` themselves.
use ratatui::style::{Color, Modifier, Style};

/// Semantic colour palette.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub text_primary: Color,
    pub text_secondary: Color,
    pub text_muted: Color,
    pub accent: Color,
    pub folder: Color,
    pub file: Color,
    pub error: Color,
    pub warning: Color,
    pub success: Color,
    pub bar_small: Color,
    pub bar_large: Color,
    pub bar_track: Color,
    pub selection: Color,
    pub header_bg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            text_primary: Color::Rgb(0xe4, 0xe4, 0xe8),
            text_secondary: Color::Rgb(0xb8, 0xb8, 0xc4),
            text_muted: Color::Rgb(0x6c, 0x70, 0x86),
            accent: Color::Rgb(0x89, 0xb4, 0xfa),
            folder: Color::Rgb(0xf9, 0xe2, 0xaf),
            file: Color::Rgb(0x89, 0xb4, 0xfa),
            error: Color::Rgb(0xf3, 0x8b, 0xa8),
            warning: Color::Rgb(0xfa, 0xb3, 0x87),
            success: Color::Rgb(0xa6, 0xe3, 0xa1),
            bar_small: Color::Rgb(0xa6, 0xe3, 0xa1),
            bar_large: Color::Rgb(0xf3, 0x8b, 0xa8),
            bar_track: Color::Rgb(0x2a, 0x2a, 0x3c),
            selection: Color::Rgb(0x28, 0x3a, 0x5c),
            header_bg: Color::Rgb(0x22, 0x22, 0x34),
        }
    }

    pub fn title(&self) -> Style {
        Style::default()
            .fg(self.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn muted(&self) -> Style {
        Style::default().fg(self.text_muted)
    }

    pub fn highlight(&self) -> Style {
        Style::default()
            .bg(self.selection)
            .add_modifier(Modifier::BOLD)
    }

    /// Bar colour interpolated between `bar_small` and `bar_large` by
    /// percentage (0.0 – 100.0).
    pub fn bar_color(&self, percent: f32) -> Color {
        let t = (percent / 100.0).clamp(0.0, 1.0);
        lerp_color(self.bar_small, self.bar_large, t)
    }
}

/// Linear interpolation between two RGB colours. Named colours are returned
/// unchanged since they have no components to blend.
fn lerp_color(a: Color, b: Color, t: f32) -> Color {
    match (a, b) {
        (Color::Rgb(ar, ag, ab), Color::Rgb(br, bg, bb)) => {
            let t = t.clamp(0.0, 1.0);
            let mix = |x: u8, y: u8| (x as f32 * (1.0 - t) + y as f32 * t) as u8;
            Color::Rgb(mix(ar, br), mix(ag, bg), mix(ab, bb))
        }
        _ if t < 0.5 => a,
        _ => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_colour_runs_from_small_to_large() {
        let theme = Theme::dark();
        assert_eq!(theme.bar_color(0.0), theme.bar_small);
        assert_eq!(theme.bar_color(100.0), theme.bar_large);
        assert_eq!(theme.bar_color(250.0), theme.bar_large);
        assert_ne!(theme.bar_color(50.0), theme.bar_small);
    }
}
