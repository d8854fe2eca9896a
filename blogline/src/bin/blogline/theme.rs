use colored::Color;
use once_cell::sync::Lazy;

/// Colors for one-line status messages
pub struct StatusColors {
    pub success: Color,
    pub error: Color,
    pub warning: Color,
    pub info: Color,
    pub progress: Color,
    pub muted: Color,
}

/// Colors for a post page and its comment thread
pub struct ThreadColors {
    pub title: Color,
    pub field: Color,
    pub value: Color,
    pub comment_id: Color,
    pub byline: Color,
    /// Note on a reply shown at top level because its parent is gone
    pub promoted: Color,
    pub delete_action: Color,
    pub reply_action: Color,
}

pub struct Theme {
    pub status: StatusColors,
    pub thread: ThreadColors,
}

pub static THEME: Lazy<Theme> = Lazy::new(|| Theme {
    status: StatusColors {
        success: Color::Green,
        error: Color::Red,
        warning: Color::Yellow,
        info: Color::Blue,
        progress: Color::Cyan,
        muted: Color::BrightBlack,
    },
    thread: ThreadColors {
        title: Color::BrightBlue,
        field: Color::BrightCyan,
        value: Color::White,
        comment_id: Color::BrightBlack,
        byline: Color::BrightBlack,
        promoted: Color::Yellow,
        delete_action: Color::Red,
        reply_action: Color::Magenta,
    },
});

/// Glyphs for status lines and the shape of a thread
pub struct Glyphs {
    pub success: &'static str,
    pub error: &'static str,
    pub warning: &'static str,
    pub info: &'static str,
    pub progress: &'static str,
    pub hint: &'static str,
    pub top_level: &'static str,
    pub reply: &'static str,
    pub promoted: &'static str,
    pub signed_in: &'static str,
    pub signed_out: &'static str,
    /// One nesting level of a reply
    pub indent: &'static str,
}

pub const GLYPHS: Glyphs = Glyphs {
    success: "✓",
    error: "✗",
    warning: "⚠",
    info: "ℹ",
    progress: "⟳",
    hint: "→",
    top_level: "•",
    reply: "↳",
    promoted: "⤴",
    signed_in: "🔓",
    signed_out: "🔒",
    indent: "    ",
};
