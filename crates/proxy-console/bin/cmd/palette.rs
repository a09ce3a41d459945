use proxy_console::Level;

/// Display color of each level, shared by the dashboard and the tail output.
pub(crate) fn level_rgb(level: Level) -> (u8, u8, u8) {
    match level {
        Level::Critical => (220, 38, 38),
        Level::Error => (239, 68, 68),
        Level::Warning => (245, 158, 11),
        Level::Notice => (59, 130, 246),
        Level::Connect => (16, 185, 129),
        Level::Info => (156, 163, 175),
    }
}
