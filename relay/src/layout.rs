use share_socket::message::{Position, Positions};

/// Virtual canvas dimensions the positions are expressed in.
pub const ROOM_WIDTH: i32 = 725;
pub const ROOM_HEIGHT: i32 = 513;

/// The one shared room every client lands in.
pub const DEFAULT_ROOM: &str = "global";

/// Fixed desk layout for the default room. Server-authoritative: client
/// update requests are accepted on the wire but discarded.
pub fn default_layout() -> Positions {
    [
        ("Mgh", 0, 0),
        ("Matin Bzr", 391, 151),
        ("Aref", 151, 363),
        ("Sahand", 543, 152),
        ("Sina", 0, 363),
        ("Pouria", 152, 0),
        ("Amirhossein", 543, 0),
        ("Matin M.", 473, 363),
        ("M.Lashkari", 393, 0),
        ("Parsa", 76, 212),
    ]
    .into_iter()
    .map(|(name, x, y)| (name.to_string(), Position { x, y }))
    .collect()
}

/// Rooms other than the default start with an empty layout.
pub fn layout_for(room: &str) -> Positions {
    if room == DEFAULT_ROOM {
        default_layout()
    } else {
        Positions::new()
    }
}
