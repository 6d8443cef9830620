/// Maps workflow key names to the names the SUT agent understands.
///
/// Unknown names pass through unchanged so single characters (`a`, `1`) and
/// already-canonical names keep working.
pub fn canonical_key(name: &str) -> String {
    let trimmed = name.trim();
    let lower = trimmed.to_ascii_lowercase();
    let mapped = match lower.as_str() {
        "enter" | "return" => "Return",
        "space" => "space",
        "tab" => "Tab",
        "escape" | "esc" => "Escape",
        "delete" | "del" => "Delete",
        "backspace" => "BackSpace",
        "shift" => "Shift_L",
        "ctrl" | "control" => "Control_L",
        "alt" => "Alt_L",
        "win" | "super" => "Super_L",
        "up" => "Up",
        "down" => "Down",
        "left" => "Left",
        "right" => "Right",
        "home" => "Home",
        "end" => "End",
        "pageup" | "page_up" => "Page_Up",
        "pagedown" | "page_down" => "Page_Down",
        _ => return function_key(&lower).unwrap_or_else(|| trimmed.to_string()),
    };
    mapped.to_string()
}

fn function_key(lower: &str) -> Option<String> {
    let n: u8 = lower.strip_prefix('f')?.parse().ok()?;
    (1..=12).contains(&n).then(|| format!("F{n}"))
}
