pub fn random_u32() -> u32 {
    (js_sys::Math::random() * (u32::MAX as f64 + 1.0)) as u32
}

/// Prefix for ids minted in this tab, so two tabs never collide.
pub fn make_session_prefix() -> String {
    let now = js_sys::Date::now() as u64;
    let rand = random_u32();
    format!("{now:x}-{rand:08x}")
}

pub fn now_iso() -> String {
    js_sys::Date::new_0().to_iso_string().into()
}
