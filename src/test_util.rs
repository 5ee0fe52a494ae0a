#[cfg(test)]
pub(crate) fn with_temp_home<F, R>(func: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    static HOME_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
    let _guard = HOME_MUTEX.lock().unwrap_or_else(|err| err.into_inner());
    let dir = tempfile::tempdir().expect("tempdir");
    let old_home = std::env::var("HOME").ok();
    // SAFETY: HOME_MUTEX serializes every test that touches HOME.
    unsafe { std::env::set_var("HOME", dir.path()) };
    let result = func(dir.path());
    if let Some(old) = old_home {
        unsafe { std::env::set_var("HOME", old) };
    } else {
        unsafe { std::env::remove_var("HOME") };
    }
    result
}
