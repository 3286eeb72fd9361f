use std::env;
use std::path::PathBuf;

/// File name of the record inside the home directory
pub const RECORD_FILE: &str = ".fwsync";

/// Locate the user's home directory
pub fn resolve_home_directory() -> Result<PathBuf, String> {
    if let Some(home) = env::var_os("HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    if let Some(user_profile) = env::var_os("USERPROFILE") {
        if !user_profile.is_empty() {
            return Ok(PathBuf::from(user_profile));
        }
    }

    Err("Home directory is not configured (HOME/USERPROFILE).".to_string())
}

/// Path of the local record: the explicit override, else `~/.fwsync`
pub fn record_path(explicit: Option<PathBuf>) -> Result<PathBuf, String> {
    match explicit {
        Some(path) => Ok(path),
        None => resolve_home_directory().map(|home| home.join(RECORD_FILE)),
    }
}
